//! Reference optimizers.
//!
//! Deltas are gradients: both optimizers descend, `p ← p - step(delta)`.
//! State (velocities, moments) is keyed by parameter name and created on
//! first use, so one optimizer can serve the decoder and the network
//! parameters together.

use ndarray::Array2;
use std::collections::BTreeMap;

use crate::core::{Optimizer, ParamMap, Result, TrialError};

fn target<'a>(params: &'a mut ParamMap, key: &str, delta: &Array2<f64>) -> Result<&'a mut Array2<f64>> {
    let p = params
        .get_mut(key)
        .ok_or_else(|| TrialError::Collaborator(format!("no parameter named {key}")))?;
    if p.dim() != delta.dim() {
        return Err(TrialError::ShapeMismatch(format!(
            "delta for {key} has shape {:?}, parameter has {:?}",
            delta.dim(),
            p.dim()
        )));
    }
    Ok(p)
}

/// SGD optimizer with optional momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f64,
    momentum: f64,
    velocities: BTreeMap<String, Array2<f64>>,
}

impl Sgd {
    pub fn new(lr: f64, momentum: f64) -> Self {
        Self {
            lr,
            momentum,
            velocities: BTreeMap::new(),
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self::new(1e-2, 0.9)
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut ParamMap, deltas: &ParamMap) -> Result<()> {
        for (key, grad) in deltas {
            let p = target(params, key, grad)?;
            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad
                let velocity = match self.velocities.get(key) {
                    Some(v) => v * self.momentum - grad * self.lr,
                    None => grad * (-self.lr),
                };
                *p += &velocity;
                self.velocities.insert(key.clone(), velocity);
            } else {
                p.scaled_add(-self.lr, grad);
            }
        }
        Ok(())
    }
}

/// Adam optimizer.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    /// Per-parameter step counts
    t: BTreeMap<String, i32>,
    m: BTreeMap<String, Array2<f64>>,
    v: BTreeMap<String, Array2<f64>>,
}

impl Adam {
    pub fn new(lr: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: BTreeMap::new(),
            m: BTreeMap::new(),
            v: BTreeMap::new(),
        }
    }

    pub fn default_params(lr: f64) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::default_params(1e-3)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut ParamMap, deltas: &ParamMap) -> Result<()> {
        for (key, grad) in deltas {
            let p = target(params, key, grad)?;
            let t = self.t.entry(key.clone()).or_insert(0);
            *t += 1;
            let (b1, b2) = (self.beta1, self.beta2);

            let m = self
                .m
                .entry(key.clone())
                .or_insert_with(|| Array2::zeros(grad.dim()));
            *m = &*m * b1 + grad * (1.0 - b1);
            let v = self
                .v
                .entry(key.clone())
                .or_insert_with(|| Array2::zeros(grad.dim()));
            *v = &*v * b2 + grad.mapv(|g| g * g) * (1.0 - b2);

            let m_hat_scale = 1.0 / (1.0 - b1.powi(*t));
            let v_hat_scale = 1.0 / (1.0 - b2.powi(*t));
            let (lr, eps) = (self.lr, self.epsilon);
            ndarray::Zip::from(p)
                .and(&*m)
                .and(&*v)
                .for_each(|p, &m, &v| {
                    *p -= lr * (m * m_hat_scale) / ((v * v_hat_scale).sqrt() + eps);
                });
        }
        Ok(())
    }
}
