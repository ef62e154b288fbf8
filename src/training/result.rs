//! Trial result record.
//!
//! Arrays are exported as nested `Vec`s so the record serializes to plain
//! JSON; NaN errors become `null`.

use ndarray::Array2;
use serde_json::{Map, Value};

use crate::core::ParamMap;

/// Outcome of a completed trial.
#[derive(Debug, Clone)]
pub struct TrialResult {
    /// 1..=n_epochs
    pub epochs: Vec<usize>,
    pub n_epochs: usize,
    pub errs_training: Vec<f64>,
    pub errs_validation: Vec<f64>,
    /// `None` unless the test error was requested.
    pub err_test: Option<f64>,
    /// Parameters before training, including the zero decoder `D`.
    pub p_initial: ParamMap,
    /// Parameters after the last epoch.
    pub p_final: ParamMap,
}

/// Convert an Array2 to Vec<Vec<f64>> for serialization.
fn array2_to_vecs(arr: &Array2<f64>) -> Vec<Vec<f64>> {
    arr.rows().into_iter().map(|row| row.to_vec()).collect()
}

impl TrialResult {
    pub fn new(
        errs_training: Vec<f64>,
        errs_validation: Vec<f64>,
        err_test: Option<f64>,
        p_initial: ParamMap,
        p_final: ParamMap,
    ) -> Self {
        let n_epochs = errs_training.len();
        Self {
            epochs: (1..=n_epochs).collect(),
            n_epochs,
            errs_training,
            errs_validation,
            err_test,
            p_initial,
            p_final,
        }
    }

    pub fn p_initial(&self, key: &str) -> Option<&Array2<f64>> {
        self.p_initial.get(key)
    }

    pub fn p_final(&self, key: &str) -> Option<&Array2<f64>> {
        self.p_final.get(key)
    }

    /// Parameter names, sorted.
    pub fn param_keys(&self) -> impl Iterator<Item = &str> {
        self.p_final.keys().map(String::as_str)
    }

    /// Flat JSON record with `p_initial_<key>` / `p_final_<key>` entries.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("epochs".to_string(), Value::from(self.epochs.clone()));
        map.insert("n_epochs".to_string(), Value::from(self.n_epochs));
        map.insert(
            "errs_training".to_string(),
            Value::from(self.errs_training.clone()),
        );
        map.insert(
            "errs_validation".to_string(),
            Value::from(self.errs_validation.clone()),
        );
        map.insert(
            "err_test".to_string(),
            self.err_test.map_or(Value::Null, Value::from),
        );
        for (key, value) in &self.p_initial {
            map.insert(format!("p_initial_{key}"), serde_json::json!(array2_to_vecs(value)));
        }
        for (key, value) in &self.p_final {
            map.insert(format!("p_final_{key}"), serde_json::json!(array2_to_vecs(value)));
        }
        Value::Object(map)
    }
}
