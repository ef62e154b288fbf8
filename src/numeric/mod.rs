//! Floating point error policy.
//!
//! Rust floats never trap, so faults are detected by screening values
//! produced during training. The active [`ErrPolicy`] decides which
//! conditions are raised as a [`NumericFault`] and which are ignored:
//!
//! | condition       | detected as                          |
//! |-----------------|--------------------------------------|
//! | divide by zero  | [`checked_div`] with a zero divisor  |
//! | overflow        | an infinite value                    |
//! | invalid         | a NaN value                          |
//! | underflow       | a subnormal value                    |
//!
//! The policy is thread-local. Install one for a scope with
//! [`ErrStateGuard::install`]; the previous policy comes back when the guard
//! drops, including on early return and unwind.

use ndarray::{ArrayBase, Data, Dimension};
use std::cell::Cell;
use thiserror::Error;

/// What to do when a floating point condition is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultAction {
    #[default]
    Ignore,
    Raise,
}

/// Per-condition fault actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrPolicy {
    pub divide: FaultAction,
    pub over: FaultAction,
    pub under: FaultAction,
    pub invalid: FaultAction,
}

impl ErrPolicy {
    /// Raise on divide, overflow and invalid; flush underflow silently.
    pub fn strict() -> Self {
        Self {
            divide: FaultAction::Raise,
            over: FaultAction::Raise,
            under: FaultAction::Ignore,
            invalid: FaultAction::Raise,
        }
    }

    /// Ignore everything.
    pub fn lenient() -> Self {
        Self::default()
    }
}

/// A floating point condition raised under the active policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumericFault {
    #[error("floating point divide by zero in {0}")]
    DivideByZero(String),
    #[error("floating point overflow in {0}")]
    Overflow(String),
    #[error("floating point underflow in {0}")]
    Underflow(String),
    #[error("invalid floating point value in {0}")]
    Invalid(String),
}

thread_local! {
    static POLICY: Cell<ErrPolicy> = Cell::new(ErrPolicy::default());
}

/// Currently active policy on this thread.
pub fn geterr() -> ErrPolicy {
    POLICY.with(Cell::get)
}

/// Replace the active policy, returning the previous one.
pub fn seterr(policy: ErrPolicy) -> ErrPolicy {
    POLICY.with(|p| p.replace(policy))
}

/// Scope guard restoring the previous policy on drop.
#[must_use = "the policy is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ErrStateGuard {
    previous: ErrPolicy,
}

impl ErrStateGuard {
    pub fn install(policy: ErrPolicy) -> Self {
        Self {
            previous: seterr(policy),
        }
    }

    /// Policy that will be restored.
    pub fn previous(&self) -> ErrPolicy {
        self.previous
    }
}

impl Drop for ErrStateGuard {
    fn drop(&mut self) {
        seterr(self.previous);
    }
}

/// Classify a single value under `policy`.
fn classify(value: f64, policy: &ErrPolicy, context: &str) -> Result<(), NumericFault> {
    if value.is_nan() {
        if policy.invalid == FaultAction::Raise {
            return Err(NumericFault::Invalid(context.to_string()));
        }
    } else if value.is_infinite() {
        if policy.over == FaultAction::Raise {
            return Err(NumericFault::Overflow(context.to_string()));
        }
    } else if value.is_subnormal() && policy.under == FaultAction::Raise {
        return Err(NumericFault::Underflow(context.to_string()));
    }
    Ok(())
}

/// Screen a scalar against the active policy.
pub fn check_scalar(value: f64, context: &str) -> Result<f64, NumericFault> {
    classify(value, &geterr(), context)?;
    Ok(value)
}

/// Screen every element of an array against the active policy.
///
/// Returns the first fault found in memory order.
pub fn check_array<S, D>(values: &ArrayBase<S, D>, context: &str) -> Result<(), NumericFault>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let policy = geterr();
    if policy == ErrPolicy::lenient() {
        return Ok(());
    }
    values
        .iter()
        .try_for_each(|&v| classify(v, &policy, context))
}

/// Division honoring the `divide` action.
///
/// With `Ignore`, behaves like plain `/` (yielding ±inf or NaN).
pub fn checked_div(numerator: f64, denominator: f64) -> Result<f64, NumericFault> {
    if denominator == 0.0 && geterr().divide == FaultAction::Raise {
        return Err(NumericFault::DivideByZero(format!(
            "{numerator} / {denominator}"
        )));
    }
    Ok(numerator / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_default_policy_ignores_everything() {
        assert_eq!(geterr(), ErrPolicy::lenient());
        assert!(checked_div(1.0, 0.0).unwrap().is_infinite());
        assert!(check_array(&array![f64::NAN, f64::INFINITY], "x").is_ok());
    }

    #[test]
    fn test_guard_restores_previous_policy() {
        let before = geterr();
        {
            let guard = ErrStateGuard::install(ErrPolicy::strict());
            assert_eq!(guard.previous(), before);
            assert_eq!(geterr(), ErrPolicy::strict());
        }
        assert_eq!(geterr(), before);
    }

    #[test]
    fn test_nested_guards() {
        let outer = ErrStateGuard::install(ErrPolicy::strict());
        {
            let _inner = ErrStateGuard::install(ErrPolicy::lenient());
            assert_eq!(geterr(), ErrPolicy::lenient());
        }
        assert_eq!(geterr(), ErrPolicy::strict());
        drop(outer);
        assert_eq!(geterr(), ErrPolicy::lenient());
    }

    #[test]
    fn test_strict_classification() {
        let _guard = ErrStateGuard::install(ErrPolicy::strict());
        assert!(matches!(
            check_array(&array![1.0, f64::INFINITY], "acts"),
            Err(NumericFault::Overflow(_))
        ));
        assert!(matches!(
            check_array(&array![[f64::NAN]], "acts"),
            Err(NumericFault::Invalid(_))
        ));
        assert!(matches!(
            checked_div(1.0, 0.0),
            Err(NumericFault::DivideByZero(_))
        ));
        // Underflow is flushed silently
        assert!(check_scalar(f64::MIN_POSITIVE / 4.0, "tiny").is_ok());
        assert_eq!(checked_div(6.0, 3.0).unwrap(), 2.0);
    }

    #[test]
    fn test_underflow_raise() {
        let policy = ErrPolicy {
            under: FaultAction::Raise,
            ..ErrPolicy::default()
        };
        let _guard = ErrStateGuard::install(policy);
        assert!(matches!(
            check_scalar(f64::MIN_POSITIVE / 4.0, "tiny"),
            Err(NumericFault::Underflow(_))
        ));
        assert!(check_scalar(0.0, "zero").is_ok());
    }

    #[test]
    fn test_guard_restores_on_unwind() {
        let before = geterr();
        let outcome = std::panic::catch_unwind(|| {
            let _guard = ErrStateGuard::install(ErrPolicy::strict());
            panic!("boom");
        });
        assert!(outcome.is_err());
        assert_eq!(geterr(), before);
    }
}
