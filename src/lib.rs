//! # encoder-bench
//!
//! Runs single training trials for encoder/decoder learning-rule benchmarks.
//!
//! ## Overview
//!
//! A trial trains a network whose hidden activities `A` are read out by a
//! linear decoder `D`. Each epoch draws samples from a [`Dataset`], updates
//! `D` through a [`DecoderLearningRule`] and, optionally, the network
//! parameters through an [`EncoderLearningRule`]. An [`Optimizer`] applies
//! the resulting deltas. Training and validation errors are recorded per
//! epoch; a test error may be computed once at the end.
//!
//! Floating point faults (overflow, invalid values, division by zero) abort
//! a trial; see [`numeric`].
//!
//! ## Structure
//!
//! - [`core`] — Collaborator traits, parameter mapping, error types
//! - [`training`] — The trial driver, progress hooks, results
//! - [`numeric`] — Floating point error policy and its scope guard
//! - [`data`] — Reference finite and streaming datasets
//! - [`network`] — Reference rate network and activations
//! - [`rules`] — Reference decoder and encoder learning rules
//! - [`optim`] — Reference optimizers
//! - [`utils`] — Math helpers

pub mod core;
pub mod data;
pub mod network;
pub mod numeric;
pub mod optim;
pub mod rules;
pub mod training;
pub mod utils;

pub use crate::core::{
    AbortReport, Dataset, DecoderLearningRule, EncoderLearningRule, Network, Optimizer, ParamMap,
    Partition, Result, Samples, TrialError, DECODER_KEY,
};
pub use training::{
    print_json_progress, print_progress, run_single_trial, BatchSnapshot, Collaborators,
    TrialResult,
};

use serde::{Deserialize, Serialize};

/// Scalar settings of one trial.
///
/// Used by [`run_single_trial`] together with a set of [`Collaborators`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// Samples per epoch. `None` uses the full finite training pool, or
    /// `n_smpls_per_epoch` for streaming datasets.
    pub epoch_size: Option<usize>,
    pub batch_size: usize,
    /// Samples form a time series; batches are not shuffled.
    pub sequential: bool,
    pub n_epochs: usize,
    /// Epoch size for streaming datasets when `epoch_size` is unset.
    pub n_smpls_per_epoch: usize,
    pub compute_test_error: bool,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            epoch_size: None,
            batch_size: 100,
            sequential: false,
            n_epochs: 1000,
            n_smpls_per_epoch: 10000,
            compute_test_error: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TrialConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.n_epochs, 1000);
        assert_eq!(config.n_smpls_per_epoch, 10000);
        assert!(config.epoch_size.is_none());
        assert!(!config.sequential);
        assert!(!config.compute_test_error);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: TrialConfig =
            serde_json::from_str(r#"{"batch_size": 5, "epoch_size": 20}"#).unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.epoch_size, Some(20));
        assert_eq!(config.n_epochs, 1000);
    }
}
