//! Reference datasets.
//!
//! ## Submodules
//!
//! - [`array`] — finite dataset backed by fixed train/validation/test arrays
//! - [`streaming`] — infinite dataset drawing fresh samples from a generator

pub mod array;
pub mod streaming;

pub use array::{split_fractions, ArrayDataset};
pub use streaming::FnDataset;
