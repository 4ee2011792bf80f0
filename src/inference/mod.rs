//! Test-time evaluation of persisted models
//!
//! Evaluation restores a model from its artifact and scores it on the plain
//! (non-autodiff) backend, so it shares nothing with the run that trained it.

pub mod evaluator;

pub use evaluator::Evaluator;
