//! Backend selection
//!
//! Training runs on the autodiff wrapper; test-time evaluation runs on the
//! plain backend so it never touches a gradient graph.

use burn::backend::Autodiff;

/// Plain CPU backend used for evaluation
pub type DefaultBackend = burn_ndarray::NdArray;

/// The autodiff backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    <DefaultBackend as burn::tensor::backend::Backend>::Device::default()
}

/// Human-readable backend name for the banner
pub fn backend_name() -> &'static str {
    "NdArray (CPU)"
}
