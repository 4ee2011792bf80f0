//! Model module for the convolutional classifier using the Burn framework
//!
//! ## Architecture
//!
//! Two convolution + max-pool stages followed by a 128-unit dense layer and a
//! linear output layer with one logit per class.

pub mod cnn;

pub use cnn::{Classifier, ClassifierConfig};
