//! Waste classification boundary.
//!
//! A `Classifier` wraps one shared model handle and turns a snapshot path
//! into a typed `ClassificationOutcome`.

mod backend;
pub mod backends;
mod classifier;
mod error;
mod loader;
mod result;

pub use backends::ColorHeuristicBackend;
pub use backend::{ClassifierBackend, InputScale, ModelHandle, ModelInput, DEFAULT_INPUT_SIZE};
pub use classifier::{select_prediction, Classifier};
pub use error::ClassifyError;
pub use loader::load_model;
pub use result::{Category, ClassificationOutcome, FailureCause, Prediction, Unavailable};
