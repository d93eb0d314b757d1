mod backend;
pub mod backends;
mod registry;
mod sample;

pub use backend::Classifier;
pub use backends::{CentroidClassifier, StubClassifier, StubStep};
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use registry::ClassifierRegistry;
pub use sample::ClassifierSample;
