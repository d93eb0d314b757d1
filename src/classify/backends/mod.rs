pub mod centroid;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use centroid::CentroidClassifier;
pub use stub::{StubClassifier, StubStep};

#[cfg(feature = "backend-tract")]
pub use tract::TractClassifier;
