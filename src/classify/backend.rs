use anyhow::Result;

use crate::classify::ClassifierSample;
use crate::frame::FullFrame;

/// Image classifier port.
///
/// Implementations map one full-resolution frame to a label distribution. A
/// returned error is a failed classification for that frame only; callers treat it
/// as "no sample" and carry on.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Classify one frame.
    fn classify(&mut self, frame: &FullFrame) -> Result<ClassifierSample>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drop any training examples held by the backend.
    ///
    /// Returns false when the backend has no training data to clear.
    fn clear_training(&mut self) -> bool {
        false
    }
}
