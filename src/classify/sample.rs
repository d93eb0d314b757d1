use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One classifier guess for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSample {
    pub label: String,
    /// Confidence of `label`, in `[0, 1]`.
    pub confidence: f32,
    /// Confidence per known class.
    pub per_class: BTreeMap<String, f32>,
}

impl ClassifierSample {
    /// Build a sample, rejecting empty labels and confidences outside `[0, 1]`.
    pub fn new(
        label: impl Into<String>,
        confidence: f32,
        per_class: BTreeMap<String, f32>,
    ) -> Result<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(anyhow!("classifier label must not be empty"));
        }
        check_confidence(&label, confidence)?;
        for (class, value) in &per_class {
            check_confidence(class, *value)?;
        }
        Ok(Self {
            label,
            confidence,
            per_class,
        })
    }

    /// Sample whose per-class map holds only the winning label.
    pub fn single(label: impl Into<String>, confidence: f32) -> Result<Self> {
        let label = label.into();
        let per_class = BTreeMap::from([(label.clone(), confidence)]);
        Self::new(label, confidence, per_class)
    }

    /// Pick the highest-scoring class of a distribution.
    ///
    /// Equal scores resolve to the class that sorts first.
    pub fn from_distribution(per_class: BTreeMap<String, f32>) -> Result<Self> {
        let (label, confidence) = per_class
            .iter()
            .fold(None::<(&String, f32)>, |best, (class, &value)| match best {
                Some((_, top)) if top >= value => best,
                _ => Some((class, value)),
            })
            .map(|(class, value)| (class.clone(), value))
            .ok_or_else(|| anyhow!("classifier produced an empty distribution"))?;
        Self::new(label, confidence, per_class)
    }
}

fn check_confidence(label: &str, value: f32) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(anyhow!(
            "confidence for '{}' must be within [0, 1], got {}",
            label,
            value
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_samples() {
        assert!(ClassifierSample::single("", 0.5).is_err());
        assert!(ClassifierSample::single("ok", 1.5).is_err());
        assert!(ClassifierSample::single("ok", f32::NAN).is_err());
        let per_class = BTreeMap::from([("dent".to_string(), -0.1)]);
        assert!(ClassifierSample::new("ok", 0.5, per_class).is_err());
    }

    #[test]
    fn distribution_picks_top_class() {
        let dist = BTreeMap::from([
            ("ok".to_string(), 0.2),
            ("scratch".to_string(), 0.7),
            ("dent".to_string(), 0.1),
        ]);
        let sample = ClassifierSample::from_distribution(dist).unwrap();
        assert_eq!(sample.label, "scratch");
        assert_eq!(sample.confidence, 0.7);
        assert_eq!(sample.per_class.len(), 3);

        assert!(ClassifierSample::from_distribution(BTreeMap::new()).is_err());
    }
}
