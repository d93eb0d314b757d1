use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

use crate::classify::backend::Classifier;
use crate::classify::ClassifierSample;
use crate::frame::FullFrame;

/// Fraction of each axis, centred, that the classifier looks at.
pub const DEFAULT_ROI_FRACTION: f32 = 0.5;
/// Colour distance scale of the softmax. Larger values flatten the distribution.
pub const DEFAULT_TEMPERATURE: f32 = 20.0;

#[derive(Clone, Debug, Default)]
struct Centroid {
    sum: [f64; 3],
    count: u64,
}

impl Centroid {
    fn add(&mut self, rgb: [f32; 3]) {
        for (acc, value) in self.sum.iter_mut().zip(rgb) {
            *acc += value as f64;
        }
        self.count += 1;
    }

    fn mean(&self) -> [f32; 3] {
        let n = self.count.max(1) as f64;
        [
            (self.sum[0] / n) as f32,
            (self.sum[1] / n) as f32,
            (self.sum[2] / n) as f32,
        ]
    }
}

/// CPU backend: nearest-centroid over the mean colour of the central region.
///
/// Training examples live in memory only. Classifying before any example has been
/// added fails, which callers treat as a missing sample.
pub struct CentroidClassifier {
    classes: BTreeMap<String, Centroid>,
    roi_fraction: f32,
    temperature: f32,
}

impl CentroidClassifier {
    pub fn new(roi_fraction: f32, temperature: f32) -> Self {
        Self {
            classes: BTreeMap::new(),
            roi_fraction,
            temperature: if temperature > 0.0 {
                temperature
            } else {
                DEFAULT_TEMPERATURE
            },
        }
    }

    /// Add a training example from a frame.
    pub fn train(&mut self, label: &str, frame: &FullFrame) -> Result<()> {
        self.train_rgb(label, frame.central_mean_rgb(self.roi_fraction))
    }

    /// Add a training example given directly as a mean colour.
    pub fn train_rgb(&mut self, label: &str, rgb: [f32; 3]) -> Result<()> {
        let label = label.trim();
        if label.is_empty() {
            return Err(anyhow!("training label must not be empty"));
        }
        if rgb.iter().any(|c| !c.is_finite()) {
            return Err(anyhow!("training colour for '{}' is not finite", label));
        }
        self.classes.entry(label.to_string()).or_default().add(rgb);
        Ok(())
    }

    pub fn labels(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    pub fn example_count(&self) -> u64 {
        self.classes.values().map(|c| c.count).sum()
    }

    fn distribution(&self, rgb: [f32; 3]) -> BTreeMap<String, f32> {
        let distances: Vec<(&String, f32)> = self
            .classes
            .iter()
            .map(|(label, centroid)| {
                let mean = centroid.mean();
                let d = ((mean[0] - rgb[0]).powi(2)
                    + (mean[1] - rgb[1]).powi(2)
                    + (mean[2] - rgb[2]).powi(2))
                .sqrt();
                (label, d)
            })
            .collect();
        let nearest = distances
            .iter()
            .map(|(_, d)| *d)
            .fold(f32::INFINITY, f32::min);

        let weights: Vec<f32> = distances
            .iter()
            .map(|(_, d)| (-(d - nearest) / self.temperature).exp())
            .collect();
        let total: f32 = weights.iter().sum();

        distances
            .iter()
            .zip(weights)
            .map(|((label, _), w)| ((*label).clone(), (w / total).clamp(0.0, 1.0)))
            .collect()
    }
}

impl Default for CentroidClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_ROI_FRACTION, DEFAULT_TEMPERATURE)
    }
}

impl Classifier for CentroidClassifier {
    fn name(&self) -> &'static str {
        "centroid"
    }

    fn classify(&mut self, frame: &FullFrame) -> Result<ClassifierSample> {
        if self.classes.is_empty() {
            return Err(anyhow!("centroid classifier has no training examples"));
        }
        let rgb = frame.central_mean_rgb(self.roi_fraction);
        ClassifierSample::from_distribution(self.distribution(rgb))
    }

    fn clear_training(&mut self) -> bool {
        let had_examples = !self.classes.is_empty();
        self.classes.clear();
        had_examples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(rgb: [u8; 3]) -> FullFrame {
        let data = rgb.iter().copied().cycle().take(8 * 8 * 3).collect();
        FullFrame::from_rgb(data, 8, 8).unwrap()
    }

    #[test]
    fn untrained_classifier_fails() {
        let mut classifier = CentroidClassifier::default();
        assert!(classifier.classify(&solid([0, 0, 0])).is_err());
    }

    #[test]
    fn nearest_centroid_wins() -> Result<()> {
        let mut classifier = CentroidClassifier::default();
        classifier.train_rgb("ok", [40.0, 160.0, 60.0])?;
        classifier.train_rgb("scratch", [200.0, 40.0, 40.0])?;
        classifier.train("scratch", &solid([210, 50, 30]))?;
        assert_eq!(classifier.example_count(), 3);

        let sample = classifier.classify(&solid([45, 150, 70]))?;
        assert_eq!(sample.label, "ok");
        assert!(sample.confidence > 0.9);
        let total: f32 = sample.per_class.values().sum();
        assert!((total - 1.0).abs() < 1e-4);

        let sample = classifier.classify(&solid([205, 45, 35]))?;
        assert_eq!(sample.label, "scratch");
        Ok(())
    }

    #[test]
    fn clear_training_forgets_examples() -> Result<()> {
        let mut classifier = CentroidClassifier::default();
        assert!(!classifier.clear_training());
        classifier.train_rgb("ok", [1.0, 2.0, 3.0])?;
        assert!(classifier.clear_training());
        assert!(classifier.labels().is_empty());
        assert!(classifier.train_rgb(" ", [0.0; 3]).is_err());
        Ok(())
    }
}
