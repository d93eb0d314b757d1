#![cfg(feature = "backend-tract")]

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::classify::backend::Classifier;
use crate::classify::ClassifierSample;
use crate::frame::FullFrame;

/// Tract-based backend for ONNX image classification.
///
/// The model takes a `1x3xHxW` float tensor in `[0, 1]` and produces one score per
/// label. Scores are passed through a softmax unless they already sum to one.
pub struct TractClassifier {
    model: TypedRunnableModel<TypedModel>,
    labels: Vec<String>,
    width: u32,
    height: u32,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        labels: Vec<String>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("tract classifier needs at least one label"));
        }
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            labels,
            width,
            height,
        })
    }

    fn build_input(&self, frame: &FullFrame) -> Result<Tensor> {
        let resized = frame.thumbnail(self.width, self.height)?;
        let width = self.width as usize;
        let pixels = resized.rgb;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| pixels[(y * width + x) * 3 + channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn distribution(&self, outputs: TVec<TValue>) -> Result<BTreeMap<String, f32>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        if scores.len() != self.labels.len() {
            return Err(anyhow!(
                "model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            ));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(anyhow!("model produced non-finite scores"));
        }

        let sum: f32 = scores.iter().sum();
        let probabilities = if scores.iter().all(|s| *s >= 0.0) && (sum - 1.0).abs() < 1e-3 {
            scores
        } else {
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
            let total: f32 = exp.iter().sum();
            exp.into_iter().map(|e| e / total).collect()
        };

        Ok(self
            .labels
            .iter()
            .cloned()
            .zip(probabilities.into_iter().map(|p| p.clamp(0.0, 1.0)))
            .collect())
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, frame: &FullFrame) -> Result<ClassifierSample> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        ClassifierSample::from_distribution(self.distribution(outputs)?)
    }
}
