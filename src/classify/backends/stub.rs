use anyhow::{anyhow, Result};

use crate::classify::backend::Classifier;
use crate::classify::ClassifierSample;
use crate::frame::FullFrame;

/// Scripted step for `StubClassifier`.
#[derive(Clone, Debug, PartialEq)]
pub enum StubStep {
    Label(String, f32),
    Fail,
}

/// Stub backend for testing. Replays a script of labels, cycling, and ignores pixels.
pub struct StubClassifier {
    script: Vec<StubStep>,
    calls: usize,
}

impl StubClassifier {
    pub fn new(script: Vec<StubStep>) -> Self {
        Self { script, calls: 0 }
    }

    /// Always answer `label` with `confidence`.
    pub fn always(label: &str, confidence: f32) -> Self {
        Self::new(vec![StubStep::Label(label.to_string(), confidence)])
    }

    /// Cycle through `(label, confidence)` pairs.
    pub fn cycle(labels: &[(&str, f32)]) -> Self {
        Self::new(
            labels
                .iter()
                .map(|(label, confidence)| StubStep::Label(label.to_string(), *confidence))
                .collect(),
        )
    }

    /// Number of `classify` calls so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Classifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, _frame: &FullFrame) -> Result<ClassifierSample> {
        if self.script.is_empty() {
            return Err(anyhow!("stub classifier has an empty script"));
        }
        let step = &self.script[self.calls % self.script.len()];
        self.calls += 1;
        match step {
            StubStep::Label(label, confidence) => ClassifierSample::single(label.as_str(), *confidence),
            StubStep::Fail => Err(anyhow!("stub classifier scripted failure")),
        }
    }
}
