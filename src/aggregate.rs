//! Temporal aggregation of classifier samples into one verdict.
//!
//! Majority vote over the buffered labels. The winning label's confidence is the
//! mean confidence of the samples that voted for it. Vote ties go to the label seen
//! first in buffer order.

use serde::{Deserialize, Serialize};

use crate::classify::ClassifierSample;

/// Label that means "no defect".
pub const OK_LABEL: &str = "ok";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Ok,
    Defective,
}

impl VerdictStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictStatus::Ok => "ok",
            VerdictStatus::Defective => "defective",
        }
    }
}

/// Stable verdict derived from one or more samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatedVerdict {
    pub label: String,
    pub confidence: f32,
    pub is_defective: bool,
    pub defect_type: Option<String>,
    pub status: VerdictStatus,
}

impl AggregatedVerdict {
    fn from_label(label: &str, confidence: f32) -> Self {
        let is_defective = label != OK_LABEL;
        Self {
            label: label.to_string(),
            confidence,
            is_defective,
            defect_type: is_defective.then(|| label.to_string()),
            status: if is_defective {
                VerdictStatus::Defective
            } else {
                VerdictStatus::Ok
            },
        }
    }
}

struct Tally<'a> {
    label: &'a str,
    votes: usize,
    confidence_sum: f32,
}

/// Majority-vote verdict over `samples`, or `None` when there are none.
pub fn aggregate<'a, I>(samples: I) -> Option<AggregatedVerdict>
where
    I: IntoIterator<Item = &'a ClassifierSample>,
{
    // First-seen order is preserved; buffers are small so a linear scan is fine.
    let mut tallies: Vec<Tally<'a>> = Vec::new();
    for sample in samples {
        match tallies.iter_mut().find(|t| t.label == sample.label) {
            Some(tally) => {
                tally.votes += 1;
                tally.confidence_sum += sample.confidence;
            }
            None => tallies.push(Tally {
                label: &sample.label,
                votes: 1,
                confidence_sum: sample.confidence,
            }),
        }
    }

    let mut winner: Option<&Tally<'a>> = None;
    for tally in &tallies {
        if winner.map_or(true, |best| tally.votes > best.votes) {
            winner = Some(tally);
        }
    }

    winner.map(|w| AggregatedVerdict::from_label(w.label, w.confidence_sum / w.votes as f32))
}

/// Verdict from a single sample, bypassing temporal aggregation.
pub fn verdict_from_sample(sample: &ClassifierSample) -> AggregatedVerdict {
    AggregatedVerdict::from_label(&sample.label, sample.confidence)
}
