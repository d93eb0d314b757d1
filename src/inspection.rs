//! Inspection lifecycle state machine.
//!
//! `Idle --just_entered--> Inspecting --just_left--> Idle`, cycling forever. While
//! inspecting, classifier samples go into a bounded FIFO and the live verdict is
//! rebuilt from it after every sample. Within one call the entry edge is handled
//! first, then the sample, then the leave edge.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};

use crate::aggregate::{aggregate, verdict_from_sample, AggregatedVerdict};
use crate::classify::ClassifierSample;
use crate::presence::PresenceSignal;

pub const DEFAULT_BUFFER_CAPACITY: usize = 8;

// ----------------------------------------------------------------------------
// PredictionBuffer
// ----------------------------------------------------------------------------

/// Bounded FIFO of the most recent samples of the current inspection.
///
/// Only the state machine can push into or clear it:
///
/// ```compile_fail
/// use inspection_kernel::{ClassifierSample, InspectionStateMachine};
///
/// let machine = InspectionStateMachine::new(8);
/// let sample = ClassifierSample::single("ok", 0.9).unwrap();
/// machine.buffer().push(sample);
/// ```
///
/// ```compile_fail
/// use inspection_kernel::InspectionStateMachine;
///
/// let machine = InspectionStateMachine::new(8);
/// machine.buffer().clear();
/// ```
#[derive(Debug)]
pub struct PredictionBuffer {
    samples: VecDeque<ClassifierSample>,
    capacity: usize,
}

impl PredictionBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Push a sample, evicting the oldest once over capacity.
    pub(crate) fn push(&mut self, sample: ClassifierSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub(crate) fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ClassifierSample> + '_ {
        self.samples.iter()
    }

    /// Verdict over the current contents.
    pub fn verdict(&self) -> Option<AggregatedVerdict> {
        aggregate(&self.samples)
    }
}

// ----------------------------------------------------------------------------
// State machine
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InspectionState {
    Idle,
    Inspecting,
}

/// The active inspection. Exists only while `Inspecting`.
#[derive(Clone, Debug)]
pub struct Inspection {
    /// Wall-clock start, for history records.
    pub started_at: SystemTime,
    started: Instant,
    /// Samples received, including ones since evicted from the buffer.
    pub samples_seen: u64,
}

impl Inspection {
    fn start() -> Self {
        Self {
            started_at: SystemTime::now(),
            started: Instant::now(),
            samples_seen: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What one `process_frame` call changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutcome {
    pub state_changed: bool,
    pub inspection_complete: bool,
    /// Live verdict, set when a sample was added this frame.
    pub current_result: Option<AggregatedVerdict>,
    /// Final verdict, set on completion when any sample was buffered.
    pub final_result: Option<AggregatedVerdict>,
    /// Duration of the inspection that completed this frame.
    pub elapsed: Option<Duration>,
    /// Samples received by the inspection that completed this frame.
    pub samples_seen: Option<u64>,
}

/// Idle/Inspecting lifecycle. State changes only through `process_frame` and `abort`:
///
/// ```compile_fail
/// use inspection_kernel::{InspectionState, InspectionStateMachine};
///
/// let mut machine = InspectionStateMachine::new(8);
/// machine.state = InspectionState::Inspecting;
/// ```
pub struct InspectionStateMachine {
    state: InspectionState,
    buffer: PredictionBuffer,
    inspection: Option<Inspection>,
}

impl InspectionStateMachine {
    /// Machine whose buffer keeps the last `buffer_capacity` samples.
    ///
    /// A capacity of 0 is raised to 1 (every verdict then comes from the latest
    /// sample). `Inspector::new` and config validation reject 0 outright.
    pub fn new(buffer_capacity: usize) -> Self {
        if buffer_capacity == 0 {
            log::warn!("prediction buffer capacity 0 raised to 1");
        }
        Self {
            state: InspectionState::Idle,
            buffer: PredictionBuffer::new(buffer_capacity),
            inspection: None,
        }
    }

    pub fn state(&self) -> InspectionState {
        self.state
    }

    pub fn is_inspecting(&self) -> bool {
        self.state == InspectionState::Inspecting
    }

    pub fn buffer(&self) -> &PredictionBuffer {
        &self.buffer
    }

    pub fn current_inspection(&self) -> Option<&Inspection> {
        self.inspection.as_ref()
    }

    /// Advance the lifecycle by one evaluated frame.
    ///
    /// `sample` is `None` when no fresh classification is available for this frame.
    pub fn process_frame(
        &mut self,
        sample: Option<ClassifierSample>,
        presence: PresenceSignal,
    ) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();

        if self.state == InspectionState::Idle && presence.just_entered {
            self.buffer.clear();
            self.inspection = Some(Inspection::start());
            self.state = InspectionState::Inspecting;
            outcome.state_changed = true;
            log::info!("inspection started");
        }

        if self.state == InspectionState::Inspecting {
            if let Some(sample) = sample {
                log::debug!(
                    "inspection sample label={} confidence={:.3}",
                    sample.label,
                    sample.confidence
                );
                self.buffer.push(sample);
                if let Some(inspection) = self.inspection.as_mut() {
                    inspection.samples_seen += 1;
                }
                outcome.current_result = self.buffer.verdict();
            }

            if presence.just_left {
                outcome.final_result = self.buffer.verdict();
                outcome.inspection_complete = true;
                outcome.state_changed = true;
                if let Some(inspection) = self.inspection.take() {
                    outcome.elapsed = Some(inspection.elapsed());
                    outcome.samples_seen = Some(inspection.samples_seen);
                }
                self.buffer.clear();
                self.state = InspectionState::Idle;
                match &outcome.final_result {
                    Some(verdict) => log::info!(
                        "inspection complete label={} status={} confidence={:.3}",
                        verdict.label,
                        verdict.status.as_str(),
                        verdict.confidence
                    ),
                    None => log::info!("inspection complete without samples"),
                }
            }
        }

        outcome
    }

    /// Verdict from one fresh sample. Buffer and state are left untouched.
    pub fn force_verdict(&self, sample: &ClassifierSample) -> AggregatedVerdict {
        verdict_from_sample(sample)
    }

    /// Drop the active inspection without a verdict. Returns whether one was active.
    pub fn abort(&mut self) -> bool {
        let was_active = self.state == InspectionState::Inspecting;
        self.buffer.clear();
        self.inspection = None;
        self.state = InspectionState::Idle;
        if was_active {
            log::info!("inspection aborted");
        }
        was_active
    }
}

impl Default for InspectionStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::VerdictStatus;

    fn s(label: &str, confidence: f32) -> ClassifierSample {
        ClassifierSample::single(label, confidence).unwrap()
    }

    fn entered() -> PresenceSignal {
        PresenceSignal {
            present: true,
            just_entered: true,
            just_left: false,
        }
    }

    fn present() -> PresenceSignal {
        PresenceSignal {
            present: true,
            ..PresenceSignal::default()
        }
    }

    fn left() -> PresenceSignal {
        PresenceSignal {
            present: false,
            just_entered: false,
            just_left: true,
        }
    }

    #[test]
    fn buffer_keeps_last_capacity_samples() {
        let mut buffer = PredictionBuffer::new(8);
        for i in 0..10 {
            buffer.push(s(&format!("l{}", i), 0.5));
        }
        let labels: Vec<&str> = buffer.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["l2", "l3", "l4", "l5", "l6", "l7", "l8", "l9"]);
        assert_eq!(buffer.capacity(), 8);
    }

    #[test]
    fn zero_capacity_keeps_latest_sample() {
        let mut machine = InspectionStateMachine::new(0);
        assert_eq!(machine.buffer().capacity(), 1);

        machine.process_frame(Some(s("ok", 0.9)), entered());
        let outcome = machine.process_frame(Some(s("dent", 0.4)), present());
        assert_eq!(machine.buffer().len(), 1);
        assert_eq!(outcome.current_result.unwrap().label, "dent");
    }

    #[test]
    fn full_cycle() {
        let mut machine = InspectionStateMachine::default();

        let start = machine.process_frame(None, entered());
        assert!(start.state_changed);
        assert!(!start.inspection_complete);
        assert_eq!(start.current_result, None);
        assert_eq!(machine.state(), InspectionState::Inspecting);

        let samples = [s("ok", 0.9), s("scratch", 0.8), s("scratch", 0.7)];
        for sample in samples.iter().cloned() {
            let update = machine.process_frame(Some(sample), present());
            assert!(!update.state_changed);
            assert!(update.current_result.is_some());
        }

        let done = machine.process_frame(None, left());
        assert!(done.state_changed);
        assert!(done.inspection_complete);
        assert_eq!(done.final_result, aggregate(&samples));
        assert_eq!(done.final_result.unwrap().status, VerdictStatus::Defective);
        assert_eq!(done.samples_seen, Some(3));
        assert!(done.elapsed.is_some());

        assert!(machine.buffer().is_empty());
        assert_eq!(machine.state(), InspectionState::Idle);
        assert!(machine.current_inspection().is_none());
    }

    #[test]
    fn idle_ignores_samples_and_leave_edges() {
        let mut machine = InspectionStateMachine::default();
        let outcome = machine.process_frame(Some(s("ok", 0.9)), present());
        assert_eq!(outcome, FrameOutcome::default());

        let outcome = machine.process_frame(None, left());
        assert_eq!(outcome, FrameOutcome::default());
        assert!(machine.buffer().is_empty());
    }

    #[test]
    fn sample_on_entry_frame_is_buffered() {
        let mut machine = InspectionStateMachine::default();
        let outcome = machine.process_frame(Some(s("dent", 0.6)), entered());
        assert!(outcome.state_changed);
        assert_eq!(outcome.current_result.unwrap().label, "dent");
        assert_eq!(machine.buffer().len(), 1);
    }

    #[test]
    fn sample_on_leave_frame_counts_towards_final() {
        let mut machine = InspectionStateMachine::default();
        machine.process_frame(None, entered());
        let outcome = machine.process_frame(Some(s("crack", 0.6)), left());
        assert_eq!(outcome.final_result.unwrap().label, "crack");
    }

    #[test]
    fn inspection_without_samples_has_no_verdict() {
        let mut machine = InspectionStateMachine::default();
        machine.process_frame(None, entered());
        machine.process_frame(None, present());
        let done = machine.process_frame(None, left());
        assert!(done.inspection_complete);
        assert_eq!(done.final_result, None);
    }

    #[test]
    fn none_frames_keep_state() {
        let mut machine = InspectionStateMachine::default();
        machine.process_frame(Some(s("ok", 0.9)), entered());
        for _ in 0..5 {
            let outcome = machine.process_frame(None, present());
            assert_eq!(outcome, FrameOutcome::default());
        }
        assert_eq!(machine.buffer().len(), 1);
        assert!(machine.is_inspecting());
    }

    #[test]
    fn buffer_is_cleared_on_new_inspection() {
        let mut machine = InspectionStateMachine::new(2);
        machine.process_frame(Some(s("dent", 0.9)), entered());
        machine.process_frame(Some(s("dent", 0.9)), present());
        machine.process_frame(Some(s("dent", 0.9)), present());
        assert_eq!(machine.buffer().len(), 2);
        machine.process_frame(None, left());

        let outcome = machine.process_frame(Some(s("ok", 0.5)), entered());
        assert_eq!(outcome.current_result.unwrap().label, "ok");
        assert_eq!(machine.buffer().len(), 1);
    }

    #[test]
    fn force_verdict_leaves_state_alone() {
        let mut machine = InspectionStateMachine::default();
        machine.process_frame(Some(s("ok", 0.9)), entered());

        let verdict = machine.force_verdict(&s("scratch", 0.4));
        assert_eq!(verdict.label, "scratch");
        assert_eq!(machine.buffer().len(), 1);
        assert!(machine.is_inspecting());
    }

    #[test]
    fn abort_returns_to_idle() {
        let mut machine = InspectionStateMachine::default();
        assert!(!machine.abort());

        machine.process_frame(Some(s("ok", 0.9)), entered());
        assert!(machine.abort());
        assert_eq!(machine.state(), InspectionState::Idle);
        assert!(machine.buffer().is_empty());

        // A stale leave edge after abort completes nothing.
        let outcome = machine.process_frame(None, left());
        assert!(!outcome.inspection_complete);
    }
}
