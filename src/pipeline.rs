//! Composition root.
//!
//! `Inspector` owns one presence detector, one inspection state machine, a
//! classifier and a history store, and advances all of them for one captured
//! frame per `step` call. The host loop decides the cadence.

use anyhow::{anyhow, Result};

use crate::aggregate::AggregatedVerdict;
use crate::classify::{Classifier, ClassifierSample};
use crate::frame::{FullFrame, Thumbnail};
use crate::ingest::Capture;
use crate::inspection::{
    FrameOutcome, InspectionState, InspectionStateMachine, DEFAULT_BUFFER_CAPACITY,
};
use crate::presence::{PresenceConfig, PresenceDetector, PresenceSignal};
use crate::storage::{HistoryStore, InspectionRecord, InspectionStats};

pub const DEFAULT_CLASSIFY_EVERY_N_FRAMES: u32 = 1;
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 64;
pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 48;

#[derive(Clone, Debug, PartialEq)]
pub struct InspectorSettings {
    pub presence: PresenceConfig,
    pub buffer_capacity: usize,
    /// Classify every n-th evaluated frame while inspecting. The entry frame is
    /// always classified.
    pub classify_every_n_frames: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    /// Keep at most this many history records. `None` keeps everything.
    pub max_history: Option<usize>,
}

impl Default for InspectorSettings {
    fn default() -> Self {
        Self {
            presence: PresenceConfig::default(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            classify_every_n_frames: DEFAULT_CLASSIFY_EVERY_N_FRAMES,
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            thumbnail_height: DEFAULT_THUMBNAIL_HEIGHT,
            max_history: None,
        }
    }
}

/// Result of one `Inspector::step`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    /// False when the capture carried no frame (source not ready or ended).
    pub evaluated: bool,
    pub presence: PresenceSignal,
    pub outcome: FrameOutcome,
    /// A classification was attempted this frame.
    pub classified: bool,
    /// The attempted classification failed and was treated as no sample.
    pub classifier_failed: bool,
    /// Id of the history record written for a completed inspection.
    pub recorded: Option<i64>,
    /// Why persisting the completed inspection failed. `outcome.final_result`
    /// still carries the verdict so the caller can keep or retry it.
    pub record_error: Option<String>,
}

pub struct Inspector {
    settings: InspectorSettings,
    detector: PresenceDetector,
    machine: InspectionStateMachine,
    classifier: Box<dyn Classifier>,
    store: Box<dyn HistoryStore>,
    frames_until_classify: u32,
    last_thumbnail: Option<Thumbnail>,
}

impl Inspector {
    pub fn new(
        settings: InspectorSettings,
        classifier: Box<dyn Classifier>,
        store: Box<dyn HistoryStore>,
    ) -> Result<Self> {
        if settings.buffer_capacity == 0 {
            return Err(anyhow!("buffer capacity must be greater than zero"));
        }
        if settings.classify_every_n_frames == 0 {
            return Err(anyhow!("classify_every_n_frames must be greater than zero"));
        }
        if settings.thumbnail_width == 0 || settings.thumbnail_height == 0 {
            return Err(anyhow!("thumbnail size must be non-zero"));
        }
        Ok(Self {
            detector: PresenceDetector::new(settings.presence.clone()),
            machine: InspectionStateMachine::new(settings.buffer_capacity),
            settings,
            classifier,
            store,
            frames_until_classify: 0,
            last_thumbnail: None,
        })
    }

    pub fn settings(&self) -> &InspectorSettings {
        &self.settings
    }

    pub fn state(&self) -> InspectionState {
        self.machine.state()
    }

    pub fn machine(&self) -> &InspectionStateMachine {
        &self.machine
    }

    pub fn detector(&self) -> &PresenceDetector {
        &self.detector
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// Advance presence, classification and lifecycle for one capture.
    pub fn step(&mut self, capture: &Capture) -> Result<StepReport> {
        let frame = match capture {
            Capture::Frame(frame) => frame,
            Capture::NotReady | Capture::EndOfStream => return Ok(StepReport::default()),
        };

        let working = frame.downsample(
            self.settings.presence.working_width,
            self.settings.presence.working_height,
        )?;
        let presence = self.detector.detect(working);
        log::trace!(
            "presence motion_ratio={:.4} present={}",
            self.detector.last_motion_ratio(),
            presence.present
        );

        let mut report = StepReport {
            evaluated: true,
            presence,
            ..StepReport::default()
        };

        if presence.just_entered && !self.machine.is_inspecting() {
            self.frames_until_classify = 0;
            self.last_thumbnail = None;
        }
        let mut sample = None;
        if self.machine.is_inspecting() || presence.just_entered {
            if self.frames_until_classify == 0 {
                self.frames_until_classify = self.settings.classify_every_n_frames - 1;
                report.classified = true;
                sample = self.classify(frame);
                report.classifier_failed = sample.is_none();
                if sample.is_some() {
                    self.capture_thumbnail(frame);
                }
            } else {
                self.frames_until_classify -= 1;
            }
        }

        report.outcome = self.machine.process_frame(sample, presence);

        if report.outcome.inspection_complete {
            let thumbnail = self.last_thumbnail.take();
            if let Some(verdict) = &report.outcome.final_result {
                match self.record(&report.outcome, verdict, thumbnail) {
                    Ok(id) => report.recorded = Some(id),
                    Err(e) => {
                        log::warn!("failed to record inspection {}: {:#}", verdict.label, e);
                        report.record_error = Some(format!("{:#}", e));
                    }
                }
            }
        }

        Ok(report)
    }

    /// Classify one frame immediately, outside the temporal aggregation.
    ///
    /// The prediction buffer and lifecycle state are not touched.
    pub fn force_inspect(&mut self, frame: &FullFrame) -> Result<AggregatedVerdict> {
        let sample = self.classifier.classify(frame)?;
        Ok(self.machine.force_verdict(&sample))
    }

    /// Drop the active inspection without recording it.
    pub fn abort_inspection(&mut self) -> bool {
        self.last_thumbnail = None;
        self.machine.abort()
    }

    /// The source restarted: forget the previous frame and any active inspection.
    pub fn restart_stream(&mut self) {
        self.abort_inspection();
        self.detector.reset();
        log::info!("stream restarted; presence detector reset");
    }

    /// Delete the history (and with it the statistics). Aborts any active inspection first.
    pub fn clear_history(&mut self) -> Result<usize> {
        self.abort_inspection();
        let removed = self.store.clear()?;
        log::info!("history cleared ({} records)", removed);
        Ok(removed)
    }

    /// Forget classifier training data. Aborts any active inspection first.
    pub fn clear_training(&mut self) -> bool {
        self.abort_inspection();
        let cleared = self.classifier.clear_training();
        if cleared {
            log::info!("classifier {} training data cleared", self.classifier.name());
        }
        cleared
    }

    pub fn stats(&mut self) -> Result<InspectionStats> {
        self.store.stats()
    }

    pub fn recent(&mut self, limit: usize) -> Result<Vec<InspectionRecord>> {
        self.store.recent(limit)
    }

    fn classify(&mut self, frame: &FullFrame) -> Option<ClassifierSample> {
        match self.classifier.classify(frame) {
            Ok(sample) => Some(sample),
            Err(e) => {
                log::warn!("classifier {} failed: {:#}", self.classifier.name(), e);
                None
            }
        }
    }

    fn capture_thumbnail(&mut self, frame: &FullFrame) {
        match frame.thumbnail(self.settings.thumbnail_width, self.settings.thumbnail_height) {
            Ok(thumbnail) => self.last_thumbnail = Some(thumbnail),
            Err(e) => log::debug!("thumbnail capture failed: {}", e),
        }
    }

    fn record(
        &mut self,
        outcome: &FrameOutcome,
        verdict: &AggregatedVerdict,
        thumbnail: Option<Thumbnail>,
    ) -> Result<i64> {
        let record = InspectionRecord {
            id: None,
            recorded_at_s: crate::now_s()?,
            duration_ms: outcome
                .elapsed
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0),
            samples: outcome.samples_seen.unwrap_or(0),
            verdict: verdict.clone(),
            thumbnail,
        };
        let id = self.store.append(&record)?;
        if let Some(max) = self.settings.max_history {
            let pruned = self.store.prune_to(max)?;
            if pruned > 0 {
                log::debug!("history retention pruned {} records", pruned);
            }
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{StubClassifier, StubStep};
    use crate::storage::InMemoryHistoryStore;

    const W: u32 = 32;
    const H: u32 = 24;

    fn frame(value: u8) -> Capture {
        Capture::Frame(FullFrame::from_rgb(vec![value; (W * H * 3) as usize], W, H).unwrap())
    }

    fn settings(exit_frames: u32, every: u32) -> InspectorSettings {
        InspectorSettings {
            presence: PresenceConfig {
                working_width: W / 2,
                working_height: H / 2,
                sample_stride: 1,
                exit_frames_required: exit_frames,
                ..PresenceConfig::default()
            },
            classify_every_n_frames: every,
            thumbnail_width: 4,
            thumbnail_height: 3,
            ..InspectorSettings::default()
        }
    }

    fn inspector(classifier: StubClassifier, exit_frames: u32, every: u32) -> Inspector {
        Inspector::new(
            settings(exit_frames, every),
            Box::new(classifier),
            Box::new(InMemoryHistoryStore::new()),
        )
        .unwrap()
    }

    /// Alternate two values so every frame has motion.
    fn moving(i: usize) -> Capture {
        frame(if i % 2 == 0 { 255 } else { 0 })
    }

    #[test]
    fn rejects_zero_settings() {
        let mut bad = settings(3, 1);
        bad.buffer_capacity = 0;
        assert!(Inspector::new(
            bad,
            Box::new(StubClassifier::always("ok", 1.0)),
            Box::new(InMemoryHistoryStore::new())
        )
        .is_err());
    }

    #[test]
    fn not_ready_captures_are_skipped() -> Result<()> {
        let mut insp = inspector(StubClassifier::always("ok", 0.9), 3, 1);
        let report = insp.step(&Capture::NotReady)?;
        assert!(!report.evaluated);
        assert_eq!(insp.state(), InspectionState::Idle);
        Ok(())
    }

    #[test]
    fn records_one_verdict_per_pass() -> Result<()> {
        let stub = StubClassifier::cycle(&[("scratch", 0.8), ("ok", 0.9), ("scratch", 0.6)]);
        let mut insp = inspector(stub, 3, 1);

        insp.step(&frame(0))?;
        let entry = insp.step(&moving(0))?;
        assert!(entry.outcome.state_changed);
        assert!(entry.classified);
        assert!(entry.outcome.current_result.is_some());

        insp.step(&moving(1))?;
        insp.step(&moving(2))?;

        // Static frames: the object stopped moving, the exit counter runs down.
        let mut completed = None;
        for _ in 0..3 {
            let report = insp.step(&moving(2))?;
            if report.outcome.inspection_complete {
                completed = Some(report);
            }
        }
        let completed = completed.expect("inspection completed");
        let verdict = completed.outcome.final_result.clone().unwrap();
        assert_eq!(verdict.label, "scratch");
        assert!(completed.recorded.is_some());

        let stats = insp.stats()?;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.defective, 1);
        let recent = insp.recent(1)?;
        assert!(recent[0].thumbnail.is_some());
        assert_eq!(recent[0].samples, 6);
        Ok(())
    }

    #[test]
    fn throttle_skips_frames_but_classifies_entry() -> Result<()> {
        let mut insp = inspector(StubClassifier::always("ok", 0.9), 10, 3);
        insp.step(&frame(0))?;

        let classified: Vec<bool> = (0..7)
            .map(|i| insp.step(&moving(i)).map(|r| r.classified))
            .collect::<Result<_>>()?;
        assert_eq!(classified, vec![true, false, false, true, false, false, true]);
        Ok(())
    }

    #[test]
    fn classifier_failure_keeps_inspection_running() -> Result<()> {
        let stub = StubClassifier::new(vec![StubStep::Label("ok".into(), 0.9), StubStep::Fail]);
        let mut insp = inspector(stub, 5, 1);
        insp.step(&frame(0))?;
        insp.step(&moving(0))?;

        let failed = insp.step(&moving(1))?;
        assert!(failed.classified);
        assert!(failed.classifier_failed);
        assert_eq!(failed.outcome.current_result, None);
        assert!(insp.machine().is_inspecting());
        assert_eq!(insp.machine().buffer().len(), 1);
        Ok(())
    }

    /// Store whose disk is full.
    struct FullDiskStore;

    impl HistoryStore for FullDiskStore {
        fn append(&mut self, _record: &InspectionRecord) -> Result<i64> {
            Err(anyhow!("disk full"))
        }

        fn recent(&mut self, _limit: usize) -> Result<Vec<InspectionRecord>> {
            Ok(Vec::new())
        }

        fn stats(&mut self) -> Result<InspectionStats> {
            Ok(InspectionStats::default())
        }

        fn clear(&mut self) -> Result<usize> {
            Ok(0)
        }

        fn prune_to(&mut self, _max_records: usize) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn storage_failure_keeps_final_verdict() -> Result<()> {
        let mut insp = Inspector::new(
            settings(1, 1),
            Box::new(StubClassifier::always("scratch", 0.8)),
            Box::new(FullDiskStore),
        )?;

        insp.step(&frame(0))?;
        insp.step(&moving(0))?;
        // One still frame ends the inspection.
        let done = insp.step(&frame(255))?;

        assert!(done.outcome.inspection_complete);
        let verdict = done.outcome.final_result.expect("final verdict");
        assert_eq!(verdict.label, "scratch");
        assert!((verdict.confidence - 0.8).abs() < 1e-6);
        assert_eq!(done.recorded, None);
        assert!(done.record_error.unwrap().contains("disk full"));
        assert_eq!(insp.state(), InspectionState::Idle);

        // The inspector keeps running after the failed write.
        let next = insp.step(&moving(1))?;
        assert!(next.outcome.state_changed);
        assert_eq!(next.record_error, None);
        Ok(())
    }

    #[test]
    fn force_inspect_is_side_effect_free() -> Result<()> {
        let mut insp = inspector(StubClassifier::always("dent", 0.7), 5, 1);
        insp.step(&frame(0))?;
        insp.step(&moving(0))?;
        let before = insp.machine().buffer().len();

        let snapshot = FullFrame::from_rgb(vec![0u8; 12], 2, 2)?;
        let verdict = insp.force_inspect(&snapshot)?;
        assert_eq!(verdict.label, "dent");
        assert_eq!(insp.machine().buffer().len(), before);
        assert!(insp.machine().is_inspecting());
        Ok(())
    }

    #[test]
    fn resets_abort_active_inspection() -> Result<()> {
        let mut insp = inspector(StubClassifier::always("ok", 0.9), 5, 1);
        insp.step(&frame(0))?;
        insp.step(&moving(0))?;
        assert!(insp.machine().is_inspecting());

        assert_eq!(insp.clear_history()?, 0);
        assert_eq!(insp.state(), InspectionState::Idle);

        // The object is still in view: no new entry edge until it leaves.
        insp.step(&moving(1))?;
        assert_eq!(insp.state(), InspectionState::Idle);
        assert!(insp.detector().is_present());

        insp.restart_stream();
        assert!(!insp.detector().is_present());
        assert!(!insp.clear_training());
        Ok(())
    }
}
