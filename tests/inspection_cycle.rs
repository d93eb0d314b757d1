use anyhow::Result;

use inspection_kernel::ingest::synthetic::SyntheticSource;
use inspection_kernel::{
    shared_memory_uri, Capture, FrameSource, HistoryStore, InspectionState, Inspector,
    InspectorSettings, PresenceConfig, SourceConfig, SqliteHistoryStore, StubClassifier,
    VerdictStatus,
};

const IDLE_FRAMES: u32 = 30;
const TRAVEL_FRAMES: u32 = 45;
const PASSES: u32 = 3;

fn line_camera() -> Result<SyntheticSource> {
    let mut source = SyntheticSource::new(SourceConfig {
        url: "stub://integration".to_string(),
        width: 160,
        height: 120,
        warmup_frames: 3,
        ..SourceConfig::default()
    })
    .with_timing(IDLE_FRAMES, TRAVEL_FRAMES);
    source.connect()?;
    Ok(source)
}

fn settings(max_history: Option<usize>) -> InspectorSettings {
    InspectorSettings {
        presence: PresenceConfig {
            exit_frames_required: 10,
            ..PresenceConfig::default()
        },
        max_history,
        ..InspectorSettings::default()
    }
}

/// Drive the inspector until `frames` frames were captured; returns the completed outcomes.
fn run(
    inspector: &mut Inspector,
    source: &mut SyntheticSource,
    frames: u64,
) -> Result<Vec<inspection_kernel::StepReport>> {
    let mut completed = Vec::new();
    let mut not_ready = 0;
    while source.stats().frames_captured < frames {
        let capture = source.next_frame()?;
        if matches!(capture, Capture::NotReady) {
            not_ready += 1;
        }
        let report = inspector.step(&capture)?;
        if report.outcome.inspection_complete {
            completed.push(report);
        }
    }
    assert_eq!(not_ready, 3);
    Ok(completed)
}

#[test]
fn one_verdict_per_object_pass() -> Result<()> {
    let db = shared_memory_uri();
    let store = SqliteHistoryStore::open(&db)?;
    let mut inspector = Inspector::new(
        settings(None),
        Box::new(StubClassifier::always("scratch", 0.8)),
        Box::new(store),
    )?;
    let mut source = line_camera()?;

    let frames = u64::from(PASSES * (IDLE_FRAMES + TRAVEL_FRAMES) + IDLE_FRAMES);
    let completed = run(&mut inspector, &mut source, frames)?;

    assert_eq!(completed.len(), PASSES as usize);
    assert_eq!(inspector.state(), InspectionState::Idle);
    for report in &completed {
        assert!(report.presence.just_left);
        let verdict = report.outcome.final_result.as_ref().expect("final verdict");
        assert_eq!(verdict.label, "scratch");
        assert_eq!(verdict.status, VerdictStatus::Defective);
        assert_eq!(verdict.defect_type.as_deref(), Some("scratch"));
        assert!((verdict.confidence - 0.8).abs() < 1e-6);
        // Every frame from entry through the exit countdown was classified.
        let samples = report.outcome.samples_seen.expect("samples");
        assert!(samples > 10 && samples <= u64::from(TRAVEL_FRAMES + 10));
        assert!(report.recorded.is_some());
    }

    // A second connection sees the same shared in-memory history.
    let mut reader = SqliteHistoryStore::open(&db)?;
    let records = reader.recent(10)?;
    assert_eq!(records.len(), PASSES as usize);
    assert!(records[0].id > records[1].id);
    assert!(records.iter().all(|r| r.thumbnail.is_some()));

    let stats = inspector.stats()?;
    assert_eq!(stats.total, u64::from(PASSES));
    assert_eq!(stats.defective, u64::from(PASSES));
    assert_eq!(stats.by_defect.get("scratch"), Some(&u64::from(PASSES)));
    assert_eq!(stats.defect_rate(), 1.0);
    Ok(())
}

#[test]
fn retention_keeps_most_recent_records() -> Result<()> {
    let mut inspector = Inspector::new(
        settings(Some(2)),
        Box::new(StubClassifier::always("ok", 0.95)),
        Box::new(SqliteHistoryStore::open(&shared_memory_uri())?),
    )?;
    let mut source = line_camera()?;

    let frames = u64::from(PASSES * (IDLE_FRAMES + TRAVEL_FRAMES) + IDLE_FRAMES);
    let completed = run(&mut inspector, &mut source, frames)?;
    assert_eq!(completed.len(), PASSES as usize);

    let ids: Vec<i64> = completed.iter().filter_map(|r| r.recorded).collect();
    let kept: Vec<Option<i64>> = inspector.recent(10)?.iter().map(|r| r.id).collect();
    assert_eq!(kept, vec![Some(ids[2]), Some(ids[1])]);

    let stats = inspector.stats()?;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.ok, 2);
    assert_eq!(stats.defect_rate(), 0.0);

    assert_eq!(inspector.clear_history()?, 2);
    assert_eq!(inspector.stats()?.total, 0);
    Ok(())
}

#[test]
fn idle_scene_records_nothing() -> Result<()> {
    let mut inspector = Inspector::new(
        settings(None),
        Box::new(StubClassifier::always("ok", 0.9)),
        Box::new(SqliteHistoryStore::open(&shared_memory_uri())?),
    )?;
    let mut source = line_camera()?;

    // Stop before the first object appears.
    let completed = run(&mut inspector, &mut source, u64::from(IDLE_FRAMES))?;
    assert!(completed.is_empty());
    assert_eq!(inspector.state(), InspectionState::Idle);
    assert!(!inspector.detector().is_present());
    assert_eq!(inspector.stats()?.total, 0);
    Ok(())
}
