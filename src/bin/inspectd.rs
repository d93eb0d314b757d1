//! inspectd - line camera inspection daemon
//!
//! This daemon:
//! 1. Pulls frames from the configured source (raw recording or synthetic scene)
//! 2. Detects when an object is in front of the camera
//! 3. Classifies frames while the object is present
//! 4. Records one aggregated verdict per object in the history database

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use inspection_kernel::config::{ClassifierSettings, InspectorConfig};
use inspection_kernel::ingest::synthetic::SyntheticSource;
use inspection_kernel::{
    open_source, Capture, CentroidClassifier, Classifier, ClassifierRegistry, FrameSource,
    Inspector, SourceConfig, SqliteHistoryStore, StubClassifier,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "INSPECT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Stop after this many captured frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Seconds between health and statistics log lines.
    #[arg(long, default_value_t = 5)]
    health_interval_s: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = InspectorConfig::load_from(args.config.as_deref())?;

    let mut source = build_source(&cfg.source, &cfg.classifier)?;
    source.connect()?;

    let classifier = build_classifier(&cfg.classifier)?;
    let store = SqliteHistoryStore::open(&cfg.db_path)?;
    let mut inspector = Inspector::new(cfg.inspector.clone(), classifier, Box::new(store))?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("inspectd running. writing to {}", cfg.db_path);
    log::info!(
        "classifier={} buffer_capacity={} exit_frames={} classify_every={}",
        inspector.classifier_name(),
        cfg.inspector.buffer_capacity,
        cfg.inspector.presence.exit_frames_required,
        cfg.inspector.classify_every_n_frames
    );

    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(cfg.source.target_fps));
    let health_interval = Duration::from_secs(args.health_interval_s.max(1));
    let mut last_health_log = Instant::now();
    let mut frames = 0u64;
    let mut completed = 0u64;

    while !stop.load(Ordering::SeqCst) {
        let tick = Instant::now();

        let capture = source.next_frame()?;
        if matches!(capture, Capture::EndOfStream) {
            log::info!("source reached end of stream");
            break;
        }
        if matches!(capture, Capture::Frame(_)) {
            frames += 1;
        }

        let report = inspector.step(&capture)?;
        if report.outcome.inspection_complete {
            completed += 1;
            match &report.outcome.final_result {
                Some(verdict) => log::info!(
                    "inspection #{}: {} label={} conf={:.2} samples={} elapsed_ms={} record={:?}",
                    completed,
                    verdict.status.as_str(),
                    verdict.label,
                    verdict.confidence,
                    report.outcome.samples_seen.unwrap_or(0),
                    report
                        .outcome
                        .elapsed
                        .map(|elapsed| elapsed.as_millis())
                        .unwrap_or(0),
                    report.recorded
                ),
                None => log::warn!(
                    "inspection #{}: object left without any classifier sample",
                    completed
                ),
            }
        }

        if last_health_log.elapsed() >= health_interval {
            let source_stats = source.stats();
            let history = inspector.stats()?;
            log::info!(
                "source health={} frames={} not_ready={} url={}",
                source.is_healthy(),
                source_stats.frames_captured,
                source_stats.not_ready_polls,
                source_stats.url
            );
            log::info!(
                "history total={} ok={} defective={} defect_rate={:.3}",
                history.total,
                history.ok,
                history.defective,
                history.defect_rate()
            );
            last_health_log = Instant::now();
        }

        if args.max_frames.is_some_and(|max| frames >= max) {
            log::info!("reached max_frames={}", frames);
            break;
        }

        if let Some(remaining) = frame_interval.checked_sub(tick.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    if inspector.abort_inspection() {
        log::warn!("shutdown during an active inspection; partial result discarded");
    }
    let history = inspector.stats()?;
    log::info!(
        "inspectd stopped after {} frames; {} inspections recorded in total",
        frames,
        history.total
    );
    Ok(())
}

fn build_source(
    source: &SourceConfig,
    classifier: &ClassifierSettings,
) -> Result<Box<dyn FrameSource>> {
    if source.url.starts_with("stub://") {
        // Paint synthetic objects with the reference colours so the verdicts vary.
        let palette = classifier.references.iter().map(|r| r.rgb).collect();
        return Ok(Box::new(
            SyntheticSource::new(source.clone()).with_palette(palette),
        ));
    }
    open_source(source)
}

fn build_classifier(settings: &ClassifierSettings) -> Result<Box<dyn Classifier>> {
    let mut registry = ClassifierRegistry::new();

    let mut centroid = CentroidClassifier::new(
        settings.roi_fraction,
        inspection_kernel::classify::backends::centroid::DEFAULT_TEMPERATURE,
    );
    for reference in &settings.references {
        let [r, g, b] = reference.rgb;
        centroid.train_rgb(&reference.label, [f32::from(r), f32::from(g), f32::from(b)])?;
    }
    registry.register(centroid);

    let script: Vec<(&str, f32)> = settings
        .references
        .iter()
        .map(|r| (r.label.as_str(), 0.9))
        .collect();
    registry.register(StubClassifier::cycle(&script));

    #[cfg(feature = "backend-tract")]
    if let Some(model_path) = &settings.model_path {
        let tract = inspection_kernel::classify::TractClassifier::new(
            model_path,
            settings.labels.clone(),
            settings.input_width,
            settings.input_height,
        )?;
        registry.register(tract);
    }

    if settings.backend == "tract" && registry.get_mut("tract").is_none() {
        return Err(anyhow!(
            "classifier 'tract' requires building with --features backend-tract"
        ));
    }
    registry.set_default(&settings.backend)?;
    log::info!(
        "classifiers available: {} (using {})",
        registry.list().join(", "),
        settings.backend
    );

    let mut classifier = registry.take_default()?;
    classifier.warm_up()?;
    Ok(classifier)
}
