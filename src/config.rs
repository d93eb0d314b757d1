use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ingest::{PixelFormat, SourceConfig};
use crate::pipeline::{
    InspectorSettings, DEFAULT_CLASSIFY_EVERY_N_FRAMES, DEFAULT_THUMBNAIL_HEIGHT,
    DEFAULT_THUMBNAIL_WIDTH,
};
use crate::presence::PresenceConfig;

const DEFAULT_DB_PATH: &str = "inspections.db";
const DEFAULT_SOURCE_URL: &str = "stub://line_camera";
const DEFAULT_SOURCE_FPS: u32 = 30;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_WARMUP_FRAMES: u32 = 5;
const DEFAULT_CLASSIFIER: &str = "centroid";
const DEFAULT_MODEL_INPUT: u32 = 224;
const DEFAULT_MAX_RECORDS: usize = 100_000;

pub const KNOWN_CLASSIFIERS: &[&str] = &["centroid", "stub", "tract"];

#[derive(Debug, Deserialize, Default)]
struct InspectorConfigFile {
    db_path: Option<String>,
    source: Option<SourceConfigFile>,
    presence: Option<PresenceConfigFile>,
    inspection: Option<InspectionConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    history: Option<HistoryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    pixel_format: Option<String>,
    warmup_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PresenceConfigFile {
    working_width: Option<u32>,
    working_height: Option<u32>,
    sample_stride: Option<usize>,
    motion_threshold: Option<u8>,
    presence_threshold: Option<f32>,
    exit_frames_required: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct InspectionConfigFile {
    buffer_capacity: Option<usize>,
    classify_every_n_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels: Option<Vec<String>>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    roi_fraction: Option<f32>,
    references: Option<Vec<ReferenceColor>>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    /// 0 keeps everything.
    max_records: Option<usize>,
    thumbnail_width: Option<u32>,
    thumbnail_height: Option<u32>,
}

/// Labelled colour used to train the centroid classifier and paint synthetic objects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReferenceColor {
    pub label: String,
    pub rgb: [u8; 3],
}

#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub db_path: String,
    pub source: SourceConfig,
    pub inspector: InspectorSettings,
    pub classifier: ClassifierSettings,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels: Vec<String>,
    pub input_width: u32,
    pub input_height: u32,
    pub roi_fraction: f32,
    pub references: Vec<ReferenceColor>,
}

fn default_references() -> Vec<ReferenceColor> {
    vec![
        ReferenceColor {
            label: "ok".to_string(),
            rgb: [40, 160, 60],
        },
        ReferenceColor {
            label: "scratch".to_string(),
            rgb: [200, 40, 40],
        },
    ]
}

impl InspectorConfig {
    /// Load from the file named by `INSPECT_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("INSPECT_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: InspectorConfigFile) -> Result<Self> {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let source_file = file.source.unwrap_or_default();
        let pixel_format = match source_file.pixel_format.as_deref() {
            Some(name) => PixelFormat::parse(name)?,
            None => PixelFormat::default(),
        };
        let source = SourceConfig {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            pixel_format,
            warmup_frames: source_file.warmup_frames.unwrap_or(DEFAULT_WARMUP_FRAMES),
        };

        let defaults = PresenceConfig::default();
        let presence_file = file.presence.unwrap_or_default();
        let presence = PresenceConfig {
            working_width: presence_file
                .working_width
                .unwrap_or(defaults.working_width),
            working_height: presence_file
                .working_height
                .unwrap_or(defaults.working_height),
            sample_stride: presence_file
                .sample_stride
                .unwrap_or(defaults.sample_stride),
            motion_threshold: presence_file
                .motion_threshold
                .unwrap_or(defaults.motion_threshold),
            presence_threshold: presence_file
                .presence_threshold
                .unwrap_or(defaults.presence_threshold),
            exit_frames_required: presence_file
                .exit_frames_required
                .unwrap_or(defaults.exit_frames_required),
        };

        let inspection_file = file.inspection.unwrap_or_default();
        let history_file = file.history.unwrap_or_default();
        let max_records = history_file.max_records.unwrap_or(DEFAULT_MAX_RECORDS);
        let inspector = InspectorSettings {
            presence,
            buffer_capacity: inspection_file
                .buffer_capacity
                .unwrap_or(crate::inspection::DEFAULT_BUFFER_CAPACITY),
            classify_every_n_frames: inspection_file
                .classify_every_n_frames
                .unwrap_or(DEFAULT_CLASSIFY_EVERY_N_FRAMES),
            thumbnail_width: history_file
                .thumbnail_width
                .unwrap_or(DEFAULT_THUMBNAIL_WIDTH),
            thumbnail_height: history_file
                .thumbnail_height
                .unwrap_or(DEFAULT_THUMBNAIL_HEIGHT),
            max_history: (max_records > 0).then_some(max_records),
        };

        let classifier_file = file.classifier.unwrap_or_default();
        let classifier = ClassifierSettings {
            backend: classifier_file
                .backend
                .unwrap_or_else(|| DEFAULT_CLASSIFIER.to_string()),
            model_path: classifier_file.model_path,
            labels: classifier_file.labels.unwrap_or_default(),
            input_width: classifier_file.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: classifier_file.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
            roi_fraction: classifier_file
                .roi_fraction
                .unwrap_or(crate::classify::backends::centroid::DEFAULT_ROI_FRACTION),
            references: classifier_file
                .references
                .unwrap_or_else(default_references),
        };

        Ok(Self {
            db_path,
            source,
            inspector,
            classifier,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("INSPECT_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(url) = std::env::var("INSPECT_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(backend) = std::env::var("INSPECT_CLASSIFIER") {
            if !backend.trim().is_empty() {
                self.classifier.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(labels) = std::env::var("INSPECT_CLASSIFIER_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.classifier.labels = parsed;
            }
        }
        if let Ok(frames) = std::env::var("INSPECT_EXIT_FRAMES") {
            self.inspector.presence.exit_frames_required = frames
                .trim()
                .parse()
                .map_err(|_| anyhow!("INSPECT_EXIT_FRAMES must be a positive integer"))?;
        }
        if let Ok(capacity) = std::env::var("INSPECT_BUFFER_CAPACITY") {
            self.inspector.buffer_capacity = capacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("INSPECT_BUFFER_CAPACITY must be a positive integer"))?;
        }
        if let Ok(threshold) = std::env::var("INSPECT_MOTION_THRESHOLD") {
            self.inspector.presence.motion_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("INSPECT_MOTION_THRESHOLD must be an integer in 0..=255"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let presence = &self.inspector.presence;
        if presence.working_width == 0 || presence.working_height == 0 {
            return Err(anyhow!("working resolution must be non-zero"));
        }
        if presence.sample_stride == 0 {
            return Err(anyhow!("sample_stride must be greater than zero"));
        }
        if !(0.0..1.0).contains(&presence.presence_threshold) {
            return Err(anyhow!("presence_threshold must be within [0, 1)"));
        }
        if presence.exit_frames_required == 0 {
            return Err(anyhow!("exit_frames_required must be greater than zero"));
        }
        if self.inspector.buffer_capacity == 0 {
            return Err(anyhow!("buffer_capacity must be greater than zero"));
        }
        if self.inspector.classify_every_n_frames == 0 {
            return Err(anyhow!("classify_every_n_frames must be greater than zero"));
        }
        if self.inspector.thumbnail_width == 0 || self.inspector.thumbnail_height == 0 {
            return Err(anyhow!("thumbnail size must be non-zero"));
        }
        if self.source.width == 0 || self.source.height == 0 || self.source.target_fps == 0 {
            return Err(anyhow!("source resolution and target_fps must be non-zero"));
        }
        self.source
            .pixel_format
            .frame_len(self.source.width, self.source.height)?;

        self.classifier.backend = self.classifier.backend.trim().to_lowercase();
        match self.classifier.backend.as_str() {
            "centroid" => {
                if self.classifier.references.is_empty() {
                    return Err(anyhow!(
                        "centroid classifier needs at least one reference colour"
                    ));
                }
                if !(self.classifier.roi_fraction > 0.0 && self.classifier.roi_fraction <= 1.0) {
                    return Err(anyhow!("roi_fraction must be within (0, 1]"));
                }
            }
            "tract" => {
                if self.classifier.model_path.is_none() {
                    return Err(anyhow!("tract classifier requires model_path"));
                }
                if self.classifier.labels.is_empty() {
                    return Err(anyhow!("tract classifier requires labels"));
                }
            }
            "stub" => {}
            other => {
                return Err(anyhow!(
                    "unknown classifier '{}' (expected one of {})",
                    other,
                    KNOWN_CLASSIFIERS.join(", ")
                ))
            }
        }
        for reference in &self.classifier.references {
            if reference.label.trim().is_empty() {
                return Err(anyhow!("reference colour labels must not be empty"));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<InspectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
