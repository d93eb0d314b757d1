//! Local raw frame recordings.
//!
//! A recording is a plain concatenation of fixed-size frames in one pixel
//! format, e.g. the output of `ffmpeg -f rawvideo -pix_fmt nv12`. Only local
//! paths are accepted.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};

use anyhow::{anyhow, Context, Result};

use super::{Capture, FrameSource, SourceConfig, SourceStats};
use crate::frame::FullFrame;

pub struct RawFileSource {
    config: SourceConfig,
    reader: Option<BufReader<File>>,
    scratch: Vec<u8>,
    frames_captured: u64,
    ended: bool,
}

impl RawFileSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if !is_local_file_path(&config.url) {
            return Err(anyhow!(
                "raw file ingestion only supports local paths (no URL schemes)"
            ));
        }
        let frame_len = config.pixel_format.frame_len(config.width, config.height)?;
        if frame_len == 0 {
            return Err(anyhow!("raw file source needs a non-zero resolution"));
        }
        Ok(Self {
            config,
            reader: None,
            scratch: vec![0u8; frame_len],
            frames_captured: 0,
            ended: false,
        })
    }
}

impl FrameSource for RawFileSource {
    fn connect(&mut self) -> Result<()> {
        let file = File::open(&self.config.url)
            .with_context(|| format!("failed to open raw recording {}", self.config.url))?;
        self.reader = Some(BufReader::new(file));
        self.ended = false;
        log::info!(
            "RawFileSource: connected to {} ({:?} {}x{})",
            self.config.url,
            self.config.pixel_format,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Capture> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| anyhow!("raw file source {} is not connected", self.config.url))?;
        if self.ended {
            return Ok(Capture::EndOfStream);
        }

        match reader.read_exact(&mut self.scratch) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                // A trailing partial frame is dropped.
                self.ended = true;
                log::info!(
                    "RawFileSource: end of {} after {} frames",
                    self.config.url,
                    self.frames_captured
                );
                return Ok(Capture::EndOfStream);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.config.url))
            }
        }

        let rgb = self
            .config
            .pixel_format
            .to_rgb(&self.scratch, self.config.width, self.config.height)?;
        self.frames_captured += 1;
        Ok(Capture::Frame(FullFrame::from_rgb(
            rgb,
            self.config.width,
            self.config.height,
        )?))
    }

    fn is_healthy(&self) -> bool {
        self.reader.is_some() && !self.ended
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            not_ready_polls: 0,
            url: self.config.url.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}
