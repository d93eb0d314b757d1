//! Presence detection by frame differencing with exit hysteresis.
//!
//! The detector compares each working frame with the previous one over a fixed
//! pixel stride. Motion above the presence ratio marks the object present at once;
//! leaving requires `exit_frames_required` consecutive motion-free frames so that a
//! single flickering or occluded frame cannot end an inspection.

use crate::frame::WorkingFrame;

pub const DEFAULT_WORKING_WIDTH: u32 = 160;
pub const DEFAULT_WORKING_HEIGHT: u32 = 120;
pub const DEFAULT_SAMPLE_STRIDE: usize = 4;
pub const DEFAULT_MOTION_THRESHOLD: u8 = 25;
pub const DEFAULT_PRESENCE_THRESHOLD: f32 = 0.02;
/// About 0.5 s at 30 evaluated frames per second.
pub const DEFAULT_EXIT_FRAMES_REQUIRED: u32 = 15;

/// Tunables for `PresenceDetector`.
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceConfig {
    /// Working resolution the caller downsamples to before calling `detect`.
    pub working_width: u32,
    pub working_height: u32,
    /// Compare every `sample_stride`-th pixel.
    pub sample_stride: usize,
    /// Mean absolute channel delta (0..=255) above which a pixel counts as changed.
    pub motion_threshold: u8,
    /// Fraction of changed sampled pixels above which the frame has motion.
    pub presence_threshold: f32,
    /// Consecutive motion-free frames needed to declare the object gone.
    pub exit_frames_required: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            working_width: DEFAULT_WORKING_WIDTH,
            working_height: DEFAULT_WORKING_HEIGHT,
            sample_stride: DEFAULT_SAMPLE_STRIDE,
            motion_threshold: DEFAULT_MOTION_THRESHOLD,
            presence_threshold: DEFAULT_PRESENCE_THRESHOLD,
            exit_frames_required: DEFAULT_EXIT_FRAMES_REQUIRED,
        }
    }
}

/// Per-frame presence output. `just_entered` and `just_left` are edges and are
/// never both set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresenceSignal {
    pub present: bool,
    pub just_entered: bool,
    pub just_left: bool,
}

impl PresenceSignal {
    /// Neutral signal used for cold starts.
    pub fn absent() -> Self {
        Self::default()
    }
}

pub struct PresenceDetector {
    config: PresenceConfig,
    previous: Option<WorkingFrame>,
    present: bool,
    exit_counter: u32,
    last_motion_ratio: f32,
}

impl PresenceDetector {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            previous: None,
            present: false,
            exit_counter: 0,
            last_motion_ratio: 0.0,
        }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Debounced presence state after the last call.
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Motion ratio computed by the last comparing call (0 after a cold start).
    pub fn last_motion_ratio(&self) -> f32 {
        self.last_motion_ratio
    }

    /// Forget the previous frame and hysteresis state (stream restart).
    pub fn reset(&mut self) {
        self.previous = None;
        self.present = false;
        self.exit_counter = 0;
        self.last_motion_ratio = 0.0;
    }

    /// Compare `current` with the previous frame and update the debounced state.
    ///
    /// The frame is kept as the next call's previous frame.
    pub fn detect(&mut self, current: WorkingFrame) -> PresenceSignal {
        let previous = match self.previous.take() {
            Some(previous) if previous.same_shape(&current) => previous,
            Some(previous) => {
                log::warn!(
                    "presence: working frame changed from {}x{} to {}x{}, restarting",
                    previous.width(),
                    previous.height(),
                    current.width(),
                    current.height()
                );
                self.reset();
                self.previous = Some(current);
                return PresenceSignal::absent();
            }
            None => {
                self.previous = Some(current);
                return PresenceSignal::absent();
            }
        };

        let ratio = self.motion_ratio(&previous, &current);
        self.last_motion_ratio = ratio;
        let has_motion = ratio > self.config.presence_threshold;

        let mut signal = PresenceSignal::default();
        if has_motion {
            self.exit_counter = 0;
            if !self.present {
                self.present = true;
                signal.just_entered = true;
            }
            signal.present = true;
        } else if self.present {
            self.exit_counter += 1;
            if self.exit_counter >= self.config.exit_frames_required {
                self.present = false;
                self.exit_counter = 0;
                signal.just_left = true;
            } else {
                signal.present = true;
            }
        }

        self.previous = Some(current);
        signal
    }

    fn motion_ratio(&self, previous: &WorkingFrame, current: &WorkingFrame) -> f32 {
        let stride = self.config.sample_stride.max(1);
        let threshold = self.config.motion_threshold as u32 * 3;

        let mut sampled = 0usize;
        let mut changed = 0usize;
        for (a, b) in previous
            .samples()
            .chunks_exact(3)
            .zip(current.samples().chunks_exact(3))
            .step_by(stride)
        {
            let delta = (a[0] as i32 - b[0] as i32).unsigned_abs()
                + (a[1] as i32 - b[1] as i32).unsigned_abs()
                + (a[2] as i32 - b[2] as i32).unsigned_abs();
            // mean channel delta > threshold, kept in integers
            if delta > threshold {
                changed += 1;
            }
            sampled += 1;
        }

        if sampled == 0 {
            0.0
        } else {
            changed as f32 / sampled as f32
        }
    }
}

impl Default for PresenceDetector {
    fn default() -> Self {
        Self::new(PresenceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 16;
    const H: u32 = 12;

    fn solid(value: u8) -> WorkingFrame {
        WorkingFrame::from_rgb(vec![value; (W * H * 3) as usize], W, H).unwrap()
    }

    /// Frame with the first `changed` pixels set to white over a black background.
    fn partial(changed: usize) -> WorkingFrame {
        let mut data = vec![0u8; (W * H * 3) as usize];
        for byte in data.iter_mut().take(changed * 3) {
            *byte = 255;
        }
        WorkingFrame::from_rgb(data, W, H).unwrap()
    }

    fn detector(exit_frames: u32) -> PresenceDetector {
        PresenceDetector::new(PresenceConfig {
            working_width: W,
            working_height: H,
            sample_stride: 1,
            exit_frames_required: exit_frames,
            ..PresenceConfig::default()
        })
    }

    #[test]
    fn first_frame_is_neutral() {
        let mut det = detector(3);
        assert_eq!(det.detect(solid(200)), PresenceSignal::absent());
        assert!(!det.is_present());
    }

    #[test]
    fn static_scene_never_raises_edges() {
        let mut det = detector(3);
        for _ in 0..50 {
            let signal = det.detect(solid(90));
            assert!(!signal.present);
            assert!(!signal.just_entered);
            assert!(!signal.just_left);
        }
    }

    #[test]
    fn motion_enters_once() {
        let mut det = detector(3);
        det.detect(solid(0));

        let entered = det.detect(solid(255));
        assert!(entered.present && entered.just_entered && !entered.just_left);

        let still_moving = det.detect(solid(0));
        assert!(still_moving.present && !still_moving.just_entered);
    }

    #[test]
    fn small_changes_stay_below_pixel_threshold() {
        let mut det = detector(3);
        det.detect(solid(100));
        // mean delta 20 <= 25
        let signal = det.detect(solid(120));
        assert!(!signal.present);
        assert_eq!(det.last_motion_ratio(), 0.0);
    }

    #[test]
    fn ratio_must_exceed_presence_threshold() {
        // 192 pixels: 2% is 3.84 pixels.
        let mut det = detector(3);
        det.detect(partial(0));
        assert!(!det.detect(partial(3)).present);

        let mut det = detector(3);
        det.detect(partial(0));
        assert!(det.detect(partial(4)).just_entered);
    }

    #[test]
    fn debounce_absorbs_short_gaps() {
        let exit = 5;
        let mut det = detector(exit);
        det.detect(solid(0));
        assert!(det.detect(solid(255)).just_entered);

        // exit - 1 quiet frames, then motion again.
        for _ in 0..exit - 1 {
            let signal = det.detect(solid(255));
            assert!(signal.present);
            assert!(!signal.just_left);
        }
        let resumed = det.detect(solid(0));
        assert!(resumed.present && !resumed.just_entered && !resumed.just_left);

        // Counter was reset: another exit - 1 quiet frames still present.
        for _ in 0..exit - 1 {
            assert!(det.detect(solid(0)).present);
        }
    }

    #[test]
    fn leaves_after_exact_exit_count() {
        let exit = 4;
        let mut det = detector(exit);
        det.detect(solid(0));
        det.detect(solid(255));

        let mut left = 0;
        for i in 1..=exit + 5 {
            let signal = det.detect(solid(255));
            if signal.just_left {
                left += 1;
                assert_eq!(i, exit);
                assert!(!signal.present);
            } else if i < exit {
                assert!(signal.present);
            } else {
                assert!(!signal.present);
            }
        }
        assert_eq!(left, 1);
    }

    #[test]
    fn reset_behaves_like_cold_start() {
        let mut det = detector(3);
        det.detect(solid(0));
        det.detect(solid(255));
        assert!(det.is_present());

        det.reset();
        assert_eq!(det.detect(solid(0)), PresenceSignal::absent());
        assert!(det.detect(solid(255)).just_entered);
    }

    #[test]
    fn shape_change_restarts_detector() {
        let mut det = detector(3);
        det.detect(solid(0));
        det.detect(solid(255));

        let other = WorkingFrame::from_rgb(vec![0u8; 8 * 6 * 3], 8, 6).unwrap();
        assert_eq!(det.detect(other), PresenceSignal::absent());
        assert!(!det.is_present());
    }

    #[test]
    fn stride_skips_pixels() {
        let mut det = PresenceDetector::new(PresenceConfig {
            sample_stride: 2,
            presence_threshold: 0.0,
            ..PresenceConfig::default()
        });
        // Only pixel 1 changes; stride 2 samples pixels 0, 2, 4, ...
        let mut changed = vec![0u8; (W * H * 3) as usize];
        changed[3..6].copy_from_slice(&[255, 255, 255]);
        det.detect(solid(0));
        let signal = det.detect(WorkingFrame::from_rgb(changed, W, H).unwrap());
        assert!(!signal.present);
    }
}
