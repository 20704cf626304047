//! Keyframe extraction for video fingerprints.
//!
//! Video decoding is delegated to external `ffprobe` and `ffmpeg` binaries.
//! When they are not installed, videos are reported as unsupported and the
//! rest of the run is unaffected.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;

use super::perceptual::{Fingerprint, PerceptualError, PerceptualHasher};
use super::HashError;

/// Maximum number of keyframes sampled per video.
pub const KEYFRAME_COUNT: usize = 5;

/// Handles to the external video tools.
#[derive(Debug, Clone)]
pub struct VideoTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl VideoTools {
    /// Use the given binaries without checking that they run.
    #[must_use]
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Look for `ffmpeg` and `ffprobe` on `PATH`.
    #[must_use]
    pub fn detect() -> Option<Self> {
        let tools = Self::new("ffmpeg", "ffprobe");
        if runs(&tools.ffmpeg) && runs(&tools.ffprobe) {
            log::debug!("Video keyframe extraction enabled");
            Some(tools)
        } else {
            log::info!("ffmpeg/ffprobe not found, videos will be skipped");
            None
        }
    }

    /// Container duration in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptualError`] if `ffprobe` fails or prints no duration.
    pub fn duration(&self, path: &Path) -> Result<f64, PerceptualError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PerceptualError::ToolUnavailable {
                path: path.to_path_buf(),
                message: format!("failed to run ffprobe: {e}"),
            })?;

        if !output.status.success() {
            return Err(PerceptualError::Decode {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|e| PerceptualError::Decode {
                path: path.to_path_buf(),
                message: format!("unreadable duration: {e}"),
            })
    }

    /// Decode the frame at `seconds` into an image.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptualError`] if `ffmpeg` fails or emits no frame.
    pub fn extract_frame(&self, path: &Path, seconds: f64) -> Result<DynamicImage, PerceptualError> {
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &format!("{seconds:.3}"), "-i"])
            .arg(path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PerceptualError::ToolUnavailable {
                path: path.to_path_buf(),
                message: format!("failed to run ffmpeg: {e}"),
            })?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(PerceptualError::Decode {
                path: path.to_path_buf(),
                message: format!("no frame at {seconds:.3}s"),
            });
        }

        image::load_from_memory(&output.stdout).map_err(|e| PerceptualError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Hash up to [`KEYFRAME_COUNT`] evenly spaced frames.
    ///
    /// Frames that fail to decode are left out; the call fails only when no
    /// frame could be hashed. `cancel` is polled before each tool run.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptualError`] if the duration is unreadable or every
    /// frame extraction failed, and a cancelled read error once `cancel` is
    /// raised.
    pub fn fingerprint(
        &self,
        path: &Path,
        hasher: &PerceptualHasher,
        cancel: Option<&AtomicBool>,
    ) -> Result<Fingerprint, PerceptualError> {
        let check = || match cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => {
                log::trace!("Video fingerprint cancelled: {}", path.display());
                Err(PerceptualError::Read(HashError::Cancelled(path.to_path_buf())))
            }
            _ => Ok(()),
        };

        check()?;
        let duration = self.duration(path)?;
        let mut frames = Vec::with_capacity(KEYFRAME_COUNT);
        let mut last_error = None;

        for seconds in keyframe_times(duration, KEYFRAME_COUNT) {
            check()?;
            match self.extract_frame(path, seconds) {
                Ok(frame) => frames.push(hasher.hash_image(&frame)),
                Err(e) => {
                    log::trace!("Skipping frame of {}: {}", path.display(), e);
                    last_error = Some(e);
                }
            }
        }

        if frames.is_empty() {
            return Err(last_error.unwrap_or_else(|| PerceptualError::Decode {
                path: path.to_path_buf(),
                message: "no frames".to_string(),
            }));
        }
        Ok(Fingerprint { frames })
    }
}

fn runs(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Timestamps of `count` frames evenly spaced from the start of the video.
///
/// A zero, negative or non-finite duration yields a single frame at 0.
#[must_use]
pub fn keyframe_times(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    if !duration.is_finite() || duration <= 0.0 {
        return vec![0.0];
    }
    (0..count)
        .map(|i| duration * i as f64 / count as f64)
        .collect()
}
