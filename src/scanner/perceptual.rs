//! Perceptual hashing for similarity detection.
//!
//! This module provides the [`PerceptualHasher`] which computes hashes for
//! images that remain stable under common transformations like resizing and
//! recompression. A [`Fingerprint`] holds one hash per frame: a single frame
//! for images, up to [`KEYFRAME_COUNT`](super::video::KEYFRAME_COUNT)
//! sampled keyframes for video.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::video::VideoTools;
use super::HashError;

/// Side length of the hash grid; fingerprints carry `HASH_SIDE²` bits per frame.
pub const HASH_SIDE: u32 = 8;

/// Bits in a single-frame hash.
pub const HASH_BITS: u32 = HASH_SIDE * HASH_SIDE;

/// Image extensions handled by the image decoder.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "ico",
];

/// Video extensions handled through keyframe extraction.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "flv", "wmv", "webm", "m4v", "mpg", "mpeg",
];

/// Supported perceptual hashing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PerceptualAlgorithm {
    /// pHash (Perceptual Hash) - DCT-based, most resilient to transformations.
    #[default]
    Phash,
    /// dHash (Difference Hash) - Gradient-based, very fast and effective.
    Dhash,
    /// aHash (Average Hash) - Mean-based, fast but less resilient.
    Ahash,
}

impl std::fmt::Display for PerceptualAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Phash => write!(f, "pHash"),
            Self::Dhash => write!(f, "dHash"),
            Self::Ahash => write!(f, "aHash"),
        }
    }
}

/// Kind of media a file holds, judged by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image
    Image,
    /// Video container
    Video,
}

impl MediaKind {
    /// Classify a path by its extension. `None` for anything else.
    #[must_use]
    pub fn of(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_string_lossy().to_lowercase();
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Errors that can occur during perceptual hashing.
#[derive(Debug, Clone, Error)]
pub enum PerceptualError {
    /// The file could not be read.
    #[error(transparent)]
    Read(#[from] HashError),

    /// Failed to decode the image or frame.
    #[error("Failed to decode {path}: {message}")]
    Decode {
        /// File that failed to decode
        path: PathBuf,
        /// Decoder message
        message: String,
    },

    /// The file type is not an image or video this build can fingerprint.
    #[error("Unsupported media type: {0}")]
    Unsupported(PathBuf),

    /// Video fingerprinting needs ffmpeg/ffprobe and they are unavailable.
    #[error("Video tools unavailable for {path}: {message}")]
    ToolUnavailable {
        /// Video that could not be processed
        path: PathBuf,
        /// Why the tools could not be used
        message: String,
    },
}

impl PerceptualError {
    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read(e) => e.path(),
            Self::Decode { path, .. } | Self::ToolUnavailable { path, .. } => path,
            Self::Unsupported(path) => path,
        }
    }

    /// Whether the file was skipped for being unsupported rather than unreadable.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::ToolUnavailable { .. })
    }
}

/// Per-frame perceptual hashes of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hash bytes for each sampled frame, in presentation order
    pub frames: Vec<Vec<u8>>,
}

impl Fingerprint {
    /// Fingerprint with a single frame.
    #[must_use]
    pub fn single(hash: Vec<u8>) -> Self {
        Self { frames: vec![hash] }
    }

    /// Bits per frame hash.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.frames
            .first()
            .map_or(HASH_BITS, |frame| frame.len() as u32 * 8)
    }

    /// Hamming distance to another fingerprint.
    ///
    /// Frames are compared pairwise over the shorter of the two sequences and
    /// the per-frame distances are averaged, rounding up. A fingerprint with no
    /// frames is maximally distant from everything.
    #[must_use]
    pub fn distance(&self, other: &Self) -> u32 {
        let frames = self.frames.len().min(other.frames.len());
        if frames == 0 {
            return self.bits().max(other.bits());
        }
        let total: u32 = self
            .frames
            .iter()
            .zip(&other.frames)
            .map(|(a, b)| hamming(a, b))
            .sum();
        total.div_ceil(frames as u32)
    }

    /// Hex representation, frames separated by `:`.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|b| format!("{b:02x}")).collect::<String>())
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Bitwise Hamming distance; bytes beyond the shorter slice count as differing.
fn hamming(a: &[u8], b: &[u8]) -> u32 {
    let common: u32 = a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum();
    let extra = a.len().abs_diff(b.len()) as u32 * 8;
    common + extra
}

/// Similarity percentage for a distance over `bits` bits.
#[must_use]
pub fn similarity_percent(distance: u32, bits: u32) -> f64 {
    if bits == 0 {
        return 0.0;
    }
    let clamped = distance.min(bits);
    f64::from(bits - clamped) / f64::from(bits) * 100.0
}

/// Largest distance allowed for a similarity percentage.
///
/// Higher percentages allow smaller distances. The percentage is clamped to
/// 0–100.
#[must_use]
pub fn threshold_distance(percent: f64, bits: u32) -> u32 {
    let percent = percent.clamp(0.0, 100.0);
    ((100.0 - percent) / 100.0 * f64::from(bits)).floor() as u32
}

/// Computes perceptual fingerprints for images and videos.
pub struct PerceptualHasher {
    hasher: image_hasher::Hasher,
    algorithm: PerceptualAlgorithm,
    video: Option<VideoTools>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl std::fmt::Debug for PerceptualHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerceptualHasher")
            .field("algorithm", &self.algorithm)
            .field("video", &self.video)
            .field("shutdown_flag", &self.shutdown_flag)
            .finish()
    }
}

impl PerceptualHasher {
    /// Create a new `PerceptualHasher` with the given algorithm.
    ///
    /// Video support is off until [`PerceptualHasher::with_video_tools`] is called.
    #[must_use]
    pub fn new(algorithm: PerceptualAlgorithm) -> Self {
        let config = HasherConfig::new().hash_size(HASH_SIDE, HASH_SIDE);
        let config = match algorithm {
            PerceptualAlgorithm::Phash => config.hash_alg(HashAlg::Median).preproc_dct(),
            PerceptualAlgorithm::Dhash => config.hash_alg(HashAlg::Gradient),
            PerceptualAlgorithm::Ahash => config.hash_alg(HashAlg::Mean),
        };

        Self {
            hasher: config.to_hasher(),
            algorithm,
            video: None,
            shutdown_flag: None,
        }
    }

    /// Enable video fingerprinting with the given tools.
    #[must_use]
    pub fn with_video_tools(mut self, tools: Option<VideoTools>) -> Self {
        self.video = tools;
        self
    }

    /// Set the shutdown flag polled between video frame extractions.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Option<Arc<AtomicBool>>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    /// Get the algorithm used by this hasher.
    #[must_use]
    pub fn algorithm(&self) -> PerceptualAlgorithm {
        self.algorithm
    }

    /// Hash a decoded image.
    #[must_use]
    pub fn hash_image(&self, image: &DynamicImage) -> Vec<u8> {
        self.hasher.hash_image(image).as_bytes().to_vec()
    }

    /// Fingerprint a media file, dispatching on its extension.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptualError::Unsupported`] for non-media files and
    /// [`PerceptualError::ToolUnavailable`] for videos when no video tools
    /// are configured.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint, PerceptualError> {
        match MediaKind::of(path) {
            Some(MediaKind::Image) => self.fingerprint_image(path),
            Some(MediaKind::Video) => match &self.video {
                Some(tools) => tools.fingerprint(path, self, self.shutdown_flag.as_deref()),
                None => Err(PerceptualError::ToolUnavailable {
                    path: path.to_path_buf(),
                    message: "ffmpeg/ffprobe not found".to_string(),
                }),
            },
            None => Err(PerceptualError::Unsupported(path.to_path_buf())),
        }
    }

    /// Fingerprint a still image.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptualError`] if the image cannot be read or decoded.
    pub fn fingerprint_image(&self, path: &Path) -> Result<Fingerprint, PerceptualError> {
        let image = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => PerceptualError::Read(HashError::from_io(path, io)),
            image::ImageError::Unsupported(_) => PerceptualError::Unsupported(path.to_path_buf()),
            other => PerceptualError::Decode {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;
        Ok(Fingerprint::single(self.hash_image(&image)))
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(PerceptualAlgorithm::Phash)
    }
}
