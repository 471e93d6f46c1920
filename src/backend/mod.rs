//! Encoder backend abstraction and selection.
//!
//! A backend turns rendered frames into codec bitstream. The compiled-in
//! set is the cargo feature set {`x264`, `nvenc`, `vaapi`}; selection
//! happens once at construction and the call contract is uniform
//! afterwards. How pixels reach a backend is the embedder's concern.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::VideoError;
use crate::sink::ShardSink;

#[cfg(any(feature = "x264", feature = "nvenc", feature = "vaapi"))]
pub mod ffmpeg;

// ── Codec / settings ─────────────────────────────────────────────

/// Output bitstream codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
}

impl Codec {
    /// File extension used for raw bitstream capture.
    pub fn extension(self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
        }
    }
}

/// Encoder selection and tuning, as parsed from the server config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Backend name: "x264", "nvenc" or "vaapi".
    pub encoder: String,
    pub codec: Codec,
    /// Target bitrate, bits per second.
    #[serde(default = "default_bitrate")]
    pub bitrate: u64,
}

fn default_bitrate() -> u64 {
    50_000_000
}

impl EncoderSettings {
    pub fn new(encoder: impl Into<String>, codec: Codec) -> Self {
        Self {
            encoder: encoder.into(),
            codec,
            bitrate: default_bitrate(),
        }
    }
}

// ── EncoderBackend ───────────────────────────────────────────────

/// Polymorphic encoder backend.
///
/// One call to [`encode`](Self::encode) covers one frame. A backend
/// either returns the finished payload (async-send mode: the
/// orchestrator queues it on the shared transmission worker) or pushes
/// slices through the sink itself as they complete (sync-send mode,
/// `Ok(None)` return, terminal slice flagged end-of-frame).
pub trait EncoderBackend: Send {
    fn codec(&self) -> Codec;

    /// Whether finished payloads go through the shared transmission
    /// worker. Sync-send backends opt out and no worker reference is
    /// held for them.
    fn async_send(&self) -> bool {
        true
    }

    /// Encode the current frame, as an IDR if `idr` is set, targeting
    /// the given headset display timestamp. `Ok(None)` means the frame
    /// was dropped or buffered by the backend (or already delivered
    /// through `sink`).
    fn encode(
        &mut self,
        sink: &ShardSink,
        idr: bool,
        target_timestamp_ns: u64,
    ) -> Result<Option<Bytes>, VideoError>;
}

// ── Factory ──────────────────────────────────────────────────────

/// Instantiate the backend named in `settings`.
///
/// Fails with [`VideoError::UnsupportedEncoder`] when the name is
/// unknown or its feature was not compiled in.
pub(crate) fn create_backend(
    settings: &EncoderSettings,
    width: u32,
    height: u32,
    fps: f32,
) -> Result<Box<dyn EncoderBackend>, VideoError> {
    #[cfg(not(any(feature = "x264", feature = "nvenc", feature = "vaapi")))]
    let _ = (width, height, fps);

    match settings.encoder.as_str() {
        #[cfg(feature = "x264")]
        "x264" => Ok(Box::new(ffmpeg::FfmpegBackend::software(
            settings, width, height, fps,
        )?)),
        #[cfg(feature = "nvenc")]
        "nvenc" => Ok(Box::new(ffmpeg::FfmpegBackend::nvenc(
            settings, width, height, fps,
        )?)),
        #[cfg(feature = "vaapi")]
        "vaapi" => Ok(Box::new(ffmpeg::FfmpegBackend::vaapi(
            settings, width, height, fps,
        )?)),
        other => Err(VideoError::UnsupportedEncoder(other.to_string())),
    }
}
