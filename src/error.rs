//! Error types for the video delivery pipeline.
//!
//! All fallible operations return `Result<T, VideoError>`.
//! Only creation and backend failures surface to callers; transport
//! errors are absorbed at the shard-send boundary (see [`crate::sink`]).

use thiserror::Error;

/// The canonical error type for the video pipeline.
#[derive(Debug, Error)]
pub enum VideoError {
    // ── Creation Errors ──────────────────────────────────────────
    /// The configured encoder backend name is unknown or was not
    /// compiled in. Fatal: no encoder is instantiated.
    #[error("unsupported encoder backend: {0}")]
    UnsupportedEncoder(String),

    // ── Encode Errors ────────────────────────────────────────────
    /// The backend failed to produce a bitstream. Fatal to this
    /// pipeline instance; the caller is expected to recreate the
    /// encoder.
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// The session/transport layer failed to send a shard. Transient;
    /// always discarded at the shard-send boundary.
    #[error("network send error: {0}")]
    Network(#[from] std::io::Error),

    // ── Wire Decode Errors ───────────────────────────────────────
    /// The received shard is shorter than its framing requires.
    #[error("shard too short: {len} bytes, need {need}")]
    ShardTooShort { len: usize, need: usize },

    /// The shard payload does not match the length field.
    #[error("shard payload length mismatch: header says {expected}, got {actual}")]
    PayloadLengthMismatch { expected: usize, actual: usize },
}
