//! Seam to the session/transport layer.
//!
//! The pipeline never owns a socket. It hands finished shards to a
//! [`SessionHandle`] and asks it for the headset clock offset; what the
//! session does with them (QUIC, UDP, loopback test capture) is its
//! business.

use crate::clock::ClockOffset;
use crate::error::VideoError;
use crate::shard::VideoShard;

/// Connection/session collaborator consumed by the pipeline.
pub trait SessionHandle: Send + Sync {
    /// Send one framed shard to the headset.
    ///
    /// Transient link errors are expected; the pipeline discards them
    /// (best-effort delivery, never stalls the encode path).
    fn send_stream(&self, shard: &VideoShard) -> Result<(), VideoError>;

    /// Current offset between the server and headset clocks.
    fn clock_offset(&self) -> ClockOffset;

    /// Fire-and-forget timing telemetry event.
    ///
    /// `tag` distinguishes frame kinds ("idr"/"p") on encode events and
    /// is empty otherwise.
    fn dump_time(&self, _event: &str, _frame_idx: u64, _timestamp_ns: u64, _stream_idx: u8, _tag: &str) {
    }
}
