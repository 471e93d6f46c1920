//! Encoder orchestrator.
//!
//! [`VideoEncoder`] owns one backend, one [`ShardSink`] and (in
//! async-send mode) a reference to the shared transmission worker. Per
//! frame it decides whether a requested IDR is emitted or throttled,
//! resets the shard template, drives the backend and queues the
//! resulting payload for transmission.

use std::fs::{File, OpenOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::backend::{self, EncoderBackend, EncoderSettings};
use crate::clock::monotonic_ns;
use crate::error::VideoError;
use crate::sender::{FrameSender, SendJob};
use crate::session::SessionHandle;
use crate::shard::ViewInfo;
use crate::sink::ShardSink;

/// Minimum distance in frames between two emitted IDRs. Requests
/// arriving sooner are deferred, never dropped.
pub const IDR_THROTTLE: i64 = 100;

/// When set, raw bitstream is appended to
/// `"{prefix}-{stream_idx}.{h264|h265}"` per stream.
pub const DUMP_VIDEO_ENV: &str = "HEADCAST_DUMP_VIDEO";

/// Per-stream video encoder front end.
pub struct VideoEncoder {
    backend: Box<dyn EncoderBackend>,
    stream_idx: u8,
    sync_needed: AtomicBool,
    last_idr_frame: i64,
    sender: Option<Arc<FrameSender>>,
    sink: Arc<ShardSink>,
}

impl VideoEncoder {
    /// Instantiate the backend named in `settings` and wrap it.
    ///
    /// Fails with [`VideoError::UnsupportedEncoder`] when the name is
    /// unknown or not compiled in. A failure to open the bitstream
    /// capture file is not fatal (capture is telemetry only).
    pub fn create(
        settings: &EncoderSettings,
        stream_idx: u8,
        width: u32,
        height: u32,
        fps: f32,
    ) -> Result<Self, VideoError> {
        let backend = backend::create_backend(settings, width, height, fps)?;
        Ok(Self::with_backend(backend, stream_idx))
    }

    /// Wrap a caller-supplied backend. Public seam for embedders with
    /// their own codec integration.
    pub fn with_backend(backend: Box<dyn EncoderBackend>, stream_idx: u8) -> Self {
        let dump = open_dump_file(stream_idx, backend.codec().extension());
        let sender = backend.async_send().then(FrameSender::acquire);
        Self {
            backend,
            stream_idx,
            sync_needed: AtomicBool::new(false),
            last_idr_frame: -IDR_THROTTLE,
            sender,
            sink: Arc::new(ShardSink::new(stream_idx, dump)),
        }
    }

    pub fn stream_idx(&self) -> u8 {
        self.stream_idx
    }

    /// Request that an upcoming frame be encoded as an IDR (the
    /// headset lost sync). Callable from any thread, idempotent; the
    /// request is honored by the next `encode()` outside the throttle
    /// window.
    pub fn request_idr(&self) {
        self.sync_needed.store(true, Ordering::Release);
    }

    /// Encode one frame and hand the payload to the send pipeline.
    ///
    /// Frame indices must be supplied in increasing order per stream;
    /// out-of-order indices corrupt the IDR throttle bookkeeping.
    pub fn encode(
        &mut self,
        session: Arc<dyn SessionHandle>,
        view_info: ViewInfo,
        frame_index: u64,
    ) -> Result<(), VideoError> {
        // At most one frame in flight: the previous frame's shards
        // must fully drain before this one is enqueued.
        if let Some(sender) = &self.sender {
            sender.wait_idle();
        }

        let mut idr = self.sync_needed.swap(false, Ordering::AcqRel);
        // Throttle IDRs to avoid overloading the decoder.
        if idr && (frame_index as i64) < self.last_idr_frame + IDR_THROTTLE {
            debug!(stream = self.stream_idx, frame = frame_index, "IDR throttled");
            self.sync_needed.store(true, Ordering::Release);
            idr = false;
        }
        if idr {
            self.last_idr_frame = frame_index as i64;
        }
        let tag = if idr { "idr" } else { "p" };

        let clock = session.clock_offset();
        self.sink
            .begin_frame(Arc::clone(&session), clock, frame_index, view_info);
        session.dump_time("encode_begin", frame_index, monotonic_ns(), self.stream_idx, tag);

        if let Some(payload) = self.backend.encode(&self.sink, idr, view_info.display_time)? {
            let sender = self
                .sender
                .as_ref()
                .expect("async payload from a backend that opted out of the transmission worker");
            sender.push(SendJob {
                sink: Arc::clone(&self.sink),
                payload,
            });
        }

        session.dump_time("encode_end", frame_index, monotonic_ns(), self.stream_idx, tag);
        Ok(())
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        // The worker may still hold jobs referencing our sink; drain
        // them before the backend goes away.
        if let Some(sender) = &self.sender {
            sender.wait_idle();
        }
    }
}

fn open_dump_file(stream_idx: u8, extension: &str) -> Option<File> {
    let prefix = std::env::var(DUMP_VIDEO_ENV).ok()?;
    let path = format!("{prefix}-{stream_idx}.{extension}");
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(%path, error = %e, "failed to open bitstream capture file");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
