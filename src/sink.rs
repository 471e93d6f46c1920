//! Shard fragmenter and per-frame send state.
//!
//! [`ShardSink`] splits one encoded payload into wire shards of at
//! most [`MAX_PAYLOAD_SIZE`] bytes and hands each to the session. The
//! frame's first shard additionally carries the view-info block, so
//! its payload capacity shrinks by [`VIEW_INFO_SIZE`].
//!
//! All mutable state (shard template, timing, clock, capture file)
//! lives behind one mutex: the transmission worker invokes
//! [`send_data`](ShardSink::send_data) from its own thread, while the
//! encoder thread only touches the same state between frames (the
//! `wait_idle` backpressure in the orchestrator keeps the two apart).

use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::debug;

use crate::clock::{ClockOffset, monotonic_ns};
use crate::session::SessionHandle;
use crate::shard::{MAX_PAYLOAD_SIZE, ShardFlags, TimingInfo, VIEW_INFO_SIZE, VideoShard, ViewInfo};

struct SinkState {
    session: Option<Arc<dyn SessionHandle>>,
    clock: ClockOffset,
    frame_idx: u64,
    shard_idx: u32,
    view_info: Option<ViewInfo>,
    timing: TimingInfo,
    dump: Option<File>,
}

/// Per-stream send state shared between the encoder thread and the
/// transmission worker.
pub struct ShardSink {
    stream_idx: u8,
    state: Mutex<SinkState>,
}

impl ShardSink {
    pub(crate) fn new(stream_idx: u8, dump: Option<File>) -> Self {
        Self {
            stream_idx,
            state: Mutex::new(SinkState {
                session: None,
                clock: ClockOffset::default(),
                frame_idx: 0,
                shard_idx: 0,
                view_info: None,
                timing: TimingInfo::default(),
                dump,
            }),
        }
    }

    /// Stream index this sink was created for.
    pub fn stream_idx(&self) -> u8 {
        self.stream_idx
    }

    /// Reset the shard template for a new frame and stamp
    /// `encode_begin`. Called once per frame from the orchestrator,
    /// never concurrently with an outstanding send.
    pub(crate) fn begin_frame(
        &self,
        session: Arc<dyn SessionHandle>,
        clock: ClockOffset,
        frame_idx: u64,
        view_info: ViewInfo,
    ) {
        let mut st = self.state.lock().unwrap();
        st.session = Some(session);
        st.clock = clock;
        st.frame_idx = frame_idx;
        st.shard_idx = 0;
        st.view_info = Some(view_info);
        st.timing = TimingInfo {
            encode_begin: Some(clock.to_headset(monotonic_ns())),
            send_begin: None,
            send_end: None,
        };
    }

    /// Fragment one encoded payload into wire shards and send them.
    ///
    /// `end_of_frame` marks this invocation as the frame's terminal
    /// send; a frame's encode may call this several times, once per
    /// slice. The call's first shard gets `START_OF_SLICE` and its
    /// last `END_OF_SLICE`, independent of per-frame shard numbering.
    /// Transport errors are logged and discarded — a damaged link
    /// never stalls encoding. Empty payloads emit no shards.
    pub fn send_data(&self, data: &[u8], end_of_frame: bool) {
        let mut st = self.state.lock().unwrap();
        let Some(session) = st.session.clone() else {
            debug!(stream = self.stream_idx, "send_data before first frame, dropped");
            return;
        };

        if let Some(dump) = st.dump.as_mut() {
            // Capture is telemetry only; write errors are not surfaced.
            let _ = dump.write_all(data);
        }
        if st.shard_idx == 0 {
            session.dump_time("send_begin", st.frame_idx, monotonic_ns(), self.stream_idx, "");
            st.timing.send_begin = Some(st.clock.to_headset(monotonic_ns()));
        }
        if end_of_frame {
            st.timing.send_end = Some(st.clock.to_headset(monotonic_ns()));
        }

        let mut flags = ShardFlags::START_OF_SLICE;
        let mut cursor = 0;
        while cursor < data.len() {
            // The view-info block eats into the first shard's capacity.
            let reserved = if st.view_info.is_some() { VIEW_INFO_SIZE } else { 0 };
            let next = data.len().min(cursor + MAX_PAYLOAD_SIZE - reserved);

            let mut timing_info = None;
            if next == data.len() {
                flags |= ShardFlags::END_OF_SLICE;
                if end_of_frame {
                    flags |= ShardFlags::END_OF_FRAME;
                    timing_info = Some(st.timing);
                }
            }

            let shard = VideoShard {
                stream_idx: self.stream_idx,
                frame_idx: st.frame_idx,
                shard_idx: st.shard_idx,
                flags,
                view_info: st.view_info,
                timing_info,
                payload: Bytes::copy_from_slice(&data[cursor..next]),
            };
            if let Err(e) = session.send_stream(&shard) {
                debug!(
                    stream = self.stream_idx,
                    frame = st.frame_idx,
                    shard = st.shard_idx,
                    error = %e,
                    "shard dropped"
                );
            }

            st.shard_idx += 1;
            flags = ShardFlags::empty();
            st.view_info = None;
            cursor = next;
        }

        if end_of_frame {
            session.dump_time("send_end", st.frame_idx, monotonic_ns(), self.stream_idx, "");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
