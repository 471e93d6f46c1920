//! Wire shard framing for the video stream.
//!
//! Each shard is one bounded-size network packet carrying a slice of
//! one encoded frame's bitstream plus framing metadata. The receiver
//! must match [`MAX_PAYLOAD_SIZE`], [`VIEW_INFO_SIZE`] and
//! [`TIMING_INFO_SIZE`] exactly.
//!
//! ## Wire format (little-endian)
//!
//! ```text
//! stream_idx:   u8    (1)
//! frame_idx:    u64   (8)
//! shard_idx:    u32   (4)
//! flags:        u8    (1)
//! view_info:    96 B  (only when shard_idx == 0)
//! timing_info:  24 B  (only when flags contain END_OF_FRAME)
//! payload_len:  u32   (4)
//! payload:      [u8]  (≤ MAX_PAYLOAD_SIZE)
//! ```

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::VideoError;

// ── Protocol constants ───────────────────────────────────────────

/// Maximum payload bytes one shard may carry.
pub const MAX_PAYLOAD_SIZE: usize = 1400;

/// Encoded size of the view-info block carried by a frame's first shard.
pub const VIEW_INFO_SIZE: usize = 96;

/// Encoded size of the timing block carried by the end-of-frame shard.
pub const TIMING_INFO_SIZE: usize = 24;

/// Fixed header bytes preceding the optional blocks.
pub const SHARD_HEADER_SIZE: usize = 14;

bitflags! {
    /// Framing flag bits carried by every shard.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ShardFlags: u8 {
        /// First shard of one `send_data` invocation's slice.
        const START_OF_SLICE = 1 << 0;
        /// Last shard of one `send_data` invocation's slice.
        const END_OF_SLICE = 1 << 1;
        /// Last shard of the whole frame; carries the timing block.
        const END_OF_FRAME = 1 << 2;
    }
}

// ── ViewInfo ─────────────────────────────────────────────────────

/// Per-eye render pose and field of view.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EyeView {
    /// Orientation quaternion (x, y, z, w).
    pub orientation: [f32; 4],
    /// Position in tracking space, metres.
    pub position: [f32; 3],
    /// Field of view half-angles (left, right, up, down), radians.
    pub fov: [f32; 4],
}

/// View metadata attached to the first shard of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewInfo {
    /// Target display timestamp on the headset clock, nanoseconds.
    pub display_time: u64,
    /// Left and right eye views.
    pub views: [EyeView; 2],
}

impl ViewInfo {
    fn put(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.display_time);
        for eye in &self.views {
            for v in eye.orientation {
                buf.put_f32_le(v);
            }
            for v in eye.position {
                buf.put_f32_le(v);
            }
            for v in eye.fov {
                buf.put_f32_le(v);
            }
        }
    }

    fn get(buf: &mut impl Buf) -> Self {
        let display_time = buf.get_u64_le();
        let mut views = [EyeView::default(); 2];
        for eye in &mut views {
            for v in &mut eye.orientation {
                *v = buf.get_f32_le();
            }
            for v in &mut eye.position {
                *v = buf.get_f32_le();
            }
            for v in &mut eye.fov {
                *v = buf.get_f32_le();
            }
        }
        Self { display_time, views }
    }
}

// ── TimingInfo ───────────────────────────────────────────────────

/// Frame-level timing telemetry, headset clock domain.
///
/// Unset stamps encode as 0 on the wire. When all are present they are
/// monotonically later within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingInfo {
    /// Stamped once per frame at `encode()` entry.
    pub encode_begin: Option<u64>,
    /// Stamped on the frame's first shard.
    pub send_begin: Option<u64>,
    /// Stamped on the shard carrying `END_OF_FRAME`.
    pub send_end: Option<u64>,
}

impl TimingInfo {
    fn put(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.encode_begin.unwrap_or(0));
        buf.put_u64_le(self.send_begin.unwrap_or(0));
        buf.put_u64_le(self.send_end.unwrap_or(0));
    }

    fn get(buf: &mut impl Buf) -> Self {
        let nonzero = |v: u64| (v != 0).then_some(v);
        Self {
            encode_begin: nonzero(buf.get_u64_le()),
            send_begin: nonzero(buf.get_u64_le()),
            send_end: nonzero(buf.get_u64_le()),
        }
    }
}

// ── VideoShard ───────────────────────────────────────────────────

/// One wire shard of an encoded video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoShard {
    pub stream_idx: u8,
    pub frame_idx: u64,
    /// Monotonic within a frame, reset to 0 at frame start.
    pub shard_idx: u32,
    pub flags: ShardFlags,
    /// Present on the frame's first shard only.
    pub view_info: Option<ViewInfo>,
    /// Present on the end-of-frame shard only.
    pub timing_info: Option<TimingInfo>,
    pub payload: Bytes,
}

impl VideoShard {
    /// Serialize to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            SHARD_HEADER_SIZE + VIEW_INFO_SIZE + TIMING_INFO_SIZE + 4 + self.payload.len(),
        );
        buf.put_u8(self.stream_idx);
        buf.put_u64_le(self.frame_idx);
        buf.put_u32_le(self.shard_idx);
        buf.put_u8(self.flags.bits());
        if self.shard_idx == 0 {
            self.view_info.unwrap_or_default().put(&mut buf);
        }
        if self.flags.contains(ShardFlags::END_OF_FRAME) {
            self.timing_info.unwrap_or_default().put(&mut buf);
        }
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Deserialize from wire bytes.
    ///
    /// The view-info block is expected exactly when `shard_idx == 0`,
    /// the timing block exactly when `END_OF_FRAME` is set.
    pub fn decode(data: &[u8]) -> Result<Self, VideoError> {
        let mut buf = data;
        let mut need = SHARD_HEADER_SIZE;
        if buf.remaining() < need {
            return Err(VideoError::ShardTooShort { len: data.len(), need });
        }
        let stream_idx = buf.get_u8();
        let frame_idx = buf.get_u64_le();
        let shard_idx = buf.get_u32_le();
        let flags = ShardFlags::from_bits_truncate(buf.get_u8());

        if shard_idx == 0 {
            need += VIEW_INFO_SIZE;
        }
        if flags.contains(ShardFlags::END_OF_FRAME) {
            need += TIMING_INFO_SIZE;
        }
        need += 4;
        if data.len() < need {
            return Err(VideoError::ShardTooShort { len: data.len(), need });
        }

        let view_info = (shard_idx == 0).then(|| ViewInfo::get(&mut buf));
        let timing_info = flags
            .contains(ShardFlags::END_OF_FRAME)
            .then(|| TimingInfo::get(&mut buf));

        let payload_len = buf.get_u32_le() as usize;
        if buf.remaining() != payload_len {
            return Err(VideoError::PayloadLengthMismatch {
                expected: payload_len,
                actual: buf.remaining(),
            });
        }
        let payload = Bytes::copy_from_slice(buf);

        Ok(Self {
            stream_idx,
            frame_idx,
            shard_idx,
            flags,
            view_info,
            timing_info,
            payload,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
