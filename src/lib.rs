//! # headcast-video
//!
//! Real-time video delivery pipeline for the Headcast HMD streaming
//! server: turns a rendered frame into a sequence of bounded-size
//! network shards with minimal added latency.
//!
//! ## Architecture
//!
//! ```text
//! caller thread                         frame-sender thread
//! ┌──────────────────────────┐          ┌─────────────────────────┐
//! │ VideoEncoder::encode     │          │ FrameSender loop        │
//! │   IDR throttle           │  push    │   pop oldest SendJob    │
//! │   EncoderBackend::encode ├────────► │   ShardSink::send_data  │
//! │   (wait_idle backpressure│          │     fragment → shards   │
//! │    before each frame)    │          │     SessionHandle::send │
//! └──────────────────────────┘          └─────────────────────────┘
//! ```
//!
//! One `FrameSender` thread is shared by every active stream; jobs are
//! FIFO across streams (one physical uplink). Concrete codec backends
//! and the network session are consumed as trait objects.
//!
//! ## Modules
//!
//! | Module    | Purpose                                             |
//! |-----------|-----------------------------------------------------|
//! | `shard`   | Wire shard framing: flags, view/timing blocks       |
//! | `sink`    | Shard fragmenter and per-frame send state           |
//! | `sender`  | Shared background transmission worker               |
//! | `encoder` | Orchestrator: lifecycle, IDR throttle, frame drive  |
//! | `backend` | Encoder backend trait and feature-gated variants    |
//! | `session` | Seam to the network session layer                   |
//! | `clock`   | Monotonic timestamps, local→headset conversion      |
//! | `error`   | `VideoError` — typed, `thiserror`-based hierarchy   |

pub mod backend;
pub mod clock;
pub mod encoder;
pub mod error;
pub mod sender;
pub mod session;
pub mod shard;
pub mod sink;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use backend::{Codec, EncoderBackend, EncoderSettings};
pub use clock::{ClockOffset, monotonic_ns};
pub use encoder::{DUMP_VIDEO_ENV, IDR_THROTTLE, VideoEncoder};
pub use error::VideoError;
pub use sender::{FrameSender, SendJob};
pub use session::SessionHandle;
pub use shard::{
    EyeView, MAX_PAYLOAD_SIZE, SHARD_HEADER_SIZE, ShardFlags, TIMING_INFO_SIZE, TimingInfo,
    VIEW_INFO_SIZE, VideoShard, ViewInfo,
};
pub use sink::ShardSink;
