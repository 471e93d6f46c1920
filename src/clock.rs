//! Monotonic timestamps and local→headset clock conversion.
//!
//! Clock synchronization itself happens in the session layer; this
//! module only carries the resulting offset and applies it.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds on the process-local monotonic clock.
///
/// Anchored at first use; only differences and offset-adjusted values
/// are meaningful.
pub fn monotonic_ns() -> u64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

// ── ClockOffset ──────────────────────────────────────────────────

/// Offset between the server's monotonic clock and the headset's,
/// as measured by the session layer. Fetched once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockOffset {
    /// headset_ns − server_ns.
    pub offset_ns: i64,
}

impl ClockOffset {
    pub fn new(offset_ns: i64) -> Self {
        Self { offset_ns }
    }

    /// Convert a local monotonic timestamp to the headset clock domain.
    pub fn to_headset(&self, local_ns: u64) -> u64 {
        (local_ns as i64).saturating_add(self.offset_ns) as u64
    }
}
