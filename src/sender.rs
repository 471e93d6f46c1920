//! Shared background transmission worker.
//!
//! One [`FrameSender`] thread is shared by every live encoder stream:
//! encode completion enqueues a [`SendJob`], the worker drains the
//! queue sequentially and pushes shards out through the owning sink.
//! Jobs are sent strictly in FIFO enqueue order across all streams
//! (one physical uplink).
//!
//! The instance is a lazily-created singleton: [`FrameSender::acquire`]
//! hands out `Arc` references and the thread is joined when the last
//! reference drops.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::sink::ShardSink;

/// Bounded wait used by every blocking loop, so cooperative stop is
/// observed even without queue activity.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ── SendJob ──────────────────────────────────────────────────────

/// One pending frame transmission.
///
/// `payload` is a refcounted view of backend-owned storage; the sink
/// reference keeps the owning encoder's send state alive until the
/// job has run.
pub struct SendJob {
    pub sink: Arc<ShardSink>,
    pub payload: Bytes,
}

// ── FrameSender ──────────────────────────────────────────────────

struct Queue {
    jobs: VecDeque<SendJob>,
    /// True while the worker is mid-send on a dequeued job, so
    /// `wait_idle` covers the full drain, not just the deque.
    in_flight: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    cv: Condvar,
    stop: AtomicBool,
}

/// The shared transmission worker. See module docs.
pub struct FrameSender {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

static INSTANCE: Mutex<Weak<FrameSender>> = Mutex::new(Weak::new());

impl FrameSender {
    /// Return the single shared worker, creating it if no live
    /// reference exists and reusing it otherwise.
    pub fn acquire() -> Arc<FrameSender> {
        let mut slot = INSTANCE.lock().unwrap();
        if let Some(live) = slot.upgrade() {
            return live;
        }
        let fresh = Arc::new(FrameSender::spawn());
        *slot = Arc::downgrade(&fresh);
        fresh
    }

    fn spawn() -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                in_flight: false,
            }),
            cv: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("frame-sender".into())
            .spawn(move || Self::run(worker))
            .expect("failed to spawn transmission worker thread");
        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// Enqueue a job without blocking and signal the worker.
    pub fn push(&self, job: SendJob) {
        let mut q = self.shared.queue.lock().unwrap();
        q.jobs.push_back(job);
        self.shared.cv.notify_all();
    }

    /// Block until the queue is empty and no job is mid-send.
    pub fn wait_idle(&self) {
        let mut q = self.shared.queue.lock().unwrap();
        while !q.jobs.is_empty() || q.in_flight {
            q = self.shared.cv.wait_timeout(q, POLL_INTERVAL).unwrap().0;
        }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let job = {
                let mut q = shared.queue.lock().unwrap();
                loop {
                    if shared.stop.load(Ordering::Acquire) {
                        // Best-effort shutdown: unsent jobs are dropped.
                        if !q.jobs.is_empty() {
                            debug!(dropped = q.jobs.len(), "discarding queued jobs at shutdown");
                            q.jobs.clear();
                        }
                        shared.cv.notify_all();
                        return;
                    }
                    if let Some(job) = q.jobs.pop_front() {
                        q.in_flight = true;
                        break job;
                    }
                    q = shared.cv.wait_timeout(q, POLL_INTERVAL).unwrap().0;
                }
            };

            // Send outside the lock; a slow link must not block push().
            if !job.payload.is_empty() {
                job.sink.send_data(&job.payload, true);
            }

            let mut q = shared.queue.lock().unwrap();
            q.in_flight = false;
            if q.jobs.is_empty() {
                shared.cv.notify_all();
            }
        }
    }
}

impl Drop for FrameSender {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.cv.notify_all();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("transmission worker panicked during shutdown");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
