//! Progress reporting and cancellation plumbing
//!
//! Workers bump a shared atomic tick counter; a watcher thread polls it
//! and reports `offset + done/total` through the user callback. A
//! shared monotone guard ensures the delivered sequence is strictly
//! increasing even across the phases of a multi-stage pipeline (build,
//! mesh, release), so a full run starts at `0.0` and ends at the number
//! of phases. Cancellation silences the watcher without a terminal
//! emission.
//!
//! The tick counter lives on the engine side and is only ever added to;
//! a misbehaving callback (including one that panics) cannot corrupt
//! the accounting.
//!
//! Author: Moroya Sakamoto

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// User progress callback; receives strictly increasing values
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Watcher poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tick budget for a fully explored subtree whose root sits at `level`
/// (the recurrence `t ← 8t + 1`, i.e. `Σ_{i=0..level} 8^i`).
///
/// One tick per leaf evaluation, one per parent collection, and a
/// homogeneous interior cell accounts for its entire pruned subtree at
/// once, so a completed build emits exactly this many ticks for its
/// root level regardless of tree shape.
pub fn subtree_ticks(level: u32) -> u64 {
    let mut t = 0u64;
    for _ in 0..=level {
        t = t * 8 + 1;
    }
    t
}

/// Shared monotone guard: wraps the callback so only strictly
/// increasing values are ever delivered. One handler spans all phases
/// of a pipeline.
#[derive(Clone)]
pub struct ProgressHandler {
    callback: ProgressCallback,
    last: Arc<Mutex<f32>>,
}

impl ProgressHandler {
    /// Wrap a user callback
    pub fn new(callback: ProgressCallback) -> Self {
        ProgressHandler {
            callback,
            last: Arc::new(Mutex::new(f32::NEG_INFINITY)),
        }
    }

    /// Deliver `value` if it advances the sequence
    fn emit(&self, value: f32) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if value > *last {
            *last = value;
            // The callback must not fail observably; discard panics.
            let cb = &self.callback;
            let _ = catch_unwind(AssertUnwindSafe(|| cb(value)));
        }
    }

    /// Start a watcher for one phase reporting in
    /// `[offset, offset + 1]`, reading the given tick counter.
    pub fn watch(
        &self,
        ticks: Arc<AtomicU64>,
        total: u64,
        offset: f32,
        cancel: &Arc<AtomicBool>,
    ) -> ProgressWatcher {
        let stop = Arc::new(AtomicBool::new(false));
        let handler = self.clone();
        let cancel = cancel.clone();
        let total = total.max(1);

        let thread_stop = stop.clone();
        let thread_ticks = ticks.clone();
        let handle = std::thread::spawn(move || {
            handler.emit(offset);
            loop {
                std::thread::sleep(POLL_INTERVAL);
                if cancel.load(Ordering::Acquire) {
                    // Cancelled: exit without further updates
                    return;
                }
                let stopping = thread_stop.load(Ordering::Acquire);
                let done = thread_ticks.load(Ordering::Relaxed);
                let frac = (done as f64 / total as f64).min(1.0) as f32;
                handler.emit(offset + frac);
                if stopping {
                    break;
                }
            }
            // Phase terminal
            handler.emit(offset + 1.0);
        });

        ProgressWatcher {
            stop,
            handle: Some(handle),
        }
    }
}

/// Handle to one phase's watcher thread
pub struct ProgressWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressWatcher {
    /// Stop the watcher and wait for its final emission
    pub fn finish(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
