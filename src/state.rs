//! # Session State Management
//!
//! The mutable, concurrently-accessed control block shared between a
//! session's owning caller and its worker thread. This is the most
//! concurrency-sensitive part of the crate.
//!
//! ## Key Rust Concepts (IMPORTANT for beginners):
//!
//! ### AtomicBool / AtomicI64
//! - **Purpose**: Lock-free values safe to read and write from two threads
//! - **Why needed**: The caller's thread sets pause/reset/cancel flags while
//!   the worker thread reads them every loop iteration
//! - **Ordering::SeqCst**: Sequential consistency ensures a flag written on
//!   one thread is visible to the other on its next check
//!
//! ### Cooperative, not preemptive
//! Flags are observed once per loop iteration, so a command takes effect
//! within one chunk's latency. Staleness inside that window is by design.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: Session constructed, waiting for start
//! 2. **Running**: Worker loop actively reading and decoding
//! 3. **Paused**: Loop alive but skipping reads (can be resumed)
//! 4. **Stopping**: Loop has exited, terminal event being emitted
//! 5. **TimedOut** / **Errored**: Terminal condition latched before Stopping
//! 6. **Stopped**: Worker exited; the session object is inert

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};

/// Sentinel for "no timeout configured" in the sample budget.
pub const NO_TIMEOUT: i64 = -1;

/// Lifecycle phase of a streaming session.
///
/// ## Legal transitions:
/// Idle -> Running -> {Stopping | TimedOut | Errored} -> Stopped, plus
/// Running <-> Paused while no stop has been requested. Once a terminal
/// condition is latched it cannot be overwritten by a late pause toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Session created but not yet started
    Idle,
    /// Worker loop actively reading and decoding
    Running,
    /// Loop alive but skipping reads (can be resumed)
    Paused,
    /// Loop exited, exit handling in progress
    Stopping,
    /// Worker exited; no further I/O will occur
    Stopped,
    /// Listening timeout expired (terminal outcome, not a failure)
    TimedOut,
    /// A read or decode failure ended the run
    Errored,
}

impl Phase {
    /// Convert the phase to a string for logs and status surfaces.
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Paused => "paused",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
            Phase::TimedOut => "timed_out",
            Phase::Errored => "errored",
        }
    }

    /// Whether a terminal condition has been latched.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Stopping | Phase::Stopped | Phase::TimedOut | Phase::Errored)
    }
}

/// Counters describing one session's run.
///
/// ## Usage:
/// Snapshot via [`SessionState::stats_snapshot`]; useful for monitoring how
/// much audio a session processed and how its events were classified.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Chunks successfully read from the audio source
    pub chunks_read: u64,

    /// Samples decoded (drives the timeout budget)
    pub samples_decoded: u64,

    /// Partial-hypothesis events emitted
    pub partial_events: u64,

    /// Finalized-utterance events emitted
    pub result_events: u64,

    /// Engine resets observed by the loop
    pub resets: u64,
}

/// The control block owned by one StreamingSession for its lifetime.
///
/// ## Thread Safety:
/// - `phase` is written by the worker (and by `begin_run` on the caller's
///   thread, once) behind an RwLock
/// - Lifecycle flags are atomics, written by the caller and read by the
///   worker every iteration
/// - `remaining_samples` is written only by the worker but read by anyone
pub struct SessionState {
    phase: RwLock<Phase>,

    pause_requested: AtomicBool,
    reset_requested: AtomicBool,
    cancel_requested: AtomicBool,

    /// Set by cancel(): the exit path must not emit a final transcript
    suppress_final: AtomicBool,

    /// Initial sample budget (NO_TIMEOUT when no timeout is configured)
    timeout_samples: i64,

    /// Remaining sample budget, decremented as chunks are decoded
    remaining_samples: AtomicI64,

    sample_rate: u32,

    /// When the session object was created
    pub created_at: DateTime<Utc>,

    /// When the run started (if it has started)
    started_at: RwLock<Option<DateTime<Utc>>>,

    /// When the run ended (if it has ended)
    ended_at: RwLock<Option<DateTime<Utc>>>,

    stats: Mutex<SessionStats>,
}

impl SessionState {
    /// Create the control block for a new session.
    ///
    /// ## Timeout arithmetic:
    /// `remaining_samples = timeout_ms * sample_rate / 1000`; a `None`
    /// timeout yields the NO_TIMEOUT sentinel and the budget never counts
    /// down.
    ///
    /// ## Example:
    /// 1000ms at 16kHz: 1000 * 16000 / 1000 = 16,000 samples
    pub fn new(sample_rate: u32, timeout_ms: Option<u64>) -> Self {
        let timeout_samples = match timeout_ms {
            Some(ms) => (ms as i64 * sample_rate as i64) / 1000,
            None => NO_TIMEOUT,
        };

        Self {
            phase: RwLock::new(Phase::Idle),
            pause_requested: AtomicBool::new(false),
            reset_requested: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            suppress_final: AtomicBool::new(false),
            timeout_samples,
            remaining_samples: AtomicI64::new(timeout_samples),
            sample_rate,
            created_at: Utc::now(),
            started_at: RwLock::new(None),
            ended_at: RwLock::new(None),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    /// Get the current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.read().unwrap()
    }

    /// Transition Idle -> Running.
    ///
    /// ## State Transition:
    /// The only transition initiated from the caller's thread. Fails for any
    /// phase but Idle, which is how a second `start` (or a restart of a
    /// finished session object) is rejected.
    pub fn begin_run(&self) -> Result<(), String> {
        let mut phase = self.phase.write().unwrap();
        match *phase {
            Phase::Idle => {
                *phase = Phase::Running;
                *self.started_at.write().unwrap() = Some(Utc::now());
                Ok(())
            }
            other => Err(format!("Cannot start a session in phase {:?}", other)),
        }
    }

    /// Worker-side: record that the loop is honoring a pause request.
    ///
    /// Ignored once a terminal phase is latched, so a pause toggle racing a
    /// stop cannot resurrect a finished session.
    pub fn mark_paused(&self) {
        let mut phase = self.phase.write().unwrap();
        if *phase == Phase::Running {
            *phase = Phase::Paused;
        }
    }

    /// Worker-side: record that the loop resumed after a pause.
    pub fn mark_resumed(&self) {
        let mut phase = self.phase.write().unwrap();
        if *phase == Phase::Paused {
            *phase = Phase::Running;
        }
    }

    /// Worker-side: the loop exited and exit handling has begun.
    pub fn begin_stopping(&self) {
        let mut phase = self.phase.write().unwrap();
        if matches!(*phase, Phase::Running | Phase::Paused) {
            *phase = Phase::Stopping;
        }
    }

    /// Worker-side: the timeout budget was exhausted.
    pub fn mark_timed_out(&self) {
        let mut phase = self.phase.write().unwrap();
        if matches!(*phase, Phase::Running | Phase::Paused) {
            *phase = Phase::TimedOut;
        }
    }

    /// Worker-side: a read or decode failure ended the run.
    pub fn mark_errored(&self) {
        let mut phase = self.phase.write().unwrap();
        if matches!(*phase, Phase::Running | Phase::Paused) {
            *phase = Phase::Errored;
        }
    }

    /// Worker-side: exit handling finished, the session is inert.
    pub fn finish(&self) {
        *self.phase.write().unwrap() = Phase::Stopped;
        *self.ended_at.write().unwrap() = Some(Utc::now());
    }

    // --- Cooperative flags (caller writes, worker reads) ---

    /// Request or clear a pause. Observed at the next iteration boundary.
    pub fn request_pause(&self, paused: bool) {
        self.pause_requested.store(paused, Ordering::SeqCst);
    }

    pub fn pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    /// Request an engine reset. Observed at the next iteration boundary.
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::SeqCst);
    }

    /// Worker-side: consume a pending reset request, if any.
    pub fn take_reset_request(&self) -> bool {
        self.reset_requested.swap(false, Ordering::SeqCst)
    }

    /// Request cooperative cancellation of the loop.
    ///
    /// ## Parameters:
    /// - **suppress_final**: `true` for cancel semantics (no final
    ///   transcript), `false` for stop semantics (final transcript emitted)
    pub fn request_cancel(&self, suppress_final: bool) {
        if suppress_final {
            self.suppress_final.store(true, Ordering::SeqCst);
        }
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn final_suppressed(&self) -> bool {
        self.suppress_final.load(Ordering::SeqCst)
    }

    // --- Timeout budget ---

    /// Whether a timeout is configured for this session.
    pub fn has_timeout(&self) -> bool {
        self.timeout_samples != NO_TIMEOUT
    }

    /// Remaining sample budget (NO_TIMEOUT when no timeout is configured).
    pub fn remaining_samples(&self) -> i64 {
        self.remaining_samples.load(Ordering::SeqCst)
    }

    /// Worker-side: charge decoded samples against the budget.
    ///
    /// ## Returns:
    /// `true` when the budget is exhausted and the session must transition
    /// to TimedOut. Always `false` when no timeout is configured.
    pub fn consume_samples(&self, count: usize) -> bool {
        if !self.has_timeout() {
            return false;
        }
        let previous = self.remaining_samples.fetch_sub(count as i64, Ordering::SeqCst);
        previous - (count as i64) <= 0
    }

    /// Sample rate this session was configured with.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    // --- Timestamps & stats ---

    /// Wall-clock run duration in seconds (start to end, or to now).
    pub fn run_duration_seconds(&self) -> f64 {
        match *self.started_at.read().unwrap() {
            Some(started) => {
                let end = self.ended_at.read().unwrap().unwrap_or_else(Utc::now);
                end.signed_duration_since(started).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        }
    }

    pub fn record_chunk(&self, samples: usize) {
        let mut stats = self.stats.lock().unwrap();
        stats.chunks_read += 1;
        stats.samples_decoded += samples as u64;
    }

    pub fn record_partial(&self) {
        self.stats.lock().unwrap().partial_events += 1;
    }

    pub fn record_result(&self) {
        self.stats.lock().unwrap().result_events += 1;
    }

    pub fn record_reset(&self) {
        self.stats.lock().unwrap().resets += 1;
    }

    /// Get a snapshot of the run counters.
    pub fn stats_snapshot(&self) -> SessionStats {
        self.stats.lock().unwrap().clone()
    }
}
