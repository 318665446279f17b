//! # Streaming Session
//!
//! The core of the crate: drives one recognition pass from start to a
//! terminal phase, exactly once per session object. The session owns a
//! worker thread running the capture-or-read -> decode -> classify loop,
//! consults its [`SessionState`] control block every iteration, and posts
//! [`Event`]s through a [`ListenerDispatcher`].
//!
//! ## Control Flow:
//! ```text
//! caller thread: start / set_pause / reset / stop / cancel
//!                      |            (atomic flags)
//!                      v
//! worker thread: loop { flags? -> read chunk -> decode -> classify -> post }
//!                      |
//!                      v
//! delivery thread: listener callbacks, in posting order
//! ```
//!
//! ## Terminal Guarantee:
//! Every run emits exactly one closing signal - `Final`, `Timeout`, or
//! `Error` - and it is always the last event posted for the session, so a
//! listener can always determine that the run has ended. The one exception
//! is a cancelled run, which suppresses its final transcript by design.

use crate::audio::{AudioSource, Chunk, ReadOutcome};
use crate::config::RecognizerConfig;
use crate::dispatcher::{Event, ListenerDispatcher, RecognitionListener};
use crate::engine::{DecodeVerdict, RecognitionEngine};
use crate::error::{SessionError, SessionResult};
use crate::state::{Phase, SessionState, SessionStats};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How a run ended, decided inside the loop and consumed by exit handling.
enum RunOutcome {
    /// End-of-stream or cooperative cancellation: flush the engine and emit
    /// `Final` (unless the final was suppressed by `cancel`)
    Completed,
    /// Sample budget exhausted: emit `Timeout`, no final transcript
    TimedOut,
    /// Read or decode failure: the `Error` event was already posted
    Errored,
}

/// Everything the worker thread takes ownership of at start.
struct RunParts {
    engine: Box<dyn RecognitionEngine>,
    source: Box<dyn AudioSource>,
}

/// Streaming recognition session.
///
/// ## Thread Safety:
/// All methods take `&self`; the session can be shared (e.g. in an `Arc`)
/// between the thread that starts it and the thread that pauses or stops it.
/// Lifecycle commands are cooperative: they set flags the worker observes at
/// its next iteration boundary, bounded by one chunk's decode latency.
///
/// ## One Run Per Object:
/// `start` succeeds at most once. After the run reaches `Stopped` the object
/// is inert; construct a new session for a new pass.
pub struct StreamingSession {
    session_id: String,
    state: Arc<SessionState>,
    dispatcher: ListenerDispatcher,

    /// Samples per chunk (sample_rate * chunk_duration / 1000)
    chunk_capacity: usize,

    /// Sleep between flag re-checks while paused
    pause_poll: Duration,

    /// Engine + source, handed to the worker thread by `start`
    parts: Mutex<Option<RunParts>>,

    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("session_id", &self.session_id)
            .field("chunk_capacity", &self.chunk_capacity)
            .field("pause_poll", &self.pause_poll)
            .finish_non_exhaustive()
    }
}

impl StreamingSession {
    /// Create a session with its own private dispatcher.
    ///
    /// ## Construction Contract:
    /// Validates the configuration and converts the optional timeout into a
    /// sample budget (`timeout_ms * sample_rate / 1000`). An invalid
    /// configuration is a `Creation` error: no run will ever be possible for
    /// this session object.
    pub fn new(
        engine: Box<dyn RecognitionEngine>,
        source: Box<dyn AudioSource>,
        config: &RecognizerConfig,
    ) -> SessionResult<Self> {
        Self::new_with_dispatcher(engine, source, config, ListenerDispatcher::new())
    }

    /// Create a session that delivers through a shared dispatcher.
    ///
    /// Multiple sessions can share one delivery thread this way; listeners
    /// registered through `start` remain scoped to their own session's
    /// events.
    pub fn new_with_dispatcher(
        engine: Box<dyn RecognitionEngine>,
        source: Box<dyn AudioSource>,
        config: &RecognizerConfig,
        dispatcher: ListenerDispatcher,
    ) -> SessionResult<Self> {
        config
            .validate()
            .map_err(|e| SessionError::Creation(e.to_string()))?;

        let session_id = Uuid::new_v4().to_string();
        let state = Arc::new(SessionState::new(
            config.audio.sample_rate,
            config.session.timeout_ms,
        ));

        Ok(Self {
            session_id,
            state,
            dispatcher,
            chunk_capacity: config.chunk_samples(),
            pause_poll: Duration::from_millis(config.session.pause_poll_ms),
            parts: Mutex::new(Some(RunParts { engine, source })),
            worker: Mutex::new(None),
        })
    }

    /// Start recognition.
    ///
    /// ## Returns:
    /// `true` if the run was actually started. `false` if a run is already
    /// active or has already completed for this session object - in that
    /// case nothing happens (no second worker thread, no duplicate event
    /// stream).
    pub fn start(&self, listener: Arc<dyn RecognitionListener>) -> bool {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return false;
        }

        let parts = match self.parts.lock().unwrap().take() {
            Some(parts) => parts,
            None => return false,  // The single run was already consumed
        };

        if let Err(e) = self.state.begin_run() {
            warn!("Session {} not started: {}", self.session_id, e);
            *self.parts.lock().unwrap() = Some(parts);
            return false;
        }

        // Register before spawning so the very first event cannot be missed
        self.dispatcher
            .add_session_listener(&self.session_id, listener);

        let session_id = self.session_id.clone();
        let state = Arc::clone(&self.state);
        let dispatcher = self.dispatcher.clone();
        let chunk_capacity = self.chunk_capacity;
        let pause_poll = self.pause_poll;

        let handle = thread::Builder::new()
            .name(format!("recognizer-{}", &self.session_id[..8]))
            .spawn(move || {
                run_session(session_id, state, dispatcher, parts, chunk_capacity, pause_poll);
            })
            .expect("failed to spawn recognizer thread");

        *worker = Some(handle);
        true
    }

    /// Stop recognition, emitting the final transcript.
    ///
    /// Blocks until the worker thread has fully exited AND the terminal
    /// event has been delivered to listeners. Returns `false` if no run was
    /// ever started.
    pub fn stop(&self) -> bool {
        self.shutdown(false)
    }

    /// Cancel recognition without emitting a final transcript.
    ///
    /// Partial events already posted are still delivered (dropping them
    /// would break per-session ordering); only the final transcript is
    /// suppressed. Join semantics are identical to [`StreamingSession::stop`].
    pub fn cancel(&self) -> bool {
        self.shutdown(true)
    }

    fn shutdown(&self, suppress_final: bool) -> bool {
        let handle = {
            let mut worker = self.worker.lock().unwrap();
            match worker.take() {
                Some(handle) => {
                    self.state.request_cancel(suppress_final);
                    handle
                }
                None => return false,
            }
        };

        // Join outside the lock, then flush so listeners have seen the
        // terminal event before control returns to the caller.
        let _ = handle.join();
        self.dispatcher.flush();
        true
    }

    /// Request or clear a pause.
    ///
    /// While paused the loop neither reads nor decodes, emits no events, and
    /// the timeout budget does not decrease. Observed at the next iteration
    /// boundary - not instantaneous.
    pub fn set_pause(&self, paused: bool) {
        self.state.request_pause(paused);
    }

    /// Request an engine reset: accumulated partial/final state is cleared
    /// without terminating the session. No event is emitted for the reset
    /// itself.
    pub fn reset(&self) {
        self.state.request_reset();
    }

    /// This session's unique identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Remaining sample budget (`NO_TIMEOUT` when no timeout is configured).
    pub fn remaining_samples(&self) -> i64 {
        self.state.remaining_samples()
    }

    /// Snapshot of the run counters.
    pub fn stats(&self) -> SessionStats {
        self.state.stats_snapshot()
    }

    /// Handle to this session's dispatcher, for registering additional
    /// listeners or removing them.
    pub fn dispatcher(&self) -> ListenerDispatcher {
        self.dispatcher.clone()
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        // A session dropped while running is cancelled: join the worker so
        // no detached thread outlives the object, emit no final transcript.
        self.cancel();
    }
}

/// Worker thread body: drive the loop, then perform exit handling exactly
/// once.
fn run_session(
    session_id: String,
    state: Arc<SessionState>,
    dispatcher: ListenerDispatcher,
    mut parts: RunParts,
    chunk_capacity: usize,
    pause_poll: Duration,
) {
    info!(
        "Session {} started ({} samples/chunk, budget {})",
        session_id,
        chunk_capacity,
        state.remaining_samples()
    );

    let outcome = drive_loop(
        &session_id,
        &state,
        &dispatcher,
        parts.engine.as_mut(),
        parts.source.as_mut(),
        chunk_capacity,
        pause_poll,
    );

    parts.source.stop();

    // Exit handling: exactly one closing signal per terminal path.
    state.begin_stopping();
    match outcome {
        RunOutcome::Errored => {
            // The Error event was posted where the failure was observed
        }
        RunOutcome::TimedOut => {
            dispatcher.post(&session_id, Event::Timeout);
        }
        RunOutcome::Completed => {
            if state.final_suppressed() {
                debug!("Session {} cancelled, final transcript suppressed", session_id);
            } else {
                let text = parts.engine.final_text();
                dispatcher.post(&session_id, Event::Final(text));
            }
        }
    }

    state.finish();

    let stats = state.stats_snapshot();
    info!(
        "Session {} stopped: {} chunks, {} samples, {:.1}s",
        session_id,
        stats.chunks_read,
        stats.samples_decoded,
        state.run_duration_seconds()
    );
}

/// The capture-or-read -> decode -> classify loop.
///
/// Repeats until a terminal condition; each iteration observes the
/// cooperative flags first, so pause/reset/cancel take effect within one
/// chunk's latency.
fn drive_loop(
    session_id: &str,
    state: &SessionState,
    dispatcher: &ListenerDispatcher,
    engine: &mut dyn RecognitionEngine,
    source: &mut dyn AudioSource,
    chunk_capacity: usize,
    pause_poll: Duration,
) -> RunOutcome {
    if let Err(e) = source.start() {
        error!("Session {} source failed to start: {}", session_id, e);
        state.mark_errored();
        dispatcher.post(session_id, Event::Error(e));
        return RunOutcome::Errored;
    }

    let mut chunk = Chunk::new(chunk_capacity);

    loop {
        if state.cancel_requested() {
            return RunOutcome::Completed;
        }

        if state.take_reset_request() {
            engine.reset();
            state.record_reset();
            debug!("Session {} engine reset", session_id);
            continue;
        }

        if state.pause_requested() {
            state.mark_paused();
            thread::sleep(pause_poll);
            continue;
        }
        state.mark_resumed();

        match source.read(&mut chunk) {
            Err(e) => {
                error!("Session {} read failed: {}", session_id, e);
                state.mark_errored();
                dispatcher.post(session_id, Event::Error(e));
                return RunOutcome::Errored;
            }
            Ok(ReadOutcome::EndOfStream) => {
                debug!("Session {} reached end of stream", session_id);
                return RunOutcome::Completed;
            }
            Ok(ReadOutcome::Filled(0)) => continue,  // No data this call
            Ok(ReadOutcome::Filled(filled)) => {
                let verdict = match engine.accept_waveform(chunk.samples()) {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        error!("Session {} decode failed: {}", session_id, e);
                        state.mark_errored();
                        dispatcher.post(session_id, Event::Error(e));
                        return RunOutcome::Errored;
                    }
                };
                state.record_chunk(filled);

                // Charge the budget before emitting: a chunk that exhausts
                // it has its decode result discarded in favor of Timeout.
                if state.consume_samples(filled) {
                    state.mark_timed_out();
                    return RunOutcome::TimedOut;
                }

                match verdict {
                    DecodeVerdict::Boundary => {
                        state.record_result();
                        dispatcher.post(session_id, Event::Result(engine.result_text()));
                    }
                    DecodeVerdict::Continuing => {
                        state.record_partial();
                        dispatcher.post(session_id, Event::Partial(engine.partial_text()));
                    }
                }
            }
        }

        if state.cancel_requested() {
            return RunOutcome::Completed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ReplaySource;
    use crate::config::RecognizerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    // --- Fixtures ---

    /// Install a test subscriber so `RUST_LOG=debug cargo test` shows the
    /// session lifecycle. Safe to call from every test; only the first
    /// install wins.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }

    fn test_config(timeout_ms: Option<u64>) -> RecognizerConfig {
        let mut config = RecognizerConfig::default();
        config.session.timeout_ms = timeout_ms;
        config.session.pause_poll_ms = 2;
        config
    }

    /// Listener that records every event in arrival order.
    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<Event>>,
    }

    impl EventLog {
        fn snapshot(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn len(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    impl RecognitionListener for EventLog {
        fn on_partial_result(&self, hypothesis: &str) {
            self.events.lock().unwrap().push(Event::Partial(hypothesis.to_string()));
        }
        fn on_result(&self, hypothesis: &str) {
            self.events.lock().unwrap().push(Event::Result(hypothesis.to_string()));
        }
        fn on_final_result(&self, hypothesis: &str) {
            self.events.lock().unwrap().push(Event::Final(hypothesis.to_string()));
        }
        fn on_error(&self, error: &SessionError) {
            self.events.lock().unwrap().push(Event::Error(error.clone()));
        }
        fn on_timeout(&self) {
            self.events.lock().unwrap().push(Event::Timeout);
        }
    }

    /// Engine scripted to report utterance boundaries at fixed sample
    /// offsets. Partial text embeds the running sample count so tests can
    /// observe resets.
    struct ScriptedEngine {
        samples_seen: u64,
        boundaries: Vec<u64>,
        utterances: u32,
    }

    impl ScriptedEngine {
        fn new(boundaries: Vec<u64>) -> Self {
            Self {
                samples_seen: 0,
                boundaries,
                utterances: 0,
            }
        }
    }

    impl RecognitionEngine for ScriptedEngine {
        fn accept_waveform(&mut self, samples: &[i16]) -> SessionResult<DecodeVerdict> {
            self.samples_seen += samples.len() as u64;
            if let Some(&next) = self.boundaries.first() {
                if self.samples_seen >= next {
                    self.boundaries.remove(0);
                    self.utterances += 1;
                    return Ok(DecodeVerdict::Boundary);
                }
            }
            Ok(DecodeVerdict::Continuing)
        }

        fn partial_text(&mut self) -> String {
            serde_json::json!({ "partial": format!("{} samples", self.samples_seen) }).to_string()
        }

        fn result_text(&mut self) -> String {
            serde_json::json!({ "text": format!("utterance {}", self.utterances) }).to_string()
        }

        fn final_text(&mut self) -> String {
            serde_json::json!({ "text": "final transcript" }).to_string()
        }

        fn reset(&mut self) {
            self.samples_seen = 0;
        }
    }

    /// Engine whose decode always fails.
    struct BrokenEngine;

    impl RecognitionEngine for BrokenEngine {
        fn accept_waveform(&mut self, _samples: &[i16]) -> SessionResult<DecodeVerdict> {
            Err(SessionError::Decode("model rejected chunk".to_string()))
        }
        fn partial_text(&mut self) -> String {
            String::new()
        }
        fn result_text(&mut self) -> String {
            String::new()
        }
        fn final_text(&mut self) -> String {
            String::new()
        }
        fn reset(&mut self) {}
    }

    /// Source that only produces a chunk when the test grants a permit,
    /// letting tests interleave lifecycle commands deterministically.
    struct GatedSource {
        permits: Arc<AtomicUsize>,
    }

    impl AudioSource for GatedSource {
        fn read(&mut self, chunk: &mut Chunk) -> SessionResult<ReadOutcome> {
            let granted = self
                .permits
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| p.checked_sub(1))
                .is_ok();
            if granted {
                let capacity = chunk.capacity();
                chunk.storage_mut().fill(0);
                chunk.set_filled(capacity);
                Ok(ReadOutcome::Filled(capacity))
            } else {
                thread::sleep(Duration::from_millis(2));
                chunk.clear();
                Ok(ReadOutcome::Filled(0))
            }
        }
    }

    /// Source whose first read fails.
    struct FailingSource;

    impl AudioSource for FailingSource {
        fn read(&mut self, _chunk: &mut Chunk) -> SessionResult<ReadOutcome> {
            Err(SessionError::Read("simulated device failure".to_string()))
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn silence(samples: usize) -> Vec<i16> {
        vec![0; samples]
    }

    // --- Scenarios ---

    /// Replay a 3-second buffer with no timeout through an engine that
    /// detects one utterance boundary at sample 16000: the listener receives
    /// exactly one Result, then one Final, in that order.
    #[test]
    fn test_replay_emits_one_result_then_final() {
        init_tracing();
        let engine = Box::new(ScriptedEngine::new(vec![16000]));
        let source = Box::new(ReplaySource::from_samples(&silence(48000)));
        let session =
            StreamingSession::new(engine, source, &test_config(None)).unwrap();
        let log = Arc::new(EventLog::default());

        assert!(session.start(log.clone()));
        assert!(wait_for(|| session.phase() == Phase::Stopped));
        session.dispatcher().flush();

        let events = log.snapshot();
        // 15 chunks of 3200 samples: 4 partials, the boundary at chunk 5,
        // 10 more partials, then the flushed final transcript.
        assert_eq!(events.len(), 16);

        let results: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::Result(_)))
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(events[4], Event::Result(r#"{"text":"utterance 1"}"#.to_string()));

        // The terminal event is last, and there is exactly one
        assert!(matches!(events.last().unwrap(), Event::Final(_)));
        let finals = events.iter().filter(|e| matches!(e, Event::Final(_))).count();
        assert_eq!(finals, 1);

        // Stop after a natural end still reports that a run existed
        assert!(session.stop());
        assert!(!session.stop());
    }

    /// Replay the same buffer with a 500ms timeout (8000 samples): events
    /// stop at the budget, the chunk that exhausts it is discarded, exactly
    /// one Timeout arrives, and no Final.
    #[test]
    fn test_timeout_discards_final_chunk_and_emits_timeout() {
        init_tracing();
        let engine = Box::new(ScriptedEngine::new(vec![16000]));
        let source = Box::new(ReplaySource::from_samples(&silence(48000)));
        let session =
            StreamingSession::new(engine, source, &test_config(Some(500))).unwrap();
        let log = Arc::new(EventLog::default());

        assert_eq!(session.remaining_samples(), 8000);
        assert!(session.start(log.clone()));
        assert!(wait_for(|| session.phase() == Phase::Stopped));
        session.dispatcher().flush();

        let events = log.snapshot();
        // Chunks of 3200: two partials (8000 -> 4800 -> 1600), then the
        // third chunk overdraws the budget and its decode result is
        // discarded in favor of Timeout.
        assert_eq!(
            events,
            vec![
                Event::Partial(r#"{"partial":"3200 samples"}"#.to_string()),
                Event::Partial(r#"{"partial":"6400 samples"}"#.to_string()),
                Event::Timeout,
            ]
        );
        assert!(session.remaining_samples() <= 0);
    }

    #[test]
    fn test_start_is_rejected_while_running_and_after() {
        let permits = Arc::new(AtomicUsize::new(0));
        let engine = Box::new(ScriptedEngine::new(vec![]));
        let source = Box::new(GatedSource {
            permits: permits.clone(),
        });
        let session = StreamingSession::new(engine, source, &test_config(None)).unwrap();
        let log = Arc::new(EventLog::default());

        assert!(session.start(log.clone()));
        // Second start while the run is active: rejected, no side effect
        assert!(!session.start(Arc::new(EventLog::default())));

        assert!(session.cancel());
        assert_eq!(session.phase(), Phase::Stopped);
        // One run per session object: a finished session cannot restart
        assert!(!session.start(Arc::new(EventLog::default())));
    }

    #[test]
    fn test_pause_suppresses_events_and_budget() {
        let permits = Arc::new(AtomicUsize::new(1));
        let engine = Box::new(ScriptedEngine::new(vec![]));
        let source = Box::new(GatedSource {
            permits: permits.clone(),
        });
        // 1000ms at 16kHz = 16000 samples of budget
        let session =
            StreamingSession::new(engine, source, &test_config(Some(1000))).unwrap();
        let log = Arc::new(EventLog::default());

        assert!(session.start(log.clone()));
        assert!(wait_for(|| log.len() == 1));
        assert_eq!(session.remaining_samples(), 12800);  // 16000 - 3200

        session.set_pause(true);
        assert!(wait_for(|| session.phase() == Phase::Paused));

        // Audio is available, but a paused session must not consume it
        permits.store(3, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(log.len(), 1);
        assert_eq!(session.remaining_samples(), 12800);

        session.set_pause(false);
        assert!(wait_for(|| log.len() == 4));
        assert!(wait_for(|| session.phase() == Phase::Running));
        assert_eq!(session.remaining_samples(), 12800 - 3 * 3200);

        assert!(session.cancel());
    }

    /// A partial emitted right after reset must not contain audio
    /// accumulated before the reset.
    #[test]
    fn test_reset_clears_accumulated_state() {
        let permits = Arc::new(AtomicUsize::new(2));
        let engine = Box::new(ScriptedEngine::new(vec![]));
        let source = Box::new(GatedSource {
            permits: permits.clone(),
        });
        let session = StreamingSession::new(engine, source, &test_config(None)).unwrap();
        let log = Arc::new(EventLog::default());

        assert!(session.start(log.clone()));
        assert!(wait_for(|| log.len() == 2));
        session.dispatcher().flush();
        assert_eq!(
            log.snapshot()[1],
            Event::Partial(r#"{"partial":"6400 samples"}"#.to_string())
        );

        session.reset();
        // Give the loop a moment to observe the flag before more audio
        thread::sleep(Duration::from_millis(20));
        permits.store(1, Ordering::SeqCst);
        assert!(wait_for(|| log.len() == 3));

        // The count starts over: 3200, not 9600
        assert_eq!(
            log.snapshot()[2],
            Event::Partial(r#"{"partial":"3200 samples"}"#.to_string())
        );
        assert_eq!(session.stats().resets, 1);

        assert!(session.cancel());
    }

    #[test]
    fn test_cancel_never_emits_final() {
        let engine = Box::new(ScriptedEngine::new(vec![]));
        let source = Box::new(GatedSource {
            permits: Arc::new(AtomicUsize::new(0)),
        });
        let session = StreamingSession::new(engine, source, &test_config(None)).unwrap();
        let log = Arc::new(EventLog::default());

        assert!(session.start(log.clone()));
        assert!(session.cancel());
        assert_eq!(session.phase(), Phase::Stopped);

        // No audio was decoded and the final was suppressed: nothing at all
        assert_eq!(log.snapshot(), vec![]);
    }

    /// `stop` must block until the Final event has been DELIVERED - the
    /// assertion runs immediately after it returns, with no extra waiting.
    #[test]
    fn test_stop_delivers_final_before_returning() {
        let engine = Box::new(ScriptedEngine::new(vec![]));
        let source = Box::new(GatedSource {
            permits: Arc::new(AtomicUsize::new(0)),
        });
        let session = StreamingSession::new(engine, source, &test_config(None)).unwrap();
        let log = Arc::new(EventLog::default());

        assert!(session.start(log.clone()));
        assert!(session.stop());

        let events = log.snapshot();
        assert_eq!(
            events,
            vec![Event::Final(r#"{"text":"final transcript"}"#.to_string())]
        );
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let engine = Box::new(ScriptedEngine::new(vec![]));
        let source = Box::new(ReplaySource::from_samples(&silence(3200)));
        let session = StreamingSession::new(engine, source, &test_config(None)).unwrap();

        assert!(!session.stop());
        assert!(!session.cancel());
        assert_eq!(session.phase(), Phase::Idle);

        // The untouched session can still run normally afterwards
        let log = Arc::new(EventLog::default());
        assert!(session.start(log.clone()));
        assert!(session.stop());
        assert!(matches!(log.snapshot().last().unwrap(), Event::Final(_)));
    }

    #[test]
    fn test_read_failure_emits_single_error() {
        let engine = Box::new(ScriptedEngine::new(vec![]));
        let source = Box::new(FailingSource);
        let session = StreamingSession::new(engine, source, &test_config(None)).unwrap();
        let log = Arc::new(EventLog::default());

        assert!(session.start(log.clone()));
        assert!(wait_for(|| session.phase() == Phase::Stopped));
        session.dispatcher().flush();

        // Exactly one closing signal, and it is the Error - no Final after
        assert_eq!(
            log.snapshot(),
            vec![Event::Error(SessionError::Read(
                "simulated device failure".to_string()
            ))]
        );
    }

    #[test]
    fn test_decode_failure_handled_like_read_failure() {
        let engine = Box::new(BrokenEngine);
        let source = Box::new(ReplaySource::from_samples(&silence(6400)));
        let session = StreamingSession::new(engine, source, &test_config(None)).unwrap();
        let log = Arc::new(EventLog::default());

        assert!(session.start(log.clone()));
        assert!(wait_for(|| session.phase() == Phase::Stopped));
        session.dispatcher().flush();

        let events = log.snapshot();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Error(SessionError::Decode(_))));
    }

    #[test]
    fn test_invalid_config_is_creation_error() {
        let mut config = test_config(None);
        config.audio.sample_rate = 0;

        let engine = Box::new(ScriptedEngine::new(vec![]));
        let source = Box::new(ReplaySource::from_samples(&[]));
        let err = StreamingSession::new(engine, source, &config).unwrap_err();
        assert!(matches!(err, SessionError::Creation(_)));
    }

    #[test]
    fn test_stats_reflect_decoded_audio() {
        let engine = Box::new(ScriptedEngine::new(vec![9600]));
        let source = Box::new(ReplaySource::from_samples(&silence(16000)));
        let session = StreamingSession::new(engine, source, &test_config(None)).unwrap();
        let log = Arc::new(EventLog::default());

        assert!(session.start(log.clone()));
        assert!(wait_for(|| session.phase() == Phase::Stopped));

        let stats = session.stats();
        assert_eq!(stats.chunks_read, 5);  // 16000 / 3200
        assert_eq!(stats.samples_decoded, 16000);
        assert_eq!(stats.result_events, 1);  // Boundary at 9600
        assert_eq!(stats.partial_events, 4);
    }
}
