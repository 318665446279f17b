//! # Listener Dispatch
//!
//! Decouples event production (the session's worker thread) from event
//! consumption (a single delivery thread). Sessions post events without
//! blocking; a dedicated delivery thread invokes listener callbacks strictly
//! in posting order, so listeners never run concurrently with each other for
//! the same session.
//!
//! ## Ordering Guarantees:
//! - Events for one session are delivered in the order they were posted
//! - Posts from multiple sessions interleave but never reorder within a
//!   session (everything funnels through one FIFO channel)
//! - A listener added after events were posted does not receive them, even
//!   if they are still queued: every event and every registration carries a
//!   sequence number, and delivery skips listeners registered "later" than
//!   the event
//!
//! ## Registry:
//! The listener collection is an explicit, dispatcher-owned set - no global
//! or process-wide registry. Add/remove is safe at any time; the set is
//! snapshot-iterated per event so a listener removed mid-dispatch at most
//! receives the in-flight event.

use crate::error::SessionError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, warn};

/// A recognition event produced by a streaming session.
///
/// ## Variants:
/// - **Partial**: In-progress hypothesis for the current utterance
/// - **Result**: Finalized text of an utterance that just ended
/// - **Final**: End-of-session transcript (flushed)
/// - **Error**: The run failed; terminal
/// - **Timeout**: The listening budget expired; terminal
///
/// Text payloads are engine-defined JSON, treated as opaque strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Partial(String),
    Result(String),
    Final(String),
    Error(SessionError),
    Timeout,
}

/// Callback surface for recognition results.
///
/// ## Delivery Contract:
/// All callbacks run on the dispatcher's delivery thread, in emission order,
/// never concurrently with each other for the same session. Implementations
/// must be `Send + Sync` (the handle is shared with the delivery thread).
pub trait RecognitionListener: Send + Sync {
    /// Called when a partial recognition result is available.
    fn on_partial_result(&self, hypothesis: &str);

    /// Called after an utterance boundary (silence) was detected.
    fn on_result(&self, hypothesis: &str);

    /// Called once at stream end with the flushed final transcript.
    fn on_final_result(&self, hypothesis: &str);

    /// Called when an error ends the run.
    fn on_error(&self, error: &SessionError);

    /// Called when the listening timeout expires.
    fn on_timeout(&self);
}

/// Handle identifying a registered listener, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// One registered listener plus its delivery gates.
struct Registered {
    id: u64,

    /// Only deliver events from this session (None = all sessions)
    session_filter: Option<String>,

    /// Sequence number at registration; events posted earlier are skipped
    joined_seq: u64,

    listener: Arc<dyn RecognitionListener>,
}

/// Messages consumed by the delivery thread.
enum DeliveryMessage {
    Deliver {
        session_id: String,
        seq: u64,
        event: Event,
    },
    /// Barrier: acknowledge once everything posted before it is delivered
    Flush(Sender<()>),
    Shutdown,
}

struct DispatcherInner {
    /// Sending side of the delivery channel. Behind a mutex because
    /// `mpsc::Sender` is not `Sync` and dispatcher handles are shared
    /// across the caller's thread and every session's worker thread.
    tx: Mutex<Sender<DeliveryMessage>>,
    listeners: Arc<Mutex<Vec<Registered>>>,
    next_listener_id: AtomicU64,
    next_seq: AtomicU64,
    delivery_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Thread-safe registry of listeners plus the delivery thread that invokes
/// them.
///
/// ## Sharing:
/// Cloning is cheap (Arc internals); every session holds a clone for posting
/// and callers hold clones for listener management. The delivery thread shuts
/// down when the last clone is dropped.
#[derive(Clone)]
pub struct ListenerDispatcher {
    inner: Arc<DispatcherInner>,
}

impl ListenerDispatcher {
    /// Create a dispatcher and spawn its delivery thread.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let listeners: Arc<Mutex<Vec<Registered>>> = Arc::new(Mutex::new(Vec::new()));

        let thread_listeners = Arc::clone(&listeners);
        let handle = thread::Builder::new()
            .name("event-delivery".to_string())
            .spawn(move || Self::delivery_loop(rx, thread_listeners))
            .expect("failed to spawn event delivery thread");

        Self {
            inner: Arc::new(DispatcherInner {
                tx: Mutex::new(tx),
                listeners,
                next_listener_id: AtomicU64::new(1),
                next_seq: AtomicU64::new(0),
                delivery_thread: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Register a listener for events from every session on this dispatcher.
    pub fn add_listener(&self, listener: Arc<dyn RecognitionListener>) -> ListenerId {
        self.register(None, listener)
    }

    /// Register a listener scoped to a single session's events.
    pub fn add_session_listener(
        &self,
        session_id: &str,
        listener: Arc<dyn RecognitionListener>,
    ) -> ListenerId {
        self.register(Some(session_id.to_string()), listener)
    }

    fn register(
        &self,
        session_filter: Option<String>,
        listener: Arc<dyn RecognitionListener>,
    ) -> ListenerId {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        // Events already posted (even if still queued) are not for this listener
        let joined_seq = self.inner.next_seq.load(Ordering::SeqCst);

        self.inner.listeners.lock().unwrap().push(Registered {
            id,
            session_filter,
            joined_seq,
            listener,
        });

        debug!("Listener {} registered (joined at seq {})", id, joined_seq);
        ListenerId(id)
    }

    /// Remove a previously registered listener.
    ///
    /// Safe to call from any thread at any time, including while dispatch is
    /// in progress; the removed listener receives at most the event currently
    /// being delivered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|registered| registered.id != id.0);
        let removed = listeners.len() != before;
        if removed {
            debug!("Listener {} removed", id.0);
        }
        removed
    }

    /// Post an event for delivery. Never blocks beyond marshalling the
    /// message into the channel.
    pub(crate) fn post(&self, session_id: &str, event: Event) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let message = DeliveryMessage::Deliver {
            session_id: session_id.to_string(),
            seq,
            event,
        };
        if self.inner.tx.lock().unwrap().send(message).is_err() {
            warn!("Event posted after delivery thread shut down");
        }
    }

    /// Block until everything posted before this call has been delivered.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        let sent = self
            .inner
            .tx
            .lock()
            .unwrap()
            .send(DeliveryMessage::Flush(ack_tx))
            .is_ok();
        if sent {
            let _ = ack_rx.recv();
        }
    }

    /// The delivery thread: drain the channel in FIFO order and invoke
    /// listener callbacks outside the registry lock.
    fn delivery_loop(rx: Receiver<DeliveryMessage>, listeners: Arc<Mutex<Vec<Registered>>>) {
        while let Ok(message) = rx.recv() {
            match message {
                DeliveryMessage::Deliver {
                    session_id,
                    seq,
                    event,
                } => {
                    // Snapshot the matching listeners, then release the lock
                    // before running callbacks so add/remove never waits on a
                    // slow listener.
                    let snapshot: Vec<Arc<dyn RecognitionListener>> = {
                        let listeners = listeners.lock().unwrap();
                        listeners
                            .iter()
                            .filter(|r| r.joined_seq < seq)
                            .filter(|r| match &r.session_filter {
                                Some(filter) => filter == &session_id,
                                None => true,
                            })
                            .map(|r| Arc::clone(&r.listener))
                            .collect()
                    };

                    for listener in snapshot {
                        match &event {
                            Event::Partial(text) => listener.on_partial_result(text),
                            Event::Result(text) => listener.on_result(text),
                            Event::Final(text) => listener.on_final_result(text),
                            Event::Error(error) => listener.on_error(error),
                            Event::Timeout => listener.on_timeout(),
                        }
                    }
                }
                DeliveryMessage::Flush(ack) => {
                    let _ = ack.send(());
                }
                DeliveryMessage::Shutdown => break,
            }
        }
        debug!("Event delivery thread exiting");
    }
}

impl Default for ListenerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DispatcherInner {
    fn drop(&mut self) {
        let _ = self.tx.lock().unwrap().send(DeliveryMessage::Shutdown);
        if let Some(handle) = self.delivery_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}
