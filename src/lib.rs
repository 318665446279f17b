//! # speech-stream - Streaming Speech Recognition Sessions
//!
//! This crate streams live or file-sourced audio into an incremental
//! speech-to-text engine and delivers partial/final transcription events to
//! registered listeners, while letting a caller pause, reset, cancel, or
//! time-box the session.
//!
//! ## Key Rust Concepts Used:
//! - **Traits at the seams**: The recognition engine and audio sources are
//!   trait objects, so the session never depends on a concrete decoder
//! - **Dedicated worker threads**: One OS thread per active session, joined
//!   on stop (no thread pool, no reentrancy)
//! - **Atomic flags**: Pause/reset/cancel commands cross threads through
//!   atomics, observed cooperatively once per loop iteration
//!
//! ## Architecture:
//! - **config**: Layered recognizer configuration (TOML + environment)
//! - **error**: The SessionError taxonomy
//! - **state**: Per-session lifecycle phase, flags, and timeout budget
//! - **engine**: The opaque recognition engine boundary
//! - **audio**: Chunks, the source contract, capture and replay adapters
//! - **dispatcher**: Listener registry and ordered event delivery
//! - **session**: The streaming session controller itself
//!
//! ## Typical Usage:
//! ```rust,ignore
//! let config = RecognizerConfig::load()?;
//! let source = CaptureSource::new(&config.audio);
//! let session = StreamingSession::new(engine, Box::new(source), &config)?;
//! session.start(listener);
//! // ... partial/result events flow to the listener ...
//! session.stop();  // blocks until the final transcript is delivered
//! ```

// Module declarations - These tell Rust about our other source files
pub mod audio;       // Chunks, source contract, capture/replay adapters (audio/ directory)
pub mod config;      // Configuration management (config.rs)
pub mod dispatcher;  // Event delivery and listener registry (dispatcher.rs)
pub mod engine;      // Recognition engine boundary (engine/ directory)
pub mod error;       // Error handling types (error.rs)
pub mod session;     // The streaming session controller (session.rs)
pub mod state;       // Session lifecycle state (state.rs)

pub use audio::{AudioSource, CaptureSource, Chunk, ReadOutcome, ReplaySource};
pub use config::{AudioConfig, RecognizerConfig, SessionTuning};
pub use dispatcher::{Event, ListenerDispatcher, ListenerId, RecognitionListener};
pub use engine::{DecodeVerdict, RecognitionEngine};
pub use error::{SessionError, SessionResult};
pub use session::StreamingSession;
pub use state::{Phase, SessionState, SessionStats, NO_TIMEOUT};
