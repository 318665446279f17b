//! # Error Handling
//!
//! This module defines the custom error types used across the streaming
//! recognition pipeline and how other error types convert into them.
//!
//! ## Error Categories:
//! - **Creation**: The session (or one of its collaborators) could not be
//!   constructed. Fatal - no run is possible for that session object.
//! - **Read**: The audio source failed mid-stream (device fault, truncated
//!   PCM data). Ends the run, reported once via an `Error` event.
//! - **Decode**: The recognition engine rejected a chunk. Handled exactly
//!   like a read failure.
//! - **Config**: Configuration file, environment variable, or validation
//!   problems.
//!
//! ## What is NOT an error:
//! Timing out and being cancelled are ordinary terminal outcomes of a run,
//! not failures. They are represented as `Phase` variants and terminal
//! events, never as `SessionError` values.
//!
//! ## Propagation policy:
//! The core never retries. Any failure is surfaced once and ends the run;
//! retry policy (if any) belongs to the audio source or the caller.

use std::fmt;  // For implementing the Display trait

/// Custom error types for the streaming recognition pipeline.
///
/// ## Rust Concepts:
/// - **enum**: A type that can be one of several variants
/// - **String**: Each variant holds an error message
/// - **#[derive(Debug, Clone, PartialEq)]**: Debug printing, cloning (errors
///   travel inside events), and equality (events compare in tests)
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(SessionError::Read("audio device disconnected".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session or adapter could not be constructed (fatal, no run possible)
    Creation(String),

    /// The audio source failed mid-stream
    Read(String),

    /// The recognition engine rejected a chunk
    Decode(String),

    /// Configuration file or environment variable problems
    Config(String),
}

/// Implementation of the Display trait for SessionError.
///
/// ## Purpose:
/// This trait defines how errors are formatted as human-readable strings.
/// The formatted text is what listeners ultimately see inside `Error` events.
impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Creation(msg) => write!(f, "Creation error: {}", msg),
            SessionError::Read(msg) => write!(f, "Read error: {}", msg),
            SessionError::Decode(msg) => write!(f, "Decode error: {}", msg),
            SessionError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

/// Automatic conversion from anyhow::Error to SessionError.
///
/// ## Purpose:
/// Adapter construction paths aggregate errors with anyhow before they cross
/// the crate boundary. Anything that bubbles up unmapped is a creation
/// failure: it happened before a run produced its first chunk.
impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        SessionError::Creation(err.to_string())
    }
}

/// Automatic conversion from I/O errors to SessionError.
///
/// ## Why Read:
/// The only component that performs I/O at run time is the audio source, so
/// an `io::Error` reaching session code is by definition a mid-stream read
/// failure.
impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Read(err.to_string())
    }
}

/// Automatic conversion from configuration errors to SessionError.
///
/// ## When this happens:
/// - config.toml has invalid syntax
/// - An APP_-prefixed environment variable holds an unparseable value
/// - Configuration values fail deserialization
impl From<config::ConfigError> for SessionError {
    fn from(err: config::ConfigError) -> Self {
        SessionError::Config(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
///
/// ## Usage Example:
/// ```rust,ignore
/// fn read(&mut self, chunk: &mut Chunk) -> SessionResult<ReadOutcome> { ... }
/// ```
pub type SessionResult<T> = Result<T, SessionError>;
