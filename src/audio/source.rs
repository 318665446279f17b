//! # Audio Source Contract
//!
//! The minimal interface the streaming session uses to pull audio, implemented
//! both by the live capture adapter and the finite replay adapter. The session
//! never observes which variant it is driving.

use crate::audio::chunk::Chunk;
use crate::error::SessionResult;

/// Result of one read call against an audio source.
///
/// ## Variants:
/// - **Filled(n)**: `n` samples were written into the chunk. `n == 0` means
///   "no data this call, but the stream continues" (e.g. a silent capture
///   device); the session simply tries again.
/// - **EndOfStream**: The source is exhausted. This ends the run normally,
///   it is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Filled(usize),
    EndOfStream,
}

/// A sequence of PCM chunks produced on demand.
///
/// ## Contract:
/// - `read` fills the chunk's storage and reports the outcome; a device or
///   stream failure is returned as `Err(SessionError::Read)` and ends the run.
/// - `start`/`stop` exist for the capture variant (they open and close the
///   underlying device); the replay variant keeps the default no-ops.
/// - Implementations must be `Send`: the source is moved onto the session's
///   worker thread.
pub trait AudioSource: Send {
    /// Pull one chunk of audio from the source.
    fn read(&mut self, chunk: &mut Chunk) -> SessionResult<ReadOutcome>;

    /// Begin producing audio (open the device). Called once before the first
    /// read, on the worker thread.
    fn start(&mut self) -> SessionResult<()> {
        Ok(())
    }

    /// Stop producing audio (close the device). Called once after the loop
    /// exits, on the worker thread.
    fn stop(&mut self) {}
}
