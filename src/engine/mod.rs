//! # Recognition Engine Boundary
//!
//! The streaming session drives an opaque, stateful decoder through this
//! trait. The engine itself (acoustic model, language model, decoding graph)
//! is an external collaborator: this crate only specifies the seam.
//!
//! ## Transcript Payloads:
//! All strings returned by an engine are engine-defined JSON payloads. The
//! session treats them as opaque and forwards them to listeners unparsed.
//!
//! ## Instance Ownership:
//! One engine instance belongs to exactly one session for the session's
//! lifetime. The underlying *model* may be shared read-only across many
//! engine instances, but callers must never hand the same instance to two
//! sessions - the engine accumulates per-utterance state between calls.
//! Engine teardown is ordinary `Drop`.

use crate::error::SessionResult;

/// Per-chunk verdict from the decoder.
///
/// ## Variants:
/// - **Boundary**: The chunk completed an utterance (silence detected); the
///   finalized utterance text is available via [`RecognitionEngine::result_text`]
/// - **Continuing**: Speech is still in progress; the running hypothesis is
///   available via [`RecognitionEngine::partial_text`]
///
/// This is a binary state signal, not a state machine; the enum just makes
/// call sites read better than a raw boolean would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeVerdict {
    Boundary,
    Continuing,
}

/// Stateful incremental speech decoder.
///
/// ## Contract:
/// - `accept_waveform` feeds one chunk of mono 16-bit PCM and classifies it.
///   A rejected chunk is a `Decode` error and ends the run.
/// - `partial_text` returns the current in-progress hypothesis.
/// - `result_text` returns the finalized text of the utterance that just
///   ended (valid after a `Boundary` verdict).
/// - `final_text` forces a flush of any buffered audio and returns the
///   end-of-session transcript.
/// - `reset` clears accumulated partial/final state without recreating the
///   engine.
pub trait RecognitionEngine: Send {
    /// Feed one chunk of audio and classify it.
    fn accept_waveform(&mut self, samples: &[i16]) -> SessionResult<DecodeVerdict>;

    /// Current partial hypothesis for the in-progress utterance.
    fn partial_text(&mut self) -> String;

    /// Finalized text for the utterance that just ended.
    fn result_text(&mut self) -> String;

    /// Flush buffered audio and return the end-of-session transcript.
    fn final_text(&mut self) -> String;

    /// Clear accumulated recognition state, starting recognition over.
    fn reset(&mut self);
}
