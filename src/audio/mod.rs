//! # Audio Module
//!
//! This module handles audio acquisition for the streaming recognition loop.
//! It defines the chunk type handed to the engine each iteration, the minimal
//! source contract the session drives, and the two source adapters.
//!
//! ## Key Components:
//! - **Chunk**: Fixed-capacity sample buffer with a filled count
//! - **AudioSource**: The read/start/stop contract both adapters implement
//! - **CaptureSource**: Live input device adapter (cpal)
//! - **ReplaySource**: Finite PCM stream adapter (in-memory, file, WAV)
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: Configurable, typically 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod capture;  // Live device adapter
pub mod chunk;    // Fixed-capacity sample buffer
pub mod replay;   // Finite stream adapter
pub mod source;   // The source contract

pub use capture::CaptureSource;
pub use chunk::Chunk;
pub use replay::ReplaySource;
pub use source::{AudioSource, ReadOutcome};
