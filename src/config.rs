//! # Configuration Management
//!
//! This module handles loading and managing recognizer configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_AUDIO_SAMPLE_RATE, APP_SESSION_TIMEOUT_MS, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;                   // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.

/// Main recognizer configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (audio format, session tuning)
/// makes it easier to understand and maintain as the pipeline grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    pub audio: AudioConfig,
    pub session: SessionTuning,
}

/// Audio format configuration.
///
/// ## Fields:
/// - `sample_rate`: Samples per second the engine expects (typically 16000)
/// - `channels`: Number of audio channels (must be 1, mono)
/// - `bit_depth`: Bits per sample (must be 16, signed little-endian PCM)
///
/// ## Why mono 16-bit only:
/// The recognition engine consumes mono 16-bit PCM; anything else has to be
/// converted upstream by the audio source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
}

/// Session behavior tuning.
///
/// ## Fields:
/// - `chunk_duration_ms`: Length of one audio chunk handed to the engine per
///   loop iteration (typically 200ms)
/// - `timeout_ms`: Optional listening timeout; `None` means listen until
///   end-of-stream or stop
/// - `pause_poll_ms`: How often a paused session re-checks its flags
///
/// ## Tuning guidelines:
/// - Smaller chunks: Lower latency for partial results, more engine calls
/// - Larger chunks: Fewer engine calls, coarser pause/stop responsiveness
///   (lifecycle flags are observed once per chunk)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTuning {
    pub chunk_duration_ms: u32,
    pub timeout_ms: Option<u64>,
    pub pause_poll_ms: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig {
                sample_rate: 16000,  // The rate recognition models are trained at
                channels: 1,         // Mono audio
                bit_depth: 16,       // 16-bit PCM
            },
            session: SessionTuning {
                chunk_duration_ms: 200,  // 0.2s per chunk, the classic capture buffer size
                timeout_ms: None,        // Listen until end-of-stream by default
                pause_poll_ms: 30,       // Paused sessions re-check flags ~33 times/sec
            },
        }
    }
}

impl RecognizerConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    ///
    /// ## Environment Variable Examples:
    /// - `APP_AUDIO_SAMPLE_RATE=8000`: Override the sample rate
    /// - `APP_SESSION_CHUNK_DURATION_MS=100`: Override the chunk duration
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&RecognizerConfig::default())?)
            // 2. Load from config.toml file (if it exists) - required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            // Example: APP_AUDIO_SAMPLE_RATE becomes audio.sample_rate in the config
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Build the final configuration and convert it back to our RecognizerConfig struct
        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Sample rate is within the range real engines accept (8kHz-48kHz)
    /// - Audio is mono 16-bit (the only format the pipeline handles)
    /// - Chunk duration is not zero (a zero-length chunk would spin the loop)
    /// - A configured timeout is not zero (use `None` to disable timeouts)
    ///
    /// ## Why validate:
    /// Catching configuration errors at session construction prevents runtime
    /// failures mid-stream and provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate < 8000 || self.audio.sample_rate > 48000 {
            return Err(anyhow::anyhow!(
                "Sample rate must be between 8000 and 48000, got {}",
                self.audio.sample_rate
            ));
        }

        if self.audio.channels != 1 {
            return Err(anyhow::anyhow!(
                "Only mono audio is supported, got {} channels",
                self.audio.channels
            ));
        }

        if self.audio.bit_depth != 16 {
            return Err(anyhow::anyhow!(
                "Only 16-bit PCM is supported, got {}-bit",
                self.audio.bit_depth
            ));
        }

        if self.session.chunk_duration_ms == 0 {
            return Err(anyhow::anyhow!("Chunk duration must be greater than 0"));
        }

        if self.session.timeout_ms == Some(0) {
            return Err(anyhow::anyhow!(
                "Timeout must be greater than 0 (omit it to disable the timeout)"
            ));
        }

        if self.session.pause_poll_ms == 0 {
            return Err(anyhow::anyhow!("Pause poll interval must be greater than 0"));
        }

        Ok(())  // All validation passed
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only the fields present in the JSON are changed. For example, sending
    /// just `{"session": {"timeout_ms": 5000}}` updates the timeout and
    /// leaves everything else alone. The updated configuration is validated
    /// before it is accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        // Parse the JSON string into a generic value
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        // Update audio configuration if provided
        if let Some(audio) = partial_config.get("audio") {
            if let Some(rate) = audio.get("sample_rate").and_then(|v| v.as_u64()) {
                self.audio.sample_rate = rate as u32;
            }
        }

        // Update session tuning if provided
        if let Some(session) = partial_config.get("session") {
            if let Some(chunk) = session.get("chunk_duration_ms").and_then(|v| v.as_u64()) {
                self.session.chunk_duration_ms = chunk as u32;
            }
            if let Some(timeout) = session.get("timeout_ms") {
                // An explicit null clears the timeout
                self.session.timeout_ms = timeout.as_u64();
            }
            if let Some(poll) = session.get("pause_poll_ms").and_then(|v| v.as_u64()) {
                self.session.pause_poll_ms = poll;
            }
        }

        // Validate the updated configuration to ensure it's still valid
        self.validate()?;
        Ok(())
    }

    /// Number of samples in one chunk at the configured rate.
    ///
    /// ## Calculation:
    /// chunk_samples = sample_rate * chunk_duration_ms / 1000
    ///
    /// ## Example:
    /// For 200ms chunks at 16kHz: 16000Hz * 200ms / 1000 = 3,200 samples
    pub fn chunk_samples(&self) -> usize {
        (self.audio.sample_rate as usize * self.session.chunk_duration_ms as usize) / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;  // Import everything from the parent module

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = RecognizerConfig::default();
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.session.chunk_duration_ms, 200);
        assert_eq!(config.session.timeout_ms, None);
        // Ensure the default config passes validation
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = RecognizerConfig::default();
        config.audio.sample_rate = 0;  // Invalid sample rate
        assert!(config.validate().is_err());

        let mut config = RecognizerConfig::default();
        config.audio.channels = 2;  // Stereo is not supported
        assert!(config.validate().is_err());

        let mut config = RecognizerConfig::default();
        config.session.chunk_duration_ms = 0;
        assert!(config.validate().is_err());

        // A zero timeout is a configuration mistake, not "no timeout"
        let mut config = RecognizerConfig::default();
        config.session.timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    /// Test that runtime configuration updates work correctly.
    #[test]
    fn test_config_update() {
        let mut config = RecognizerConfig::default();
        let json = r#"{"session": {"timeout_ms": 5000}}"#;  // Update only the timeout
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.session.timeout_ms, Some(5000));  // Timeout should be updated
        // Other fields should remain unchanged
        assert_eq!(config.audio.sample_rate, 16000);

        // An explicit null disables the timeout again
        assert!(config.update_from_json(r#"{"session": {"timeout_ms": null}}"#).is_ok());
        assert_eq!(config.session.timeout_ms, None);

        // Updates that fail validation are rejected
        assert!(config.update_from_json(r#"{"audio": {"sample_rate": 100}}"#).is_err());
    }

    /// Test the chunk size arithmetic used by the session loop.
    #[test]
    fn test_chunk_samples() {
        let config = RecognizerConfig::default();
        // 16000 Hz * 200 ms / 1000 = 3200 samples
        assert_eq!(config.chunk_samples(), 3200);

        let mut config = RecognizerConfig::default();
        config.audio.sample_rate = 8000;
        config.session.chunk_duration_ms = 100;
        assert_eq!(config.chunk_samples(), 800);
    }
}
