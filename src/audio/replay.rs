//! # Replay Audio Source
//!
//! Adapter that feeds the streaming session from a finite byte stream of raw
//! little-endian 16-bit PCM, such as a recorded utterance held in memory or a
//! WAV file loaded from disk. Used for file-sourced transcription and as the
//! deterministic source in tests.
//!
//! ## Format Requirements:
//! - **Bit Depth**: 16-bit signed PCM
//! - **Encoding**: Little-endian
//! - **Channels**: Mono (1 channel)
//!
//! A stream that ends on a half sample (odd byte count) is treated as
//! corrupted and reported as a read failure, matching how truncated PCM is
//! rejected elsewhere in the pipeline.

use crate::audio::chunk::Chunk;
use crate::audio::source::{AudioSource, ReadOutcome};
use crate::config::AudioConfig;
use crate::error::{SessionError, SessionResult};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

/// Replay adapter over any finite byte reader.
///
/// ## Rust Concepts:
/// - **Generic over `R: Read + Send`**: Works with files, cursors over
///   in-memory buffers, network streams - anything that yields bytes
/// - **Send bound**: The source is moved onto the session's worker thread
#[derive(Debug)]
pub struct ReplaySource<R: Read + Send> {
    reader: R,

    /// Scratch byte buffer reused across reads
    scratch: Vec<u8>,
}

impl<R: Read + Send> ReplaySource<R> {
    /// Wrap a raw little-endian 16-bit PCM byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            scratch: Vec::new(),
        }
    }
}

impl ReplaySource<Cursor<Vec<u8>>> {
    /// Build a replay source from samples already in memory.
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(Cursor::new(bytes))
    }

    /// Load a WAV file and validate its header against the session's audio
    /// format.
    ///
    /// ## Validation Checks:
    /// 1. **Bit depth**: Must contain 16-bit samples
    /// 2. **Channel count**: Must match the configured channel count (mono)
    /// 3. **Sample rate**: Must match the configured rate - the session has
    ///    no resampler, so a mismatched file would silently skew the timeout
    ///    budget and the engine's acoustic assumptions
    pub fn from_wav_file(path: &Path, expected: &AudioConfig) -> SessionResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| SessionError::Creation(format!("Failed to open {}: {}", path.display(), e)))?;

        let (header, data) = wav::read(&mut file)
            .map_err(|e| SessionError::Creation(format!("Failed to parse {}: {}", path.display(), e)))?;

        if header.channel_count != expected.channels as u16 {
            return Err(SessionError::Creation(format!(
                "Channel count mismatch: expected {}, got {}",
                expected.channels, header.channel_count
            )));
        }

        if header.sampling_rate != expected.sample_rate {
            return Err(SessionError::Creation(format!(
                "Sample rate mismatch: expected {}, got {}",
                expected.sample_rate, header.sampling_rate
            )));
        }

        match data {
            wav::BitDepth::Sixteen(samples) => Ok(Self::from_samples(&samples)),
            other => Err(SessionError::Creation(format!(
                "Only 16-bit WAV data is supported, got {:?}",
                other
            ))),
        }
    }
}

impl<R: Read + Send> AudioSource for ReplaySource<R> {
    /// Fill the chunk with the next block of samples from the stream.
    ///
    /// ## Returns:
    /// - **Filled(n)**: `n` samples were decoded into the chunk
    /// - **EndOfStream**: The reader produced no more bytes (normal exit)
    /// - **Err(Read)**: The reader failed, or the stream ended mid-sample
    fn read(&mut self, chunk: &mut Chunk) -> SessionResult<ReadOutcome> {
        let want = chunk.capacity() * 2;  // Two bytes per 16-bit sample
        self.scratch.resize(want, 0);

        // Read until the scratch buffer is full or the stream is exhausted
        let mut total = 0;
        while total < want {
            match self.reader.read(&mut self.scratch[total..]) {
                Ok(0) => break,  // End of stream
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SessionError::Read(format!("Audio stream read failed: {}", e)))
                }
            }
        }

        if total == 0 {
            chunk.clear();
            return Ok(ReadOutcome::EndOfStream);
        }

        if total % 2 != 0 {
            return Err(SessionError::Read(
                "PCM stream ended on a half sample (odd byte count)".to_string(),
            ));
        }

        // Decode the bytes as little-endian 16-bit samples
        let mut cursor = Cursor::new(&self.scratch[..total]);
        let storage = chunk.storage_mut();
        let mut filled = 0;
        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            storage[filled] = sample;
            filled += 1;
        }
        chunk.set_filled(filled);

        Ok(ReadOutcome::Filled(filled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(source: &mut dyn AudioSource, chunk_capacity: usize) -> Vec<Vec<i16>> {
        let mut chunk = Chunk::new(chunk_capacity);
        let mut chunks = Vec::new();
        loop {
            match source.read(&mut chunk).unwrap() {
                ReadOutcome::Filled(_) => chunks.push(chunk.samples().to_vec()),
                ReadOutcome::EndOfStream => return chunks,
            }
        }
    }

    #[test]
    fn test_reads_in_chunk_sized_blocks() {
        let samples: Vec<i16> = (0..10).collect();
        let mut source = ReplaySource::from_samples(&samples);

        let chunks = read_all(&mut source, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], vec![0, 1, 2, 3]);
        assert_eq!(chunks[1], vec![4, 5, 6, 7]);
        // Final chunk is the short remainder
        assert_eq!(chunks[2], vec![8, 9]);
    }

    #[test]
    fn test_empty_stream_is_immediate_eof() {
        let mut source = ReplaySource::new(Cursor::new(Vec::<u8>::new()));
        let mut chunk = Chunk::new(4);
        assert_eq!(source.read(&mut chunk).unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn test_odd_byte_count_is_read_error() {
        // Three bytes: one full sample plus a trailing half sample
        let mut source = ReplaySource::new(Cursor::new(vec![0x01u8, 0x02, 0x03]));
        let mut chunk = Chunk::new(4);
        let err = source.read(&mut chunk).unwrap_err();
        assert!(matches!(err, SessionError::Read(_)));
    }

    #[test]
    fn test_little_endian_decoding() {
        let mut source = ReplaySource::from_samples(&[-1, 256]);
        let mut chunk = Chunk::new(2);
        assert_eq!(source.read(&mut chunk).unwrap(), ReadOutcome::Filled(2));
        assert_eq!(chunk.samples(), &[-1, 256]);
    }

    #[test]
    fn test_wav_round_trip() {
        let config = AudioConfig {
            sample_rate: 16000,
            channels: 1,
            bit_depth: 16,
        };
        let samples: Vec<i16> = vec![0, 100, -100, 32767, -32768];

        let path = std::env::temp_dir().join(format!("speech-stream-{}.wav", uuid::Uuid::new_v4()));
        {
            let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, 1, 16000, 16);
            let mut file = File::create(&path).unwrap();
            wav::write(header, &wav::BitDepth::Sixteen(samples.clone()), &mut file).unwrap();
        }

        let mut source = ReplaySource::from_wav_file(&path, &config).unwrap();
        let chunks = read_all(&mut source, 8);
        assert_eq!(chunks, vec![samples]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_wav_rate_mismatch_rejected() {
        let config = AudioConfig {
            sample_rate: 8000,  // File below is written at 16kHz
            channels: 1,
            bit_depth: 16,
        };

        let path = std::env::temp_dir().join(format!("speech-stream-{}.wav", uuid::Uuid::new_v4()));
        {
            let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, 1, 16000, 16);
            let mut file = File::create(&path).unwrap();
            wav::write(header, &wav::BitDepth::Sixteen(vec![0i16; 4]), &mut file).unwrap();
        }

        let err = ReplaySource::from_wav_file(&path, &config).unwrap_err();
        assert!(matches!(err, SessionError::Creation(_)));

        std::fs::remove_file(&path).ok();
    }
}
