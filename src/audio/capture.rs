//! # Live Capture Audio Source
//!
//! Adapter over a live input device (microphone) using cpal. The cpal stream
//! object is not `Send`, so it lives on a dedicated capture thread for the
//! duration of the session; samples are forwarded to the session's worker
//! thread over a channel.
//!
//! ## Data Flow:
//! ```text
//! device -> cpal callback -> mpsc channel -> pending queue -> Chunk
//! ```
//!
//! ## Failure Surfacing:
//! Opening the device happens on the capture thread, with a startup handshake
//! back to `start()`: a missing device, an unsupported format, or a stream
//! that will not play is reported synchronously as a read failure rather than
//! being discovered one chunk later.

use crate::audio::chunk::Chunk;
use crate::audio::source::{AudioSource, ReadOutcome};
use crate::config::AudioConfig;
use crate::error::{SessionError, SessionResult};
use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// How long one read call will wait for the device before reporting
/// "no data this call". Half the default chunk duration.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// How often the capture thread re-checks the shutdown flag while parked.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Live capture adapter around a cpal input device.
///
/// ## Thread Model:
/// `start()` spawns a capture thread that owns the cpal stream; the cpal
/// callback pushes converted i16 batches into an unbounded channel. `read()`
/// (called on the session's worker thread) drains that channel into chunks.
/// `stop()` signals the capture thread and joins it.
pub struct CaptureSource {
    format: AudioConfig,
    device_name: Option<String>,

    /// Receiving side of the sample channel, present after `start()`
    rx: Option<Receiver<Vec<i16>>>,

    /// Samples received but not yet handed out in a chunk
    pending: VecDeque<i16>,

    /// Cooperative shutdown flag shared with the capture thread
    shutdown: Arc<AtomicBool>,

    capture_thread: Option<thread::JoinHandle<()>>,
}

impl CaptureSource {
    /// Create a capture source for the default input device.
    pub fn new(format: &AudioConfig) -> Self {
        Self {
            format: format.clone(),
            device_name: None,
            rx: None,
            pending: VecDeque::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
        }
    }

    /// Create a capture source for a named input device.
    pub fn with_device(format: &AudioConfig, device_name: &str) -> Self {
        let mut source = Self::new(format);
        source.device_name = Some(device_name.to_string());
        source
    }

    /// Open the device and build the input stream. Runs on the capture
    /// thread, since the resulting stream must stay there.
    fn open_stream(
        device_name: &Option<String>,
        format: &AudioConfig,
        tx: Sender<Vec<i16>>,
    ) -> anyhow::Result<cpal::Stream> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().as_deref().unwrap_or("") == name.as_str())
                .ok_or_else(|| anyhow!("Input device '{}' not found", name))?,
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow!("No default input device available"))?,
        };

        debug!(
            "Opening input device '{}'",
            device.name().unwrap_or_else(|_| "<unknown>".to_string())
        );

        let sample_format = device.default_input_config()?.sample_format();
        let stream_config = cpal::StreamConfig {
            channels: format.channels as u16,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_fn = |e: cpal::StreamError| error!("Capture stream error: {}", e);

        // Devices expose different native sample formats; everything is
        // converted to the 16-bit PCM the engine consumes.
        let stream = match sample_format {
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    let _ = tx.send(data.to_vec());
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _| {
                    let converted = data.iter().map(|&s| (s as i32 - 32768) as i16).collect();
                    let _ = tx.send(converted);
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    let converted = data.iter().map(|&s| float_to_pcm(s)).collect();
                    let _ = tx.send(converted);
                },
                err_fn,
                None,
            )?,
            other => {
                return Err(anyhow!("Unsupported device sample format: {:?}", other));
            }
        };

        stream.play()?;
        Ok(stream)
    }
}

impl AudioSource for CaptureSource {
    /// Drain buffered samples into the chunk.
    ///
    /// ## Returns:
    /// - **Filled(n)**: Up to one chunk of samples; `Filled(0)` when the
    ///   device produced nothing within the read timeout (stream continues)
    /// - **EndOfStream**: The capture thread was stopped
    /// - **Err(Read)**: The capture thread died without being asked to stop
    fn read(&mut self, chunk: &mut Chunk) -> SessionResult<ReadOutcome> {
        let rx = match &self.rx {
            Some(rx) => rx,
            None => {
                return Err(SessionError::Read(
                    "Capture source read before start()".to_string(),
                ))
            }
        };

        let capacity = chunk.capacity();

        // Wait briefly for the first batch when nothing is buffered
        if self.pending.is_empty() {
            match rx.recv_timeout(READ_TIMEOUT) {
                Ok(batch) => self.pending.extend(batch),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    chunk.clear();
                    return Ok(ReadOutcome::Filled(0));
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    chunk.clear();
                    if self.shutdown.load(Ordering::SeqCst) {
                        return Ok(ReadOutcome::EndOfStream);
                    }
                    return Err(SessionError::Read(
                        "Capture stream terminated unexpectedly".to_string(),
                    ));
                }
            }
        }

        // Top up from whatever else is already queued, without blocking
        while self.pending.len() < capacity {
            match rx.try_recv() {
                Ok(batch) => self.pending.extend(batch),
                Err(_) => break,
            }
        }

        let storage = chunk.storage_mut();
        let mut filled = 0;
        while filled < capacity {
            match self.pending.pop_front() {
                Some(sample) => {
                    storage[filled] = sample;
                    filled += 1;
                }
                None => break,
            }
        }
        chunk.set_filled(filled);

        Ok(ReadOutcome::Filled(filled))
    }

    /// Spawn the capture thread and wait for the device to come up.
    fn start(&mut self) -> SessionResult<()> {
        if self.capture_thread.is_some() {
            return Ok(());  // Already capturing
        }

        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        self.shutdown.store(false, Ordering::SeqCst);
        let shutdown = Arc::clone(&self.shutdown);
        let device_name = self.device_name.clone();
        let format = self.format.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                // The stream must be created AND dropped on this thread
                let stream = match Self::open_stream(&device_name, &format, tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                while !shutdown.load(Ordering::SeqCst) {
                    thread::sleep(SHUTDOWN_POLL);
                }

                drop(stream);
                debug!("Capture thread exiting");
            })
            .map_err(|e| SessionError::Read(format!("Failed to spawn capture thread: {}", e)))?;

        self.capture_thread = Some(handle);

        // Startup handshake: device failures surface here, not mid-loop
        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.rx = Some(rx);
                info!("Capture started at {} Hz", self.format.sample_rate);
                Ok(())
            }
            Ok(Err(msg)) => {
                self.stop();
                Err(SessionError::Read(format!("Failed to start capture: {}", msg)))
            }
            Err(_) => {
                self.stop();
                Err(SessionError::Read(
                    "Capture thread died during startup".to_string(),
                ))
            }
        }
    }

    /// Signal the capture thread and join it.
    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
            debug!("Capture stopped");
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert one 32-bit float sample to 16-bit PCM.
///
/// Scales from float range [-1.0, 1.0] to integer range [-32768, 32767].
fn float_to_pcm(sample: f32) -> i16 {
    let scaled = sample * 32768.0;
    scaled.clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_pcm_conversion() {
        assert_eq!(float_to_pcm(0.0), 0);
        assert_eq!(float_to_pcm(1.0), 32767);
        assert_eq!(float_to_pcm(-1.0), -32768);
        // Out-of-range input clamps instead of wrapping
        assert_eq!(float_to_pcm(2.0), 32767);
        assert_eq!(float_to_pcm(-2.0), -32768);
    }

    #[test]
    fn test_read_before_start_is_error() {
        let format = AudioConfig {
            sample_rate: 16000,
            channels: 1,
            bit_depth: 16,
        };
        let mut source = CaptureSource::new(&format);
        let mut chunk = Chunk::new(64);
        assert!(matches!(
            source.read(&mut chunk),
            Err(SessionError::Read(_))
        ));
    }
}
