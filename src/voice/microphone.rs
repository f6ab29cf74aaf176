//! Microphone capture with remote transcription

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::capture::SpeechRecognizer;
use super::stt::SpeechToText;
use super::utterance::UtteranceDetector;
use super::wav::{SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// How often the capture buffer is drained into the detector
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Hard cap on a single utterance once speech has started
const MAX_UTTERANCE: Duration = Duration::from_secs(30);

/// Captures audio from the default input device
pub struct AudioCapture {
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device at 16kHz mono
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Check that an input device exists
    #[must_use]
    pub fn is_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("audio capture stopped");
        }
    }

    /// Samples captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

/// Raises the stop flag when the listening future is dropped
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Listens on the microphone until one utterance ends, then transcribes it
pub struct MicrophoneRecognizer {
    stt: SpeechToText,
    max_listen: Duration,
    supported: bool,
}

impl MicrophoneRecognizer {
    /// `max_listen` bounds the wait for speech to begin
    #[must_use]
    pub fn new(stt: SpeechToText, max_listen: Duration) -> Self {
        Self {
            stt,
            max_listen,
            supported: AudioCapture::is_available(),
        }
    }
}

#[async_trait]
impl SpeechRecognizer for MicrophoneRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn recognize(&self) -> Result<Option<String>> {
        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(Arc::clone(&stop));
        let max_listen = self.max_listen;

        let samples = tokio::task::spawn_blocking(move || record_utterance(max_listen, &stop))
            .await
            .map_err(|e| Error::Capture(e.to_string()))??;

        let Some(samples) = samples else {
            return Ok(None);
        };

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        let transcript = self.stt.transcribe(&wav).await?;
        Ok(Some(transcript))
    }
}

/// Block until an utterance completes, nothing is heard, or `stop` is raised
fn record_utterance(max_listen: Duration, stop: &AtomicBool) -> Result<Option<Vec<f32>>> {
    let mut capture = AudioCapture::new()?;
    let mut detector = UtteranceDetector::new();
    capture.start()?;

    let started = Instant::now();
    let outcome = loop {
        if stop.load(Ordering::SeqCst) {
            break None;
        }

        std::thread::sleep(POLL_INTERVAL);
        if detector.process(&capture.take_buffer()) {
            break Some(detector.take_utterance());
        }

        let elapsed = started.elapsed();
        if !detector.heard_speech() && elapsed > max_listen {
            tracing::debug!("no speech before listen timeout");
            break None;
        }
        if elapsed > max_listen + MAX_UTTERANCE {
            break Some(detector.take_utterance());
        }
    };

    capture.stop();
    Ok(outcome)
}
