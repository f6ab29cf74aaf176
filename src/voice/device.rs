//! Playback straight to the default output device

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::player::Player;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Decodes MP3 and plays it through cpal
pub struct DevicePlayer {
    config: StreamConfig,
}

impl DevicePlayer {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no usable output device exists
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |channels: u16| {
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        };

        let supported_config = supports(1)
            .or_else(|| supports(2))
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }
}

/// Raises the stop flag when the playing future is dropped
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Player for DevicePlayer {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        let samples = decode_mp3(&audio)?;
        if samples.is_empty() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(Arc::clone(&stop));
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || play_blocking(&config, samples, &stop))
            .await
            .map_err(|e| Error::Playback(e.to_string()))?
    }
}

/// Play samples until done or stopped
fn play_blocking(config: &StreamConfig, samples: Vec<f32>, stop: &AtomicBool) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = usize::from(config.channels);
    let total = samples.len();
    let samples = Arc::new(samples);
    let cursor = Arc::new(AtomicUsize::new(0));

    let stream = {
        let samples = Arc::clone(&samples);
        let cursor = Arc::clone(&cursor);
        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let pos = cursor.fetch_add(1, Ordering::Relaxed);
                        frame.fill(samples.get(pos).copied().unwrap_or(0.0));
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (total as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let timeout = Duration::from_millis(duration_ms + 500);
    let start = Instant::now();

    while cursor.load(Ordering::Relaxed) < total {
        if stop.load(Ordering::SeqCst) {
            tracing::debug!("playback stopped");
            return Ok(());
        }
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = total, "playback complete");

    Ok(())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
