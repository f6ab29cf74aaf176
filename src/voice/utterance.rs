//! End-of-utterance detection
//!
//! Local energy detection decides when the user started and stopped talking;
//! the segment in between goes to remote transcription.

use super::wav::{SAMPLE_RATE, rms_energy};

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to count as an utterance (0.3s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Trailing silence that ends an utterance (0.8s)
const SILENCE_SAMPLES: usize = SAMPLE_RATE as usize * 8 / 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Waiting,
    /// Speech in progress, accumulating
    Speaking,
    /// Speech followed by enough silence
    Complete,
}

/// Segments a stream of samples into a single utterance
pub struct UtteranceDetector {
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    threshold: f32,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_threshold(ENERGY_THRESHOLD)
    }

    /// Detector with a custom energy threshold
    #[must_use]
    pub const fn with_threshold(threshold: f32) -> Self {
        Self {
            state: DetectorState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            threshold,
        }
    }

    /// Feed a block of samples; returns true once the utterance is complete
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = rms_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Waiting => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected");
                }
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    if self.speech_buffer.len() > MIN_SPEECH_SAMPLES + self.silence_counter {
                        tracing::debug!(
                            samples = self.speech_buffer.len(),
                            "utterance complete"
                        );
                        self.state = DetectorState::Complete;
                    } else {
                        // A click or cough, not speech
                        tracing::trace!("speech too short, resetting");
                        self.reset();
                    }
                }
            }
            DetectorState::Complete => {}
        }

        self.state == DetectorState::Complete
    }

    /// Take the captured utterance and reset
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let samples = std::mem::take(&mut self.speech_buffer);
        self.reset();
        samples
    }

    /// Whether speech has started
    #[must_use]
    pub fn heard_speech(&self) -> bool {
        self.state != DetectorState::Waiting
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}
