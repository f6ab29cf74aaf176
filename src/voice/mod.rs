//! Voice I/O
//!
//! Speech synthesis (remote TTS + local playback) and speech capture
//! (typed input, or microphone + remote STT behind the `audio` feature).

mod capture;
#[cfg(feature = "audio")]
mod device;
#[cfg(feature = "audio")]
mod microphone;
mod player;
mod stt;
mod synthesis;
mod tts;
mod utterance;
mod wav;

use std::sync::Arc;

pub use capture::{
    CaptureErrorCode, CaptureEvent, CaptureEventKind, SpeechCaptureAdapter, SpeechRecognizer,
    TypedInput, TypedRecognizer, UnsupportedRecognizer,
};
#[cfg(feature = "audio")]
pub use device::DevicePlayer;
#[cfg(feature = "audio")]
pub use microphone::{AudioCapture, MicrophoneRecognizer};
pub use player::{CommandPlayer, Player};
pub use stt::SpeechToText;
pub use synthesis::{
    PlaybackEvent, PlaybackEventKind, PlaybackHandle, SpeechSynthesisAdapter, Synthesizer,
};
pub use tts::TextToSpeech;
pub use utterance::{DetectorState, UtteranceDetector};
pub use wav::{SAMPLE_RATE, rms_energy, samples_to_wav};

use crate::config::{ApiKeys, CaptureBackend, VoiceConfig};
use crate::Result;

/// Build the playback side from config
///
/// With the `audio` feature and no explicit player command, the output
/// device is used directly.
///
/// # Errors
///
/// Returns error if no usable player exists
pub fn player_from_config(voice: &VoiceConfig) -> Result<Arc<dyn Player>> {
    match voice.player.as_deref() {
        Some(command) => Ok(Arc::new(CommandPlayer::new(command)?)),
        None => default_player(),
    }
}

#[cfg(feature = "audio")]
fn default_player() -> Result<Arc<dyn Player>> {
    Ok(Arc::new(DevicePlayer::new()?))
}

#[cfg(not(feature = "audio"))]
fn default_player() -> Result<Arc<dyn Player>> {
    Ok(Arc::new(CommandPlayer::detect()?))
}

/// Build the capture backend from config
///
/// Returns the typed-input handle when the terminal backend is selected.
///
/// # Errors
///
/// Returns error if the microphone backend is selected but cannot be built
pub fn recognizer_from_config(
    voice: &VoiceConfig,
    keys: &ApiKeys,
) -> Result<(Arc<dyn SpeechRecognizer>, Option<TypedInput>)> {
    match voice.capture {
        CaptureBackend::Typed => {
            let (recognizer, input) = TypedRecognizer::new(None);
            Ok((Arc::new(recognizer), Some(input)))
        }
        CaptureBackend::Disabled => Ok((Arc::new(UnsupportedRecognizer), None)),
        #[cfg(feature = "audio")]
        CaptureBackend::Microphone => {
            let stt = SpeechToText::from_config(voice, keys)?;
            Ok((
                Arc::new(MicrophoneRecognizer::new(stt, voice.max_listen)),
                None,
            ))
        }
        #[cfg(not(feature = "audio"))]
        CaptureBackend::Microphone => {
            let _ = keys;
            Err(crate::Error::Config(
                "microphone capture requires the `audio` feature".to_string(),
            ))
        }
    }
}
