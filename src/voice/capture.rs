//! Speech capture adapter
//!
//! One single-utterance capture session at a time. Each session emits either
//! `Result` or `Error`, then `End`, exactly once.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Why a capture session produced no transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorCode {
    NoSpeech,
    Aborted,
    AudioCapture(String),
    Network(String),
}

impl CaptureErrorCode {
    fn from_error(err: &Error) -> Self {
        match err {
            Error::Stt(msg) => Self::Network(msg.clone()),
            Error::Http(e) => Self::Network(e.to_string()),
            other => Self::AudioCapture(other.to_string()),
        }
    }
}

impl fmt::Display for CaptureErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpeech => f.write_str("no-speech"),
            Self::Aborted => f.write_str("aborted"),
            Self::AudioCapture(reason) => write!(f, "audio-capture: {reason}"),
            Self::Network(reason) => write!(f, "network: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureEvent {
    pub session: u64,
    pub kind: CaptureEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEventKind {
    Result(String),
    Error(CaptureErrorCode),
    End,
}

/// A speech-recognition backend
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Static capability flag
    fn is_supported(&self) -> bool {
        true
    }

    /// Listen for one utterance; `Ok(None)` when nothing was said
    async fn recognize(&self) -> Result<Option<String>>;
}

/// Platform without speech recognition
pub struct UnsupportedRecognizer;

#[async_trait]
impl SpeechRecognizer for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    async fn recognize(&self) -> Result<Option<String>> {
        Err(Error::CaptureUnsupported)
    }
}

/// Utterances typed at the terminal
pub struct TypedRecognizer {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
    timeout: Option<Duration>,
}

/// Feeds typed utterances into a [`TypedRecognizer`]
#[derive(Clone)]
pub struct TypedInput {
    tx: mpsc::UnboundedSender<String>,
}

impl TypedInput {
    /// Hand one utterance to the recognizer
    pub fn say(&self, text: impl Into<String>) {
        let _ = self.tx.send(text.into());
    }
}

impl TypedRecognizer {
    /// Create a recognizer and its input side
    ///
    /// With a timeout, a session with no typed line ends in `NoSpeech`.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> (Self, TypedInput) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                lines: Mutex::new(rx),
                timeout,
            },
            TypedInput { tx },
        )
    }
}

#[async_trait]
impl SpeechRecognizer for TypedRecognizer {
    async fn recognize(&self) -> Result<Option<String>> {
        let mut lines = self.lines.lock().await;

        let line = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, lines.recv()).await {
                Ok(line) => line,
                Err(_) => return Ok(None),
            },
            None => lines.recv().await,
        };

        line.map(Some)
            .ok_or_else(|| Error::Capture("terminal input closed".to_string()))
    }
}

type Emitter = Arc<dyn Fn(CaptureEventKind) + Send + Sync>;

struct CaptureSession {
    id: u64,
    task: JoinHandle<()>,
    terminated: Arc<AtomicBool>,
    emit: Emitter,
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Listens for one user utterance at a time
pub struct SpeechCaptureAdapter {
    recognizer: Arc<dyn SpeechRecognizer>,
    supported: bool,
    active: Option<CaptureSession>,
    next_session: u64,
}

impl SpeechCaptureAdapter {
    #[must_use]
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        let supported = recognizer.is_supported();
        tracing::debug!(supported, "speech capture initialized");

        Self {
            recognizer,
            supported,
            active: None,
            next_session: 0,
        }
    }

    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.supported
    }

    /// Begin a capture session, stopping any active one first
    ///
    /// # Errors
    ///
    /// Returns `Error::CaptureUnsupported` when the capability is absent
    pub fn start<T>(&mut self, events: &mpsc::UnboundedSender<T>) -> Result<u64>
    where
        T: From<CaptureEvent> + Send + 'static,
    {
        if !self.supported {
            return Err(Error::CaptureUnsupported);
        }

        self.stop();

        self.next_session += 1;
        let id = self.next_session;

        let tx = events.clone();
        let emit: Emitter = Arc::new(move |kind: CaptureEventKind| {
            let _ = tx.send(T::from(CaptureEvent { session: id, kind }));
        });
        let terminated = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn({
            let recognizer = Arc::clone(&self.recognizer);
            let emit = Arc::clone(&emit);
            let terminated = Arc::clone(&terminated);

            async move {
                let outcome = match recognizer.recognize().await {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        CaptureEventKind::Result(text.trim().to_string())
                    }
                    Ok(_) => CaptureEventKind::Error(CaptureErrorCode::NoSpeech),
                    Err(e) => {
                        tracing::warn!(session = id, error = %e, "speech capture failed");
                        CaptureEventKind::Error(CaptureErrorCode::from_error(&e))
                    }
                };

                if !terminated.swap(true, Ordering::SeqCst) {
                    emit(outcome);
                    emit(CaptureEventKind::End);
                }
            }
        });

        tracing::debug!(session = id, "capture started");

        self.active = Some(CaptureSession {
            id,
            task,
            terminated,
            emit,
        });

        Ok(id)
    }

    /// Abort the active session; no-op when idle
    pub fn stop(&mut self) {
        if let Some(session) = self.active.take() {
            session.task.abort();
            if !session.terminated.swap(true, Ordering::SeqCst) {
                tracing::debug!(session = session.id, "capture aborted");
                (session.emit)(CaptureEventKind::Error(CaptureErrorCode::Aborted));
                (session.emit)(CaptureEventKind::End);
            }
        }
    }

    /// Forget session `id` after its `End` was handled
    pub fn release(&mut self, id: u64) {
        if self.active.as_ref().is_some_and(|session| session.id == id) {
            self.active = None;
        }
    }

    /// Whether a session is still listening
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|session| !session.terminated.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next(rx: &mut mpsc::UnboundedReceiver<CaptureEvent>) -> CaptureEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for capture event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_typed_utterance_yields_result_then_end() {
        let (recognizer, input) = TypedRecognizer::new(None);
        let mut adapter = SpeechCaptureAdapter::new(Arc::new(recognizer));
        let (tx, mut rx) = mpsc::unbounded_channel::<CaptureEvent>();

        let id = adapter.start(&tx).unwrap();
        input.say("  what color is it?  ");

        let result = next(&mut rx).await;
        assert_eq!(result.session, id);
        assert_eq!(
            result.kind,
            CaptureEventKind::Result("what color is it?".to_string())
        );
        assert_eq!(next(&mut rx).await.kind, CaptureEventKind::End);
        assert!(!adapter.is_listening());
    }

    #[tokio::test]
    async fn test_stop_emits_aborted_then_end() {
        let (recognizer, _input) = TypedRecognizer::new(None);
        let mut adapter = SpeechCaptureAdapter::new(Arc::new(recognizer));
        let (tx, mut rx) = mpsc::unbounded_channel::<CaptureEvent>();

        adapter.start(&tx).unwrap();
        assert!(adapter.is_listening());
        adapter.stop();

        assert_eq!(
            next(&mut rx).await.kind,
            CaptureEventKind::Error(CaptureErrorCode::Aborted)
        );
        assert_eq!(next(&mut rx).await.kind, CaptureEventKind::End);

        adapter.stop();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timeout_is_no_speech() {
        let (recognizer, _input) = TypedRecognizer::new(Some(Duration::from_millis(10)));
        let mut adapter = SpeechCaptureAdapter::new(Arc::new(recognizer));
        let (tx, mut rx) = mpsc::unbounded_channel::<CaptureEvent>();

        adapter.start(&tx).unwrap();
        assert_eq!(
            next(&mut rx).await.kind,
            CaptureEventKind::Error(CaptureErrorCode::NoSpeech)
        );
        assert_eq!(next(&mut rx).await.kind, CaptureEventKind::End);
    }

    #[tokio::test]
    async fn test_unsupported_refuses_to_start() {
        let mut adapter = SpeechCaptureAdapter::new(Arc::new(UnsupportedRecognizer));
        let (tx, _rx) = mpsc::unbounded_channel::<CaptureEvent>();

        assert!(!adapter.is_supported());
        assert!(matches!(adapter.start(&tx), Err(Error::CaptureUnsupported)));
    }
}
