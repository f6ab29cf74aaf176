//! Speech synthesis adapter
//!
//! Owns the single playback resource. Every `speak` yields `Started` and then
//! exactly one terminal event (`Ended` or `Failed`), whichever of natural
//! completion, failure or `stop` gets there first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::player::Player;
use crate::Result;

/// Turns text into encoded audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Lifecycle event of one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub utterance: u64,
    pub kind: PlaybackEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    Started,
    /// Playback finished; `interrupted` when cut short by `stop`
    Ended { interrupted: bool },
    Failed(String),
}

impl PlaybackEventKind {
    /// Whether this event closes the utterance
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

type Emitter = Arc<dyn Fn(PlaybackEvent) + Send + Sync>;

/// The one currently-playing utterance
///
/// Dropping the handle aborts synthesis and playback.
pub struct PlaybackHandle {
    utterance: u64,
    task: JoinHandle<()>,
    terminated: Arc<AtomicBool>,
    emit: Emitter,
}

impl PlaybackHandle {
    #[must_use]
    pub const fn utterance(&self) -> u64 {
        self.utterance
    }

    /// Whether the terminal event has already been emitted
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Abort playback, emitting `Ended { interrupted: true }` if still open
    fn interrupt(self) {
        self.task.abort();
        if !self.terminated.swap(true, Ordering::SeqCst) {
            (self.emit)(PlaybackEvent {
                utterance: self.utterance,
                kind: PlaybackEventKind::Ended { interrupted: true },
            });
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Speaks assistant replies, one at a time
pub struct SpeechSynthesisAdapter {
    synthesizer: Arc<dyn Synthesizer>,
    player: Arc<dyn Player>,
    active: Option<PlaybackHandle>,
    next_utterance: u64,
}

impl SpeechSynthesisAdapter {
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, player: Arc<dyn Player>) -> Self {
        Self {
            synthesizer,
            player,
            active: None,
            next_utterance: 0,
        }
    }

    /// Start speaking `text`, replacing any active utterance
    ///
    /// `Started` is sent before this returns. Must be called inside a tokio
    /// runtime.
    pub fn speak<T>(&mut self, text: &str, events: &mpsc::UnboundedSender<T>) -> u64
    where
        T: From<PlaybackEvent> + Send + 'static,
    {
        self.stop();

        self.next_utterance += 1;
        let utterance = self.next_utterance;

        let tx = events.clone();
        let emit: Emitter = Arc::new(move |event: PlaybackEvent| {
            // Receiver gone means nobody is listening any more
            let _ = tx.send(T::from(event));
        });
        let terminated = Arc::new(AtomicBool::new(false));

        emit(PlaybackEvent {
            utterance,
            kind: PlaybackEventKind::Started,
        });
        tracing::debug!(utterance, chars = text.len(), "speaking");

        let task = tokio::spawn({
            let synthesizer = Arc::clone(&self.synthesizer);
            let player = Arc::clone(&self.player);
            let emit = Arc::clone(&emit);
            let terminated = Arc::clone(&terminated);
            let text = text.to_string();

            async move {
                let outcome = match synthesizer.synthesize(&text).await {
                    Ok(audio) => player.play(audio).await,
                    Err(e) => Err(e),
                };

                let kind = match outcome {
                    Ok(()) => PlaybackEventKind::Ended { interrupted: false },
                    Err(e) => {
                        tracing::warn!(utterance, error = %e, "speech synthesis failed");
                        PlaybackEventKind::Failed(e.to_string())
                    }
                };

                if !terminated.swap(true, Ordering::SeqCst) {
                    emit(PlaybackEvent { utterance, kind });
                }
            }
        });

        self.active = Some(PlaybackHandle {
            utterance,
            task,
            terminated,
            emit,
        });

        utterance
    }

    /// Stop the active utterance; no-op when idle
    pub fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            tracing::debug!(utterance = handle.utterance(), "stopping playback");
            handle.interrupt();
        }
    }

    /// Drop the handle for `utterance` once its terminal event was handled
    pub fn release(&mut self, utterance: u64) {
        if self
            .active
            .as_ref()
            .is_some_and(|handle| handle.utterance() == utterance)
        {
            self.active = None;
        }
    }

    /// Utterance currently holding the playback resource, if any
    #[must_use]
    pub fn active_utterance(&self) -> Option<u64> {
        self.active
            .as_ref()
            .filter(|handle| !handle.is_finished())
            .map(PlaybackHandle::utterance)
    }
}
