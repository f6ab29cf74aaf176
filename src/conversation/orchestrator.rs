//! Conversation orchestrator
//!
//! A single-owner state machine. Commands (`load_product`, `toggle`, `reset`,
//! `exit`) and completion events (`handle`) are applied one at a time on the
//! caller's task; remote work runs in spawned tasks that report back over the
//! event channel, tagged with the epoch they were started under. Results from
//! an older epoch are dropped.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::state::{ConversationSession, ConversationState, Role, Snapshot};
use crate::chat::{ChatBackend, ChatRequest, HistoryItem};
use crate::context::{ContextSource, ProductContext, validate_product_url};
use crate::error::{ErrorInfo, ErrorKind};
use crate::framing;
use crate::voice::{
    CaptureErrorCode, CaptureEvent, CaptureEventKind, PlaybackEvent, PlaybackEventKind,
    SpeechCaptureAdapter, SpeechSynthesisAdapter,
};
use crate::{Error, Result};

/// Completion of asynchronous work, fed back into [`Orchestrator::handle`]
#[derive(Debug)]
pub enum Event {
    ContextLoaded {
        epoch: u64,
        result: Result<ProductContext>,
        prior: Vec<HistoryItem>,
    },
    ChatReplied {
        epoch: u64,
        result: Result<String>,
    },
    Playback(PlaybackEvent),
    Capture(CaptureEvent),
}

impl From<PlaybackEvent> for Event {
    fn from(event: PlaybackEvent) -> Self {
        Self::Playback(event)
    }
}

impl From<CaptureEvent> for Event {
    fn from(event: CaptureEvent) -> Self {
        Self::Capture(event)
    }
}

/// Session behavior switches
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Ask the chat service not to use its stored history
    pub skip_chat_history: bool,
    /// Read remote history before loading a product page
    pub bootstrap_history: bool,
}

/// Drives one conversation about one product page
pub struct Orchestrator {
    session: ConversationSession,
    epoch: u64,
    options: SessionOptions,

    context_source: Arc<dyn ContextSource>,
    chat: Arc<dyn ChatBackend>,
    synthesis: SpeechSynthesisAdapter,
    capture: SpeechCaptureAdapter,
    capture_supported: bool,

    events: mpsc::UnboundedSender<Event>,
    in_flight: Option<JoinHandle<()>>,
    utterance: Option<u64>,
    capture_session: Option<u64>,
    snapshots: watch::Sender<Snapshot>,
}

impl Orchestrator {
    /// Create an orchestrator and the receiver its events arrive on
    ///
    /// Every event taken from the receiver must be passed to [`handle`](Self::handle).
    #[must_use]
    pub fn new(
        context_source: Arc<dyn ContextSource>,
        chat: Arc<dyn ChatBackend>,
        synthesis: SpeechSynthesisAdapter,
        capture: SpeechCaptureAdapter,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(Snapshot::default());
        let capture_supported = capture.is_supported();

        let orchestrator = Self {
            session: ConversationSession::default(),
            epoch: 0,
            options,
            context_source,
            chat,
            synthesis,
            capture,
            capture_supported,
            events,
            in_flight: None,
            utterance: None,
            capture_session: None,
            snapshots,
        };

        (orchestrator, rx)
    }

    #[must_use]
    pub const fn session(&self) -> &ConversationSession {
        &self.session
    }

    #[must_use]
    pub const fn state(&self) -> ConversationState {
        self.session.state
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub const fn capture_supported(&self) -> bool {
        self.capture_supported
    }

    /// Watch state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.session.state,
            epoch: self.epoch,
            last_error: self.session.last_error.clone(),
            turns: self.session.history.len(),
            product_url: self.session.product_url.clone(),
        }
    }

    /// Submit a product page URL
    ///
    /// A new URL replaces the live session. The live session's own URL is a
    /// no-op unless it has no context and nothing is in flight.
    pub fn load_product(&mut self, url: &str) {
        let url = match validate_product_url(url) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::warn!(url, error = %e, "rejected product URL");
                self.interrupt();
                self.fail(&e);
                self.publish();
                return;
            }
        };

        if self.session.product_url.as_deref() == Some(url.as_str()) {
            if self.session.product_context.is_some() || self.session.state.is_busy() {
                tracing::debug!(url = %url, "product already loaded");
                return;
            }
        } else {
            self.interrupt();
            self.session = ConversationSession::for_product(url);
            tracing::info!(epoch = self.epoch, "new session");
        }

        self.begin_loading();
        self.publish();
    }

    /// The single user control
    ///
    /// Stops speech or listening when active, otherwise moves the
    /// conversation forward: load the page if needed, else listen.
    pub fn toggle(&mut self) {
        match self.session.state {
            ConversationState::Speaking => {
                tracing::debug!("toggle: stop speaking");
                self.stop_speaking();
                self.session.state = ConversationState::Idle;
            }
            ConversationState::Listening => {
                tracing::debug!("toggle: stop listening");
                self.stop_listening();
                self.session.state = ConversationState::Idle;
            }
            ConversationState::LoadingContext | ConversationState::Thinking => {
                tracing::debug!(state = %self.session.state, "toggle ignored while busy");
                return;
            }
            ConversationState::Idle | ConversationState::Failed => {
                self.session.last_error = None;
                if self.session.product_context.is_some() {
                    self.start_listening();
                } else if self.session.product_url.is_some() {
                    self.begin_loading();
                } else {
                    self.fail(&Error::Validation("no product URL loaded".to_string()));
                }
            }
        }

        self.publish();
    }

    /// Clear history, context and error, cancelling all in-flight work
    ///
    /// The product URL is kept so the next toggle reloads it.
    pub fn reset(&mut self) {
        self.interrupt();
        self.session = ConversationSession {
            product_url: self.session.product_url.take(),
            ..ConversationSession::default()
        };
        tracing::info!(epoch = self.epoch, "session reset");
        self.publish();
    }

    /// Reset and forget the product URL
    pub fn exit(&mut self) {
        self.interrupt();
        self.session = ConversationSession::default();
        tracing::info!(epoch = self.epoch, "session closed");
        self.publish();
    }

    /// Apply one completion event
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::ContextLoaded {
                epoch,
                result,
                prior,
            } => {
                if self.is_stale(epoch, ConversationState::LoadingContext) {
                    return;
                }
                self.in_flight = None;
                self.on_context_loaded(result, prior);
            }
            Event::ChatReplied { epoch, result } => {
                if self.is_stale(epoch, ConversationState::Thinking) {
                    return;
                }
                self.in_flight = None;
                self.on_chat_replied(result);
            }
            Event::Playback(event) => self.on_playback(event),
            Event::Capture(event) => self.on_capture(event),
        }

        self.publish();
    }

    fn is_stale(&self, epoch: u64, expected: ConversationState) -> bool {
        if epoch != self.epoch || self.session.state != expected {
            tracing::debug!(
                epoch,
                current = self.epoch,
                state = %self.session.state,
                "discarding stale result"
            );
            return true;
        }
        false
    }

    fn on_context_loaded(&mut self, result: Result<ProductContext>, prior: Vec<HistoryItem>) {
        self.session.prior_history = prior;

        match result {
            Ok(context) => {
                tracing::info!(
                    url = %context.url,
                    chars = context.content.len(),
                    "product context loaded"
                );
                let content = framing::product_introduction(&context.content);
                self.session.product_context = Some(context);
                self.request_chat(content);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load product context");
                self.fail(&e);
            }
        }
    }

    fn on_chat_replied(&mut self, result: Result<String>) {
        match result {
            Ok(text) => {
                let sequence = self.session.append_turn(Role::Assistant, text.clone()).sequence;
                tracing::info!(sequence, chars = text.len(), "assistant replied");

                self.session.state = ConversationState::Speaking;
                self.utterance = Some(self.synthesis.speak(&text, &self.events));
            }
            Err(e) => {
                tracing::error!(error = %e, "chat completion failed");
                self.fail(&e);
            }
        }
    }

    fn on_playback(&mut self, event: PlaybackEvent) {
        if self.utterance != Some(event.utterance) {
            tracing::debug!(utterance = event.utterance, "ignoring event for old utterance");
            return;
        }

        match event.kind {
            PlaybackEventKind::Started => {
                tracing::debug!(utterance = event.utterance, "speech started");
            }
            PlaybackEventKind::Ended { interrupted } => {
                tracing::debug!(utterance = event.utterance, interrupted, "speech ended");
                self.finish_utterance(event.utterance);
                if self.session.state == ConversationState::Speaking {
                    self.session.state = ConversationState::Idle;
                }
            }
            PlaybackEventKind::Failed(reason) => {
                self.finish_utterance(event.utterance);
                if self.session.state == ConversationState::Speaking {
                    self.session.state = ConversationState::Failed;
                    self.session.last_error = Some(ErrorInfo::new(ErrorKind::Synthesis, reason));
                }
            }
        }
    }

    fn on_capture(&mut self, event: CaptureEvent) {
        if self.capture_session != Some(event.session) {
            tracing::debug!(session = event.session, "ignoring event for old capture");
            return;
        }

        match event.kind {
            CaptureEventKind::Result(text) => {
                if self.session.state != ConversationState::Listening {
                    return;
                }
                let question = text.trim();
                if question.is_empty() {
                    self.capture_failed(&CaptureErrorCode::NoSpeech);
                    return;
                }

                let sequence = self.session.append_turn(Role::User, question).sequence;
                tracing::info!(sequence, "user asked a question");

                let content = framing::customer_question(self.session.context_text(), question);
                self.request_chat(content);
            }
            CaptureEventKind::Error(CaptureErrorCode::Aborted) => {
                tracing::debug!(session = event.session, "capture aborted");
                if self.session.state == ConversationState::Listening {
                    self.session.state = ConversationState::Idle;
                }
            }
            CaptureEventKind::Error(code) => {
                if self.session.state == ConversationState::Listening {
                    self.capture_failed(&code);
                }
            }
            CaptureEventKind::End => {
                self.capture.release(event.session);
                self.capture_session = None;
                if self.session.state == ConversationState::Listening {
                    self.session.state = ConversationState::Idle;
                }
            }
        }
    }

    fn capture_failed(&mut self, code: &CaptureErrorCode) {
        tracing::warn!(error = %code, "speech capture failed");
        self.session.state = ConversationState::Idle;
        self.session.last_error = Some(ErrorInfo::new(ErrorKind::Capture, code.to_string()));
    }

    fn begin_loading(&mut self) {
        let Some(url) = self.session.product_url.clone() else {
            return;
        };

        self.session.state = ConversationState::LoadingContext;
        self.session.last_error = None;

        let epoch = self.epoch;
        let source = Arc::clone(&self.context_source);
        let chat = Arc::clone(&self.chat);
        let bootstrap = self.options.bootstrap_history;
        let events = self.events.clone();

        tracing::info!(url = %url, epoch, "loading product context");

        self.spawn_remote(async move {
            let prior = if bootstrap {
                match chat.history().await {
                    Ok(history) => history.items,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not read chat history");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };

            let result = source.load(&url).await;
            let _ = events.send(Event::ContextLoaded {
                epoch,
                result,
                prior,
            });
        });
    }

    fn request_chat(&mut self, content: String) {
        let request = match ChatRequest::new(
            content,
            self.session.product_url.as_deref(),
            self.options.skip_chat_history,
        ) {
            Ok(request) => request,
            Err(e) => {
                self.fail(&e);
                return;
            }
        };

        self.session.state = ConversationState::Thinking;

        let epoch = self.epoch;
        let chat = Arc::clone(&self.chat);
        let events = self.events.clone();

        self.spawn_remote(async move {
            let result = chat.complete(&request).await;
            let _ = events.send(Event::ChatReplied { epoch, result });
        });
    }

    fn start_listening(&mut self) {
        match self.capture.start(&self.events) {
            Ok(session) => {
                tracing::debug!(session, "listening");
                self.capture_session = Some(session);
                self.session.state = ConversationState::Listening;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot start listening");
                self.session.state = ConversationState::Idle;
                self.session.last_error = Some(ErrorInfo::from(&e));
            }
        }
    }

    /// Run remote work, replacing any previous in-flight task
    fn spawn_remote<F>(&mut self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        self.in_flight = Some(tokio::spawn(work));
    }

    fn stop_speaking(&mut self) {
        self.synthesis.stop();
        self.utterance = None;
    }

    fn stop_listening(&mut self) {
        self.capture.stop();
        self.capture_session = None;
    }

    fn finish_utterance(&mut self, utterance: u64) {
        self.synthesis.release(utterance);
        self.utterance = None;
    }

    /// Invalidate everything in flight
    fn interrupt(&mut self) {
        self.epoch += 1;
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        self.stop_speaking();
        self.stop_listening();
    }

    fn fail(&mut self, err: &Error) {
        self.session.state = ConversationState::Failed;
        self.session.last_error = Some(ErrorInfo::from(err));
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}
