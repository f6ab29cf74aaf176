//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use ecomvoice::chat::{ChatBackend, ChatHistory, ChatRequest, HistoryItem};
use ecomvoice::context::{ContextSource, ProductContext};
use ecomvoice::conversation::{ConversationState, Event, Orchestrator, SessionOptions};
use ecomvoice::voice::{
    Player, SpeechCaptureAdapter, SpeechRecognizer, SpeechSynthesisAdapter, Synthesizer,
    TypedInput, TypedRecognizer, UnsupportedRecognizer,
};
use ecomvoice::{Error, Result};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};

pub const PRODUCT_URL: &str = "https://shop.example/item/1";
pub const PRODUCT_CONTENT: &str = "Blue Widget, $10";
pub const INTRO_REPLY: &str = "This is a great blue widget...";

/// Serve a router on an ephemeral loopback port, returning its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });

    format!("http://{addr}")
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Context source with a canned page
pub struct FakeContext {
    content: Option<String>,
    gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
}

impl FakeContext {
    pub fn page(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every load fails with a 404
    pub fn missing() -> Self {
        Self {
            content: None,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Hold each load until the gate is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl ContextSource for FakeContext {
    async fn load(&self, url: &str) -> Result<ProductContext> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.content {
            Some(content) => Ok(ProductContext {
                url: url.to_string(),
                content: content.clone(),
            }),
            None => Err(Error::ContextFetch("HTTP error! status: 404".to_string())),
        }
    }
}

/// Chat backend answering from a queue and recording requests
pub struct FakeChat {
    replies: Mutex<VecDeque<Result<String>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    history: Vec<HistoryItem>,
    gate: Option<Arc<Notify>>,
}

impl FakeChat {
    pub fn replying(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            history: Vec::new(),
            gate: None,
        }
    }

    pub fn with_history(mut self, items: Vec<HistoryItem>) -> Self {
        self.history = items;
        self
    }

    /// Hold each completion until the gate is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::ChatEmpty("Unknown error".to_string())))
    }

    async fn history(&self) -> Result<ChatHistory> {
        Ok(ChatHistory {
            success: true,
            kind: "chat_history".to_string(),
            items: self.history.clone(),
        })
    }
}

/// Synthesizer that "encodes" text as its bytes
pub struct FakeSynth;

#[async_trait]
impl Synthesizer for FakeSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Player that runs until `finish` is called and counts interruptions
#[derive(Default)]
pub struct FakePlayer {
    pub played: AtomicUsize,
    pub stopped: Arc<AtomicUsize>,
    gate: Notify,
    fail: bool,
}

impl FakePlayer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Let the current utterance run to its natural end
    pub fn finish(&self) {
        self.gate.notify_one();
    }

    pub fn played(&self) -> usize {
        self.played.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Counts a stop unless disarmed by a natural end
struct StopCounter(Option<Arc<AtomicUsize>>);

impl Drop for StopCounter {
    fn drop(&mut self) {
        if let Some(counter) = self.0.take() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Player for FakePlayer {
    async fn play(&self, _audio: Vec<u8>) -> Result<()> {
        self.played.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Playback("device busy".to_string()));
        }

        let mut counter = StopCounter(Some(Arc::clone(&self.stopped)));
        self.gate.notified().await;
        counter.0 = None;
        Ok(())
    }
}

/// Orchestrator wired to fakes
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub events: mpsc::UnboundedReceiver<Event>,
    pub context: Arc<FakeContext>,
    pub chat: Arc<FakeChat>,
    pub player: Arc<FakePlayer>,
    pub typed: TypedInput,
}

/// Knobs for [`Harness::build`]
pub struct Setup {
    pub context: FakeContext,
    pub chat: FakeChat,
    pub player: FakePlayer,
    pub capture_supported: bool,
    pub options: SessionOptions,
}

impl Setup {
    pub fn new(context: FakeContext, chat: FakeChat) -> Self {
        Self {
            context,
            chat,
            player: FakePlayer::default(),
            capture_supported: true,
            options: SessionOptions::default(),
        }
    }
}

impl Harness {
    /// The standard product page with the given chat replies
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self::build(Setup::new(
            FakeContext::page(PRODUCT_CONTENT),
            FakeChat::replying(replies),
        ))
    }

    pub fn build(setup: Setup) -> Self {
        let context = Arc::new(setup.context);
        let chat = Arc::new(setup.chat);
        let player = Arc::new(setup.player);

        let (typed_recognizer, typed) = TypedRecognizer::new(None);
        let recognizer: Arc<dyn SpeechRecognizer> = if setup.capture_supported {
            Arc::new(typed_recognizer)
        } else {
            Arc::new(UnsupportedRecognizer)
        };

        let synthesis = SpeechSynthesisAdapter::new(Arc::new(FakeSynth), player.clone());
        let capture = SpeechCaptureAdapter::new(recognizer);

        let (orchestrator, events) = Orchestrator::new(
            context.clone(),
            chat.clone(),
            synthesis,
            capture,
            setup.options,
        );

        Self {
            orchestrator,
            events,
            context,
            chat,
            player,
            typed,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.orchestrator.state()
    }

    /// Receive and apply one event
    pub async fn step(&mut self) {
        let event = tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed");
        self.orchestrator.handle(event);
    }

    /// Apply events until the session reaches `state`
    pub async fn settle(&mut self, state: ConversationState) {
        for _ in 0..50 {
            if self.state() == state {
                return;
            }
            self.step().await;
        }
        panic!("never reached {state}, stuck in {}", self.state());
    }

    /// Load the standard page and wait for the introduction to be spoken
    pub async fn introduce(&mut self) {
        self.orchestrator.load_product(PRODUCT_URL);
        self.settle(ConversationState::Speaking).await;
        let player = self.player.clone();
        eventually(|| player.played() >= 1).await;
    }
}
