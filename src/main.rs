use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use ecomvoice::chat::{ChatBackend, ChatCompletionClient};
use ecomvoice::context::{ContextSource, ProductContextLoader};
use ecomvoice::conversation::{ConversationState, Orchestrator, SessionOptions};
use ecomvoice::voice::{
    self, SpeechCaptureAdapter, SpeechSynthesisAdapter, Synthesizer, TextToSpeech, TypedInput,
};
use ecomvoice::{Config, ErrorInfo, RelayServer};

/// EcomVoice - talk to a product page
#[derive(Parser)]
#[command(name = "ecomvoice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive voice session (default)
    Talk {
        /// Product page to load right away
        url: Option<String>,
    },
    /// Run the chat relay server
    Relay {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the extracted content of a product page
    Fetch {
        /// Product page URL
        url: String,
    },
    /// Print the chat history stored by the chat service
    History,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,ecomvoice=info",
        1 => "info,ecomvoice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Talk { url: None }) {
        Command::Talk { url } => talk(config, url).await,
        Command::Relay { port } => relay(config, port).await,
        Command::Fetch { url } => fetch(&config, &url).await,
        Command::History => history(&config).await,
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

/// One line of terminal input
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Open(String),
    Toggle,
    Say(String),
    Reset,
    Exit,
    Status,
    History,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, r)| (c, r.trim()));

    match command.to_lowercase().as_str() {
        "" | "toggle" | "t" => Input::Toggle,
        "open" | "load" if !rest.is_empty() => Input::Open(rest.to_string()),
        "say" | "ask" if !rest.is_empty() => Input::Say(rest.to_string()),
        "reset" => Input::Reset,
        "exit" => Input::Exit,
        "status" => Input::Status,
        "history" => Input::History,
        "help" | "?" => Input::Help,
        "quit" | "q" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  open URL    load a product page");
    println!("  <enter>     toggle: stop speaking / stop listening / listen");
    println!("  say TEXT    ask a question (typed capture)");
    println!("  reset       clear the conversation");
    println!("  exit        close the product page");
    println!("  status      show the session state");
    println!("  history     show the conversation so far");
    println!("  quit        leave");
}

/// What has already been printed
#[derive(Default)]
struct View {
    state: ConversationState,
    turns: usize,
    error: Option<ErrorInfo>,
}

impl View {
    fn render(&mut self, orchestrator: &Orchestrator) {
        let session = orchestrator.session();

        if session.history.len() < self.turns {
            self.turns = 0;
        }
        for turn in &session.history[self.turns..] {
            println!("{:>9}: {}", turn.role, turn.text);
        }
        self.turns = session.history.len();

        if session.state != self.state {
            println!("[{}]", session.state);
            self.state = session.state;
        }

        if session.last_error != self.error {
            if let Some(error) = &session.last_error {
                println!("! {} ({})", error.user_message(), error.message);
            }
            self.error.clone_from(&session.last_error);
        }
    }
}

async fn talk(config: Config, url: Option<String>) -> anyhow::Result<()> {
    let timeout = config.session.request_timeout;

    let loader = ProductContextLoader::new(&config.content_url, timeout)?;
    let chat = ChatCompletionClient::new(&config.relay_url, timeout)?;
    let tts = TextToSpeech::from_config(&config.voice, &config.api_keys)?;
    let player = voice::player_from_config(&config.voice)?;
    let (recognizer, typed) = voice::recognizer_from_config(&config.voice, &config.api_keys)?;

    let options = SessionOptions {
        skip_chat_history: config.session.skip_chat_history,
        bootstrap_history: config.session.bootstrap_history,
    };

    let (mut orchestrator, mut events) = Orchestrator::new(
        Arc::new(loader),
        Arc::new(chat),
        SpeechSynthesisAdapter::new(Arc::new(tts), player),
        SpeechCaptureAdapter::new(recognizer),
        options,
    );
    let mut snapshots = orchestrator.subscribe();
    let mut view = View::default();

    tracing::info!(
        relay = %config.relay_url,
        capture = ?config.voice.capture,
        capture_supported = orchestrator.capture_supported(),
        "session ready"
    );
    print_help();

    if let Some(url) = url {
        orchestrator.load_product(&url);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Input::Open(url) => orchestrator.load_product(&url),
                    Input::Toggle => orchestrator.toggle(),
                    Input::Say(text) => say(&mut orchestrator, typed.as_ref(), text),
                    Input::Reset => orchestrator.reset(),
                    Input::Exit => orchestrator.exit(),
                    Input::Status => print_status(&orchestrator),
                    Input::History => print_history(&orchestrator),
                    Input::Help => print_help(),
                    Input::Quit => break,
                    Input::Unknown(line) => println!("unknown command: {line} (try `help`)"),
                }
            }
            Some(event) = events.recv() => orchestrator.handle(event),
            Ok(()) = snapshots.changed() => view.render(&orchestrator),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    orchestrator.exit();
    Ok(())
}

/// Ask a typed question, moving the session into listening first
fn say(orchestrator: &mut Orchestrator, typed: Option<&TypedInput>, text: String) {
    let Some(input) = typed else {
        println!("typed input is disabled; set voice.capture = \"typed\"");
        return;
    };

    if orchestrator.state() == ConversationState::Speaking {
        orchestrator.toggle();
    }
    if matches!(
        orchestrator.state(),
        ConversationState::Idle | ConversationState::Failed
    ) {
        orchestrator.toggle();
    }

    if orchestrator.state() == ConversationState::Listening {
        input.say(text);
    } else {
        println!("not listening right now ({})", orchestrator.state());
    }
}

fn print_status(orchestrator: &Orchestrator) {
    let snapshot = orchestrator.snapshot();
    println!("state:   {}", snapshot.state);
    println!(
        "product: {}",
        snapshot.product_url.as_deref().unwrap_or("(none)")
    );
    println!("turns:   {}", snapshot.turns);
    if let Some(error) = snapshot.last_error {
        println!("error:   {} ({})", error.user_message(), error.message);
    }
}

fn print_history(orchestrator: &Orchestrator) {
    let session = orchestrator.session();
    if !session.prior_history.is_empty() {
        println!("({} earlier messages stored remotely)", session.prior_history.len());
    }
    if session.history.is_empty() {
        println!("(no conversation yet)");
    }
    for turn in &session.history {
        println!("{:>3} {:>9}: {}", turn.sequence, turn.role, turn.text);
    }
}

async fn relay(mut config: Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }

    let server = RelayServer::new(&config.server, config.session.request_timeout)?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}

async fn fetch(config: &Config, url: &str) -> anyhow::Result<()> {
    let loader = ProductContextLoader::new(&config.content_url, config.session.request_timeout)?;
    let context = loader.load(url).await?;
    println!("{}", context.content);
    Ok(())
}

async fn history(config: &Config) -> anyhow::Result<()> {
    let chat = ChatCompletionClient::new(&config.relay_url, config.session.request_timeout)?;
    let history = chat.history().await?;

    if history.items.is_empty() {
        println!("(no stored history)");
    }
    for item in history.items {
        println!("[{}] {}: {}", item.created_at, item.role, item.content);
    }

    Ok(())
}

/// Synthesize and play one sentence
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::from_config(&config.voice, &config.api_keys)?;
    let player = voice::player_from_config(&config.voice)?;

    println!("Synthesizing speech...");
    let audio = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", audio.len());

    println!("Playing audio...");
    player.play(audio).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input(""), Input::Toggle);
        assert_eq!(parse_input("  toggle "), Input::Toggle);
        assert_eq!(
            parse_input("open https://shop.example/item/1"),
            Input::Open("https://shop.example/item/1".to_string())
        );
        assert_eq!(
            parse_input("say what color is it?"),
            Input::Say("what color is it?".to_string())
        );
        assert_eq!(parse_input("RESET"), Input::Reset);
        assert_eq!(parse_input("quit"), Input::Quit);
    }

    #[test]
    fn test_commands_missing_argument_are_unknown() {
        assert_eq!(parse_input("open"), Input::Unknown("open".to_string()));
        assert_eq!(parse_input("say   "), Input::Unknown("say".to_string()));
    }
}
