//! Audio players for synthesized speech

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::{Error, Result};

/// Players that accept MP3 on stdin, in order of preference
const KNOWN_PLAYERS: &[(&str, &[&str])] = &[
    ("mpv", &["--no-video", "--really-quiet", "-"]),
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet", "-"]),
    ("mpg123", &["-q", "-"]),
];

/// Plays encoded audio to completion
///
/// Dropping the returned future stops playback.
#[async_trait]
pub trait Player: Send + Sync {
    async fn play(&self, audio: Vec<u8>) -> Result<()>;
}

/// Pipes audio into an external player process
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandPlayer {
    /// Use an explicit command line, e.g. `"mpv --really-quiet -"`
    ///
    /// # Errors
    ///
    /// Returns error if the command is empty or the program is not on PATH
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| Error::Config("player command is empty".to_string()))?;

        let program = which::which(name)
            .map_err(|e| Error::Config(format!("player '{name}' not found: {e}")))?;

        Ok(Self {
            program,
            args: parts.map(ToString::to_string).collect(),
        })
    }

    /// Pick the first known player found on PATH
    ///
    /// # Errors
    ///
    /// Returns error if none is installed
    pub fn detect() -> Result<Self> {
        for (name, args) in KNOWN_PLAYERS {
            if let Ok(program) = which::which(name) {
                tracing::debug!(player = %program.display(), "using audio player");
                return Ok(Self {
                    program,
                    args: args.iter().map(ToString::to_string).collect(),
                });
            }
        }

        Err(Error::Config(
            "no audio player found (install mpv, ffplay or mpg123, or set voice.player)"
                .to_string(),
        ))
    }
}

#[async_trait]
impl Player for CommandPlayer {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        if audio.is_empty() {
            return Ok(());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Playback(format!("failed to start player: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&audio)
                .await
                .map_err(|e| Error::Playback(format!("failed to feed player: {e}")))?;
            // Closing stdin lets the player reach end of stream
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Playback(e.to_string()))?;

        if !status.success() {
            return Err(Error::Playback(format!("player exited with {status}")));
        }

        tracing::debug!(bytes = audio.len(), "playback complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(CommandPlayer::new("   "), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_program_rejected() {
        assert!(matches!(
            CommandPlayer::new("definitely-not-an-audio-player-xyz -"),
            Err(Error::Config(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_player_runs_to_completion() {
        let player = CommandPlayer::new("cat").unwrap();
        player.play(b"ID3fake".to_vec()).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_player_reports_failure() {
        let player = CommandPlayer::new("false").unwrap();
        assert!(matches!(
            player.play(b"ID3fake".to_vec()).await,
            Err(Error::Playback(_))
        ));
    }
}
