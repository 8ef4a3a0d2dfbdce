//! Voice announcements through an external player command.
//!
//! Synthesis and playback live outside this agent; all we do is hand the
//! text to a configured command. Failures are never fatal.

use tokio::process::Command;
use tracing::warn;

pub struct VoiceSink {
    player: Option<String>,
}

impl VoiceSink {
    pub fn disabled() -> Self {
        Self { player: None }
    }

    pub fn with_player(command: &str) -> Self {
        Self {
            player: Some(command.to_string()),
        }
    }

    /// Speak `text`. With `wait` the call returns after playback finishes.
    pub async fn play(&self, text: &str, wait: bool) {
        let Some(player) = &self.player else {
            return;
        };

        let mut cmd = Command::new(player);
        cmd.arg(text);

        if wait {
            match cmd.status().await {
                Ok(status) if !status.success() => {
                    warn!("voice player exited with {status}");
                }
                Ok(_) => {}
                Err(e) => warn!("voice player failed: {e}"),
            }
        } else if let Err(e) = cmd.spawn() {
            warn!("voice player failed to start: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_sink_is_silent() {
        // Must not block or panic.
        VoiceSink::disabled().play("hello", true).await;
    }

    #[tokio::test]
    async fn missing_player_is_non_fatal() {
        VoiceSink::with_player("/nonexistent/player")
            .play("hello", true)
            .await;
    }
}
