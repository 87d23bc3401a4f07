//! Operator console on stdin.
//!
//! Every plain line is a server broadcast and every `/`-prefixed line is a
//! privileged command; both flow through the router as `Origin::Operator`.
//! The console attaches its own printer queue to the shared state so it sees
//! the message stream and every join/leave/kick/mute notice.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use super::frame::{Frame, FrameKind};
use super::router::{self, Origin};
use super::server::SharedState;
use super::session::SessionEvent;

const HELP_TEXT: &str = "\
moderation commands:
  /w <user> <message>   whisper to a user
  /kick <user>          kick a user from the server
  /mute <user> <secs>   mute a user for the given seconds
  /unmute <user>        unmute a user
  /list                 list connected users
  /help                 show this help
console commands:
  shutdown              gracefully shut down the server
  quit                  close the console (server keeps running)";

/// Render a frame for the console.
pub fn render(frame: &Frame) -> String {
    let time = frame.timestamp.format("%H:%M:%S");
    match frame.kind {
        FrameKind::Public => format!(
            "[{time}] {}: {}",
            frame.from.as_deref().unwrap_or("?"),
            frame.body
        ),
        FrameKind::Whisper => format!(
            "[{time}] [PRIVATE] {} -> {}: {}",
            frame.from.as_deref().unwrap_or("server"),
            frame.to.as_deref().unwrap_or("?"),
            frame.body
        ),
        FrameKind::System => format!("[{time}] [SYSTEM] {}", frame.body),
        FrameKind::Error => format!("[{time}] [ERROR] {}", frame.body),
    }
}

/// Read operator input until `quit`, `shutdown` or end of stdin.
/// `shutdown` requests a graceful server stop via `control_tx`.
pub async fn run(state: SharedState, control_tx: mpsc::UnboundedSender<()>) {
    // Attach the printer queue so fan-out reaches the console.
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.write().await.operator_tx = Some(tx);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let SessionEvent::Deliver(frame) = event {
                println!("{}", render(&frame));
            }
        }
    });

    println!("type a message to broadcast, /help for commands, shutdown to stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // stdin closed
            Err(err) => {
                warn!("console read error: {err}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.to_ascii_lowercase().as_str() {
            "quit" => {
                println!("closing console (server keeps running)");
                break;
            }
            "shutdown" => {
                let _ = control_tx.send(());
                break;
            }
            "/help" => println!("{HELP_TEXT}"),
            _ => {
                for reply in router::dispatch(&state, &Origin::Operator, line).await {
                    println!("{}", render(&reply));
                }
            }
        }
    }

    // Detach the printer when the console goes away.
    state.write().await.operator_tx = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::frame::ReplyCode;

    #[test]
    fn renders_public_with_sender() {
        let line = render(&Frame::public("alice", "hi all"));
        assert!(line.ends_with("alice: hi all"));
    }

    #[test]
    fn renders_system_with_prefix() {
        let line = render(&Frame::system("bob joined the chat"));
        assert!(line.contains("[SYSTEM] bob joined the chat"));
    }

    #[test]
    fn renders_whisper_with_both_parties() {
        let line = render(&Frame::whisper(Some("alice".into()), "bob", "psst"));
        assert!(line.contains("[PRIVATE] alice -> bob: psst"));
    }

    #[test]
    fn renders_errors_distinctly() {
        let line = render(&Frame::error(ReplyCode::UnknownCommand, "unknown command: /x"));
        assert!(line.contains("[ERROR] unknown command: /x"));
    }
}
