//! The single on-the-wire message type sent to clients.
//!
//! Every line the server writes is one [`Frame`] serialized as a JSON object.
//! Inbound traffic is plain text (see [`super::codec`]); only the server side
//! of the conversation is structured. Frames are immutable once created and
//! the same type backs the history log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a frame is: a public broadcast, a private whisper, a server notice,
/// or an error reply to the issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Public,
    Whisper,
    System,
    Error,
}

/// Machine-readable reason code carried on handshake replies and error frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyCode {
    Welcome,
    NameTaken,
    ServerFull,
    UnknownCommand,
    UnknownRecipient,
    SelfWhisper,
    InvalidArgument,
    Unauthorized,
    Muted,
    Shutdown,
}

/// A single message frame.
///
/// `from: None` means the server (or the operator console) is speaking;
/// System notices about one user carry that user in `from`.
/// `to` is set only on whispers. `remaining_secs` is set only on `muted`
/// rejections so the client can render a countdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ReplyCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub body: String,
}

impl Frame {
    /// A public broadcast from a client.
    pub fn public(from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Public,
            from: Some(from.into()),
            to: None,
            code: None,
            remaining_secs: None,
            timestamp: Utc::now(),
            body: body.into(),
        }
    }

    /// A whisper between two identities. `from: None` when the operator
    /// console is the sender.
    pub fn whisper(
        from: Option<String>,
        to: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind: FrameKind::Whisper,
            from,
            to: Some(to.into()),
            code: None,
            remaining_secs: None,
            timestamp: Utc::now(),
            body: body.into(),
        }
    }

    /// A server notice (joins, leaves, kicks, operator broadcasts).
    pub fn system(body: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::System,
            from: None,
            to: None,
            code: None,
            remaining_secs: None,
            timestamp: Utc::now(),
            body: body.into(),
        }
    }

    /// A server notice about one user (join, leave, kick, mute). The
    /// subject rides in `from` so a client can tell events about itself
    /// apart from events about others without parsing the body.
    pub fn notice_about(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from: Some(subject.into()),
            ..Self::system(body)
        }
    }

    /// A coded System frame (welcome, shutdown).
    pub fn notice(code: ReplyCode, body: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            ..Self::system(body)
        }
    }

    /// An error reply, visible only to the issuer.
    pub fn error(code: ReplyCode, body: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Error,
            from: None,
            to: None,
            code: Some(code),
            remaining_secs: None,
            timestamp: Utc::now(),
            body: body.into(),
        }
    }

    /// A mute rejection carrying the whole-seconds countdown.
    pub fn muted(remaining_secs: u64) -> Self {
        Self {
            remaining_secs: Some(remaining_secs),
            ..Self::error(
                ReplyCode::Muted,
                format!("you are muted ({remaining_secs}s remaining)"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn public_frame_serializes_without_empty_fields() {
        let frame = Frame::public("alice", "hi");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"kind\":\"public\""));
        assert!(json.contains("\"from\":\"alice\""));
        // Absent options must not appear on the wire.
        assert!(!json.contains("\"to\""));
        assert!(!json.contains("\"code\""));
        assert!(!json.contains("\"remaining_secs\""));
    }

    #[test]
    fn roundtrip_through_json() {
        let frame = Frame::whisper(Some("alice".into()), "bob", "psst");
        let json = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn reply_codes_use_snake_case() {
        let frame = Frame::error(ReplyCode::NameTaken, "taken");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"code\":\"name_taken\""));
    }

    #[test]
    fn muted_frame_carries_countdown() {
        let frame = Frame::muted(4);
        assert_eq!(frame.kind, FrameKind::Error);
        assert_eq!(frame.code, Some(ReplyCode::Muted));
        assert_eq!(frame.remaining_secs, Some(4));
        assert!(frame.body.contains("4s"));
    }

    #[test]
    fn notice_about_carries_the_subject() {
        let frame = Frame::notice_about("bob", "bob has been kicked from the server");
        assert_eq!(frame.kind, FrameKind::System);
        assert_eq!(frame.from.as_deref(), Some("bob"));
    }

    #[test]
    fn system_frame_has_no_sender() {
        let frame = Frame::system("alice joined the chat");
        assert_eq!(frame.from, None);
        assert_eq!(frame.kind, FrameKind::System);
    }
}
