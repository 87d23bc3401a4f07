//! Interprets inbound lines and fans out deliveries.
//!
//! Every line from a registered session or the operator console goes through
//! [`dispatch`]: either a broadcast, a whisper, or a moderation command.
//! Direct replies to the issuer (errors, command results, the sender's copy
//! of a whisper) are returned; everything else is enqueued to the recipients'
//! session queues.
//!
//! Fan-out discipline: recipient queues are snapshotted under the state lock,
//! the lock is released, and only then are frames enqueued. The lock is
//! never held across delivery.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::frame::{Frame, ReplyCode};
use super::server::{ServerState, SharedState};
use super::session::SessionEvent;

/// Who is speaking: the privileged console or a registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Operator,
    Client(String),
}

impl Origin {
    pub fn is_operator(&self) -> bool {
        matches!(self, Self::Operator)
    }

    /// The sender identity, or `None` for the operator.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Operator => None,
            Self::Client(id) => Some(id),
        }
    }
}

/// A parsed `/`-command. Command names are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Whisper { target: String, body: String },
    List,
    Kick { target: String },
    Mute { target: String, seconds: u64 },
    Unmute { target: String },
}

/// Recoverable command failures, surfaced only to the issuer. Never fatal
/// to the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("no such user: {0}")]
    UnknownRecipient(String),
    #[error("you cannot whisper to yourself")]
    SelfWhisper,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("you are not allowed to do that")]
    Unauthorized,
    #[error("you are muted ({remaining}s remaining)")]
    Muted { remaining: u64 },
}

impl CommandError {
    pub fn code(&self) -> ReplyCode {
        match self {
            Self::UnknownCommand(_) => ReplyCode::UnknownCommand,
            Self::UnknownRecipient(_) => ReplyCode::UnknownRecipient,
            Self::SelfWhisper => ReplyCode::SelfWhisper,
            Self::InvalidArgument(_) => ReplyCode::InvalidArgument,
            Self::Unauthorized => ReplyCode::Unauthorized,
            Self::Muted { .. } => ReplyCode::Muted,
        }
    }

    /// The error frame sent back to the issuer.
    pub fn into_frame(self) -> Frame {
        match self {
            Self::Muted { remaining } => Frame::muted(remaining),
            other => {
                let body = other.to_string();
                Frame::error(other.code(), body)
            }
        }
    }
}

impl Command {
    /// Parse a `/`-prefixed line. The trailing message of a whisper keeps
    /// its internal spacing.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let trimmed = line.trim();
        let (name, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (trimmed, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "/w" => {
                let (target, body) = rest
                    .split_once(char::is_whitespace)
                    .map(|(t, b)| (t, b.trim_start()))
                    .ok_or_else(|| {
                        CommandError::InvalidArgument("usage: /w <user> <message>".into())
                    })?;
                if target.is_empty() || body.is_empty() {
                    return Err(CommandError::InvalidArgument(
                        "usage: /w <user> <message>".into(),
                    ));
                }
                Ok(Self::Whisper {
                    target: target.to_owned(),
                    body: body.to_owned(),
                })
            }
            "/list" => Ok(Self::List),
            "/kick" => match rest.split_whitespace().next() {
                Some(target) => Ok(Self::Kick {
                    target: target.to_owned(),
                }),
                None => Err(CommandError::InvalidArgument("usage: /kick <user>".into())),
            },
            "/mute" => {
                let mut args = rest.split_whitespace();
                let (Some(target), Some(raw_secs)) = (args.next(), args.next()) else {
                    return Err(CommandError::InvalidArgument(
                        "usage: /mute <user> <seconds>".into(),
                    ));
                };
                let seconds: u64 = raw_secs.parse().map_err(|_| {
                    CommandError::InvalidArgument("mute time must be a whole number of seconds".into())
                })?;
                if seconds == 0 {
                    return Err(CommandError::InvalidArgument(
                        "mute time must be positive".into(),
                    ));
                }
                Ok(Self::Mute {
                    target: target.to_owned(),
                    seconds,
                })
            }
            "/unmute" => match rest.split_whitespace().next() {
                Some(target) => Ok(Self::Unmute {
                    target: target.to_owned(),
                }),
                None => Err(CommandError::InvalidArgument(
                    "usage: /unmute <user>".into(),
                )),
            },
            other => Err(CommandError::UnknownCommand(other.to_owned())),
        }
    }
}

/// Route one inbound line. Returns the direct replies for the issuer.
pub async fn dispatch(state: &SharedState, origin: &Origin, line: &str) -> Vec<Frame> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    if line.starts_with('/') {
        match Command::parse(line) {
            Ok(command) => run_command(state, origin, command).await,
            Err(err) => vec![err.into_frame()],
        }
    } else {
        relay_text(state, origin, line).await
    }
}

/// Plain text: broadcast to every active session (including the sender, so
/// they see their own message land in order). Client senders are subject to
/// the mute check; the operator is not.
async fn relay_text(state: &SharedState, origin: &Origin, body: &str) -> Vec<Frame> {
    let mut st = state.write().await;

    let frame = match origin {
        Origin::Client(identity) => {
            if let Some(remaining) = st.moderation.remaining_mute(identity) {
                // Dropped: not broadcast, not logged.
                return vec![CommandError::Muted { remaining }.into_frame()];
            }
            Frame::public(identity.clone(), body)
        }
        Origin::Operator => Frame::system(body),
    };

    st.history.append(frame.clone());
    let targets = fanout_targets(&st, None);
    drop(st);

    deliver(&targets, &frame);
    Vec::new()
}

async fn run_command(state: &SharedState, origin: &Origin, command: Command) -> Vec<Frame> {
    match command {
        Command::Whisper { target, body } => whisper(state, origin, target, body).await,
        Command::List => list(state).await,
        Command::Kick { target } => kick(state, origin, target).await,
        Command::Mute { target, seconds } => mute(state, origin, target, seconds).await,
        Command::Unmute { target } => unmute(state, origin, target).await,
    }
}

async fn whisper(
    state: &SharedState,
    origin: &Origin,
    target: String,
    body: String,
) -> Vec<Frame> {
    let mut st = state.write().await;

    if let Origin::Client(identity) = origin {
        if *identity == target {
            return vec![CommandError::SelfWhisper.into_frame()];
        }
        if let Some(remaining) = st.moderation.remaining_mute(identity) {
            return vec![CommandError::Muted { remaining }.into_frame()];
        }
    }

    let Some(handle) = st.registry.lookup(&target) else {
        return vec![CommandError::UnknownRecipient(target).into_frame()];
    };
    let target_tx = handle.tx.clone();

    let frame = Frame::whisper(origin.identity().map(str::to_owned), target, body);
    st.history.append(frame.clone());
    drop(st);

    deliver(&[target_tx], &frame);
    // The sender's copy goes back as a direct reply.
    vec![frame]
}

/// `/list` replies only to the requester and leaves no history entry.
async fn list(state: &SharedState) -> Vec<Frame> {
    let st = state.read().await;
    let entries: Vec<String> = st
        .registry
        .list()
        .into_iter()
        .map(|identity| match st.moderation.remaining_mute(&identity) {
            Some(secs) => format!("{identity} (muted {secs}s)"),
            None => format!("{identity} (active)"),
        })
        .collect();
    drop(st);

    let body = if entries.is_empty() {
        "no users connected".to_owned()
    } else {
        format!("connected users: {}", entries.join(", "))
    };
    vec![Frame::system(body)]
}

async fn kick(state: &SharedState, origin: &Origin, target: String) -> Vec<Frame> {
    if !origin.is_operator() {
        return vec![CommandError::Unauthorized.into_frame()];
    }

    let mut st = state.write().await;
    // Idempotent: kicking someone who already left is a no-op, reported as such.
    let Some(handle) = st.registry.unregister(&target) else {
        return vec![CommandError::UnknownRecipient(target).into_frame()];
    };

    let notice = Frame::notice_about(target.as_str(), format!("{target} has been kicked from the server"));
    st.history.append(notice.clone());
    let targets = fanout_targets(&st, None);
    drop(st);

    // Personal notice first, then the close signal.
    deliver(
        &[handle.tx.clone()],
        &Frame::system("you have been kicked from the server"),
    );
    if handle.tx.send(SessionEvent::Close).is_err() {
        debug!(identity = %target, "session already gone before close");
    }
    deliver(&targets, &notice);

    info!(identity = %target, "kicked");
    vec![Frame::system(format!("user {target} kicked"))]
}

async fn mute(state: &SharedState, origin: &Origin, target: String, seconds: u64) -> Vec<Frame> {
    if !origin.is_operator() {
        return vec![CommandError::Unauthorized.into_frame()];
    }

    let mut st = state.write().await;
    // The table is keyed by identity, not by connection: muting an absent
    // identity takes effect if they are connected when they next send.
    st.moderation.mute(&target, Duration::from_secs(seconds));

    let notice = Frame::notice_about(target.as_str(), format!("{target} has been muted for {seconds} seconds"));
    st.history.append(notice.clone());
    let personal = st.registry.lookup(&target).map(|h| h.tx.clone());
    let targets = fanout_targets(&st, Some(target.as_str()));
    drop(st);

    if let Some(tx) = personal {
        deliver(
            &[tx],
            &Frame::system(format!("you have been muted for {seconds} seconds")),
        );
    }
    deliver(&targets, &notice);

    info!(identity = %target, seconds, "muted");
    vec![Frame::system(format!("user {target} muted for {seconds} seconds"))]
}

async fn unmute(state: &SharedState, origin: &Origin, target: String) -> Vec<Frame> {
    if !origin.is_operator() {
        return vec![CommandError::Unauthorized.into_frame()];
    }

    let mut st = state.write().await;
    if !st.moderation.unmute(&target) {
        return vec![Frame::system(format!("user {target} is not muted"))];
    }

    let notice = Frame::notice_about(target.as_str(), format!("{target} has been unmuted"));
    st.history.append(notice.clone());
    let personal = st.registry.lookup(&target).map(|h| h.tx.clone());
    let targets = fanout_targets(&st, Some(target.as_str()));
    drop(st);

    if let Some(tx) = personal {
        deliver(&[tx], &Frame::system("you have been unmuted"));
    }
    deliver(&targets, &notice);

    info!(identity = %target, "unmuted");
    vec![Frame::system(format!("user {target} unmuted"))]
}

/// Snapshot the recipient queues: every registered session except `exclude`,
/// plus the operator console printer when attached.
pub(crate) fn fanout_targets(
    st: &ServerState,
    exclude: Option<&str>,
) -> Vec<mpsc::UnboundedSender<SessionEvent>> {
    let mut targets: Vec<_> = st
        .registry
        .handles()
        .filter(|h| exclude != Some(h.identity.as_str()))
        .map(|h| h.tx.clone())
        .collect();
    if let Some(op) = &st.operator_tx {
        targets.push(op.clone());
    }
    targets
}

/// Enqueue a frame to each snapshotted queue. A receiver that disappeared
/// mid-broadcast just drops the send.
pub(crate) fn deliver(targets: &[mpsc::UnboundedSender<SessionEvent>], frame: &Frame) {
    for tx in targets {
        if tx.send(SessionEvent::Deliver(frame.clone())).is_err() {
            debug!("dropping frame for a closed session");
        }
    }
}
