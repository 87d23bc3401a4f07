//! One accepted connection, from handshake to teardown.
//!
//! `Connecting → Active → Closing → Closed`. The first inbound line is the
//! requested identity; registration must succeed before the session becomes
//! Active. An Active session multiplexes its TCP stream, its delivery queue
//! and the server shutdown signal in one `tokio::select!` loop, so reads and
//! writes never block each other. Closing drains already-queued frames for a
//! short grace period, unregisters, and announces the leave.

use std::net::SocketAddr;
use std::time::Duration;

use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::codec::{CodecError, LineCodec};
use super::frame::{Frame, ReplyCode};
use super::registry::{AdmissionError, SessionHandle};
use super::router::{self, Origin};
use super::server::{SharedState, SERVER_NAME};

/// Events another task can enqueue to a session.
#[derive(Debug)]
pub enum SessionEvent {
    /// Write this frame to the client.
    Deliver(Frame),
    /// Force-close the connection (kick, shutdown stragglers).
    Close,
}

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

const MAX_IDENTITY_CHARS: usize = 24;

/// Grace period for flushing queued frames during Closing.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A requested identity must be non-empty, at most 24 characters, and use
/// only alphanumerics, `-` or `_`.
pub fn validate_identity(identity: &str) -> bool {
    let count = identity.chars().count();
    count >= 1
        && count <= MAX_IDENTITY_CHARS
        && identity
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

/// Drive one client connection to completion.
pub async fn handle(
    socket: TcpStream,
    addr: SocketAddr,
    state: SharedState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), CodecError> {
    let mut framed = Framed::new(socket, LineCodec);
    let mut session_state = SessionState::Connecting;
    debug!(%addr, state = ?session_state, "awaiting identity");

    // Handshake: the first line is the requested identity.
    let identity = match framed.next().await {
        Some(Ok(line)) => line.trim().to_owned(),
        Some(Err(err)) => return Err(err),
        None => return Ok(()), // closed before the handshake
    };

    if !validate_identity(&identity) {
        framed
            .send(Frame::error(
                ReplyCode::InvalidArgument,
                "identity must be 1-24 characters: letters, digits, '-' or '_'",
            ))
            .await?;
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();

    // Admission: capacity before uniqueness, atomic under the write lock.
    // On rejection the session closes without ever registering.
    let admission = {
        let mut st = state.write().await;
        st.registry.try_register(SessionHandle {
            identity: identity.clone(),
            addr,
            tx,
        })
    };
    if let Err(err) = admission {
        let code = match err {
            AdmissionError::NameTaken => ReplyCode::NameTaken,
            AdmissionError::ServerFull => ReplyCode::ServerFull,
        };
        warn!(%addr, identity, "admission rejected: {err}");
        framed.send(Frame::error(code, err.to_string())).await?;
        return Ok(());
    }

    session_state = SessionState::Active;
    info!(%addr, identity, state = ?session_state, "session registered");

    let result = active_loop(&mut framed, &state, &identity, &mut rx, &mut shutdown).await;

    // Closing runs regardless of how the loop ended.
    session_state = SessionState::Closing;
    debug!(identity, state = ?session_state, "draining");

    let drain = async {
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Deliver(frame) = event {
                if framed.send(frame).await.is_err() {
                    break;
                }
            }
        }
        let _ = framed.flush().await;
    };
    let _ = tokio::time::timeout(DRAIN_GRACE, drain).await;

    let shutting_down = *shutdown.borrow();
    let mut st = state.write().await;
    let was_registered = st.registry.unregister(&identity).is_some();
    // A kicked session was already unregistered and announced by the router;
    // during shutdown individual leave notices would only be noise.
    if was_registered && !shutting_down {
        let notice = Frame::notice_about(identity.as_str(), format!("{identity} left the chat"));
        st.history.append(notice.clone());
        let targets = router::fanout_targets(&st, None);
        drop(st);
        router::deliver(&targets, &notice);
    } else {
        drop(st);
    }

    session_state = SessionState::Closed;
    info!(identity, state = ?session_state, "session closed");
    result
}

/// The Active phase: welcome the client, announce the join, then multiplex
/// inbound lines, queued deliveries and the shutdown signal.
async fn active_loop(
    framed: &mut Framed<TcpStream, LineCodec>,
    state: &SharedState,
    identity: &str,
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), CodecError> {
    framed
        .send(Frame::notice(
            ReplyCode::Welcome,
            format!("welcome to {}, {identity}", *SERVER_NAME),
        ))
        .await?;

    {
        let mut st = state.write().await;
        let notice = Frame::notice_about(identity, format!("{identity} joined the chat"));
        st.history.append(notice.clone());
        let targets = router::fanout_targets(&st, None);
        drop(st);
        router::deliver(&targets, &notice);
    }

    let origin = Origin::Client(identity.to_owned());

    loop {
        tokio::select! {
            inbound = framed.next() => {
                match inbound {
                    Some(Ok(line)) => {
                        for reply in router::dispatch(state, &origin, &line).await {
                            framed.send(reply).await?;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(identity, "transport error: {err}");
                        break;
                    }
                    None => break, // peer disconnected
                }
            }

            event = rx.recv() => {
                match event {
                    Some(SessionEvent::Deliver(frame)) => framed.send(frame).await?,
                    Some(SessionEvent::Close) | None => break,
                }
            }

            _ = shutdown.changed() => {
                let _ = framed
                    .send(Frame::notice(ReplyCode::Shutdown, "server is shutting down"))
                    .await;
                break;
            }
        }
    }

    Ok(())
}
