//! The connection roster: who is connected, under which identity.
//!
//! Maps display identities to live session handles, enforcing capacity and
//! case-sensitive name uniqueness. Registration is atomic with respect to
//! concurrent admissions because every mutation happens under the server
//! state write lock; two sessions racing for the same name cannot both win.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use super::session::SessionEvent;

/// Handle to a registered session: everything the router needs to deliver.
///
/// The receiving end of `tx` is owned exclusively by the session task; the
/// rest of the server only enqueues.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub identity: String,
    pub addr: SocketAddr,
    pub tx: mpsc::UnboundedSender<SessionEvent>,
}

/// Why an admission was rejected. Fatal to the rejected connection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("that name is already in use")]
    NameTaken,
    #[error("the server is full")]
    ServerFull,
}

/// Insertion-ordered registry of live sessions.
#[derive(Debug)]
pub struct Registry {
    max_clients: usize,
    sessions: Vec<SessionHandle>,
}

impl Registry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            max_clients,
            sessions: Vec::new(),
        }
    }

    /// Claim an identity. Capacity is checked before uniqueness so a full
    /// server reports `ServerFull` even for a name that is also taken.
    pub fn try_register(&mut self, handle: SessionHandle) -> Result<(), AdmissionError> {
        if self.sessions.len() >= self.max_clients {
            return Err(AdmissionError::ServerFull);
        }
        if self.sessions.iter().any(|s| s.identity == handle.identity) {
            return Err(AdmissionError::NameTaken);
        }
        self.sessions.push(handle);
        Ok(())
    }

    /// Release an identity. Returns the handle if it was registered, which
    /// makes disconnect cleanup idempotent with `/kick`.
    pub fn unregister(&mut self, identity: &str) -> Option<SessionHandle> {
        let pos = self.sessions.iter().position(|s| s.identity == identity)?;
        Some(self.sessions.remove(pos))
    }

    pub fn lookup(&self, identity: &str) -> Option<&SessionHandle> {
        self.sessions.iter().find(|s| s.identity == identity)
    }

    /// Connected identities in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.identity.clone()).collect()
    }

    /// All live handles, for broadcast snapshots.
    pub fn handles(&self) -> impl Iterator<Item = &SessionHandle> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
