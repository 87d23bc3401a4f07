//! A small TCP chat relay.
//!
//! The server accepts line-oriented TCP connections, gives each one a unique
//! display identity, routes public and private messages among the connected
//! clients, and lets a process-local operator console moderate sessions
//! (kick, mute, list) in real time.

pub mod chat;
