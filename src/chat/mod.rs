//! Chat relay core: admission, routing, moderation and history.

pub mod codec;
pub mod config;
pub mod console;
pub mod frame;
pub mod history;
pub mod moderation;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
