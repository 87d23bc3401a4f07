//! Runtime settings: bind host, port and client capacity.
//!
//! How these values are gathered interactively belongs to the setup
//! front-end; the core consumes them from the environment (`COVE_HOST`,
//! `COVE_PORT`, `COVE_MAX_CLIENTS`) with validated fallbacks.

use tracing::warn;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 55555;
pub const DEFAULT_MAX_CLIENTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Must be at least 1.
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the environment, falling back to defaults for
    /// absent or invalid values (invalid values are logged, not fatal).
    pub fn from_env() -> Self {
        let host = std::env::var("COVE_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.into());

        let port = match std::env::var("COVE_PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(%raw, "invalid COVE_PORT, using default {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            Err(_) => DEFAULT_PORT,
        };

        let max_clients = match std::env::var("COVE_MAX_CLIENTS") {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    warn!(%raw, "invalid COVE_MAX_CLIENTS, using default {DEFAULT_MAX_CLIENTS}");
                    DEFAULT_MAX_CLIENTS
                }
            },
            Err(_) => DEFAULT_MAX_CLIENTS,
        };

        Self {
            host,
            port,
            max_clients,
        }
    }

    /// The socket address to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Convenience for tests: bind an ephemeral port on loopback.
    pub fn ephemeral(max_clients: usize) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_clients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_clients, DEFAULT_MAX_CLIENTS);
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = ServerConfig {
            host: "0.0.0.0".into(),
            port: 6667,
            max_clients: 10,
        };
        assert_eq!(config.bind_addr(), "0.0.0.0:6667");
    }

    #[test]
    fn ephemeral_uses_port_zero() {
        let config = ServerConfig::ephemeral(2);
        assert_eq!(config.port, 0);
        assert_eq!(config.max_clients, 2);
    }
}
