//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the confab server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-sink event queue depth; events beyond it are dropped.
    pub event_buffer: usize,
    /// Max framed unit size in bytes.
    pub max_unit_size: usize,
}

impl ServerConfig {
    /// The bind address in `host:port` form.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            event_buffer: 64,
            max_unit_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}
