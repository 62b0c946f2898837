//! `[serve]` section configuration.
//!
//! Settings of the rewrite and admin server.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 5279                 # HTTP port number
//! token = "change-me"         # Bearer token of the background endpoint
//! nonce_secret = "change-me"  # Key of admin action nonces
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the server accessible from LAN.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// HTTP port number.
    pub port: u16,

    /// Bearer token required by `POST /api/upload_cache`.
    /// Empty disables the endpoint.
    pub token: String,

    /// Secret keying admin nonces.
    pub nonce_secret: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 5279,
            token: String::new(),
            nonce_secret: String::new(),
        }
    }
}

impl ServeConfig {
    const NONCE_SECRET: FieldPath = FieldPath::new("serve.nonce_secret");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if !self.nonce_secret.is_empty() && self.nonce_secret.len() < 8 {
            diag.error_with_hint(
                Self::NONCE_SECRET,
                "secret is too short",
                "use at least 8 characters",
            );
        }
    }
}
