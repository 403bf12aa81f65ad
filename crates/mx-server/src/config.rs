//! Process configuration, read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:2333";
const DEFAULT_JWT_TTL_SECS: i64 = 7 * 24 * 3600;
const DEFAULT_IDENTITY_TIMEOUT_MS: u64 = 5_000;

/// Runtime settings for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PostgreSQL URL. `None` runs on in-memory stores.
    pub database_url: Option<String>,
    /// Base64 Ed25519 seed for JWT signing. `None` generates an ephemeral key.
    pub jwt_seed_b64: Option<String>,
    pub listen_addr: SocketAddr,
    /// Lifetime of issued session tokens.
    pub jwt_ttl_secs: i64,
    /// Upper bound on each identity lookup during credential verification.
    pub identity_timeout: Duration,
    /// Insert a default admin and sample content on startup.
    pub dev_seed: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_seed_b64: None,
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 2333))),
            jwt_ttl_secs: DEFAULT_JWT_TTL_SECS,
            identity_timeout: Duration::from_millis(DEFAULT_IDENTITY_TIMEOUT_MS),
            dev_seed: false,
        }
    }
}

impl ServerConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(addr) => addr
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid LISTEN_ADDR {addr:?}: {e}"))?,
            None => defaults.listen_addr,
        };

        let jwt_ttl_secs = match lookup("JWT_TTL_SECS") {
            Some(v) => v
                .parse::<i64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| anyhow::anyhow!("JWT_TTL_SECS must be a positive integer"))?,
            None => defaults.jwt_ttl_secs,
        };

        let identity_timeout = match lookup("IDENTITY_TIMEOUT_MS") {
            Some(v) => Duration::from_millis(
                v.parse::<u64>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| {
                        anyhow::anyhow!("IDENTITY_TIMEOUT_MS must be a positive integer")
                    })?,
            ),
            None => defaults.identity_timeout,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            jwt_seed_b64: lookup("JWT_SEED_B64").filter(|s| !s.is_empty()),
            listen_addr,
            jwt_ttl_secs,
            identity_timeout,
            dev_seed: lookup("DEV_SEED").is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.listen_addr.port(), 2333);
        assert_eq!(cfg.identity_timeout, Duration::from_secs(5));
        assert!(!cfg.dev_seed);
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://mx@localhost/mx"),
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("JWT_TTL_SECS", "60"),
            ("IDENTITY_TIMEOUT_MS", "250"),
            ("DEV_SEED", "1"),
        ])
        .unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://mx@localhost/mx"));
        assert_eq!(cfg.listen_addr.port(), 9000);
        assert_eq!(cfg.jwt_ttl_secs, 60);
        assert_eq!(cfg.identity_timeout, Duration::from_millis(250));
        assert!(cfg.dev_seed);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("LISTEN_ADDR", "nope")]).is_err());
        assert!(config(&[("JWT_TTL_SECS", "0")]).is_err());
        assert!(config(&[("IDENTITY_TIMEOUT_MS", "-5")]).is_err());
    }

    #[test]
    fn empty_database_url_means_memory() {
        let cfg = config(&[("DATABASE_URL", "")]).unwrap();
        assert!(cfg.database_url.is_none());
    }
}
