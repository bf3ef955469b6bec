//! Terminal client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero
//! configuration against the public endpoint.

use std::path::PathBuf;
use std::time::Duration;

use cloudchat_client::ReconcilerConfig;
use cloudchat_net::StoreConfig;
use cloudchat_shared::constants::{
    DEFAULT_ENDPOINT, DEFAULT_PROTOCOL_USER, POLL_INTERVAL, READ_TIMEOUT, WRITE_TIMEOUT,
};

/// Endpoint value that selects the in-process service instead of the network.
pub const MEMORY_ENDPOINT: &str = "memory";

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// WebSocket endpoint, or `memory` for an in-process service.
    /// Env: `CLOUDCHAT_ENDPOINT`
    pub endpoint: String,

    /// Account id used on the wire.
    /// Env: `CLOUDCHAT_USER_ID`
    pub user_id: String,

    /// Name shown next to sent messages; empty means anonymous.
    /// Env: `CLOUDCHAT_USERNAME`
    pub username: String,

    /// Whether this user may recall anyone's messages.
    /// Env: `CLOUDCHAT_ADMIN` (true/false)
    pub admin: bool,

    /// Directory of the local database; the platform data dir when unset.
    /// Env: `CLOUDCHAT_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Keep the room list and caches in memory only.
    /// Env: `CLOUDCHAT_EPHEMERAL` (true/false)
    pub ephemeral: bool,

    /// Env: `CLOUDCHAT_POLL_SECS`
    pub poll_interval: Duration,

    /// Env: `CLOUDCHAT_READ_TIMEOUT_SECS`
    pub read_timeout: Duration,

    /// Env: `CLOUDCHAT_WRITE_TIMEOUT_SECS`
    pub write_timeout: Duration,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_id: DEFAULT_PROTOCOL_USER.to_string(),
            username: String::new(),
            admin: false,
            data_dir: None,
            ephemeral: false,
            poll_interval: POLL_INTERVAL,
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("CLOUDCHAT_ENDPOINT") {
            if !endpoint.is_empty() {
                config.endpoint = endpoint;
            }
        }

        if let Some(user_id) = lookup("CLOUDCHAT_USER_ID") {
            if !user_id.is_empty() {
                config.user_id = user_id;
            }
        }

        if let Some(username) = lookup("CLOUDCHAT_USERNAME") {
            config.username = username.trim().to_string();
        }

        if let Some(val) = lookup("CLOUDCHAT_ADMIN") {
            config.admin = is_truthy(&val);
        }

        if let Some(dir) = lookup("CLOUDCHAT_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(val) = lookup("CLOUDCHAT_EPHEMERAL") {
            config.ephemeral = is_truthy(&val);
        }

        for (key, slot) in [
            ("CLOUDCHAT_POLL_SECS", &mut config.poll_interval),
            ("CLOUDCHAT_READ_TIMEOUT_SECS", &mut config.read_timeout),
            ("CLOUDCHAT_WRITE_TIMEOUT_SECS", &mut config.write_timeout),
        ] {
            if let Some(val) = lookup(key) {
                match parse_secs(&val) {
                    Some(duration) => *slot = duration,
                    None => tracing::warn!(key, value = %val, "Invalid duration, using default"),
                }
            }
        }

        config
    }

    pub fn uses_memory_cloud(&self) -> bool {
        self.endpoint == MEMORY_ENDPOINT
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            endpoint: self.endpoint.clone(),
            protocol_user: self.user_id.clone(),
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            ..StoreConfig::default()
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            poll_interval: self.poll_interval,
            ..ReconcilerConfig::default()
        }
    }
}

fn is_truthy(val: &str) -> bool {
    !matches!(val.trim(), "" | "false" | "0" | "no")
}

fn parse_secs(val: &str) -> Option<Duration> {
    val.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs > 0.0 && *secs < 1e9)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> CliConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CliConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.user_id, "16641346");
        assert!(!config.uses_memory_cloud());
        assert!(!config.admin);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("CLOUDCHAT_ENDPOINT", "memory"),
            ("CLOUDCHAT_USERNAME", " alice "),
            ("CLOUDCHAT_ADMIN", "true"),
            ("CLOUDCHAT_DATA_DIR", "/tmp/cc"),
            ("CLOUDCHAT_EPHEMERAL", "1"),
            ("CLOUDCHAT_POLL_SECS", "2.5"),
            ("CLOUDCHAT_WRITE_TIMEOUT_SECS", "10"),
        ]);

        assert!(config.uses_memory_cloud());
        assert_eq!(config.username, "alice");
        assert!(config.admin);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/cc")));
        assert!(config.ephemeral);
        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.store_config().write_timeout, Duration::from_secs(10));
        assert_eq!(config.reconciler_config().poll_interval, Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("CLOUDCHAT_POLL_SECS", "soon"),
            ("CLOUDCHAT_READ_TIMEOUT_SECS", "-3"),
            ("CLOUDCHAT_ADMIN", "false"),
        ]);
        assert_eq!(config.poll_interval, POLL_INTERVAL);
        assert_eq!(config.read_timeout, READ_TIMEOUT);
        assert!(!config.admin);
    }
}
