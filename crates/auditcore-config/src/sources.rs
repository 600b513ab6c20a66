// Configuration loading and environment overrides

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::{RuntimeConfig, TransportConfig};

const DEFAULT_CONFIG_PATH: &str = "./auditcore.toml";

impl RuntimeConfig {
    /// Load from an explicit TOML file, then apply environment overrides.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: RuntimeConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `./auditcore.toml` when present, defaults otherwise, then
    /// apply environment overrides.
    pub fn load_or_default() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_path(DEFAULT_CONFIG_PATH)
        } else {
            debug!("no config file found, using defaults");
            let mut config = RuntimeConfig::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Environment variables win over every file value.
    pub fn apply_env_overrides(&mut self) {
        fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok()?.parse().ok()
        }

        if let Some(capacity) = parse_env("AUDITCORE_BUFFER_CAPACITY") {
            self.buffer.capacity = capacity;
        }
        if let Some(capacity) = parse_env("AUDITCORE_RATE_CAPACITY") {
            self.rate_limit.capacity = capacity;
        }
        if let Some(refill) = parse_env("AUDITCORE_RATE_REFILL_PER_SEC") {
            self.rate_limit.refill_per_sec = refill;
        }
        if let Some(size) = parse_env("AUDITCORE_FALLBACK_MAX_QUEUE_SIZE") {
            self.fallback.max_queue_size = size;
        }
        if let Some(level) = std::env::var("AUDITCORE_LOG_LEVEL").ok().filter(|v| !v.is_empty()) {
            self.log.level = level;
        }
        if let Some(endpoint) = std::env::var("AUDITCORE_HTTP_ENDPOINT")
            .ok()
            .filter(|v| !v.is_empty())
        {
            self.override_http_endpoint(endpoint);
        }
    }

    /// Point the first HTTP transport at `endpoint`, or prepend one when
    /// the chain has none.
    fn override_http_endpoint(&mut self, new_endpoint: String) {
        for transport in &mut self.transports {
            if let TransportConfig::Http { endpoint, .. } = transport {
                *endpoint = new_endpoint;
                return;
            }
        }
        self.transports.insert(
            0,
            TransportConfig::Http {
                endpoint: new_endpoint,
                timeout_ms: crate::default_http_timeout_ms(),
                retries: crate::default_http_retries(),
                headers: Default::default(),
            },
        );
    }
}
