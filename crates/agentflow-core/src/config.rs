//! Engine configuration.
//!
//! Values come from `Default`, then `AGENTFLOW_*` environment variables via
//! [`OrchestratorConfig::from_env`]. The CLI layers its own flags on top.

use std::time::Duration;

use crate::agent::CursorClientConfig;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Seconds between polling cycles
    pub poll_interval_secs: u64,
    /// Upper bound on jobs processed concurrently within one cycle
    pub max_concurrent_jobs: usize,
    /// Agent API base URL
    pub api_base_url: String,
    /// Agent API key (supports `${ENV_VAR}` references)
    pub api_key: String,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            max_concurrent_jobs: 8,
            api_base_url: "https://api.cursor.com".to_string(),
            api_key: String::new(),
            request_timeout_secs: 60,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("AGENTFLOW_POLL_INTERVAL_SECS") {
            config.poll_interval_secs = v;
        }
        if let Some(v) = env_parse("AGENTFLOW_MAX_CONCURRENT_JOBS") {
            config.max_concurrent_jobs = v;
        }
        if let Some(v) = env_parse("AGENTFLOW_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = v;
        }
        if let Ok(url) = std::env::var("AGENTFLOW_API_BASE_URL") {
            config.api_base_url = url;
        }
        config.api_key = std::env::var("AGENTFLOW_API_KEY")
            .or_else(|_| std::env::var("CURSOR_API_KEY"))
            .unwrap_or_default();
        config
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic.
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn client_config(&self) -> CursorClientConfig {
        CursorClientConfig {
            base_url: resolve_env_vars(&self.api_base_url),
            api_key: resolve_env_vars(&self.api_key),
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Expand `${VAR}` and `${VAR:-default}` in the API key or base URL, so a
/// config can name the variable holding the secret instead of the secret.
/// Unset variables without a default are left as written.
pub fn resolve_env_vars(input: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| expand(&caps[1], &caps[0]))
        .into_owned()
}

fn expand(expr: &str, original: &str) -> String {
    let (name, default) = match expr.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (expr, None),
    };
    match (std::env::var(name), default) {
        (Ok(value), _) => value,
        (Err(_), Some(default)) => default.to_string(),
        (Err(_), None) => original.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_expands_key_reference() {
        std::env::set_var("AGENTFLOW_CONFIG_TEST_TOKEN", "key_abc123");
        let config = OrchestratorConfig {
            api_key: "${AGENTFLOW_CONFIG_TEST_TOKEN}".to_string(),
            api_base_url: "${AGENTFLOW_CONFIG_TEST_UNSET_URL:-http://localhost:8787}".to_string(),
            request_timeout_secs: 5,
            ..Default::default()
        };
        let client = config.client_config();
        assert_eq!(client.api_key, "key_abc123");
        assert_eq!(client.base_url, "http://localhost:8787");
        assert_eq!(client.request_timeout_secs, 5);
        std::env::remove_var("AGENTFLOW_CONFIG_TEST_TOKEN");
    }

    #[test]
    fn test_unset_reference_without_default_is_kept() {
        assert_eq!(
            resolve_env_vars("token-${AGENTFLOW_CONFIG_TEST_NEVER_SET}"),
            "token-${AGENTFLOW_CONFIG_TEST_NEVER_SET}"
        );
        assert_eq!(resolve_env_vars("plain-key"), "plain-key");
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let config = OrchestratorConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
