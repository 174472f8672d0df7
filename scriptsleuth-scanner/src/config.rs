use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str =
    "scriptsleuth/0.1 (https://github.com/trapdoorsec/scriptsleuth)";

/// Tunables for a single scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Per-request timeout, page and scripts alike. `0` is raised to one second.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Upper bound on remote script fetches in flight at once. `0` is raised to one.
    pub max_concurrent_fetches: usize,
    /// Fetch each distinct absolute script URL once and share the body between
    /// all tags referencing it. Off by default: every tag is fetched on its own.
    pub share_fetches_by_url: bool,
    /// Treat 4xx/5xx responses as failed fetches instead of script bodies.
    pub reject_error_status: bool,
    pub max_redirects: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrent_fetches: 8,
            share_fetches_by_url: false,
            reject_error_status: false,
            max_redirects: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"timeout_secs": 3, "share_fetches_by_url": true}"#).unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert!(config.share_fetches_by_url);
        assert_eq!(config.max_concurrent_fetches, 8);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }
}
