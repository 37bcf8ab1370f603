//! Configuration management for banwarden.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::entry::{DefaultEscalation, Escalation, TieredEscalation};
use crate::validation::{validate_nft_identifier, MAX_EXPIRE_IN_DAYS};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/banwarden/config.yaml";

/// Secure string type that zeroizes memory on drop
/// Used for sensitive data like API tokens
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Resolve a secret: custom env var, then default env var, then config value
fn resolve_secret(custom_env: Option<&str>, default_env: &str, configured: &SecureString) -> SecureString {
    if let Some(env_name) = custom_env {
        if let Ok(val) = env::var(env_name) {
            return SecureString::new(val);
        }
    }
    if let Ok(val) = env::var(default_env) {
        return SecureString::new(val);
    }
    configured.clone()
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the ban list is persisted
    pub store: StoreConfig,

    /// Chat notifications for committed changes
    pub slack: SlackConfig,

    /// Generic JSON webhook notifications
    pub webhook: WebhookConfig,

    /// Approval workflow settings
    pub approval: ApprovalConfig,

    /// Ban length in days per ban count (last value repeats); empty = built-in table
    pub escalation_days: Vec<u32>,

    /// Firewall rule-sets kept in sync with the ban list
    pub reconcilers: Vec<ReconcilerConfig>,

    /// Actor link recorded for commands run from the terminal
    pub actor_link: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            slack: SlackConfig::default(),
            webhook: WebhookConfig::default(),
            approval: ApprovalConfig::default(),
            escalation_days: Vec::new(),
            reconcilers: Vec::new(),
            actor_link: "cli".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.store.path.as_os_str().is_empty() {
            anyhow::bail!("store.path must not be empty");
        }

        if self.slack.enabled {
            if !self.slack.api_url.starts_with("https://") {
                anyhow::bail!("Slack API URL must use HTTPS: {}", self.slack.api_url);
            }
            if self.slack.channel.is_empty() {
                anyhow::bail!("Slack channel must not be empty when Slack is enabled");
            }
        }

        if self.webhook.enabled
            && !self.webhook.url.is_empty()
            && !self.webhook.url.starts_with("https://")
        {
            anyhow::bail!("Webhook URL must use HTTPS: {}", self.webhook.url);
        }

        for days in &self.escalation_days {
            if *days == 0 || u64::from(*days) > MAX_EXPIRE_IN_DAYS {
                anyhow::bail!(
                    "escalation_days tiers must be between 1 and {} days, got {}",
                    MAX_EXPIRE_IN_DAYS,
                    days
                );
            }
        }

        for reconciler in &self.reconcilers {
            reconciler.validate()?;
        }

        Ok(())
    }

    /// Escalation policy for bans without an explicit duration
    pub fn escalation(&self) -> Arc<dyn Escalation> {
        if self.escalation_days.is_empty() {
            Arc::new(DefaultEscalation)
        } else {
            Arc::new(TieredEscalation::from_days(&self.escalation_days))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file holding the persisted ban list
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/banwarden/state.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub enabled: bool,
    pub api_url: String,
    pub channel: String,
    /// Token can be set directly or via BANWARDEN_SLACK_TOKEN env var
    /// Memory is securely zeroed when dropped
    pub token: SecureString,
    /// Environment variable name to read token from (optional)
    #[serde(default)]
    pub token_env: Option<String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://slack.com/api".to_string(),
            channel: "#banwarden".to_string(),
            token: SecureString::default(),
            token_env: None,
        }
    }
}

impl SlackConfig {
    /// Get the effective token, checking env vars first
    pub fn get_token(&self) -> SecureString {
        resolve_secret(self.token_env.as_deref(), "BANWARDEN_SLACK_TOKEN", &self.token)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    #[serde(deserialize_with = "deserialize_headers")]
    pub headers: HashMap<String, String>,
}

/// Deserialize and validate HTTP headers (reject injection attempts)
fn deserialize_headers<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let headers: HashMap<String, String> = HashMap::deserialize(deserializer)?;

    for (key, value) in &headers {
        if key.contains('\r') || key.contains('\n') {
            return Err(serde::de::Error::custom(format!(
                "Invalid header name '{}': contains newline characters",
                key
            )));
        }
        if value.contains('\r') || value.contains('\n') {
            return Err(serde::de::Error::custom(format!(
                "Invalid header value for '{}': contains newline characters",
                key
            )));
        }
        // RFC 7230 token characters we accept
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_".contains(c))
        {
            return Err(serde::de::Error::custom(format!(
                "Invalid header name '{}': contains invalid characters",
                key
            )));
        }
    }

    Ok(headers)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Attachment title shown above the approve/reject/cancel buttons
    pub request_text: String,
    /// User ids allowed to request bans; empty allows everyone
    pub requesters: Vec<String>,
    /// User ids allowed to approve, reject or cancel; empty allows everyone
    pub approvers: Vec<String>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            request_text: "*Approval Request*".to_string(),
            requesters: Vec::new(),
            approvers: Vec::new(),
        }
    }
}

/// One external rule-set kept in sync with the living entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcilerConfig {
    /// Remote IP set API (change-token protected)
    IpSet(IpSetConfig),
    /// Local nftables named sets
    Nftables(NftablesConfig),
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            ReconcilerConfig::IpSet(c) => {
                if !c.endpoint.starts_with("https://") {
                    anyhow::bail!("IP set endpoint must use HTTPS: {}", c.endpoint);
                }
                if c.ip_set_id.trim().is_empty() {
                    anyhow::bail!("IP set reconciler requires ip_set_id");
                }
                if c.region.trim().is_empty() {
                    anyhow::bail!("IP set reconciler requires region");
                }
                Ok(())
            }
            ReconcilerConfig::Nftables(c) => {
                validate_nft_identifier(&c.table)?;
                validate_nft_identifier(&c.set_v4)?;
                validate_nft_identifier(&c.set_v6)?;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpSetConfig {
    pub endpoint: String,
    pub region: String,
    pub ip_set_id: String,
    /// Token can be set directly or via BANWARDEN_IPSET_TOKEN env var
    #[serde(default)]
    pub token: SecureString,
    #[serde(default)]
    pub token_env: Option<String>,
}

impl IpSetConfig {
    pub fn get_token(&self) -> SecureString {
        resolve_secret(self.token_env.as_deref(), "BANWARDEN_IPSET_TOKEN", &self.token)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NftablesConfig {
    pub table: String,
    pub set_v4: String,
    pub set_v6: String,
}

impl Default for NftablesConfig {
    fn default() -> Self {
        Self {
            table: "banwarden".to_string(),
            set_v4: "banned_v4".to_string(),
            set_v6: "banned_v6".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(
            config.store.path,
            PathBuf::from("/var/lib/banwarden/state.json")
        );
        assert!(!config.slack.enabled);
        assert_eq!(config.approval.request_text, "*Approval Request*");
        assert!(config.reconcilers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r##"
store:
  path: /tmp/bans.json
slack:
  enabled: true
  channel: "#security"
  token: xoxb-test
approval:
  approvers: [U1, U2]
escalation_days: [1, 7, 30]
reconcilers:
  - kind: ip_set
    endpoint: https://waf.example.com
    region: ap-northeast-1
    ip_set_id: 01234567-89ab-cdef-0123-456789abcdef
  - kind: nftables
    table: edge
"##;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.slack.channel, "#security");
        assert_eq!(config.slack.api_url, "https://slack.com/api");
        assert_eq!(config.approval.approvers, vec!["U1", "U2"]);
        assert_eq!(config.reconcilers.len(), 2);
        match &config.reconcilers[1] {
            ReconcilerConfig::Nftables(n) => {
                assert_eq!(n.table, "edge");
                assert_eq!(n.set_v4, "banned_v4");
            }
            other => panic!("unexpected reconciler: {:?}", other),
        }
    }

    #[test]
    fn test_escalation_from_config() {
        let config = Config {
            escalation_days: vec![2, 4],
            ..Default::default()
        };
        let escalation = config.escalation();
        assert_eq!(escalation.ban_duration(1), Duration::days(2));
        assert_eq!(escalation.ban_duration(5), Duration::days(4));

        let default = Config::default().escalation();
        assert_eq!(default.ban_duration(4), Duration::days(7));
    }

    #[test]
    fn test_validation_escalation_tier_bounds() {
        for tiers in [vec![1, 0], vec![1, 36_501], vec![100_000_000]] {
            let config = Config {
                escalation_days: tiers.clone(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{:?} should be rejected", tiers);
        }

        let config = Config {
            escalation_days: vec![1, 36_500],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_slack_http_rejected() {
        let config = Config {
            slack: SlackConfig {
                enabled: true,
                api_url: "http://slack.example.com/api".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("HTTPS"));
    }

    #[test]
    fn test_validation_webhook_http_rejected() {
        let config = Config {
            webhook: WebhookConfig {
                enabled: true,
                url: "http://example.com/webhook".to_string(),
                headers: HashMap::new(),
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Webhook"));
    }

    #[test]
    fn test_validation_ip_set_requires_id() {
        let config = Config {
            reconcilers: vec![ReconcilerConfig::IpSet(IpSetConfig {
                endpoint: "https://waf.example.com".to_string(),
                region: "us-east-1".to_string(),
                ip_set_id: " ".to_string(),
                token: SecureString::default(),
                token_env: None,
            })],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_nft_identifier_injection_rejected() {
        let config = Config {
            reconcilers: vec![ReconcilerConfig::Nftables(NftablesConfig {
                table: "edge; flush ruleset".to_string(),
                ..Default::default()
            })],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_header_validation_rejects_newlines() {
        let yaml = r#"
enabled: true
url: "https://example.com/webhook"
headers:
  "X-Evil": "value\r\ninjected"
"#;
        let result: Result<WebhookConfig, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_header_validation_accepts_valid() {
        let yaml = r#"
enabled: true
url: "https://example.com/webhook"
headers:
  "X-Custom-Header": "some-value"
"#;
        let config: WebhookConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.headers.len(), 1);
    }

    #[test]
    fn test_secure_string_debug_redacted() {
        let secret = SecureString::new("xoxb-secret".to_string());
        let debug_str = format!("{:?}", secret);
        assert_eq!(debug_str, "[REDACTED]");
    }

    #[test]
    fn test_token_from_custom_env() {
        let config = SlackConfig {
            token: "from-config".into(),
            token_env: Some("BANWARDEN_TEST_SLACK_TOKEN_CUSTOM".to_string()),
            ..Default::default()
        };
        env::set_var("BANWARDEN_TEST_SLACK_TOKEN_CUSTOM", "from-env");
        assert_eq!(config.get_token().as_str(), "from-env");
        env::remove_var("BANWARDEN_TEST_SLACK_TOKEN_CUSTOM");
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "escalation_days: [1, 2]\nactor_link: https://example.slack.com/archives/C1/p1\n",
        )
        .unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.escalation_days, vec![1, 2]);
        assert_eq!(loaded.actor_link, "https://example.slack.com/archives/C1/p1");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "escalation_days: [100000000]\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(dir.path().join("missing.yaml")).unwrap();
        assert_eq!(config.actor_link, "cli");
    }
}
