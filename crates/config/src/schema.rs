//! Config schema types (server, dispatch pool, remote gateway, plugins).

use std::{path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WxhookConfig {
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub gateway: GatewayConfig,
    pub plugins: PluginsConfig,
}

/// Webhook listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
    /// Path the remote gateway posts callbacks to.
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 2531,
            webhook_path: "/webhook".into(),
        }
    }
}

/// Sizing of the worker pool that runs the observer and plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of concurrent consumer invocations.
    pub workers: usize,
    /// Jobs that may wait for a free worker before submissions are rejected.
    pub queue_capacity: usize,
    /// Upper bound for a single observer or plugin invocation. 0 disables it.
    pub invocation_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: 1024,
            invocation_timeout_secs: 30,
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn invocation_timeout(&self) -> Option<Duration> {
        (self.invocation_timeout_secs > 0).then(|| Duration::from_secs(self.invocation_timeout_secs))
    }
}

/// Remote chat-gateway HTTP API used to resolve attachments and send replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the gateway API, e.g. `http://127.0.0.1:2531/v2/api`.
    /// Outbound collaborators are only wired when this is set.
    pub base_url: Option<String>,
    /// Never serialized.
    #[serde(skip_serializing)]
    pub token: Option<Secret<String>>,
    /// Device/app id the gateway expects on every call.
    pub app_id: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            app_id: None,
            request_timeout_secs: 10,
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.base_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret().as_str())
    }
}

/// Plugin selection and per-plugin settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Plugins enabled right after startup. Others stay loaded but disabled.
    pub enabled: Vec<String>,
    pub keyword_reply: KeywordReplyConfig,
    pub message_log: MessageLogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordReplyConfig {
    pub rules: Vec<KeywordRule>,
    /// Also answer inside group chats.
    pub reply_in_groups: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub reply: String,
    /// Require the whole text to equal the keyword instead of containing it.
    #[serde(default)]
    pub exact: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageLogConfig {
    /// JSONL output file. Defaults to `<data dir>/logs/messages.jsonl`.
    pub path: Option<PathBuf>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: WxhookConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.server.webhook_path, "/webhook");
        assert_eq!(cfg.dispatch.workers, 8);
        assert_eq!(
            cfg.dispatch.invocation_timeout(),
            Some(Duration::from_secs(30))
        );
        assert!(!cfg.gateway.is_configured());
    }

    #[test]
    fn zero_timeout_disables_it() {
        let cfg: WxhookConfig = toml::from_str("[dispatch]\ninvocation_timeout_secs = 0\n").unwrap();
        assert_eq!(cfg.dispatch.invocation_timeout(), None);
    }

    #[test]
    fn keyword_rules_deserialize() {
        let raw = r#"
[plugins]
enabled = ["keyword-reply"]

[[plugins.keyword_reply.rules]]
keyword = "ping"
reply = "pong"
exact = true

[[plugins.keyword_reply.rules]]
keyword = "help"
reply = "see the wiki"
"#;
        let cfg: WxhookConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.plugins.enabled, vec!["keyword-reply".to_string()]);
        let rules = &cfg.plugins.keyword_reply.rules;
        assert_eq!(rules.len(), 2);
        assert!(rules[0].exact);
        assert!(!rules[1].exact);
    }

    #[test]
    fn token_is_exposed_on_request_only() {
        let cfg: WxhookConfig =
            toml::from_str("[gateway]\nbase_url = \"http://gw\"\ntoken = \"s3cret\"\n").unwrap();
        assert!(cfg.gateway.is_configured());
        assert_eq!(cfg.gateway.token(), Some("s3cret"));
        assert!(!format!("{:?}", cfg.gateway).contains("s3cret"));
    }

    #[test]
    fn token_is_never_serialized() {
        let cfg: WxhookConfig =
            toml::from_str("[gateway]\nbase_url = \"http://gw\"\ntoken = \"s3cret\"\n").unwrap();
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["gateway"]["base_url"], "http://gw");
        assert!(value["gateway"].get("token").is_none());
        assert!(!value.to_string().contains("s3cret"));
    }
}
