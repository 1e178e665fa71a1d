//! Semantic checks on a parsed configuration.
//!
//! Parsing already rejects malformed files; these checks catch values that
//! parse fine but cannot work at runtime.

use crate::schema::WxhookConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "dispatch.workers"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate `config` against runtime constraints.
///
/// `known_plugins` lists the plugin names the binary can register; entries in
/// `plugins.enabled` outside that list are reported.
#[must_use]
pub fn validate(config: &WxhookConfig, known_plugins: &[&str]) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.dispatch.workers == 0 {
        result.push(
            Severity::Error,
            "dispatch.workers",
            "worker pool needs at least one worker",
        );
    }
    if config.dispatch.queue_capacity == 0 {
        result.push(
            Severity::Error,
            "dispatch.queue_capacity",
            "queue capacity must be positive",
        );
    }
    if config.dispatch.invocation_timeout_secs == 0 {
        result.push(
            Severity::Warning,
            "dispatch.invocation_timeout_secs",
            "no invocation timeout: a stuck plugin holds its worker forever",
        );
    }

    if !config.server.webhook_path.starts_with('/') {
        result.push(
            Severity::Error,
            "server.webhook_path",
            format!(
                "webhook path must start with '/', got {:?}",
                config.server.webhook_path
            ),
        );
    }

    if config.gateway.is_configured() && config.gateway.app_id.is_none() {
        result.push(
            Severity::Warning,
            "gateway.app_id",
            "gateway.base_url is set but gateway.app_id is missing",
        );
    }

    for name in &config.plugins.enabled {
        if !known_plugins.contains(&name.as_str()) {
            result.push(
                Severity::Error,
                "plugins.enabled",
                format!("unknown plugin {name:?}"),
            );
        }
    }

    if config.plugins.enabled.iter().any(|n| n == "keyword-reply") {
        if config.plugins.keyword_reply.rules.is_empty() {
            result.push(
                Severity::Warning,
                "plugins.keyword_reply.rules",
                "keyword-reply is enabled without any rules",
            );
        }
        if !config.gateway.is_configured() {
            result.push(
                Severity::Warning,
                "plugins.keyword_reply",
                "keyword-reply needs gateway.base_url to send replies",
            );
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[&str] = &["message-log", "keyword-reply"];

    #[test]
    fn defaults_are_valid() {
        let result = validate(&WxhookConfig::default(), KNOWN);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn zero_workers_is_an_error() {
        let mut cfg = WxhookConfig::default();
        cfg.dispatch.workers = 0;
        let result = validate(&cfg, KNOWN);
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "dispatch.workers")
        );
    }

    #[test]
    fn relative_webhook_path_is_an_error() {
        let mut cfg = WxhookConfig::default();
        cfg.server.webhook_path = "hook".into();
        assert!(validate(&cfg, KNOWN).has_errors());
    }

    #[test]
    fn unknown_plugin_is_reported() {
        let mut cfg = WxhookConfig::default();
        cfg.plugins.enabled = vec!["message-log".into(), "auto-forward".into()];
        let result = validate(&cfg, KNOWN);
        let errors: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("auto-forward"));
    }

    #[test]
    fn keyword_reply_without_gateway_warns() {
        let mut cfg = WxhookConfig::default();
        cfg.plugins.enabled = vec!["keyword-reply".into()];
        let result = validate(&cfg, KNOWN);
        assert!(!result.has_errors());
        assert_eq!(result.diagnostics.len(), 2);
        assert!(
            result
                .diagnostics
                .iter()
                .all(|d| d.severity == Severity::Warning)
        );
    }
}
