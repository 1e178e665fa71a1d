//! Configuration loading, validation and env substitution.
//!
//! Config files: `wxhook.toml`, `wxhook.yaml`, or `wxhook.json`
//! Searched in `./` then `~/.config/wxhook/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        config_dir, data_dir, discover_and_load, find_config_file, load_config, load_or_discover,
    },
    schema::{
        DispatchConfig, GatewayConfig, KeywordReplyConfig, KeywordRule, MessageLogConfig,
        PluginsConfig, ServerConfig, WxhookConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
