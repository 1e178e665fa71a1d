//! Plugins shipped with the binary.

pub mod keyword_reply;
pub mod message_log;

use std::sync::Arc;

use {wxhook_config::PluginsConfig, wxhook_messages::MessageSender};

use crate::plugin::Plugin;

/// Names of the bundled plugins, in registration order.
pub const NAMES: &[&str] = &[message_log::NAME, keyword_reply::NAME];

/// Instantiate every bundled plugin from its config section.
pub fn instantiate(
    config: &PluginsConfig,
    sender: Option<Arc<dyn MessageSender>>,
) -> Vec<Arc<dyn Plugin>> {
    let log_path = config
        .message_log
        .path
        .clone()
        .unwrap_or_else(message_log::MessageLogPlugin::default_path);
    let log: Arc<dyn Plugin> = Arc::new(message_log::MessageLogPlugin::new(log_path));
    let reply: Arc<dyn Plugin> = Arc::new(keyword_reply::KeywordReplyPlugin::new(
        &config.keyword_reply,
        sender,
    ));
    vec![log, reply]
}
