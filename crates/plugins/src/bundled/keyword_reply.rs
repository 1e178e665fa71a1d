//! `keyword-reply` plugin: answers text messages that match configured
//! keywords through the gateway's sender.

use std::sync::Arc;

use {
    async_trait::async_trait,
    tracing::info,
    wxhook_config::{KeywordReplyConfig, KeywordRule},
    wxhook_messages::{MessageRecord, MessageSender, MessageVariant},
};

use crate::plugin::Plugin;

pub const NAME: &str = "keyword-reply";

pub struct KeywordReplyPlugin {
    rules: Vec<KeywordRule>,
    reply_in_groups: bool,
    sender: Option<Arc<dyn MessageSender>>,
}

impl KeywordReplyPlugin {
    pub fn new(config: &KeywordReplyConfig, sender: Option<Arc<dyn MessageSender>>) -> Self {
        Self {
            rules: config.rules.clone(),
            reply_in_groups: config.reply_in_groups,
            sender,
        }
    }

    /// First rule matching `text`.
    fn rule_for(&self, text: &str) -> Option<&KeywordRule> {
        let text = text.trim();
        self.rules.iter().find(|rule| {
            if rule.exact {
                text == rule.keyword
            } else {
                !rule.keyword.is_empty() && text.contains(&rule.keyword)
            }
        })
    }
}

#[async_trait]
impl Plugin for KeywordReplyPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "reply to text messages containing configured keywords"
    }

    fn matches(&self, record: &MessageRecord) -> bool {
        let header = &record.header;
        record.variant() == MessageVariant::Text
            && (self.reply_in_groups || !record.is_group())
            // Never answer our own messages.
            && header.actual_sender_id != header.session_wxid
            && record.text().is_some_and(|t| self.rule_for(t).is_some())
    }

    async fn handle(&self, record: &MessageRecord) -> anyhow::Result<()> {
        let Some(sender) = &self.sender else {
            anyhow::bail!("no outbound sender configured");
        };
        let Some(rule) = record.text().and_then(|t| self.rule_for(t)) else {
            return Ok(());
        };

        let header = &record.header;
        let at = if record.is_group() {
            vec![header.actual_sender_id.clone()]
        } else {
            Vec::new()
        };
        sender
            .send_text(header.reply_target(), &rule.reply, &at)
            .await?;
        info!(
            keyword = %rule.keyword,
            to = header.reply_target(),
            message_id = %header.message_id,
            "keyword reply sent"
        );
        Ok(())
    }

    fn on_enable(&self) -> anyhow::Result<()> {
        if self.sender.is_none() {
            anyhow::bail!("gateway.base_url must be set to send replies");
        }
        Ok(())
    }
}
