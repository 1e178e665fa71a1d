//! `message-log` plugin: appends one JSON line per classified record.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use {async_trait::async_trait, tracing::debug, wxhook_messages::MessageRecord};

use crate::{error::Context, plugin::Plugin};

pub const NAME: &str = "message-log";

/// Writes a JSONL journal of every record it sees.
pub struct MessageLogPlugin {
    path: PathBuf,
    /// Opened lazily on first write, closed on unload.
    file: Mutex<Option<File>>,
}

impl MessageLogPlugin {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    /// Default log path: `<data dir>/logs/messages.jsonl`.
    pub fn default_path() -> PathBuf {
        wxhook_config::data_dir().join("logs/messages.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> crate::error::Result<()> {
        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("open {}", self.path.display()))?;
            debug!(path = %self.path.display(), "message log opened");
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

fn entry(record: &MessageRecord) -> serde_json::Value {
    let header = &record.header;
    serde_json::json!({
        "ts": SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        "variant": record.variant(),
        "message_id": header.message_id,
        "dedup_id": header.dedup_id,
        "created_at": header.created_at,
        "from_id": header.from_id,
        "to_id": header.to_id,
        "room_id": header.room_id,
        "actual_sender_id": header.actual_sender_id,
        "text": record.text(),
    })
}

#[async_trait]
impl Plugin for MessageLogPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "append every message to a JSONL file"
    }

    fn matches(&self, _record: &MessageRecord) -> bool {
        true
    }

    async fn handle(&self, record: &MessageRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(&entry(record))?;
        self.append(&line)?;
        Ok(())
    }

    fn on_unload(&self) -> anyhow::Result<()> {
        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut file) = guard.take() {
            file.flush()?;
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        serde_json::json,
        wxhook_messages::{ClassifierChain, Envelope},
    };

    use super::*;

    fn record(sub_type: i64, content: &str, from: &str) -> MessageRecord {
        ClassifierChain::builtin()
            .classify(&Envelope::new(json!({
                "typename": "AddMsg",
                "payload": {"sub_type": sub_type, "content": content, "from": from, "to": "wxid_me", "msg_id": 11}
            })))
            .unwrap()
    }

    #[tokio::test]
    async fn appends_one_line_per_record() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs/messages.jsonl");
        let plugin = MessageLogPlugin::new(path.clone());

        plugin.handle(&record(1, "hello", "wxid_a")).await.unwrap();
        plugin
            .handle(&record(1, "wxid_b:hey", "9@chatroom"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["variant"], "TEXT");
        assert_eq!(first["message_id"], "11");
        assert_eq!(first["text"], "hello");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["room_id"], "9@chatroom");
        assert_eq!(second["actual_sender_id"], "wxid_b");
    }

    #[tokio::test]
    async fn reopens_after_unload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("messages.jsonl");
        let plugin = MessageLogPlugin::new(path.clone());

        plugin.handle(&record(3, "<msg/>", "wxid_a")).await.unwrap();
        plugin.on_unload().unwrap();
        plugin.handle(&record(1, "again", "wxid_a")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"IMAGE\""));
    }

    #[test]
    fn nothing_is_created_before_the_first_record() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("messages.jsonl");
        let plugin = MessageLogPlugin::new(path.clone());
        plugin.on_unload().unwrap();
        assert!(!path.exists());
        assert_eq!(plugin.path(), path.as_path());
    }
}
