//! The contract between the registry and a plugin.

use {async_trait::async_trait, wxhook_messages::MessageRecord};

/// A unit of message handling with its own enable/disable lifecycle.
///
/// The registry owns registered plugins and calls the lifecycle hooks in
/// order: `on_load` once, then any number of `on_enable`/`on_disable` pairs,
/// then `on_unload` once. Hooks run while lifecycle operations are
/// serialized, so they must not call back into the registry.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique key in the registry.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Whether this plugin wants `record`. Cheap and side-effect free.
    fn matches(&self, record: &MessageRecord) -> bool;

    async fn handle(&self, record: &MessageRecord) -> anyhow::Result<()>;

    /// Failing here keeps the plugin out of the registry.
    fn on_load(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Failing here leaves the plugin disabled.
    fn on_enable(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Errors are logged; the plugin is disabled regardless.
    fn on_disable(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Errors are logged; the plugin is removed regardless.
    fn on_unload(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
