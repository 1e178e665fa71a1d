//! Plugin registry: lifecycle transitions and isolated fan-out.

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    futures::FutureExt,
    tracing::{debug, info, warn},
    wxhook_common::panic_message,
    wxhook_messages::MessageRecord,
};

use crate::{
    error::{Error, Result},
    plugin::Plugin,
};

/// Lifecycle state of a registered plugin. Unloaded plugins are simply
/// absent from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Disabled,
    Enabled,
}

/// Listing entry for a registered plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub state: PluginState,
}

/// What one [`PluginRegistry::dispatch`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Enabled plugins whose predicate accepted the record.
    pub matched: usize,
    /// Predicates or handlers that failed, panicked or timed out.
    pub failed: usize,
}

struct Entry {
    plugin: Arc<dyn Plugin>,
    state: PluginState,
}

/// Owns registered plugins, in registration order.
///
/// Lifecycle operations take the write lock for their whole duration, hooks
/// included, so they are serialized. [`PluginRegistry::dispatch`] only holds
/// the read lock long enough to copy the enabled plugins.
pub struct PluginRegistry {
    entries: RwLock<Vec<Entry>>,
    invocation_timeout: Option<Duration>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            invocation_timeout: None,
        }
    }

    /// Bound each handler invocation. A timeout counts as a failure.
    pub fn with_invocation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Load `plugin` in the disabled state.
    ///
    /// A plugin already registered under the same name is unloaded first, so
    /// registering twice replaces rather than stacks. If the new plugin's
    /// `on_load` fails it is not registered.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if let Some(idx) = entries.iter().position(|e| e.plugin.name() == name) {
            let old = entries.remove(idx);
            info!(plugin = %name, "replacing registered plugin");
            teardown(old);
        }

        plugin
            .on_load()
            .map_err(|e| Error::hook(&name, "load", e))?;
        entries.push(Entry {
            plugin,
            state: PluginState::Disabled,
        });
        info!(plugin = %name, "plugin loaded");
        Ok(())
    }

    /// Enable a loaded plugin. Enabling an enabled plugin is a no-op.
    pub fn enable(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = find_mut(&mut entries, name)?;
        if entry.state == PluginState::Enabled {
            return Ok(());
        }
        entry
            .plugin
            .on_enable()
            .map_err(|e| Error::hook(name, "enable", e))?;
        entry.state = PluginState::Enabled;
        info!(plugin = %name, "plugin enabled");
        Ok(())
    }

    /// Disable a loaded plugin. Disabling a disabled plugin is a no-op.
    pub fn disable(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = find_mut(&mut entries, name)?;
        if entry.state == PluginState::Disabled {
            return Ok(());
        }
        disable_entry(entry);
        Ok(())
    }

    /// Disable (if needed) and remove a plugin.
    pub fn unload(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let idx = entries
            .iter()
            .position(|e| e.plugin.name() == name)
            .ok_or_else(|| Error::unknown_plugin(name))?;
        teardown(entries.remove(idx));
        Ok(())
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .find(|e| e.plugin.name() == name)
            .map(|e| e.state)
    }

    /// All registered plugins in registration order.
    pub fn list(&self) -> Vec<PluginInfo> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .map(|e| PluginInfo {
                name: e.plugin.name().to_string(),
                description: e.plugin.description().to_string(),
                state: e.state,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the enabled plugins in registration order.
    pub fn enabled(&self) -> Vec<Arc<dyn Plugin>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|e| e.state == PluginState::Enabled)
            .map(|e| Arc::clone(&e.plugin))
            .collect()
    }

    /// Offer `record` to every enabled plugin, one after another.
    ///
    /// Works on a snapshot: plugins enabled or disabled while this runs take
    /// effect from the next call. A plugin that fails, panics or times out is
    /// logged and skipped; the others still run.
    pub async fn dispatch(&self, record: &MessageRecord) -> DispatchSummary {
        let plugins = self.enabled();
        let mut summary = DispatchSummary::default();
        let message_id = record.header.message_id.as_str();
        let variant = record.variant();

        for plugin in plugins {
            let name = plugin.name();

            let wanted = match std::panic::catch_unwind(AssertUnwindSafe(|| plugin.matches(record))) {
                Ok(wanted) => wanted,
                Err(panic) => {
                    summary.failed += 1;
                    warn!(
                        plugin = %name,
                        message_id,
                        %variant,
                        error = %panic_message(&*panic),
                        "plugin predicate panicked"
                    );
                    continue;
                },
            };
            if !wanted {
                continue;
            }

            summary.matched += 1;
            debug!(plugin = %name, message_id, %variant, "invoking plugin");
            if let Err(e) = self.invoke(plugin.as_ref(), record).await {
                summary.failed += 1;
                warn!(plugin = %name, message_id, %variant, error = %e, "plugin handler failed");
            }
        }

        summary
    }

    async fn invoke(&self, plugin: &dyn Plugin, record: &MessageRecord) -> anyhow::Result<()> {
        let call = AssertUnwindSafe(plugin.handle(record)).catch_unwind();
        let outcome = match self.invocation_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => anyhow::bail!("timed out after {limit:?}"),
            },
            None => call.await,
        };
        outcome.unwrap_or_else(|panic| Err(anyhow::anyhow!("panicked: {}", panic_message(&*panic))))
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn find_mut<'a>(entries: &'a mut [Entry], name: &str) -> Result<&'a mut Entry> {
    entries
        .iter_mut()
        .find(|e| e.plugin.name() == name)
        .ok_or_else(|| Error::unknown_plugin(name))
}

fn disable_entry(entry: &mut Entry) {
    let name = entry.plugin.name();
    if let Err(e) = entry.plugin.on_disable() {
        warn!(plugin = %name, error = %e, "plugin disable hook failed");
    }
    entry.state = PluginState::Disabled;
    info!(plugin = %name, "plugin disabled");
}

/// Run the disable (when enabled) and unload hooks of a removed entry.
fn teardown(mut entry: Entry) {
    if entry.state == PluginState::Enabled {
        disable_entry(&mut entry);
    }
    let name = entry.plugin.name();
    if let Err(e) = entry.plugin.on_unload() {
        warn!(plugin = %name, error = %e, "plugin unload hook failed");
    }
    info!(plugin = %name, "plugin unloaded");
}
