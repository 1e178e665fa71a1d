//! Plugins: consumers of classified messages with an enable/disable
//! lifecycle, the registry that fans records out to them, and the plugins
//! bundled with the binary.

pub mod bundled;
pub mod error;
pub mod plugin;
pub mod registry;

pub use {
    error::{Error, Result},
    plugin::Plugin,
    registry::{DispatchSummary, PluginInfo, PluginRegistry, PluginState},
};
