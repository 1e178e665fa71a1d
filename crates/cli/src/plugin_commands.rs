//! CLI commands for plugin management.

use clap::Subcommand;

use {wxhook_config::WxhookConfig, wxhook_plugins::bundled};

#[derive(Subcommand)]
pub enum PluginAction {
    /// List the bundled plugins and whether the config enables them.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn handle_plugins(action: PluginAction, config: &WxhookConfig) -> anyhow::Result<()> {
    match action {
        PluginAction::List { json } => {
            let plugins = bundled::instantiate(&config.plugins, None);
            let enabled = |name: &str| config.plugins.enabled.iter().any(|e| e == name);

            if json {
                let entries: Vec<serde_json::Value> = plugins
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "name": p.name(),
                            "description": p.description(),
                            "enabled": enabled(p.name()),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for plugin in &plugins {
                    let status = if enabled(plugin.name()) {
                        "✓"
                    } else {
                        "✗"
                    };
                    println!("  {status} {} — {}", plugin.name(), plugin.description());
                }
            }
        },
    }
    Ok(())
}
