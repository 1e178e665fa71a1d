mod classify_commands;
mod plugin_commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    clap::{Parser, Subcommand},
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    wxhook_config::{Severity, WxhookConfig},
    wxhook_gateway::{DispatcherBuilder, HttpGateway},
    wxhook_messages::MessageSender,
    wxhook_plugins::{PluginRegistry, bundled},
};

#[derive(Parser)]
#[command(name = "wxhook", about = "wxhook — chat gateway webhook dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and the user config dir).
    #[arg(long, global = true, env = "WXHOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server (default when no subcommand is provided).
    Serve,
    /// Classify an envelope read from a JSON file and print the record.
    Classify(classify_commands::ClassifyArgs),
    /// Plugin management.
    Plugins {
        #[command(subcommand)]
        action: plugin_commands::PluginAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        // Default: start the server when no subcommand is provided
        None | Some(Commands::Serve) => serve(cli.config, cli.bind, cli.port).await,
        Some(Commands::Classify(args)) => classify_commands::handle_classify(args),
        Some(Commands::Plugins { action }) => {
            let config = load_config(cli.config.as_deref())?;
            plugin_commands::handle_plugins(action, &config)
        },
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<WxhookConfig> {
    let config = wxhook_config::load_or_discover(path)?;

    let report = wxhook_config::validate(&config, bundled::NAMES);
    for diag in &report.diagnostics {
        match diag.severity {
            Severity::Error => error!(path = %diag.path, "{}", diag.message),
            Severity::Warning => warn!(path = %diag.path, "{}", diag.message),
        }
    }
    if report.has_errors() {
        anyhow::bail!("configuration has errors, see log above");
    }
    Ok(config)
}

async fn serve(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "wxhook starting");

    let mut config = load_config(config_path.as_deref())?;
    // CLI args override config values
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let gateway = HttpGateway::from_config(&config.gateway)?.map(Arc::new);
    match &gateway {
        Some(gw) => info!(base_url = %gw.base_url(), "gateway client configured"),
        None => info!("no gateway base_url, attachments stay unresolved and replies are disabled"),
    }

    let registry = Arc::new(
        PluginRegistry::new().with_invocation_timeout(config.dispatch.invocation_timeout()),
    );
    let sender = gateway.clone().map(|gw| -> Arc<dyn MessageSender> { gw });
    for plugin in bundled::instantiate(&config.plugins, sender) {
        registry.register(plugin)?;
    }
    for name in &config.plugins.enabled {
        if let Err(e) = registry.enable(name) {
            warn!(plugin = %name, error = %e, "could not enable plugin");
        }
    }

    let mut builder = DispatcherBuilder::from_config(&config.dispatch).plugins(registry);
    if let Some(gw) = gateway {
        builder = builder.resolver(gw);
    }
    let dispatcher = builder.build();

    wxhook_gateway::start_server(&config.server, dispatcher, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("shutdown requested");
}
