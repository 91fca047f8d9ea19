mod plugins_commands;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "ferrygram", about = "ferrygram: QQ/Telegram bridge plugin runtime")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address the admin API binds to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port the admin API listens on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Custom config directory (overrides default ~/.config/ferrygram/).
    #[arg(long, global = true, env = "FERRYGRAM_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
    /// Custom data directory (overrides default data dir).
    #[arg(long, global = true, env = "FERRYGRAM_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the plugin runtime and admin API (default when no subcommand is provided).
    Gateway,
    /// Plugin inventory management (works offline).
    Plugins {
        #[command(subcommand)]
        action: plugins_commands::PluginAction,
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

    info!(version = env!("CARGO_PKG_VERSION"), "ferrygram starting");

    // Apply directory overrides before loading config
    if let Some(ref dir) = cli.config_dir {
        ferrygram_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        ferrygram_config::set_data_dir(dir.clone());
    }
    let mut config = ferrygram_config::discover_and_load();

    match cli.command {
        // Default: start gateway when no subcommand is provided
        None | Some(Commands::Gateway) => {
            if let Some(bind) = cli.bind {
                config.server.bind = bind;
            }
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            ferrygram_gateway::start_gateway(config).await
        },
        Some(Commands::Plugins { action }) => plugins_commands::handle_plugins(action, &config),
    }
}
