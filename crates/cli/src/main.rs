mod browser_commands;
mod config_commands;
mod resource_commands;
mod run_command;
mod telegram_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    pagewatch_config::PagewatchConfig,
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "pagewatch", about = "pagewatch: get told when a web page changes")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./pagewatch.toml and ~/.config/pagewatch/).
    #[arg(long, global = true, env = "PAGEWATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule every tracked page and run until Ctrl-C (default).
    Run,
    /// Start tracking a page.
    Add {
        /// Page URL (http or https).
        url: String,
        /// Seconds between captures.
        #[arg(long, value_name = "SECS")]
        every: u64,
        /// Keep every capture, not only the ones that changed.
        #[arg(long, default_value_t = false)]
        retain_all: bool,
    },
    /// List tracked pages with their last observation.
    List,
    /// Change the interval or retention of a tracked page.
    Edit {
        id: i64,
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
        #[arg(long)]
        retain_all: Option<bool>,
    },
    /// Show recent observations of a tracked page.
    History {
        id: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Stop tracking a page and delete its observations.
    Remove {
        id: i64,
        /// Also delete the page's screenshot folder.
        #[arg(long, default_value_t = false)]
        purge: bool,
    },
    /// Telegram bot helpers.
    Telegram {
        #[command(subcommand)]
        action: telegram_commands::TelegramAction,
    },
    /// Headless browser status.
    Browser {
        #[command(subcommand)]
        action: browser_commands::BrowserAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
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

/// Load the explicit config file, or discover one.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<PagewatchConfig> {
    match path {
        Some(path) => pagewatch_config::load_config(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(pagewatch_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = load_config(cli.config.as_deref())?;
    debug!(?config, "configuration loaded");

    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "pagewatch starting");
            run_command::run(config).await
        },
        Some(Commands::Add {
            url,
            every,
            retain_all,
        }) => resource_commands::add(&config, url, every, retain_all).await,
        Some(Commands::List) => resource_commands::list(&config).await,
        Some(Commands::Edit {
            id,
            every,
            retain_all,
        }) => resource_commands::edit(&config, id, every, retain_all).await,
        Some(Commands::History { id, limit }) => {
            resource_commands::history(&config, id, limit).await
        },
        Some(Commands::Remove { id, purge }) => resource_commands::remove(&config, id, purge).await,
        Some(Commands::Telegram { action }) => {
            telegram_commands::handle_telegram(&config, action).await
        },
        Some(Commands::Browser { action }) => browser_commands::handle_browser(&config, action),
        Some(Commands::Config { action }) => {
            config_commands::handle_config(cli.config.as_deref(), &config, action)
        },
    }
}
