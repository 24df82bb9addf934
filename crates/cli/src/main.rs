mod bootstrap;
mod message_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    murmur_metrics::{MetricsRecorderConfig, init_metrics},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "murmur", about = "Murmur: messages encrypted at rest")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Explicit config file (skips discovery; errors are fatal).
    #[arg(long, global = true, env = "MURMUR_CONFIG")]
    config: Option<PathBuf>,

    /// Custom data directory (overrides `storage.data_dir`).
    #[arg(long, global = true, env = "MURMUR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print collected metrics in Prometheus text format on exit.
    #[arg(long, global = true, default_value_t = false)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an outgoing message.
    Send {
        /// Message text.
        text: String,
    },
    /// Store an "ok" reply after a delay.
    Reply {
        #[arg(long, default_value_t = 1500)]
        delay_ms: u64,
    },
    /// Print the whole history, oldest first.
    List {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the history newest first, page by page.
    Page {
        /// Page size (defaults to `paging.page_size`).
        #[arg(long)]
        size: Option<usize>,
        /// Number of loads to perform.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Print the number of stored messages.
    Count,
    /// Print the newest stored timestamp (0 when empty).
    MaxTimestamp,
    /// Bulk insert a generated conversation. Ctrl-C stops between chunks.
    Seed {
        #[arg(long, default_value_t = murmur_messages::conversation::DEFAULT_DATASET_SIZE)]
        count: usize,
    },
    /// Delete every message.
    Clear,
    /// Show the root-key backend and data key state.
    Status,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output stays pipeable.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_telemetry(&cli);

    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: cli.metrics,
    })?;

    let mut config = match &cli.config {
        Some(path) => murmur_config::load_config(path)?,
        None => murmur_config::discover_and_load(),
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }
    debug!(backend = ?config.vault.backend, "configuration resolved");

    let result = message_commands::handle(cli.command, &config).await;

    if cli.metrics {
        eprint!("{}", metrics.render());
    }

    result
}
