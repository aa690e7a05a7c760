use clap::Parser;
use orgdeploy::cli::output::{self, OutputMode};
use orgdeploy::cli::{self, Cli, Commands};
use orgdeploy::config::{AppConfig, LoggingConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load_from(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&format!("Failed to load configuration: {e}"));
            std::process::exit(2);
        }
    };
    init_logging(&config.logging);

    let mode = OutputMode::from_json_flag(cli.json);
    let result = match &cli.command {
        Commands::Plan { env } => cli::run_plan(&config, *env, mode).await,
        Commands::Deploy(args) => cli::run_deploy(&config, args, mode).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        output::print_error(&format!("Error: {e:#}"));
        std::process::exit(1);
    }
}

/// Console logging plus a daily-rolling file when `ORGDEPLOY_LOG_DIR` is writable
fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if logging.level.trim().is_empty() {
            "info"
        } else {
            logging.level.trim()
        };
        EnvFilter::new(format!("{level},orgdeploy=debug"))
    });

    // `rolling::daily` panics if it cannot create the initial file, so check first.
    let log_dir = std::env::var("ORGDEPLOY_LOG_DIR").ok();
    let file_layer = log_dir.as_deref().and_then(|dir| {
        let writable = std::fs::create_dir_all(dir).is_ok()
            && std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(std::path::Path::new(dir).join("orgdeploy.log"))
                .is_ok();
        if !writable {
            eprintln!(
                "Warning: Could not write to log directory {}, file logging disabled",
                dir
            );
            return None;
        }

        let file_appender = tracing_appender::rolling::daily(dir, "orgdeploy.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The process exits right after the run; keep the writer alive until then.
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let console_layer = if logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
