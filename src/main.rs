use clap::Parser;
use std::sync::Arc;
use swapd::cli::{self, Cli, Commands};
use swapd::config::{AppConfig, LoggingConfig};
use swapd::coordinator::{build_orchestrator, run_daemon};
use swapd::error::{Result, SwapdError};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    let _guard = init_logging(&config.logging);

    if let Err(problems) = config.validate() {
        for problem in &problems {
            error!("Invalid configuration: {}", problem);
        }
        return Err(SwapdError::Validation(problems.join("; ")));
    }
    info!(config_dir = %cli.config.display(), "Configuration loaded");

    let orchestrator = Arc::new(build_orchestrator(config));
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(orchestrator).await?,
        Commands::SaveHistory => cli::save_history(&orchestrator).await?,
        Commands::Retrain => cli::retrain(&orchestrator).await?,
        Commands::Predict => cli::predict(&orchestrator).await?,
        Commands::Pending => cli::pending(&orchestrator).await?,
        Commands::Resolve {
            pair,
            quote_id,
            resolution,
        } => cli::resolve(&orchestrator, &pair, &quote_id, &resolution).await?,
    }
    Ok(())
}

/// Console logging plus an optional daily rolling file. The returned guard
/// flushes the file writer and must live until exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},swapd=debug", config.level)));

    let (file_layer, guard) = match &config.dir {
        Some(dir) => match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, "swapd.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not create log directory {} ({}), file logging disabled",
                    dir.display(),
                    e
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
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

    guard
}
