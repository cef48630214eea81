// kegsmith/src/main.rs
use std::fs;
use std::process;

use clap::Parser;
use colored::Colorize;
use kegsmith_common::config::Config;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::CliArgs;

const LOG_ENV_VAR: &str = "KEGSMITH_LOG";
const LOG_FILE_NAME: &str = "kegsmith.log";

/// Logs go to stderr; with `-v` they are also written to a daily log file.
fn init_logging(config: &Config, verbose: u8) {
    let level_filter = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let max_log_level = level_filter.into_level().unwrap_or(tracing::Level::INFO);

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy();

    let log_dir = config.logs_dir();
    if verbose > 0 {
        if let Err(e) = fs::create_dir_all(&log_dir) {
            eprintln!(
                "{} Failed to create log directory {}: {}",
                "Warning:".yellow().bold(),
                log_dir.display(),
                e
            );
        } else {
            let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
            let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

            let stderr_writer = std::io::stderr.with_max_level(max_log_level);
            let file_writer = non_blocking_appender.with_max_level(max_log_level);

            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(stderr_writer.and(file_writer))
                .with_ansi(true)
                .without_time()
                .try_init();

            // Flushes on drop; must live until exit.
            Box::leak(Box::new(guard));

            debug!(
                "Verbose logging enabled. Writing logs to: {}/{}",
                log_dir.display(),
                LOG_FILE_NAME
            );
            return;
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .without_time()
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: Could not load configuration: {}", "Error".red().bold(), e);
            process::exit(1);
        }
    };
    init_logging(&config, cli_args.verbose);
    debug!("Using install root {}", config.root().display());

    if let Err(e) = cli_args.command.run(&config).await {
        error!("Command failed: {:#}", e);
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        process::exit(1);
    }

    debug!("Command completed successfully.");
}
