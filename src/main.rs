use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use sysinfo::System;

use tagbox::error::AppResult;
use tagbox::library::MusicLibrary;
use tagbox::messaging::Event;
use tagbox::{Appliance, Config, ShutdownReason};

const LOG_TARGET_STARTUP: &str = "tagbox::startup";

/// Exit code for the debug interrupt tag
const EXIT_DEBUG: u8 = 2;

#[derive(Parser, Debug)]
#[command(version, about = "Control core for an RFID tag-triggered audio box")]
struct Args {
    /// Configuration file; defaults to the platform config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mirror the log to stdout
    #[arg(long)]
    log_stdout: bool,

    /// Validate the music library layout and exit
    #[arg(long)]
    check_library: bool,
}

/// Initialize tracing with daily file rotation
///
/// Logs are written to the configured `log_dir`, or
/// `<data dir>/tagbox/logs/tagbox.YYYY-MM-DD.log` when unset.
fn initialize_tracing(log_dir: &Path, log_stdout: bool) {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(log_dir, "tagbox.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    let console_layer = log_stdout.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!("Log directory: {}", log_dir.display());
}

fn log_runtime_environment() {
    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());
    let architecture = std::env::consts::ARCH;

    tracing::info!(target: LOG_TARGET_STARTUP, "Starting tagbox v{} on ({})", version, architecture);
    tracing::info!(target: LOG_TARGET_STARTUP, "Operating System: {} (kernel {})", os_name, kernel);
}

fn check_library(config: &Config) -> ExitCode {
    let root = &config.tags.music_root;
    match MusicLibrary::scan(root) {
        Ok(library) => {
            println!("{}: {} tags", root.display(), library.len());
            for tag in library.tags() {
                let albums = library.albums(tag).map_or(0, <[_]>::len);
                println!("  {} ({} albums)", tag, albums);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", root.display(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> AppResult<ShutdownReason> {
    let mut appliance = Appliance::start(config).context("starting appliance")?;

    let publisher = appliance.publisher();
    ctrlc::set_handler(move || publisher.publish(Event::Interrupt))
        .context("installing SIGINT handler")?;

    let result = appliance.run();
    appliance.shutdown();
    result.context("dispatcher loop failed")
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (config, source) = match Config::load(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.check_library {
        return check_library(&config);
    }

    initialize_tracing(&config.log_dir(), args.log_stdout);
    log_runtime_environment();
    tracing::info!(target: LOG_TARGET_STARTUP, "{}", source);

    match run(config) {
        Ok(ShutdownReason::InterruptTag) => {
            tracing::info!(target: LOG_TARGET_STARTUP, "exiting on interrupt tag");
            ExitCode::from(EXIT_DEBUG)
        }
        Ok(reason) => {
            tracing::info!(target: LOG_TARGET_STARTUP, "exiting: {}", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(target: LOG_TARGET_STARTUP, "{:#}", e);
            ExitCode::FAILURE
        }
    }
}
