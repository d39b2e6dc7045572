//! C0 Window Host CLI
//!
//! Offloads windowed weighted means of IMU samples to a C0-microSD.

use anyhow::{Context, Result};
use c0_window_host::{
    config::Config,
    core::AuxiliaryLayout,
    device::{
        CancelToken, DeviceError, DeviceMode, DeviceSession, FileTransport, MockTransport,
        SocTransport,
    },
    io::{read_samples_from_path, RecordWriter},
    pipeline::{PipelineError, WeightedRun},
    telemetry::create_shared_stats,
    VERSION,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "c0-window")]
#[command(version = VERSION)]
#[command(about = "Host application for the C0-microSD accelerometer application", long_about = None)]
struct Cli {
    /// Path of the C0-microSD
    device_path: PathBuf,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get an array of weighted means from a CSV file with IMU data
    Weighted {
        /// Path to CSV file
        csv_path: PathBuf,

        /// Window size (default: 10, or the configured value)
        #[arg(long, value_parser = parse_window_size)]
        window_size: Option<usize>,

        /// Output CSV file (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Comma-separated names of the auxiliary columns to carry through
        #[arg(long)]
        aux_columns: Option<String>,

        /// Run against a simulated device instead of the device path
        #[arg(long)]
        simulate: bool,
    },

    /// Show device configuration and status
    Status {
        /// Query a simulated device
        #[arg(long)]
        simulate: bool,
    },

    /// Show configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

struct WeightedArgs {
    csv_path: PathBuf,
    window_size: Option<usize>,
    output: Option<PathBuf>,
    aux_columns: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_cancelled(&e) => {
            eprintln!("Interrupted; device released.");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("An error occurred while calculating:\n{e:#}\nAborting.");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Commands::Weighted {
            csv_path,
            window_size,
            output,
            aux_columns,
            simulate,
        } => {
            let args = WeightedArgs {
                csv_path,
                window_size,
                output,
                aux_columns,
            };
            let cancel = CancelToken::new();
            ctrlc_handler(cancel.clone())?;

            eprintln!("Getting weighted means from: {}", args.csv_path.display());
            if simulate {
                cmd_weighted(simulated_device(&config), &args, &config, cancel)
            } else {
                cmd_weighted(open_device(&cli.device_path, &config)?, &args, &config, cancel)
            }
        }
        Commands::Status { simulate } => {
            if simulate {
                cmd_status(simulated_device(&config), &config)
            } else {
                cmd_status(open_device(&cli.device_path, &config)?, &config)
            }
        }
        Commands::Config { init } => cmd_config(&config, cli.config, init),
    }
}

fn cmd_weighted<T: SocTransport>(
    transport: T,
    args: &WeightedArgs,
    config: &Config,
    cancel: CancelToken,
) -> Result<()> {
    let window_size = args.window_size.unwrap_or(config.window_size);
    let stats = create_shared_stats();

    let mut session = DeviceSession::connect(transport, config.session.clone())
        .context("Failed to connect to the C0-microSD")?
        .with_cancel_token(cancel)
        .with_stats(stats.clone());

    eprintln!("{}", session.info()?);

    let input = read_samples_from_path(&args.csv_path)?;
    session.check_cancelled()?;
    eprintln!("Read {} rows from CSV file.", input.len());
    if !input.skipped.is_empty() {
        eprintln!("Skipped {} malformed rows.", input.skipped.len());
    }

    let layout = match (&args.aux_columns, &config.auxiliary_columns) {
        (Some(list), _) => AuxiliaryLayout::from_csv(list),
        (None, Some(names)) => AuxiliaryLayout::new(names.clone()),
        (None, None) => AuxiliaryLayout::detect(input.max_columns),
    };

    let mut writer = match &args.output {
        Some(path) => RecordWriter::to_path(path, &layout)
            .with_context(|| format!("Failed to create output {path:?}"))?,
        None => RecordWriter::to_stdout(&layout)?,
    };

    eprintln!("Sending windows to C0-microSD (window size {window_size})...");
    let outcome =
        WeightedRun::new(window_size, layout).execute(&mut session, &input, &mut writer, &stats)?;
    writer.finish()?;
    session.close()?;

    if let Some(path) = &args.output {
        eprintln!("Wrote {} records to {:?}", outcome.records, path);
    }
    eprintln!();
    eprintln!("{}", stats.summary());
    Ok(())
}

fn cmd_status<T: SocTransport>(transport: T, config: &Config) -> Result<()> {
    let mut session = DeviceSession::connect(transport, config.session.clone())
        .context("Failed to connect to the C0-microSD")?;

    println!("{}", session.info()?);
    match session.require_mode(&DeviceMode::Soc) {
        Ok(()) => println!("Ready for commands."),
        Err(e) => println!("Not ready: {e}"),
    }

    session.close()?;
    Ok(())
}

fn cmd_config(config: &Config, path: Option<PathBuf>, init: bool) -> Result<()> {
    if init {
        let written = match path {
            Some(path) => {
                Config::default().save_to(&path)?;
                path
            }
            None => Config::default().save()?,
        };
        println!("Wrote default configuration to {written:?}");
        return Ok(());
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file: {:?}",
        path.unwrap_or_else(Config::config_path)
    );
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn open_device(path: &Path, config: &Config) -> Result<FileTransport> {
    FileTransport::open(path, config.layout.clone())
        .with_context(|| format!("Failed to open C0-microSD at {path:?}"))
}

fn simulated_device(config: &Config) -> MockTransport {
    tracing::info!("using simulated device");
    MockTransport::new().with_buffer_sizes(config.layout.mosi_size, config.layout.miso_size)
}

fn parse_window_size(s: &str) -> Result<usize, String> {
    let size: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid window size"))?;
    if size == 0 {
        return Err("window size must be at least 1".to_string());
    }
    Ok(size)
}

fn is_cancelled(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<PipelineError>()
        .is_some_and(PipelineError::is_cancelled)
        || matches!(
            error.downcast_ref::<DeviceError>(),
            Some(DeviceError::Cancelled)
        )
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("c0_window_host={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(cancel: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || cancel.cancel()).context("Error setting Ctrl+C handler")
}
