//! mongoport - MongoDB export/import
//!
//! # Usage
//!
//! ```bash
//! # Export one database to a native archive
//! mongoport --uri mongodb://localhost:27017 export --db shop -o shop.zip
//!
//! # Restore every archive in a directory
//! mongoport import /backups/nightly --drop
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use mongoport::cli::progress::{ConsoleEmitter, ConsoleMode};
use mongoport::cli::report::SummaryFormatter;
use mongoport::cli::{CliInterface, Commands};
use mongoport::error::Result;
use mongoport::transfer::Backend;
use mongoport::{ConnectionManager, TransferEngine, TransferOutcome};

/// Exit code used after Ctrl+C, as shells do for SIGINT
const EXIT_CANCELLED: u8 = 130;

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => {
            eprintln!("Cancelled, partial output removed");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(e) => {
            eprintln!("Error: {}", e.masked_message());
            ExitCode::FAILURE
        }
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle local subcommands (completion, config)
/// 4. Build the engine and run the transfer
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);

    if cli.handle_local_subcommand()? {
        return Ok(());
    }

    let manager = Arc::new(ConnectionManager::new(
        cli.connection_uri(),
        cli.config().connection.clone(),
    ));
    let engine = Arc::new(create_engine(&cli, Arc::clone(&manager)));
    let ctrl_c = spawn_cancel_handler(Arc::clone(&engine));

    let formatter = SummaryFormatter::new(cli.use_colors());
    let outcome = match &cli.args().command {
        Commands::Export { .. } | Commands::Import { .. } => {
            connect(&cli, &manager).await?;
            match (cli.export_request(), cli.import_request()) {
                (Some(request), _) => engine.export(request).await,
                (_, Some(request)) => engine.import(request).await,
                _ => Ok(TransferOutcome::Skipped),
            }
        }
        Commands::Preview { input } => {
            let preview = engine.preview(&cli.connection_uri(), input).await;
            ctrl_c.abort();
            let preview = preview?;
            if cli.args().json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                println!("{}", formatter.preview(&preview));
            }
            return Ok(());
        }
        Commands::Completion { .. } | Commands::Config { .. } => Ok(TransferOutcome::Skipped),
    };
    ctrl_c.abort();

    display_outcome(&cli, &formatter, outcome?);
    Ok(())
}

/// Build the engine with a console emitter matching the output flags
fn create_engine(cli: &CliInterface, manager: Arc<ConnectionManager>) -> TransferEngine {
    let mode = if cli.args().json {
        ConsoleMode::Json
    } else if cli.args().quiet {
        ConsoleMode::Silent
    } else {
        ConsoleMode::Bar
    };
    let emitter = Arc::new(ConsoleEmitter::new(mode, cli.use_colors()));
    let backend: Arc<dyn Backend> = manager;
    TransferEngine::new(cli.config().clone(), backend, emitter)
}

/// Ping the server before a transfer so a bad URI fails fast
async fn connect(cli: &CliInterface, manager: &ConnectionManager) -> Result<()> {
    cli.print_banner();
    let health = manager.connect().await?;
    if let Some(version) = health.server_version.as_deref() {
        cli.print_connection_info(version);
    }
    Ok(())
}

/// Cancel every running job on Ctrl+C; exit directly when none is running
fn spawn_cancel_handler(engine: Arc<TransferEngine>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                eprintln!("Failed to listen for Ctrl+C: {}", err);
                return;
            }
            if engine.cancel(None) == 0 {
                std::process::exit(i32::from(EXIT_CANCELLED));
            }
        }
    })
}

fn display_outcome(cli: &CliInterface, formatter: &SummaryFormatter, outcome: TransferOutcome) {
    if cli.args().json {
        return;
    }
    match outcome {
        TransferOutcome::Skipped => {
            if !cli.args().quiet {
                println!("Nothing selected, nothing to do");
            }
        }
        TransferOutcome::Exported(summary) => println!("{}", formatter.export(&summary)),
        TransferOutcome::Imported(summary) => println!("{}", formatter.import(&summary)),
    }
}

/// Initialize logging system based on verbosity level
///
/// # Arguments
/// * `cli` - CLI interface with the effective log level
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
