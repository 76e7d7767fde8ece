//! Command-line interface for mongoport
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and argument overrides
//! - Turning subcommands into engine requests
//! - The `completion` and `config` subcommands, which need no server

pub mod completion;
pub mod progress;
pub mod report;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{Config, EngineKind, LogLevel};
use crate::error::Result;
use crate::transfer::{ExportRequest, ImportOptions, ImportRequest, Namespace, Selection};
use crate::utils::mask::mask_credentials;

/// Bulk export/import for MongoDB
#[derive(Parser, Debug)]
#[command(
    name = "mongoport",
    version,
    about = "Export and import MongoDB databases",
    long_about = "Export databases and collections to archives and restore them again, either
natively through the driver or with the MongoDB Database Tools."
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(long, global = true, value_name = "URI")]
    pub uri: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Print events as JSON lines instead of a progress bar
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Connection timeout in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for mongoport
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export databases or collections to archives
    Export {
        /// Database to export (repeatable)
        #[arg(long = "db", value_name = "NAME")]
        databases: Vec<String>,

        /// Collection to export; requires exactly one --db (repeatable)
        #[arg(long = "collection", value_name = "NAME")]
        collections: Vec<String>,

        /// Collection to leave out of the single --db (repeatable)
        #[arg(long = "exclude-collection", value_name = "NAME")]
        excluded_collections: Vec<String>,

        /// Collection to leave out, qualified by database (repeatable)
        #[arg(long = "exclude", value_name = "DB.COLL", value_parser = parse_namespace)]
        exclusions: Vec<Namespace>,

        /// Output file, or directory when several archives are produced
        #[arg(short = 'o', long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Export engine (overrides transfer.engine)
        #[arg(long, value_enum)]
        engine: Option<EngineKind>,

        /// Do not compress tool archives
        #[arg(long)]
        no_gzip: bool,

        /// Job id used in events
        #[arg(long, value_name = "ID")]
        job_id: Option<String>,
    },

    /// Import an archive, a directory of archives, or a dump directory
    Import {
        /// Archive file or directory
        #[arg(value_name = "PATH")]
        input: Option<PathBuf>,

        /// Drop each collection before restoring it
        #[arg(long)]
        drop: bool,

        /// Parse and count without writing
        #[arg(long)]
        dry_run: bool,

        /// Restore only matching namespaces (`db.*`, `db.coll`; repeatable)
        #[arg(long = "ns-include", value_name = "PATTERN")]
        ns_include: Vec<String>,

        /// Job id used in events
        #[arg(long, value_name = "ID")]
        job_id: Option<String>,
    },

    /// List what an archive or directory contains without restoring it
    Preview {
        /// Archive file or directory
        #[arg(value_name = "PATH")]
        input: PathBuf,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type
        #[arg(value_enum, value_name = "SHELL")]
        shell: Shell,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

fn parse_namespace(value: &str) -> std::result::Result<Namespace, String> {
    Namespace::parse(value)
        .filter(|ns| !ns.database.is_empty() && !ns.collection.is_empty())
        .ok_or_else(|| format!("expected <database>.<collection>, got '{value}'"))
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;

        if let Err(e) = config.validate() {
            eprintln!("Warning: Configuration validation failed: {}", e);
            eprintln!("Using default configuration instead.");
            config = Config::default();
        }

        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    /// Apply CLI arguments to configuration
    ///
    /// # Arguments
    /// * `config` - Configuration to modify
    /// * `args` - Command-line arguments
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };

        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Whether terminal output may use colors
    pub fn use_colors(&self) -> bool {
        !self.args.no_color && !self.args.json
    }

    /// Connection URI: `--uri` first, then the configured default
    pub fn connection_uri(&self) -> String {
        self.args
            .uri
            .clone()
            .unwrap_or_else(|| self.config.connection.default_uri.clone())
    }

    /// Connection URI safe to print
    pub fn sanitized_connection_uri(&self) -> String {
        mask_credentials(&self.connection_uri())
    }

    /// Build the export request for an `export` invocation
    ///
    /// # Returns
    /// * `Option<ExportRequest>` - `None` for any other subcommand
    pub fn export_request(&self) -> Option<ExportRequest> {
        let Commands::Export {
            databases,
            collections,
            excluded_collections,
            exclusions,
            output,
            engine,
            no_gzip,
            job_id,
        } = &self.args.command
        else {
            return None;
        };

        let mut by_database: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for ns in exclusions {
            by_database
                .entry(ns.database.clone())
                .or_default()
                .push(ns.collection.clone());
        }

        Some(ExportRequest {
            uri: self.connection_uri(),
            selection: Selection {
                databases: databases.clone(),
                collections: collections.clone(),
                excluded_collections: excluded_collections.clone(),
                exclusions: by_database,
            },
            output: output.clone(),
            engine: *engine,
            gzip: no_gzip.then_some(false),
            job_id: job_id.clone(),
        })
    }

    /// Build the import request for an `import` invocation
    ///
    /// # Returns
    /// * `Option<ImportRequest>` - `None` for any other subcommand
    pub fn import_request(&self) -> Option<ImportRequest> {
        let Commands::Import {
            input,
            drop,
            dry_run,
            ns_include,
            job_id,
        } = &self.args.command
        else {
            return None;
        };

        Some(ImportRequest {
            uri: self.connection_uri(),
            input: input.clone(),
            options: ImportOptions {
                drop: *drop,
                dry_run: *dry_run,
                ns_include: ns_include.clone(),
            },
            job_id: job_id.clone(),
        })
    }

    /// Handle subcommands that need no database connection
    ///
    /// # Returns
    /// * `Result<bool>` - True if the subcommand was handled here
    pub fn handle_local_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Commands::Completion { shell } => {
                completion::generate_completion(*shell)?;
                Ok(true)
            }
            Commands::Config { show, validate } => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist, defaults apply");
            return;
        }

        match Config::load_from_file(Some(&path)) {
            Ok(config) => match config.validate() {
                Ok(()) => println!("Configuration is valid"),
                Err(e) => println!("Configuration validation failed: {}", e),
            },
            Err(e) => println!("Failed to load configuration: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.config_path().display());
        println!();
        let mut shown = self.config.clone();
        shown.connection.default_uri = mask_credentials(&shown.connection.default_uri);
        println!("{}", shown.to_toml()?);
        Ok(())
    }

    /// Configuration file path (from args or default)
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path)
    }

    /// Print the target server unless quiet
    pub fn print_banner(&self) {
        if !self.args.quiet && !self.args.json {
            eprintln!("Connecting to: {}", self.sanitized_connection_uri());
        }
    }

    /// Print server details after connecting
    ///
    /// # Arguments
    /// * `mongodb_version` - MongoDB server version
    pub fn print_connection_info(&self, mongodb_version: &str) {
        if !self.args.quiet && !self.args.json {
            eprintln!("Using MongoDB: {}", mongodb_version);
        }
    }
}
