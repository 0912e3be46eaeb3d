//! deid CLI: de-identify patient video cases.
//!
//! Usage:
//!   deid process [OPTIONS]         Run cases through the pipeline
//!   deid anonymize <DIR> --out D   Strip metadata and rename videos
//!   deid validate <FILES>...       Pre-flight check a set of videos
//!   deid segments <LABELS>         Segment a 0/1 label sequence
//!   deid check                     Check system capabilities
//!   deid init                      Write a default configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "deid",
    about = "Remove sensitive footage from patient videos and anonymize the result",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the standard location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one or more patient cases
    Process {
        /// A case as ID=DIR; every video under DIR belongs to the case
        #[arg(long = "case", value_name = "ID=DIR")]
        cases: Vec<String>,

        /// Treat each subdirectory of ROOT as a case named after it
        #[arg(long, value_name = "ROOT")]
        root: Option<PathBuf>,

        /// Pipeline: normal (cut and merge) or advanced (streaming)
        #[arg(long)]
        mode: Option<String>,

        /// Output frame rate in advanced mode
        #[arg(long)]
        fps: Option<f64>,

        /// Output frame height in advanced mode (0 keeps source size)
        #[arg(long)]
        height: Option<u32>,

        /// Frames per classification batch
        #[arg(long)]
        buffer_size: Option<usize>,

        /// Per-case working directory root
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Anonymized output directory
        #[arg(long)]
        shared_dir: Option<PathBuf>,

        /// Remove the case working directory after anonymization
        #[arg(long)]
        purge: bool,
    },

    /// Strip metadata and rename every video under a directory
    Anonymize {
        /// Directory to scan recursively
        dir: PathBuf,

        /// Destination directory
        #[arg(short, long)]
        out: PathBuf,

        /// Name outputs <PREFIX>0, <PREFIX>1, ... instead of random ids
        #[arg(long, value_name = "PREFIX")]
        sequential: Option<String>,

        /// Translation log (defaults to the configured one, outside OUT)
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Pre-flight check videos as if they formed one case
    Validate {
        /// Video files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Segment a label sequence such as 001001100
    Segments {
        /// One 0 (clear) or 1 (sensitive) per sampled frame
        labels: String,

        /// Sampling rate used to convert spans to seconds
        #[arg(long)]
        sample_fps: Option<f64>,

        /// Video duration used to clamp the last segment (seconds)
        #[arg(long, default_value = "0")]
        duration: f64,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = commands::load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    deid_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Process {
            cases,
            root,
            mode,
            fps,
            height,
            buffer_size,
            working_dir,
            shared_dir,
            purge,
        } => {
            let options = commands::process::ProcessOptions {
                cases,
                root,
                mode,
                fps,
                height,
                buffer_size,
                working_dir,
                shared_dir,
                purge,
            };
            commands::process::run(config, options).await
        }
        Commands::Anonymize {
            dir,
            out,
            sequential,
            log,
        } => commands::anonymize::run(config, dir, out, sequential, log),
        Commands::Validate { files } => commands::validate::run(config, files),
        Commands::Segments {
            labels,
            sample_fps,
            duration,
            json,
        } => commands::segments::run(&labels, sample_fps, duration, json),
        Commands::Check => commands::check::run(&config),
        Commands::Init { force } => commands::init::run(&config, cli.config, force),
    }
}
