//! cliprelay CLI: resolve editor timelines into published segments.
//!
//! Usage:
//!   cliprelay resolve <TIMELINE>   Extract, publish, and rewrite a timeline
//!   cliprelay analyze <TIMELINE>   Show source assets and usages
//!   cliprelay check                Check ffmpeg/ffprobe and configuration
//!   cliprelay config init|show     Manage the config file

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use cliprelay_common::config::{AppConfig, ExtractionMode};

mod commands;

#[derive(Parser)]
#[command(
    name = "cliprelay",
    about = "Resolve editor timelines into trimmed, published video segments",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, publish, and rewrite every unpublished video item
    Resolve {
        /// Timeline JSON file
        timeline: PathBuf,

        /// Output file (defaults to `<timeline>.resolved.json`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Job id used for naming and log correlation (random if omitted)
        #[arg(long)]
        job_id: Option<String>,

        /// Extraction mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Local content cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Write the resolve report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the source assets and usages of a timeline
    Analyze {
        /// Timeline JSON file
        timeline: PathBuf,
    },

    /// Check the media engine and configuration
    Check,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Re-encode; frame-exact cuts
    Exact,
    /// Stream copy from the preceding keyframe
    Fast,
}

impl From<ModeArg> for ExtractionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Exact => ExtractionMode::Exact,
            ModeArg::Fast => ExtractionMode::Fast,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    cliprelay_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Resolve {
            timeline,
            output,
            job_id,
            mode,
            cache_dir,
            report,
        } => {
            if let Some(mode) = mode {
                config.extraction.mode = mode.into();
            }
            if cache_dir.is_some() {
                config.locator.cache_dir = cache_dir;
            }
            commands::resolve::run(config, timeline, output, job_id, report).await
        }
        Commands::Analyze { timeline } => commands::analyze::run(&config, timeline),
        Commands::Check => commands::check::run(&config).await,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config::init(force),
            ConfigAction::Show => commands::config::show(&config),
        },
    }
}
