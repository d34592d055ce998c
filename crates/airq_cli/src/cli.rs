//! Command-line surface for the AirQ client.
use std::path::PathBuf;

use airq_core::JobKind;
use clap::{Parser, Subcommand, ValueEnum};
use engine_logging::LogDestination;

use crate::config::TransportSetting;

#[derive(Debug, Parser)]
#[command(name = "airq")]
#[command(about = "AirQ: upload air-quality datasets and run forecasts", long_about = None)]
pub struct Cli {
    /// TOML file with client settings.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Backend base URL, e.g. http://127.0.0.1:8000/api/v1.
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// How advanced forecast progress is delivered.
    #[arg(long, global = true, value_enum)]
    pub transport: Option<TransportSetting>,

    /// Where log output goes.
    #[arg(long, global = true, value_enum, default_value_t = LogTarget::File)]
    pub log: LogTarget,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Upload a dataset file (.csv by default).
    Upload {
        /// Path to the dataset.
        file: PathBuf,
    },

    /// Run a forecast job and follow its progress.
    Run {
        #[arg(value_enum)]
        kind: ForecastKind,
    },

    /// Show the server's dataset and forecast state.
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ForecastKind {
    Basic,
    Advanced,
}

impl From<ForecastKind> for JobKind {
    fn from(kind: ForecastKind) -> Self {
        match kind {
            ForecastKind::Basic => JobKind::Basic,
            ForecastKind::Advanced => JobKind::Advanced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl LogTarget {
    pub fn destination(self) -> LogDestination {
        match self {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::default_file(),
            LogTarget::Both => LogDestination::Both(PathBuf::from(engine_logging::DEFAULT_LOG_FILE)),
        }
    }
}
