mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stageload",
    version,
    about = "Load dated staged files into warehouse tables with an audit trail"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate engine configuration and, optionally, a dataset file
    Check {
        /// Path to engine config YAML file
        config: PathBuf,
        /// Path to dataset YAML file
        #[arg(long)]
        datasets: Option<PathBuf>,
    },
    /// Print the statements a run would issue for each selected dataset
    Render {
        /// Path to engine config YAML file
        config: PathBuf,
        /// Path to dataset YAML file
        #[arg(long)]
        datasets: PathBuf,
        /// Load period year (default: current year)
        #[arg(long, requires = "month")]
        year: Option<i32>,
        /// Load period month, 1-12 (default: current month)
        #[arg(long, requires = "year")]
        month: Option<u32>,
        /// Only datasets of this data source
        #[arg(long, conflicts_with = "adhoc")]
        source: Option<String>,
        /// Only the ad-hoc dataset with this id
        #[arg(long)]
        adhoc: Option<String>,
        /// Emit plans as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Check { config, datasets } => {
            commands::check::execute(&config, datasets.as_deref())
        }
        Commands::Render {
            config,
            datasets,
            year,
            month,
            source,
            adhoc,
            json,
        } => {
            let selector = commands::render::selector(source, adhoc);
            commands::render::execute(&config, &datasets, year.zip(month), &selector, json)
        }
    }
}
