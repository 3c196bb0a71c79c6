mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "untis-ics")]
#[command(about = "Export a WebUntis timetable as an ICS calendar")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the timetable and publish the calendar file
    Sync {
        /// Config file (defaults to WEBUNTIS_* variables, then config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the output path from the configuration
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the calendar name from the configuration
        #[arg(long)]
        calendar_name: Option<String>,
    },

    /// Convert a JSON array of lesson records into a calendar file
    Convert {
        /// JSON file with lesson records
        #[arg(short, long)]
        input: PathBuf,

        /// Calendar file to write
        #[arg(short, long)]
        output: PathBuf,

        /// IANA timezone of the school
        #[arg(long, default_value = "Europe/Brussels")]
        timezone: String,

        /// Calendar name
        #[arg(long, default_value = "WebUntis Timetable")]
        calendar_name: String,

        /// Add a display alarm this many minutes before each lesson
        #[arg(long)]
        reminder_minutes: Option<u32>,

        /// Leave teachers, classes and notes out of the event description
        #[arg(long)]
        no_description: bool,
    },

    /// List the classes of the configured school
    Classes {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check that the configured credentials can log in
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("untis_ics_cli={log_level},untis_ics_core={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Sync {
            config,
            output,
            calendar_name,
        } => commands::sync_command(config.as_deref(), output, calendar_name).await,

        Commands::Convert {
            input,
            output,
            timezone,
            calendar_name,
            reminder_minutes,
            no_description,
        } => {
            commands::convert_command(commands::ConvertParams {
                input,
                output,
                timezone,
                calendar_name,
                reminder_minutes,
                include_description: !no_description,
            })
            .await
        }

        Commands::Classes { config } => commands::classes_command(config.as_deref()).await,

        Commands::Validate { config } => commands::validate_command(config.as_deref()).await,
    }
}
