use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use untis_ics_core::{prelude::*, timezone};

/// Parameters of the `convert` command
pub struct ConvertParams {
    pub input: PathBuf,
    pub output: PathBuf,
    pub timezone: String,
    pub calendar_name: String,
    pub reminder_minutes: Option<u32>,
    pub include_description: bool,
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let config = SyncConfig::load(path).context("Failed to load configuration")?;
    tracing::debug!("Loaded {:?}", config);
    Ok(config)
}

fn print_summary(summary: &SyncSummary) {
    println!(
        "✓ {} events ({} unchanged, {} rejected, {} duplicates dropped)",
        summary.events, summary.unchanged, summary.rejected, summary.duplicates
    );
    if summary.published {
        println!("✓ Calendar written to {}", summary.destination);
    } else {
        println!("✓ {} is already up to date", summary.destination);
    }
}

/// Fetch from WebUntis and publish the calendar file
pub async fn sync_command(
    config_path: Option<&Path>,
    output: Option<PathBuf>,
    calendar_name: Option<String>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(output) = output {
        config.output = output;
    }
    if let Some(name) = calendar_name {
        config.calendar_name = name;
    }

    tracing::info!(
        "Syncing {} on {} as {}",
        config.school,
        config.server,
        config.username
    );

    let options = config.ics_options()?;
    let sink = FileSink::new(config.output.clone());
    let provider = WebUntisProvider::new(config)?;

    println!("Fetching timetable...");
    let summary = run_sync(&provider, &sink, &options).await?;
    print_summary(&summary);

    Ok(())
}

/// Convert lesson records from a JSON file
pub async fn convert_command(params: ConvertParams) -> Result<()> {
    let options = IcsOptions {
        calendar_name: params.calendar_name,
        timezone: timezone::parse_timezone(&params.timezone)?,
        include_description: params.include_description,
        reminder_minutes: params.reminder_minutes,
    };

    let source = JsonFileSource::new(params.input);
    let sink = FileSink::new(params.output);

    tracing::info!("Converting {}", source.path().display());
    let summary = run_sync(&source, &sink, &options).await?;
    print_summary(&summary);

    Ok(())
}

/// List the school's classes
pub async fn classes_command(config_path: Option<&Path>) -> Result<()> {
    let provider = WebUntisProvider::new(load_config(config_path)?)?;

    let classes = provider.list_classes().await?;
    if classes.is_empty() {
        println!("No classes available");
        return Ok(());
    }

    println!("Available classes:");
    for class in classes {
        match class.longname.as_deref().filter(|l| !l.is_empty()) {
            Some(longname) => println!("  {} - {} (ID: {})", class.name, longname, class.id),
            None => println!("  {} (ID: {})", class.name, class.id),
        }
    }

    Ok(())
}

/// Log in and out again
pub async fn validate_command(config_path: Option<&Path>) -> Result<()> {
    let provider = WebUntisProvider::new(load_config(config_path)?)?;

    println!("Validating credentials...");
    provider.validate().await?;
    println!("✓ Login succeeded for {}", provider.config().username);

    Ok(())
}
