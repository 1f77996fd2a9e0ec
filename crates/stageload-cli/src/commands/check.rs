use std::path::Path;

use anyhow::{Context, Result};

use stageload_engine::config::{parser, validator};

/// Execute the `check` command: validate engine config and dataset file.
pub fn execute(config_path: &Path, datasets_path: Option<&Path>) -> Result<()> {
    let config = parser::parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    validator::validate_config(&config)?;

    let (env_name, env) = config.active_environment()?;
    println!("Engine config:     OK");
    println!(
        "Environment:       {env_name} ({}.{}, stage {})",
        env.warehouse.database, env.warehouse.schema, env.stage.name
    );

    if let Some(datasets_path) = datasets_path {
        check_datasets(datasets_path)?;
    }

    println!("\nAll checks passed.");
    Ok(())
}

fn check_datasets(datasets_path: &Path) -> Result<()> {
    let entries = parser::parse_datasets(datasets_path)
        .with_context(|| format!("Failed to parse datasets: {}", datasets_path.display()))?;
    validator::validate_datasets(&entries)?;

    let active = entries.iter().filter(|e| e.active).count();
    let adhoc = entries.iter().filter(|e| e.dataset.is_adhoc()).count();
    println!(
        "Datasets:          OK ({} total, {active} active, {adhoc} ad-hoc)",
        entries.len()
    );
    tracing::debug!(path = %datasets_path.display(), "Dataset file validated");
    Ok(())
}
