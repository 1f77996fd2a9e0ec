use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use stageload_engine::catalog::FileCatalog;
use stageload_engine::config::{parser, validator};
use stageload_engine::location::LoadPeriod;
use stageload_engine::options::CopyOptions;
use stageload_engine::plan::{plan_dataset, DatasetPlan};
use stageload_engine::DatasetSource;
use stageload_types::dataset::RunSelector;

/// Build the dataset selector from the `--source`/`--adhoc` flags.
pub fn selector(source: Option<String>, adhoc: Option<String>) -> RunSelector {
    match (source, adhoc) {
        (_, Some(id)) => RunSelector::Adhoc(id),
        (Some(source), None) => RunSelector::Source(source),
        (None, None) => RunSelector::AllActive,
    }
}

/// Execute the `render` command: print the load plan of every selected
/// dataset without connecting to a warehouse.
pub fn execute(
    config_path: &Path,
    datasets_path: &Path,
    period: Option<(i32, u32)>,
    selector: &RunSelector,
    json: bool,
) -> Result<()> {
    let config = parser::parse_config(config_path)
        .with_context(|| format!("Failed to parse config: {}", config_path.display()))?;
    validator::validate_config(&config)?;
    let (env_name, env) = config.active_environment()?;
    let defaults = CopyOptions::from_source(&config.default_copy_options)
        .context("default_copy_options")?;

    let period = match period {
        Some((year, month)) => match LoadPeriod::new(year, month) {
            Some(period) => period,
            None => bail!("invalid load period {year}-{month}"),
        },
        None => LoadPeriod::from_datetime(Utc::now()),
    };

    let catalog = FileCatalog::load(datasets_path)?;
    let datasets = catalog.datasets(selector)?;
    if datasets.is_empty() {
        bail!("No datasets match {selector}");
    }
    tracing::info!(
        environment = env_name,
        selector = %selector,
        datasets = datasets.len(),
        "Rendering load plans for {:04}-{:02}",
        period.year(),
        period.month()
    );

    let mut plans = Vec::new();
    let mut failures = Vec::new();
    for dataset in &datasets {
        match plan_dataset(env, &defaults, dataset, period) {
            Ok(plan) => plans.push(plan),
            Err(e) => failures.push((dataset.name.clone(), e.describe())),
        }
    }

    if json {
        let failed: Vec<_> = failures
            .iter()
            .map(|(dataset, error)| serde_json::json!({ "dataset": dataset, "error": error }))
            .collect();
        let output = serde_json::json!({
            "environment": env_name,
            "period": format!("{:04}-{:02}", period.year(), period.month()),
            "plans": plans,
            "failed": failed,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for plan in &plans {
            print_plan(plan);
        }
        for (dataset, error) in &failures {
            println!("-- {dataset}: FAILED");
            println!("--   {error}\n");
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        bail!("{} dataset(s) could not be planned", failures.len())
    }
}

fn print_plan(plan: &DatasetPlan) {
    println!("-- {} -> {}", plan.dataset, plan.table);
    println!("-- file: {}", plan.stage_path);
    match &plan.create_table {
        Some(ddl) => println!("{ddl};"),
        None => println!("-- table created from inferred schema when missing"),
    }
    println!("{};", plan.enable_schema_evolution);
    println!("{};\n", plan.copy);
}
