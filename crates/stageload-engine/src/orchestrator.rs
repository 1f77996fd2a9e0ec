//! Run coordinator: selects datasets, drives each through resolve,
//! provision, load and classify, and records one event per attempt.

use std::sync::Arc;

use stageload_state::AuditStore;
use stageload_types::dataset::{DatasetConfig, RunSelector};
use stageload_types::run::{EventId, LoadOutcome, RunId, RunStats};

use crate::catalog::WarehouseCatalog;
use crate::classify::{classify, Classification};
use crate::config::types::{EngineConfig, EnvironmentConfig};
use crate::errors::IngestError;
use crate::events::{build_event, record_event, AttemptHeader, AttemptTrace};
use crate::load::{execute_load, TagScope};
use crate::location::{resolve_location, LoadPeriod};
use crate::options::{compile_options, CopyOptions};
use crate::provision::{target_table, TableProvisioner, WarehouseSchemaInference};
use crate::rejections::{record_rejections, WarehouseLoadValidator};
use crate::warehouse::{
    Clock, DatasetSource, LoadValidator, SchemaInference, Session, SystemClock,
};

/// Per-dataset result handed back to the run loop.
struct DatasetReport {
    outcome: LoadOutcome,
    rows_loaded: u64,
    recording_failures: u64,
}

/// Drives ingestion runs against one warehouse session.
///
/// Collaborators default to the warehouse-backed implementations over the
/// same session; the `with_*` builders replace them.
pub struct RunCoordinator {
    config: EngineConfig,
    session: Arc<dyn Session>,
    audit: Arc<dyn AuditStore>,
    datasets: Option<Arc<dyn DatasetSource>>,
    inference: Arc<dyn SchemaInference>,
    validator: Arc<dyn LoadValidator>,
    clock: Arc<dyn Clock>,
}

impl RunCoordinator {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        session: Arc<dyn Session>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            inference: Arc::new(WarehouseSchemaInference::new(session.clone())),
            validator: Arc::new(WarehouseLoadValidator::new(session.clone())),
            session,
            audit,
            datasets: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Read datasets from `source` instead of the warehouse catalog tables.
    #[must_use]
    pub fn with_dataset_source(mut self, source: Arc<dyn DatasetSource>) -> Self {
        self.datasets = Some(source);
        self
    }

    #[must_use]
    pub fn with_schema_inference(mut self, inference: Arc<dyn SchemaInference>) -> Self {
        self.inference = inference;
        self
    }

    #[must_use]
    pub fn with_load_validator(mut self, validator: Arc<dyn LoadValidator>) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run every dataset matching `selector` under a fresh run id.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if the environment, default options,
    /// or dataset list cannot be prepared. Per-dataset failures never
    /// surface here; they are recorded as `FAILED` events and counted.
    pub fn run(&self, selector: &RunSelector) -> Result<RunStats, IngestError> {
        self.run_as(RunId::generate(), selector)
    }

    /// Like [`run`](Self::run), tagging every event with `run_id`.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_as(&self, run_id: RunId, selector: &RunSelector) -> Result<RunStats, IngestError> {
        let (env_name, env) = self.config.active_environment()?;
        let defaults =
            CopyOptions::from_source(&self.config.default_copy_options).map_err(|e| match e {
                IngestError::Config(message) => {
                    IngestError::Config(format!("default_copy_options: {message}"))
                }
                other => other,
            })?;
        let datasets = self.load_datasets(env, selector)?;

        tracing::info!(
            run_id = %run_id,
            environment = env_name,
            selector = %selector,
            datasets = datasets.len(),
            "Starting ingestion run"
        );

        let mut stats = RunStats::default();
        for dataset in &datasets {
            stats.begin_attempt();
            let report = self.process_dataset(run_id, env, &defaults, dataset);
            stats.record_outcome(report.outcome, report.rows_loaded);
            stats.recording_failures += report.recording_failures;
            debug_assert!(stats.is_balanced(), "run stats out of balance: {stats:?}");
        }

        tracing::info!(
            run_id = %run_id,
            attempted = stats.files_attempted,
            loaded = stats.files_loaded,
            already_loaded = stats.files_already_loaded,
            partial = stats.files_partial,
            failed = stats.files_failed,
            rows_loaded = stats.rows_loaded,
            recording_failures = stats.recording_failures,
            "Ingestion run finished"
        );
        Ok(stats)
    }

    fn load_datasets(
        &self,
        env: &EnvironmentConfig,
        selector: &RunSelector,
    ) -> Result<Vec<DatasetConfig>, IngestError> {
        let source: Arc<dyn DatasetSource> = match &self.datasets {
            Some(source) => source.clone(),
            None => Arc::new(
                WarehouseCatalog::new(self.session.clone(), &env.warehouse)
                    .map_err(|e| IngestError::config(format!("{e:#}")))?,
            ),
        };
        source.datasets(selector).map_err(|e| {
            IngestError::config(format!("failed to load datasets for {selector}: {e:#}"))
        })
    }

    /// Attempt one dataset and record its event. Never fails.
    fn process_dataset(
        &self,
        run_id: RunId,
        env: &EnvironmentConfig,
        defaults: &CopyOptions,
        dataset: &DatasetConfig,
    ) -> DatasetReport {
        let event_id = EventId::generate();
        let started_at = self.clock.now();
        let mut trace = AttemptTrace::default();
        let mut recording_failures = 0;

        let result = {
            let scope = TagScope::open(self.session.as_ref(), &dataset.name);
            self.attempt(
                &scope,
                env,
                defaults,
                dataset,
                event_id,
                &mut trace,
                &mut recording_failures,
            )
        };

        match &result {
            Ok(classification) => tracing::info!(
                run_id = %run_id,
                dataset = dataset.name,
                table = trace.table_name,
                outcome = %classification.outcome,
                rows_loaded = classification.rows_loaded,
                "Dataset attempt finished"
            ),
            Err(e) => tracing::error!(
                run_id = %run_id,
                dataset = dataset.name,
                table = trace.table_name,
                "Dataset attempt failed: {}",
                e.describe()
            ),
        }

        let header = AttemptHeader {
            run_id,
            event_id,
            dataset,
            started_at,
            finished_at: self.clock.now(),
        };
        let event = build_event(header, &trace, &result);
        if let Err(e) = record_event(self.audit.as_ref(), &event) {
            tracing::error!(
                run_id = %run_id,
                dataset = dataset.name,
                "Event not recorded: {}",
                e.describe()
            );
            recording_failures += 1;
        }

        DatasetReport {
            outcome: event.outcome,
            rows_loaded: event.rows_loaded,
            recording_failures,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn attempt(
        &self,
        scope: &TagScope<'_>,
        env: &EnvironmentConfig,
        defaults: &CopyOptions,
        dataset: &DatasetConfig,
        event_id: EventId,
        trace: &mut AttemptTrace,
        recording_failures: &mut u64,
    ) -> Result<Classification, IngestError> {
        let table = target_table(&env.warehouse, dataset)?;
        trace.table_name = table.to_string();

        let period = LoadPeriod::from_datetime(self.clock.now());
        let location = resolve_location(dataset, &env.stage, period)?;
        trace.file_path.clone_from(&location.file_path);

        TableProvisioner::new(self.session.as_ref(), self.inference.as_ref())
            .ensure_table(&table, dataset, &location)?;

        let option_clauses = compile_options(defaults, &dataset.copy_options)?;

        if let Some(tag) = &dataset.query_tag {
            scope.attach(tag).map_err(|source| IngestError::Load {
                table: table.to_string(),
                source,
            })?;
        }

        let receipt = execute_load(
            self.session.as_ref(),
            &table,
            &location,
            &dataset.file_format,
            &option_clauses,
        )?;
        trace.load_id = Some(receipt.load_id.clone());

        let classification = classify(&receipt.rows);

        if let Err(e) = record_rejections(
            self.validator.as_ref(),
            self.audit.as_ref(),
            event_id,
            &table,
            &receipt.load_id,
        ) {
            tracing::error!(
                dataset = dataset.name,
                table = %table,
                "Rejected records not recorded: {}",
                e.describe()
            );
            *recording_failures += 1;
        }

        Ok(classification)
    }
}
