//! One batch run of the alert action
//!
//! The host supplies a JSON payload naming the results file and carrying the
//! alert-time configuration. A run resolves the settings, folds the results
//! into events and hands each event to the submission sink.

use crate::aggregator::EventAggregator;
use crate::config::{AlertConfig, AppConfig, Settings};
use crate::dispatch::{
    utf8_environment, DispatchReport, ProcessSink, SubmissionDispatcher, SubmissionSink,
};
use crate::error::{ResultsError, RunError};
use crate::results::ResultsReader;
use log::{debug, info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Payload the host writes to stdin
#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    /// Alert-time configuration
    #[serde(default)]
    pub configuration: AlertConfig,
    /// Location of the gzip-compressed CSV results
    pub results_file: Option<PathBuf>,
}

impl Payload {
    /// Parse the payload JSON
    pub fn from_json(input: &str) -> Result<Self, RunError> {
        serde_json::from_str(input).map_err(|e| RunError::InvalidPayload(e.to_string()))
    }

    /// Results file path, which every payload must carry
    pub fn results_path(&self) -> Result<&Path, RunError> {
        self.results_file
            .as_deref()
            .ok_or_else(|| RunError::InvalidPayload("missing 'results_file'".to_string()))
    }
}

/// What a completed run did
#[derive(Debug)]
pub struct RunSummary {
    /// Rows that became attributes
    pub rows_added: usize,
    /// Rows rejected for lacking `type` or `value`
    pub rows_skipped: usize,
    /// Per-event dispatch outcome
    pub report: DispatchReport,
}

/// Run a batch against the process-backed sink
///
/// Checks for the results file first, then loads the installation file at
/// `config_path` and builds the child environment from the current one.
pub fn execute(payload: &Payload, config_path: &Path) -> Result<RunSummary, RunError> {
    let results_path = payload.results_path()?;
    if !results_path.exists() {
        return Err(ResultsError::Missing(results_path.display().to_string()).into());
    }

    let app = AppConfig::load(config_path)?;
    let parent_env = utf8_environment(std::env::vars_os());
    let sink = ProcessSink::from_config(&app.submission, parent_env);

    run(payload, &app, sink)
}

/// Run a batch against any sink
///
/// Settings are resolved before the results file is opened, so a bad
/// classification code stops the run before any event exists. An I/O
/// failure while streaming stops it before any event is dispatched.
pub fn run<S: SubmissionSink>(
    payload: &Payload,
    app: &AppConfig,
    sink: S,
) -> Result<RunSummary, RunError> {
    let results_path = payload.results_path()?;
    debug!("Creating events with config {:?}", payload.configuration.redacted());

    let settings = Settings::resolve(&payload.configuration, app)?;
    let reader = ResultsReader::open(results_path)?;
    debug!(
        "Results columns: {}",
        reader.headers().collect::<Vec<_>>().join(",")
    );

    let mut aggregator = EventAggregator::new(&settings);
    for (position, row) in reader.enumerate() {
        if let Err(e) = aggregator.add_row(&row?) {
            warn!("Skipping result row {}: {}", position + 1, e);
        }
    }
    let rows_added = aggregator.rows_added();
    let rows_skipped = aggregator.rows_skipped();
    let batch = aggregator.finish();

    let report = SubmissionDispatcher::new(sink).dispatch_all(&settings, &batch);
    info!(
        "Run complete: {} events, {} dispatch failures",
        batch.len(),
        report.failed.len()
    );

    Ok(RunSummary {
        rows_added,
        rows_skipped,
        report,
    })
}
