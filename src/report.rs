//! Structured failure reporting.
//!
//! The orchestrator never raises per-frame errors across its boundary;
//! every failure becomes a [`FaultReport`] handed to whatever sink the
//! pipeline was built with. The default sink logs through `tracing`.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

/// One failure event, as delivered to the observability sink.
#[derive(Debug, Clone, Serialize)]
pub struct FaultReport {
    /// Stable error category ("conversion", "inference", "decode", "load",
    /// "decoder-mismatch").
    pub kind: String,
    /// Fatal faults halt the pipeline; recoverable ones drop a single frame.
    pub fatal: bool,
    /// Sequence number of the frame that failed, when one exists.
    pub frame_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    /// Inference wall-clock time, when the failure happened after predict.
    pub inference_ms: Option<f64>,
    pub detail: String,
}

impl FaultReport {
    pub fn new(kind: impl Into<String>, fatal: bool, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fatal,
            frame_id: None,
            timestamp: Utc::now(),
            inference_ms: None,
            detail: detail.into(),
        }
    }

    pub fn with_frame(mut self, frame_id: u64) -> Self {
        self.frame_id = Some(frame_id);
        self
    }

    pub fn with_inference(mut self, inference: Duration) -> Self {
        self.inference_ms = Some(inference.as_secs_f64() * 1000.0);
        self
    }
}

/// Receives failure reports from the orchestrator.
pub trait FaultSink: Send + Sync {
    fn report(&self, report: &FaultReport);
}

/// Default sink: recoverable faults at `warn`, fatal ones at `error`, each
/// with the full report as a JSON payload.
#[derive(Debug, Default)]
pub struct TracingSink;

impl FaultSink for TracingSink {
    fn report(&self, report: &FaultReport) {
        let payload = serde_json::to_string(report).unwrap_or_else(|_| report.detail.clone());
        if report.fatal {
            error!(kind = %report.kind, report = %payload, "pipeline fault");
        } else {
            warn!(kind = %report.kind, report = %payload, "frame dropped");
        }
    }
}

/// In-memory sink. Used by the tests and the simulate binary to inspect
/// what the pipeline reported.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<FaultReport>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<FaultReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FaultSink for CollectingSink {
    fn report(&self, report: &FaultReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}
