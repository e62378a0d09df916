//! Sinks to which [`api::Snapshot`]s are sent on every render tick, and
//! the file sink which records the raw trace for later replay.
use crate::diag;

use sched_scope_api as api;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to setup sink during I/O:{} {1}", { if let Some(s) = .0 {
        format!(" {}:", s)
    } else {
        "".to_string()
    }})]
    SetupIOError(Option<String>, #[source] std::io::Error),
    #[error("Failed to serialize snapshot: {0}")]
    DrainSerError(#[from] serde_json::Error),
    #[error("Failed to drain data on I/O: {0}")]
    DrainIOError(#[source] std::io::Error),
}

impl diag::DiagnosableError for SinkError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::SetupIOError(..) => vec![
                "Pass --trace-dir to record elsewhere, or --dont-record to not record at all.".to_string(),
            ],
            _ => vec![],
        }
    }
}

pub mod file;
pub use file::FileSink;

mod frontend;
pub use frontend::FrontendSink;

pub trait Sink {
    fn drain(&mut self, snapshot: &api::Snapshot) -> Result<(), SinkError>;
    fn describe(&self) -> String;
}
