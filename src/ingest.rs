//! The ingestion loop: pulls lines from a [`Source`], optionally records
//! them, and folds them into the [`SharedState`].
//!
//! The loop runs on its own thread and never waits on rendering; the
//! state lock is held only while a single line is applied.
use crate::log;
use crate::protocol::{IgnoreReason, Record};
use crate::sinks::FileSink;
use crate::sources::{BufferStatus, Source, SourceError};
use crate::state::SharedState;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel as channel;

/// Bytes waiting in the source's input buffer above which we warn that
/// lines are not consumed quickly enough.
const BUFFER_WARN_THRESHOLD: u32 = 3 * 1024;

/// Cooperative cancellation signal shared by the ingestion loop, its
/// source and whoever wants to stop them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the ingestion loop ended. Sent exactly once.
#[derive(Debug)]
pub enum IngestEvent {
    /// The source ran dry or the loop was cancelled.
    Finished,
    /// The source failed mid-stream. Data collected so far is kept.
    Failed(SourceError),
}

/// Consumes `source` until it ends, fails, or `cancel` is set. The
/// source is dropped, and with it the underlying transport released,
/// before this function returns.
pub fn run(
    mut source: Box<dyn Source>,
    state: SharedState,
    mut recorder: Option<FileSink>,
    cancel: CancelToken,
) -> IngestEvent {
    let mut buffer_warning = false;

    while !cancel.is_cancelled() {
        let line = match source.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => return IngestEvent::Failed(e),
            None => break,
        };

        if let Some(sink) = recorder.as_mut() {
            if let Err(e) = sink.record(&line) {
                log::err(format!(
                    "failed to record to {}: {}; recording stopped",
                    sink.describe(),
                    e
                ));
                recorder = None;
            }
        }

        let record = state.lock().ingest_line(&line);
        if let Record::Ignored(reason @ (IgnoreReason::Malformed(_) | IgnoreReason::Undecodable)) =
            record
        {
            log::warn(format!(
                "malformed line {:?}: {:?}",
                String::from_utf8_lossy(&line),
                reason
            ));
        }

        if !buffer_warning {
            if let BufferStatus::Pending(n) = source.avail_buffer() {
                if n > BUFFER_WARN_THRESHOLD {
                    log::warn(format!(
                        "{} bytes pending on source {}; lines are not read quickly enough",
                        n,
                        source.describe()
                    ));
                    buffer_warning = true;
                }
            }
        }
    }

    IngestEvent::Finished
}

/// A running ingestion thread. Dropping the handle cancels the loop and
/// waits for it, which releases the source.
pub struct Ingestion {
    cancel: CancelToken,
    thread: Option<thread::JoinHandle<()>>,
    events: channel::Receiver<IngestEvent>,
}

impl Ingestion {
    /// Receives the single [`IngestEvent`] once the loop ends.
    pub fn events(&self) -> &channel::Receiver<IngestEvent> {
        &self.events
    }

    /// Stops the loop and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::err("ingestion thread panicked".to_string());
            }
        }
    }
}

impl Drop for Ingestion {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns [`run`] on a dedicated thread. Its outcome is sent on
/// [`Ingestion::events`].
pub fn spawn(
    source: Box<dyn Source>,
    state: SharedState,
    recorder: Option<FileSink>,
    cancel: CancelToken,
) -> std::io::Result<Ingestion> {
    let (tx, rx) = channel::bounded(1);
    let thread = thread::Builder::new()
        .name("ingestion".to_string())
        .spawn({
            let cancel = cancel.clone();
            move || {
                let outcome = run(source, state, recorder, cancel);
                // the receiving end may already be gone during shutdown
                let _ = tx.send(outcome);
            }
        })?;

    Ok(Ingestion {
        cancel,
        thread: Some(thread),
        events: rx,
    })
}
