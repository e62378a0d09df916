//! Everything the ingestion loop has learned from the target so far.
//!
//! The state is written by the ingestion thread and read by the render
//! tick. Both go through the [`SharedState`] mutex: a record is applied
//! under one lock acquisition, and a snapshot is built under another, so
//! a snapshot never sees a half-applied record.
use crate::budget::BudgetSampleStore;
use crate::clock::{ClockReconciler, HostClock};
use crate::color::ColorAssignment;
use crate::protocol::{self, IgnoreReason, Record};
use crate::timeline::EventReconstructor;

use std::sync::{Arc, Mutex, MutexGuard};

/// Counters over everything received from the source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// How many lines we have received from the source.
    pub lines: usize,
    /// How many task switches we have recorded.
    pub activity: usize,
    /// How many budget samples we have recorded.
    pub budget: usize,
    /// How many lines with a known tag failed to parse.
    pub malformed: usize,
    /// How many lines were empty or carried an unknown tag.
    pub ignored: usize,
}

#[derive(Debug, Default)]
pub struct IngestionState {
    activity: EventReconstructor,
    budgets: BudgetSampleStore,
    clock: ClockReconciler,
    colors: ColorAssignment,
    stats: Stats,
}

impl IngestionState {
    pub fn new(clock: Box<dyn HostClock>) -> Self {
        Self {
            activity: EventReconstructor::new(),
            budgets: BudgetSampleStore::new(),
            clock: ClockReconciler::new(clock),
            colors: ColorAssignment::default(),
            stats: Stats::default(),
        }
    }

    /// Parses a raw line and applies the resulting record. The parsed
    /// record is returned so the caller can report on it.
    pub fn ingest_line(&mut self, line: &[u8]) -> Record {
        let record = protocol::parse_bytes(line);
        self.stats.lines += 1;
        self.apply(&record);
        record
    }

    pub fn apply(&mut self, record: &Record) {
        match record {
            Record::Activity(event) => {
                self.colors.color_for(&event.task);
                self.activity.record(event);
                self.stats.activity += 1;
            }
            Record::Budget(event) => {
                self.colors.color_for(&event.server);
                self.budgets.record_event(event);
                self.stats.budget += 1;
            }
            Record::Ignored(IgnoreReason::Malformed(_) | IgnoreReason::Undecodable) => {
                self.stats.malformed += 1
            }
            Record::Ignored(IgnoreReason::Empty | IgnoreReason::UnknownTag(_)) => {
                self.stats.ignored += 1
            }
        }

        if let Some(t) = record.time() {
            self.clock.observe(t);
        }
    }

    pub fn activity(&self) -> &EventReconstructor {
        &self.activity
    }

    pub fn budgets(&self) -> &BudgetSampleStore {
        &self.budgets
    }

    pub fn clock(&self) -> &ClockReconciler {
        &self.clock
    }

    /// Label colors, assigned in the order labels first arrive.
    pub fn colors(&self) -> &ColorAssignment {
        &self.colors
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }
}

/// Ingestion state shared between the ingestion thread and the render
/// tick.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<Mutex<IngestionState>>);

impl SharedState {
    pub fn new(state: IngestionState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Locks the state. A poisoned lock is recovered: a panic on the
    /// other side never leaves a record half-applied, as records are
    /// applied in a single call.
    pub fn lock(&self) -> MutexGuard<'_, IngestionState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
