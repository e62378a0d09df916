//! Remaining-budget samples of CBS servers. Budget is a sampled
//! quantity: samples are stored as received, without deduplication.
use crate::protocol::{Budget, BudgetEvent, ServerName};

use indexmap::IndexMap;
use sched_scope_api::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetSample {
    pub time: Timestamp,
    pub remaining: Budget,
}

#[derive(Debug, Clone, Default)]
pub struct BudgetSampleStore {
    servers: IndexMap<ServerName, Vec<BudgetSample>>,
}

impl BudgetSampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, server: &str, time: Timestamp, remaining: Budget) {
        self.servers
            .entry(server.to_string())
            .or_default()
            .push(BudgetSample { time, remaining });
    }

    pub fn record_event(&mut self, event: &BudgetEvent) {
        self.record(&event.server, event.time, event.remaining);
    }

    /// Samples of `server` in arrival order.
    pub fn samples(&self, server: &str) -> &[BudgetSample] {
        self.servers.get(server).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Server names in ascending order. The position of a server in
    /// this order is its display ordinal.
    pub fn servers_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.servers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
