//! Reconstruction of task activity intervals from task-switch events.
//!
//! The target only reports which task started running on a core and
//! when. A task's interval is closed by the next switch on the same core
//! to a *different* task. Reporting the already-running task again opens
//! a second interval without closing the first; consecutive same-task
//! intervals are kept as the target reported them and are never merged.
use crate::protocol::{ActivityEvent, TaskName};

use indexmap::IndexMap;
use sched_scope_api::{CoreId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInterval {
    pub task: TaskName,
    pub core: CoreId,
    pub start: Timestamp,
    /// `None` while the interval is open.
    pub end: Option<Timestamp>,
}

impl TaskInterval {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Activity history of a single core.
#[derive(Debug, Clone)]
pub struct CoreTimeline {
    core: CoreId,
    /// Intervals per task, tasks in first-seen order, intervals in
    /// arrival order.
    tasks: IndexMap<TaskName, Vec<TaskInterval>>,
    active: Option<TaskName>,
}

impl CoreTimeline {
    pub fn new(core: CoreId) -> Self {
        Self {
            core,
            tasks: IndexMap::new(),
            active: None,
        }
    }

    pub fn core(&self) -> CoreId {
        self.core
    }

    /// The task that was most recently switched to on this core.
    pub fn active_task(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Folds a task switch into the timeline.
    pub fn switch_to(&mut self, task: &str, time: Timestamp) {
        self.tasks
            .entry(task.to_string())
            .or_default()
            .push(TaskInterval {
                task: task.to_string(),
                core: self.core,
                start: time,
                end: None,
            });

        match self.active.as_deref() {
            Some(prev) if prev != task => {
                let last = self
                    .tasks
                    .get_mut(prev)
                    .and_then(|intervals| intervals.iter_mut().rev().find(|i| i.is_open()));
                if let Some(interval) = last {
                    interval.end = Some(time);
                }
                self.active = Some(task.to_string());
            }
            Some(_) => (),
            None => self.active = Some(task.to_string()),
        }
    }

    /// Intervals of `task` on this core, in arrival order.
    pub fn intervals(&self, task: &str) -> &[TaskInterval] {
        self.tasks.get(task).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All tasks ever seen on this core, in first-seen order, with
    /// their intervals.
    pub fn tasks(&self) -> impl Iterator<Item = (&str, &[TaskInterval])> {
        self.tasks.iter().map(|(t, i)| (t.as_str(), i.as_slice()))
    }

    pub fn interval_count(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }
}

/// Per-core timelines, created lazily when a core is first reported.
#[derive(Debug, Clone, Default)]
pub struct EventReconstructor {
    cores: IndexMap<CoreId, CoreTimeline>,
}

impl EventReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &ActivityEvent) {
        self.cores
            .entry(event.core)
            .or_insert_with(|| CoreTimeline::new(event.core))
            .switch_to(&event.task, event.time);
    }

    pub fn core(&self, core: CoreId) -> Option<&CoreTimeline> {
        self.cores.get(&core)
    }

    /// All observed cores, in ascending core order.
    pub fn cores(&self) -> impl Iterator<Item = &CoreTimeline> {
        let mut cores: Vec<_> = self.cores.values().collect();
        cores.sort_by_key(|c| c.core);
        cores.into_iter()
    }
}
