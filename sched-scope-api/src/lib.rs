//! API used between the sched-scope backend and its frontends.
//!
//! The backend periodically samples its ingestion state and sends a
//! [`Snapshot`] to every frontend, serialized as one JSON document per
//! line. A frontend only has to draw what it receives: all windowing,
//! filtering and display offsets have already been applied.
use serde::{Deserialize, Serialize};

/// Device time in milliseconds, as reported by the traced target.
pub type Timestamp = i64;

/// Index of a core on the traced target.
pub type CoreId = usize;

/// A color from the shared label palette, e.g. `"#1f77b4"`.
pub type Color = String;

/// The visible time range of a [`Snapshot`]. Both ends are inclusive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    /// Whether the span `[start, end]` intersects this window.
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        start <= self.end && end >= self.start
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }
}

/// A render-ready sample of the ingestion state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Projected device time at which the snapshot was taken.
    pub now: Timestamp,

    /// The range a frontend should show. `window.end == now`.
    pub window: Window,

    /// One lane per core, ordered by core index.
    pub cores: Vec<CoreLane>,

    /// One series per budget server, ordered by server name.
    pub servers: Vec<ServerSeries>,
}

impl Snapshot {
    /// A snapshot with no data, used before any record has arrived. The
    /// window start saturates at the lowest representable time.
    pub fn empty(now: Timestamp, window_length: Timestamp) -> Self {
        Self {
            now,
            window: Window {
                start: now.saturating_sub(window_length),
                end: now,
            },
            cores: vec![],
            servers: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cores.iter().all(|c| c.tasks.is_empty()) && self.servers.is_empty()
    }
}

/// Task activity on a single core.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CoreLane {
    pub core: CoreId,
    pub tasks: Vec<TaskTrack>,
}

/// The visible intervals of one task on one core.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskTrack {
    /// Name of the task, as reported by the target.
    pub task: String,

    pub color: Color,

    /// Vertical position of this track among the visible tracks of
    /// its core, counted from zero in first-seen order.
    pub lane: usize,

    pub intervals: Vec<Span>,
}

/// A span of time during which a task was running.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Timestamp,

    /// End of the span. For a span that is still running this is the
    /// snapshot's `now`.
    pub end: Timestamp,

    /// The task has not been switched out yet; `end` is synthesized and
    /// should be drawn distinctly (e.g. dashed).
    pub open: bool,
}

/// Remaining budget samples of one CBS server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerSeries {
    pub server: String,

    pub color: Color,

    /// Additive offset already applied to every `value` of this series
    /// so that stacked series do not overlap.
    pub offset: i64,

    /// Samples inside the window, in arrival order.
    pub points: Vec<BudgetPoint>,

    /// The most recent sample held until `now`, to be drawn distinctly.
    pub hold: Option<HoldLine>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetPoint {
    pub timestamp: Timestamp,

    /// Remaining budget plus the series offset.
    pub value: i64,
}

/// A horizontal extension of the last known budget value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldLine {
    pub from: Timestamp,
    pub to: Timestamp,
    pub value: i64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn window_overlap() {
        let w = Window {
            start: 100,
            end: 200,
        };
        assert!(w.overlaps(50, 100));
        assert!(w.overlaps(150, 400));
        assert!(!w.overlaps(10, 99));
        assert!(!w.overlaps(201, 300));
        assert!(w.contains(200));
        assert!(!w.contains(201));
    }

    #[test]
    fn snapshot_wire_format() {
        let snapshot = Snapshot {
            now: 1500,
            window: Window {
                start: 500,
                end: 1500,
            },
            cores: vec![CoreLane {
                core: 0,
                tasks: vec![TaskTrack {
                    task: "TaskX".to_string(),
                    color: "#1f77b4".to_string(),
                    lane: 0,
                    intervals: vec![Span {
                        start: 1000,
                        end: 1500,
                        open: true,
                    }],
                }],
            }],
            servers: vec![],
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains('\n'));
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert!(!back.is_empty());
        assert!(Snapshot::empty(0, 10_000).is_empty());
    }

    #[test]
    fn empty_window_saturates() {
        let snapshot = Snapshot::empty(i64::MIN + 5, 10_000);
        assert_eq!(
            snapshot.window,
            Window {
                start: i64::MIN,
                end: i64::MIN + 5,
            }
        );
    }
}
