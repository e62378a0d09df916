//! Windowed, filtered snapshots of the ingestion state.
//!
//! Filtering and display offsets only shape the [`api::Snapshot`]; the
//! ingestion state itself is never modified, so un-hiding a label
//! brings back its complete history.
use crate::state::IngestionState;

use indexmap::IndexSet;
use sched_scope_api::{self as api, Timestamp};

/// Labels (task or server names) that are left out of snapshots.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    hidden: IndexSet<String>,
}

impl ViewFilter {
    pub fn new<I, S>(hidden: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hidden: hidden.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_hidden(&self, label: &str) -> bool {
        self.hidden.contains(label)
    }

    pub fn hide(&mut self, label: &str) {
        self.hidden.insert(label.to_string());
    }

    pub fn show(&mut self, label: &str) {
        self.hidden.shift_remove(label);
    }

    /// Flips the visibility of `label`. Returns whether it is now hidden.
    pub fn toggle(&mut self, label: &str) -> bool {
        if self.hidden.shift_remove(label) {
            false
        } else {
            self.hidden.insert(label.to_string());
            true
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindowedView {
    /// Length of the visible window, in device milliseconds.
    pub window_length: Timestamp,
    /// Display offset between consecutive budget series.
    pub budget_offset: i64,
    /// Number of core lanes to emit even before a core has reported.
    pub cores: usize,
    pub filter: ViewFilter,
}

impl WindowedView {
    pub fn new(window_length: Timestamp, budget_offset: i64, cores: usize, filter: ViewFilter) -> Self {
        Self {
            window_length,
            budget_offset,
            cores,
            filter,
        }
    }

    /// Builds a snapshot at the state's projected current time.
    pub fn snapshot(&self, state: &IngestionState) -> api::Snapshot {
        let now = state.clock().projected_now();
        self.snapshot_at(state, now)
    }

    pub fn snapshot_at(&self, state: &IngestionState, now: Timestamp) -> api::Snapshot {
        let mut snapshot = api::Snapshot::empty(now, self.window_length);
        let window = snapshot.window;
        let colors = state.colors();

        // Configured lanes, then any core reported beyond them. Indices
        // between the two that never reported get no lane.
        let extra = state
            .activity()
            .cores()
            .map(|c| c.core())
            .filter(|&c| c >= self.cores);
        for core in (0..self.cores).chain(extra) {
            let mut lane = api::CoreLane {
                core,
                tasks: vec![],
            };

            if let Some(timeline) = state.activity().core(core) {
                let visible = timeline
                    .tasks()
                    .filter(|(task, _)| !self.filter.is_hidden(task));
                for (idx, (task, intervals)) in visible.enumerate() {
                    let spans: Vec<api::Span> = intervals
                        .iter()
                        .map(|i| api::Span {
                            start: i.start,
                            end: i.end.unwrap_or_else(|| now.max(i.start)),
                            open: i.is_open(),
                        })
                        .filter(|s| window.overlaps(s.start, s.end))
                        .collect();

                    if !spans.is_empty() {
                        lane.tasks.push(api::TaskTrack {
                            task: task.to_string(),
                            color: colors.color_of(task).unwrap_or_default(),
                            lane: idx,
                            intervals: spans,
                        });
                    }
                }
            }

            snapshot.cores.push(lane);
        }

        let budgets = state.budgets();
        for (ordinal, server) in budgets.servers_sorted().into_iter().enumerate() {
            if self.filter.is_hidden(server) {
                continue;
            }

            let offset = (ordinal as i64).saturating_mul(self.budget_offset);
            let samples = budgets.samples(server);
            let points: Vec<api::BudgetPoint> = samples
                .iter()
                .filter(|s| window.contains(s.time))
                .map(|s| api::BudgetPoint {
                    timestamp: s.time,
                    value: s.remaining.saturating_add(offset),
                })
                .collect();
            let hold = samples
                .last()
                .map(|s| api::HoldLine {
                    from: s.time,
                    to: now.max(s.time),
                    value: s.remaining.saturating_add(offset),
                })
                .filter(|h| window.overlaps(h.from, h.to));

            if !points.is_empty() || hold.is_some() {
                snapshot.servers.push(api::ServerSeries {
                    server: server.to_string(),
                    color: colors.color_of(server).unwrap_or_default(),
                    offset,
                    points,
                    hold,
                });
            }
        }

        snapshot
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::test::ManualClock;
    use crate::color::TABLEAU;

    fn state_from(host: &ManualClock, lines: &[&str]) -> IngestionState {
        let mut state = IngestionState::new(Box::new(host.clone()));
        for line in lines {
            state.ingest_line(line.as_bytes());
        }
        state
    }

    fn view(filter: ViewFilter) -> WindowedView {
        WindowedView::new(1000, 500, 2, filter)
    }

    fn track<'a>(snapshot: &'a api::Snapshot, core: usize, task: &str) -> Option<&'a api::TaskTrack> {
        snapshot
            .cores
            .iter()
            .find(|lane| lane.core == core)?
            .tasks
            .iter()
            .find(|t| t.task == task)
    }

    #[test]
    fn open_interval_extends_to_now() {
        let host = ManualClock::at(0);
        let state = state_from(&host, &["A,TaskX,100,0", "A,TaskY,200,0"]);
        host.advance(300);

        let snapshot = view(ViewFilter::default()).snapshot(&state);
        assert_eq!(snapshot.now, 500);
        assert_eq!(
            snapshot.window,
            api::Window {
                start: -500,
                end: 500
            }
        );
        assert_eq!(
            track(&snapshot, 0, "TaskX").unwrap().intervals,
            vec![api::Span {
                start: 100,
                end: 200,
                open: false
            }]
        );
        assert_eq!(
            track(&snapshot, 0, "TaskY").unwrap().intervals,
            vec![api::Span {
                start: 200,
                end: 500,
                open: true
            }]
        );

        // The open interval is only extended in the snapshot.
        let core = state.activity().core(0).unwrap();
        assert!(core.intervals("TaskY")[0].is_open());
    }

    #[test]
    fn intervals_outside_the_window_are_dropped() {
        let host = ManualClock::at(0);
        let state = state_from(
            &host,
            &["A,Old,100,0", "A,Mid,1400,0", "A,New,2200,0"],
        );

        let snapshot = view(ViewFilter::default()).snapshot_at(&state, 2500);
        assert!(track(&snapshot, 0, "Old").is_none());
        assert_eq!(track(&snapshot, 0, "Mid").unwrap().intervals.len(), 1);
        assert_eq!(track(&snapshot, 0, "New").unwrap().lane, 2);
    }

    #[test]
    fn empty_state_yields_empty_lanes() {
        let state = IngestionState::new(Box::new(ManualClock::at(0)));
        let snapshot = view(ViewFilter::default()).snapshot(&state);

        assert_eq!(snapshot.now, 0);
        assert_eq!(snapshot.cores.len(), 2);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn unexpected_core_gets_a_lane() {
        let host = ManualClock::at(0);
        let state = state_from(&host, &["A,TaskX,100,3"]);

        let snapshot = view(ViewFilter::default()).snapshot(&state);
        assert_eq!(
            snapshot.cores.iter().map(|l| l.core).collect::<Vec<_>>(),
            vec![0, 1, 3]
        );
        assert!(track(&snapshot, 3, "TaskX").is_some());
    }

    #[test]
    fn huge_core_index_adds_a_single_lane() {
        let host = ManualClock::at(0);
        let state = state_from(
            &host,
            &[
                "A,TaskX,100,5000000",
                "A,TaskY,110,18446744073709551615",
                "A,TaskZ,120,1",
            ],
        );

        let snapshot = view(ViewFilter::default()).snapshot(&state);
        assert_eq!(
            snapshot.cores.iter().map(|l| l.core).collect::<Vec<_>>(),
            vec![0, 1, 5_000_000, usize::MAX]
        );
        assert!(track(&snapshot, usize::MAX, "TaskY").is_some());
    }

    #[test]
    fn extreme_times_and_budgets_saturate() {
        let host = ManualClock::at(0);
        let state = state_from(
            &host,
            &[
                "A,TaskX,-9223372036854775808,0",
                "B,S0,0,0,1",
                "B,S1,9223372036854775807,0,9223372036854775807",
            ],
        );
        host.advance(1000);

        let snapshot = view(ViewFilter::default()).snapshot(&state);
        assert_eq!(snapshot.now, i64::MAX);
        assert_eq!(snapshot.window.start, i64::MAX - 1000);
        assert_eq!(
            track(&snapshot, 0, "TaskX").unwrap().intervals,
            vec![api::Span {
                start: i64::MIN,
                end: i64::MAX,
                open: true
            }]
        );
        let s1 = snapshot.servers.iter().find(|s| s.server == "S1").unwrap();
        assert_eq!(s1.points[0].value, i64::MAX);

        let early = state_from(&ManualClock::at(0), &["A,TaskX,-9223372036854775808,0"]);
        let snapshot = view(ViewFilter::default()).snapshot(&early);
        assert_eq!(snapshot.now, i64::MIN);
        assert_eq!(snapshot.window.start, i64::MIN);
        assert_eq!(track(&snapshot, 0, "TaskX").unwrap().intervals.len(), 1);

        let wide = WindowedView::new(1000, i64::MAX, 2, ViewFilter::default());
        let snapshot = wide.snapshot_at(&state, i64::MAX);
        let s1 = snapshot.servers.iter().find(|s| s.server == "S1").unwrap();
        assert_eq!(s1.offset, i64::MAX);
        assert_eq!(s1.hold.unwrap().value, i64::MAX);
    }

    #[test]
    fn toggling_a_filter_keeps_history() {
        let host = ManualClock::at(0);
        let state = state_from(
            &host,
            &[
                "A,IDLE0,100,0",
                "A,TaskX,200,0",
                "A,IDLE0,300,0",
                "A,TaskX,400,0",
            ],
        );
        let mut view = view(ViewFilter::new(["Logger"]));

        let before = view.snapshot_at(&state, 500);
        assert_eq!(track(&before, 0, "IDLE0").unwrap().intervals.len(), 2);

        assert!(view.filter.toggle("IDLE0"));
        let hidden = view.snapshot_at(&state, 500);
        assert!(track(&hidden, 0, "IDLE0").is_none());
        assert_eq!(track(&hidden, 0, "TaskX").unwrap().lane, 0);

        assert!(!view.filter.toggle("IDLE0"));
        let restored = view.snapshot_at(&state, 500);
        assert_eq!(restored, before);
    }

    #[test]
    fn hidden_servers_keep_their_ordinal() {
        let host = ManualClock::at(0);
        let state = state_from(&host, &["B,S1,100,0,50", "B,S2,100,0,10"]);
        let mut view = view(ViewFilter::default());

        view.filter.hide("S1");
        let snapshot = view.snapshot_at(&state, 200);
        assert_eq!(snapshot.servers.len(), 1);
        assert_eq!(snapshot.servers[0].offset, 500);

        view.filter.show("S1");
        assert!(!view.filter.is_hidden("S1"));
        assert_eq!(view.snapshot_at(&state, 200).servers.len(), 2);
    }

    #[test]
    fn budget_offsets_are_display_only() {
        let host = ManualClock::at(0);
        let state = state_from(
            &host,
            &["B,S2,100,0,10", "B,S1,100,0,50", "B,S1,200,1,40"],
        );

        let snapshot = view(ViewFilter::default()).snapshot_at(&state, 300);
        let s1 = &snapshot.servers[0];
        let s2 = &snapshot.servers[1];
        assert_eq!((s1.server.as_str(), s1.offset), ("S1", 0));
        assert_eq!((s2.server.as_str(), s2.offset), ("S2", 500));
        assert_eq!(
            s1.points,
            vec![
                api::BudgetPoint {
                    timestamp: 100,
                    value: 50
                },
                api::BudgetPoint {
                    timestamp: 200,
                    value: 40
                },
            ]
        );
        assert_eq!(
            s2.hold,
            Some(api::HoldLine {
                from: 100,
                to: 300,
                value: 510
            })
        );

        let stored: Vec<_> = state
            .budgets()
            .samples("S1")
            .iter()
            .map(|s| (s.time, s.remaining))
            .collect();
        assert_eq!(stored, vec![(100, 50), (200, 40)]);
    }

    #[test]
    fn stale_budget_is_held_across_the_window() {
        let host = ManualClock::at(0);
        let state = state_from(&host, &["B,S1,100,0,7"]);

        let snapshot = view(ViewFilter::default()).snapshot_at(&state, 5000);
        let s1 = &snapshot.servers[0];
        assert!(s1.points.is_empty());
        assert_eq!(s1.hold.unwrap().value, 7);
    }

    #[test]
    fn colors_follow_label_arrival() {
        let host = ManualClock::at(0);
        let state = state_from(
            &host,
            &["B,S2,90,0,3", "B,S1,95,0,3", "A,TaskY,100,1", "A,TaskX,150,0"],
        );
        let mut view = view(ViewFilter::new(["S1"]));

        let snapshot = view.snapshot_at(&state, 200);
        assert_eq!(snapshot.servers[0].server, "S2");
        assert_eq!(snapshot.servers[0].color, TABLEAU[0]);
        assert_eq!(track(&snapshot, 1, "TaskY").unwrap().color, TABLEAU[2]);
        assert_eq!(track(&snapshot, 0, "TaskX").unwrap().color, TABLEAU[3]);

        // A label shown later keeps the slot of its arrival.
        view.filter.show("S1");
        let again = view.snapshot_at(&state, 300);
        assert_eq!(again.servers[0].server, "S1");
        assert_eq!(again.servers[0].color, TABLEAU[1]);
        assert_eq!(track(&again, 0, "TaskX").unwrap().color, TABLEAU[3]);
    }
}
