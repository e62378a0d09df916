//! Reconciliation of the target's clock with the host's.
//!
//! The target only tells us its time when it sends a record. To let a
//! frontend draw a moving "now" between records, the device time of the
//! latest record is paired with the host time at which it arrived, and
//! the current device time is extrapolated linearly from that pair.
use sched_scope_api::Timestamp;

/// Wall clock of the host, in milliseconds.
pub trait HostClock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl HostClock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockAnchor {
    pub device_time: Timestamp,
    pub host_time: i64,
}

pub struct ClockReconciler {
    clock: Box<dyn HostClock>,
    anchor: Option<ClockAnchor>,
}

impl ClockReconciler {
    pub fn new(clock: Box<dyn HostClock>) -> Self {
        Self {
            clock,
            anchor: None,
        }
    }

    /// Re-anchors on a record with device time `t`. Out-of-order times
    /// are accepted as-is.
    pub fn observe(&mut self, t: Timestamp) {
        self.anchor = Some(ClockAnchor {
            device_time: t,
            host_time: self.clock.now_ms(),
        });
    }

    pub fn anchor(&self) -> Option<ClockAnchor> {
        self.anchor
    }

    /// The current device time, extrapolated from the last anchor. Zero
    /// before any record has been observed.
    pub fn projected_now(&self) -> Timestamp {
        match self.anchor {
            Some(ClockAnchor {
                device_time,
                host_time,
            }) => {
                let elapsed = self.clock.now_ms().saturating_sub(host_time);
                device_time.saturating_add(elapsed)
            }
            None => 0,
        }
    }
}

impl Default for ClockReconciler {
    fn default() -> Self {
        Self::new(Box::new(SystemClock))
    }
}

impl std::fmt::Debug for ClockReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockReconciler")
            .field("anchor", &self.anchor)
            .finish()
    }
}
