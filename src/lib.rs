//! Host-side monitor for the scheduling trace of an embedded real-time
//! operating system.
//!
//! The target reports task switches per core and, for CBS servers,
//! remaining-budget samples over a serial link, one record per line:
//!
//! ```text
//! A,<task>,<device time ms>,<core>
//! B,<server>,<device time ms>,<core>,<remaining budget>
//! ```
//!
//! Lines are read from a [`sources::Source`] by the [`ingest`] loop,
//! parsed by [`protocol`] and folded into the [`state::IngestionState`]:
//! per-core task intervals ([`timeline`]), per-server budget samples
//! ([`budget`]) and the device/host clock anchor ([`clock`]). On a fixed
//! tick, a [`view::WindowedView`] samples the state into a
//! [`sched_scope_api::Snapshot`] which [`sinks`] forward to frontends.

pub mod budget;
pub mod clock;
pub mod color;
pub mod config;
pub mod diag;
pub mod ingest;
pub mod log;
pub mod protocol;
pub mod sinks;
pub mod sources;
pub mod state;
pub mod timeline;
pub mod view;
