//! Store capability: append-only event log, workspace snapshots, and
//! the projections that derive views from the event stream.

mod event_log;
pub mod projections;
mod snapshot;

pub use event_log::EventLog;
pub use snapshot::SnapshotStore;
