//! Event emitter — the single ingress for the event stream.
//!
//! Allocates `seq` per `(session, turn)`, stamps timestamps from the
//! clock, appends to the log, and fans the event out to the projection
//! set. Everything that happens in the system goes through here, which
//! is what makes the `(turn_id, seq)` order total.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use qm_domain::error::Result;
use qm_domain::event::{Event, EventPayload, SCHEMA_VERSION};
use qm_store::projections::{
    AnalyticsProjection, DebugProjection, Projection, SessionProjection, TurnStateProjection,
};
use qm_store::EventLog;

use crate::clock::Clock;

/// The projections every session maintains.
#[derive(Default)]
pub struct ProjectionSet {
    pub turn_state: TurnStateProjection,
    pub session: SessionProjection,
    pub analytics: AnalyticsProjection,
    pub debug: DebugProjection,
}

impl ProjectionSet {
    pub fn apply(&mut self, event: &Event) {
        self.turn_state.apply(event);
        self.session.apply(event);
        self.analytics.apply(event);
        self.debug.apply(event);
    }

    pub fn rebuild_from(&mut self, events: &[Event]) {
        self.turn_state.rebuild_from(events);
        self.session.rebuild_from(events);
        self.analytics.rebuild_from(events);
        self.debug.rebuild_from(events);
    }
}

pub struct EventEmitter {
    session_id: String,
    log: Arc<EventLog>,
    clock: Arc<dyn Clock>,
    projections: Mutex<ProjectionSet>,
    /// Next seq per turn; seeded from the log so reopened sessions keep
    /// strictly increasing sequences.
    seqs: Mutex<HashMap<u64, u64>>,
}

impl EventEmitter {
    pub fn new(log: Arc<EventLog>, clock: Arc<dyn Clock>) -> Self {
        let mut seqs: HashMap<u64, u64> = HashMap::new();
        let mut projections = ProjectionSet::default();
        let existing = log.replay_session();
        for event in &existing {
            let next = seqs.entry(event.turn_id).or_insert(0);
            *next = (*next).max(event.seq + 1);
        }
        projections.rebuild_from(&existing);

        Self {
            session_id: log.session_id().to_string(),
            log,
            clock,
            projections: Mutex::new(projections),
            seqs: Mutex::new(seqs),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    /// Append one event and fan it out. On append failure the event is
    /// not applied to projections, so derived state never drifts ahead
    /// of the durable log.
    pub fn emit(&self, turn_id: u64, payload: EventPayload) -> Result<Event> {
        let event = {
            // Allocate the seq and append under one lock so concurrent
            // emitters cannot interleave allocations with appends.
            let mut seqs = self.seqs.lock();
            let seq = seqs.entry(turn_id).or_insert(0);
            let event = Event {
                session_id: self.session_id.clone(),
                turn_id,
                seq: *seq,
                ts_monotonic_ms: self.clock.monotonic_ms(),
                ts_wall: self.clock.now_wall(),
                schema_version: SCHEMA_VERSION,
                payload,
            };
            self.log.append(&event)?;
            *seq += 1;
            event
        };

        self.projections.lock().apply(&event);
        tracing::trace!(
            turn_id,
            seq = event.seq,
            kind = ?event.kind(),
            "event emitted"
        );
        Ok(event)
    }

    /// Read access to the projections (short, non-awaiting closures).
    pub fn with_projections<R>(&self, f: impl FnOnce(&ProjectionSet) -> R) -> R {
        f(&self.projections.lock())
    }

    /// Highest allocated seq for a turn, if any events were emitted.
    pub fn last_seq(&self, turn_id: u64) -> Option<u64> {
        self.seqs.lock().get(&turn_id).map(|next| next - 1)
    }
}
