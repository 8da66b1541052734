//! Projections — pure folds over the event stream.
//!
//! A projection owns derived state only; it never mutates core state and
//! can always be rebuilt byte-identically by replaying the log.

mod analytics;
mod debug;
mod session;
mod turn_state;

pub use analytics::{AnalyticsProjection, ModelCallStats};
pub use debug::{AgentTrace, DebugProjection};
pub use session::{SessionMessage, SessionProjection};
pub use turn_state::{AgentLogLine, ChatLine, TurnStateProjection};

use qm_domain::event::Event;

/// A fold over the event stream: `(state, event) → state'`.
pub trait Projection {
    /// Apply one event to the derived state.
    fn apply(&mut self, event: &Event);

    /// Return to the initial state.
    fn reset(&mut self);

    /// Rebuild from scratch by replaying `events` in order.
    fn rebuild_from(&mut self, events: &[Event]) {
        self.reset();
        for event in events {
            self.apply(event);
        }
    }
}
