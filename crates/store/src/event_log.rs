//! Append-only event log, one per session.
//!
//! Events persist as JSONL (`<session_id>.events.jsonl` under the events
//! directory) and are mirrored in memory for replay. All writers go
//! through a single mutex-guarded ingress, which keeps `(turn, seq)`
//! monotonic per turn and makes collision detection exact.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use qm_domain::error::{Error, Result};
use qm_domain::event::Event;

struct LogInner {
    events: Vec<Event>,
    /// `(turn_id, seq)` pairs already appended.
    seen: BTreeSet<(u64, u64)>,
    file: Option<File>,
    path: Option<PathBuf>,
}

/// Append-only, totally-ordered event stream for one session.
pub struct EventLog {
    session_id: String,
    inner: Mutex<LogInner>,
}

impl EventLog {
    /// Memory-only log (tests, ephemeral runs).
    pub fn in_memory(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            inner: Mutex::new(LogInner {
                events: Vec::new(),
                seen: BTreeSet::new(),
                file: None,
                path: None,
            }),
        }
    }

    /// Open (or create) the persistent log for a session. Existing events
    /// are loaded so replay and collision detection cover prior runs;
    /// malformed lines are skipped with a warning.
    pub fn open(events_dir: &Path, session_id: impl Into<String>) -> Result<Self> {
        let session_id = session_id.into();
        std::fs::create_dir_all(events_dir)?;
        let path = events_dir.join(format!("{session_id}.events.jsonl"));

        let mut events = Vec::new();
        let mut seen = BTreeSet::new();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(line) {
                    Ok(ev) => {
                        seen.insert((ev.turn_id, ev.seq));
                        events.push(ev);
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_id = %session_id,
                            error = %e,
                            "skipping malformed event line"
                        );
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::info!(
            session_id = %session_id,
            events = events.len(),
            path = %path.display(),
            "event log opened"
        );

        Ok(Self {
            session_id,
            inner: Mutex::new(LogInner {
                events,
                seen,
                file: Some(file),
                path: Some(path),
            }),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append one event. Rejects session mismatches and `(turn, seq)`
    /// collisions; once this returns `Ok` the event is durably ordered
    /// with respect to all later appends.
    pub fn append(&self, event: &Event) -> Result<()> {
        if event.session_id != self.session_id {
            return Err(Error::Store(format!(
                "event for session {} appended to log of {}",
                event.session_id, self.session_id
            )));
        }

        let mut inner = self.inner.lock();
        let key = (event.turn_id, event.seq);
        if inner.seen.contains(&key) {
            return Err(Error::Store(format!(
                "duplicate event (turn={}, seq={})",
                event.turn_id, event.seq
            )));
        }

        if let Some(file) = inner.file.as_mut() {
            let mut line = serde_json::to_string(event)?;
            line.push('\n');
            file.write_all(line.as_bytes())?;
        }

        inner.seen.insert(key);
        inner.events.push(event.clone());
        Ok(())
    }

    /// All events for the session, in append order.
    pub fn replay_session(&self) -> Vec<Event> {
        self.inner.lock().events.clone()
    }

    /// All events for one turn, in append order.
    pub fn replay_turn(&self, turn_id: u64) -> Vec<Event> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|e| e.turn_id == turn_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all events ordered at or before `(turn_id, seq)` and rewrite
    /// the backing file. Callers snapshot the workspace first; returns
    /// the number of events removed.
    pub fn trim_up_to(&self, turn_id: u64, seq: u64) -> Result<usize> {
        let mut inner = self.inner.lock();
        let before = inner.events.len();
        inner
            .events
            .retain(|e| (e.turn_id, e.seq) > (turn_id, seq));
        inner.seen.retain(|&k| k > (turn_id, seq));
        let removed = before - inner.events.len();

        if let Some(path) = inner.path.clone() {
            let mut buf = String::new();
            for ev in &inner.events {
                buf.push_str(&serde_json::to_string(ev)?);
                buf.push('\n');
            }
            std::fs::write(&path, buf)?;
            inner.file = Some(OpenOptions::new().create(true).append(true).open(&path)?);
        }

        tracing::debug!(
            session_id = %self.session_id,
            removed,
            "event log trimmed"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qm_domain::event::{EventPayload, SCHEMA_VERSION};

    fn ev(session: &str, turn: u64, seq: u64) -> Event {
        Event {
            session_id: session.into(),
            turn_id: turn,
            seq,
            ts_monotonic_ms: seq * 10,
            ts_wall: Utc::now(),
            schema_version: SCHEMA_VERSION,
            payload: EventPayload::DaemonTick { tick: seq },
        }
    }

    #[test]
    fn append_and_replay_in_order() {
        let log = EventLog::in_memory("s");
        for seq in 0..5 {
            log.append(&ev("s", 1, seq)).unwrap();
        }
        let events = log.replay_turn(1);
        assert_eq!(events.len(), 5);
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn rejects_seq_collision() {
        let log = EventLog::in_memory("s");
        log.append(&ev("s", 1, 0)).unwrap();
        let err = log.append(&ev("s", 1, 0)).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_session_mismatch() {
        let log = EventLog::in_memory("s");
        assert!(log.append(&ev("other", 1, 0)).is_err());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = EventLog::open(dir.path(), "s").unwrap();
            log.append(&ev("s", 1, 0)).unwrap();
            log.append(&ev("s", 1, 1)).unwrap();
        }
        let log = EventLog::open(dir.path(), "s").unwrap();
        assert_eq!(log.len(), 2);
        // Collision detection survives the reload.
        assert!(log.append(&ev("s", 1, 1)).is_err());
        log.append(&ev("s", 2, 0)).unwrap();
        assert_eq!(log.replay_session().len(), 3);
    }

    #[test]
    fn trim_drops_prefix_and_keeps_rest() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path(), "s").unwrap();
        for seq in 0..4 {
            log.append(&ev("s", 1, seq)).unwrap();
        }
        log.append(&ev("s", 2, 0)).unwrap();

        let removed = log.trim_up_to(1, 2).unwrap();
        assert_eq!(removed, 3);
        let left = log.replay_session();
        assert_eq!(left.len(), 2);
        assert_eq!((left[0].turn_id, left[0].seq), (1, 3));

        // File reflects the trim.
        let reloaded = EventLog::open(dir.path(), "s").unwrap();
        assert_eq!(reloaded.len(), 2);
    }
}
