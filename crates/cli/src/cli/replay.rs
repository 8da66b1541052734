//! `quorum replay` — rebuild projections from a recorded session.
//!
//! Replay determinism in practice: the transcript and traces printed
//! here derive purely from the persisted log.

use qm_domain::config::Config;
use qm_engine::ProjectionSet;
use qm_store::EventLog;

pub fn run(config: &Config, session_id: &str, turn: Option<u64>) -> anyhow::Result<()> {
    let log = EventLog::open(&config.store.data_dir.join("events"), session_id)?;
    if log.is_empty() {
        anyhow::bail!("no events recorded for session {session_id}");
    }

    let events = log.replay_session();
    let mut projections = ProjectionSet::default();
    projections.rebuild_from(&events);

    println!("session {session_id}: {} events", events.len());
    if let Some(started) = projections.session.started_at {
        println!("started {started}");
    }
    println!();

    // ── Transcript ────────────────────────────────────────────────
    println!("── transcript ──");
    for message in &projections.session.messages {
        if turn.is_some_and(|t| message.turn_id != t) {
            continue;
        }
        println!("[turn {}] {:>9}: {}", message.turn_id, message.role, message.content);
    }

    // ── Per-turn traces ───────────────────────────────────────────
    println!();
    println!("── agent traces ──");
    for (turn_id, traces) in &projections.debug.turn_traces {
        if turn.is_some_and(|t| *turn_id != t) {
            continue;
        }
        if traces.is_empty() {
            continue;
        }
        println!("turn {turn_id}:");
        for trace in traces {
            match &trace.error {
                Some(error) => println!("  ✗ {} — {}", trace.agent_id, error),
                None => println!(
                    "  · {} [u{} c{} s{:.2}] {} ({}ms)",
                    trace.agent_id,
                    trace.urgency,
                    trace.confidence,
                    trace.salience,
                    trace.observation,
                    trace.duration_ms,
                ),
            }
        }
    }

    // ── Totals ────────────────────────────────────────────────────
    println!();
    println!(
        "tokens: prompt={} completion={} | model calls={} | turns={}",
        projections.analytics.total_prompt_tokens,
        projections.analytics.total_completion_tokens,
        projections.analytics.recent_calls.len(),
        projections.session.turn_count,
    );
    if !projections.debug.errors.is_empty() {
        println!("errors: {}", projections.debug.errors.len());
        for error in &projections.debug.errors {
            println!("  turn {}: {}", error.turn_id, error.message);
        }
    }

    Ok(())
}
