//! `quorum chat` — interactive REPL.
//!
//! Each line runs one full turn; the rendered response (or a silence
//! marker) prints to stdout. Slash commands inspect live state.

use std::sync::Arc;

use qm_domain::config::Config;

use crate::bootstrap;

pub async fn run(
    config: Arc<Config>,
    session: Option<String>,
    offline: bool,
) -> anyhow::Result<()> {
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // 1. Boot the engine and start the background daemon.
    let engine = bootstrap::build(config.clone(), session_id, offline)?;
    let daemon_handle = engine.spawn_daemon();

    // 2. Readline with persistent history under the data dir.
    let history_path = config.store.data_dir.join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("quorum interactive chat");
    eprintln!(
        "Session: {}  |  /help for commands, Ctrl+D to exit",
        engine.session_id
    );
    eprintln!();

    // 3. REPL loop.
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &engine) {
                        break;
                    }
                    continue;
                }

                match engine.runner.run_turn(trimmed).await {
                    Ok(result) => match result.response {
                        Some(text) => println!("{text}"),
                        None => eprintln!("(listening quietly)"),
                    },
                    Err(err) => eprintln!("error: {err}"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }

    // 4. Shutdown: stop the daemon, close the session.
    engine.cancel.cancel();
    let _ = daemon_handle.await;
    engine.runner.end_session()?;
    let _ = rl.save_history(&history_path);
    Ok(())
}

/// Returns `true` when the REPL should exit.
fn handle_slash_command(command: &str, engine: &bootstrap::Engine) -> bool {
    match command {
        "/quit" | "/exit" => return true,
        "/help" => {
            eprintln!("/stance           current stance vector");
            eprintln!("/sensors          last fast-sensor readings");
            eprintln!("/claims           active claims of the last turn");
            eprintln!("/analytics        token and latency totals");
            eprintln!("/goal [Nh] TEXT   track an open goal (optional deadline in hours)");
            eprintln!("/goals            list open goals");
            eprintln!("/quit             exit");
        }
        "/stance" => {
            let ws = engine.runner.workspace().lock();
            for (dim, value) in ws.stance.to_map() {
                eprintln!("  {:<10} {:+.3}", dim.as_str(), value);
            }
            eprintln!(
                "  readiness={:.2} advice_suppression={:.2} warmth={:.2}",
                ws.stance.readiness_to_speak(),
                ws.stance.advice_suppression(),
                ws.stance.warmth_level(),
            );
        }
        "/sensors" => {
            engine.runner.emitter().with_projections(|p| {
                if p.turn_state.sensors.is_empty() {
                    eprintln!("  (no readings yet)");
                }
                for (name, value) in &p.turn_state.sensors {
                    eprintln!("  {:<18} {:.2}", name.as_str(), value);
                }
            });
        }
        "/claims" => {
            engine.runner.emitter().with_projections(|p| {
                eprintln!(
                    "  claims={} consensus={:.2}",
                    p.turn_state.claim_count, p.turn_state.consensus
                );
                for line in &p.turn_state.agent_log {
                    let marker = if line.failed { "✗" } else { "·" };
                    eprintln!("  {marker} [{:.2}] {} — {}", line.salience, line.agent_id, line.observation);
                }
            });
        }
        "/analytics" => {
            engine.runner.emitter().with_projections(|p| {
                eprintln!(
                    "  tokens: prompt={} completion={} total={}",
                    p.analytics.total_prompt_tokens,
                    p.analytics.total_completion_tokens,
                    p.analytics.total_tokens(),
                );
                eprintln!("  model latency: {}ms", p.analytics.total_latency_ms);
                for (model, usage) in &p.analytics.model_usage {
                    eprintln!("    {model}: {} calls", usage.calls);
                }
            });
        }
        "/goals" => {
            let ws = engine.runner.workspace().lock();
            if ws.open_goals.is_empty() {
                eprintln!("  (no open goals)");
            }
            for goal in &ws.open_goals {
                match goal.deadline {
                    Some(deadline) => eprintln!("  [{:?}] {} (due {})", goal.status, goal.text, deadline),
                    None => eprintln!("  [{:?}] {}", goal.status, goal.text),
                }
            }
        }
        other if other.starts_with("/goal ") => {
            let rest = other.trim_start_matches("/goal ").trim();
            let (deadline_hours, text) = parse_goal_args(rest);
            if text.is_empty() {
                eprintln!("usage: /goal [Nh] TEXT");
            } else {
                let mut goal = qm_domain::goal::Goal::new(text);
                if let Some(hours) = deadline_hours {
                    goal.deadline =
                        Some(chrono::Utc::now() + chrono::Duration::minutes((hours * 60.0) as i64));
                }
                let mut ws = engine.runner.workspace().lock();
                ws.open_goals.push(goal);
                eprintln!("  goal tracked ({} open)", ws.open_goals.len());
            }
        }
        other => eprintln!("unknown command: {other} (try /help)"),
    }
    false
}

/// Split an optional leading "<N>h" deadline from the goal text.
fn parse_goal_args(rest: &str) -> (Option<f64>, &str) {
    if let Some((first, remainder)) = rest.split_once(' ') {
        if let Some(hours) = first.strip_suffix('h').and_then(|n| n.parse::<f64>().ok()) {
            return (Some(hours), remainder.trim());
        }
    }
    (None, rest)
}

#[cfg(test)]
mod tests {
    use super::parse_goal_args;

    #[test]
    fn goal_args_with_deadline() {
        let (hours, text) = parse_goal_args("2h finish the report");
        assert_eq!(hours, Some(2.0));
        assert_eq!(text, "finish the report");
    }

    #[test]
    fn goal_args_without_deadline() {
        let (hours, text) = parse_goal_args("call the dentist");
        assert_eq!(hours, None);
        assert_eq!(text, "call the dentist");
    }

    #[test]
    fn goal_args_h_word_is_not_a_deadline() {
        let (hours, text) = parse_goal_args("hatch a plan");
        assert_eq!(hours, None);
        assert_eq!(text, "hatch a plan");
    }
}
