//! Bootstrap — builds the full engine from configuration.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use qm_domain::config::Config;
use qm_engine::{
    AgentRegistry, Clock, Daemon, EventEmitter, FsPromptStore, SystemClock, TurnRunner,
    Workspace,
};
use qm_providers::{ModelProvider, OpenAiCompatProvider, ScriptedProvider};
use qm_store::{EventLog, SnapshotStore};

/// A fully wired engine for one session.
pub struct Engine {
    pub runner: Arc<TurnRunner>,
    pub daemon: Arc<Daemon>,
    pub cancel: CancellationToken,
    pub session_id: String,
}

impl Engine {
    /// Spawn the background daemon; returns its join handle.
    pub fn spawn_daemon(&self) -> tokio::task::JoinHandle<()> {
        self.daemon.clone().spawn(self.cancel.clone())
    }
}

/// Build the engine: stores, provider, workspace (restored from its
/// snapshot when one exists), registry, runner, daemon.
pub fn build(config: Arc<Config>, session_id: String, offline: bool) -> anyhow::Result<Engine> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    // ── Stores ────────────────────────────────────────────────────
    let data_dir = &config.store.data_dir;
    let log = if config.store.persist_events {
        Arc::new(EventLog::open(&data_dir.join("events"), session_id.clone())?)
    } else {
        Arc::new(EventLog::in_memory(session_id.clone()))
    };
    let snapshots = Arc::new(SnapshotStore::new(&data_dir.join("snapshots"))?);

    // ── Workspace (recover from snapshot) ─────────────────────────
    let mut workspace = Workspace::new(config.workspace.clone());
    if let Some(snapshot) = snapshots.load(&format!("workspace-{session_id}"))? {
        workspace.restore(&snapshot);
        tracing::info!(session_id = %session_id, "workspace restored from snapshot");
    }
    let workspace = Arc::new(Mutex::new(workspace));

    // ── Model provider ────────────────────────────────────────────
    let provider: Arc<dyn ModelProvider> = if offline {
        tracing::info!("offline mode: scripted provider");
        Arc::new(ScriptedProvider::new())
    } else {
        match std::env::var(&config.models.api_key_env) {
            Ok(key) if !key.is_empty() => {
                Arc::new(OpenAiCompatProvider::new(config.models.clone(), key)?)
            }
            _ => {
                tracing::warn!(
                    env = %config.models.api_key_env,
                    "model API key not set; falling back to the offline scripted provider"
                );
                Arc::new(ScriptedProvider::new())
            }
        }
    };

    // ── Agents ────────────────────────────────────────────────────
    let mut registry = AgentRegistry::builtin();
    let agents_dir = std::path::Path::new(&config.prompts.dir).join("agents");
    let loaded = registry.load_yaml_dir(&agents_dir)?;
    if loaded > 0 {
        tracing::info!(loaded, dir = %agents_dir.display(), "extra agent manifests loaded");
    }
    let registry = Arc::new(registry);
    let prompts = Arc::new(FsPromptStore::new(&config.prompts.dir));

    // ── Runner + daemon ───────────────────────────────────────────
    let emitter = Arc::new(EventEmitter::new(log, clock.clone()));
    let runner = Arc::new(TurnRunner::new(
        config.clone(),
        clock.clone(),
        provider,
        prompts,
        registry,
        emitter.clone(),
        workspace.clone(),
        Some(snapshots),
    ));
    runner.start_session()?;

    let daemon = Arc::new(Daemon::new(
        config.daemon.clone(),
        emitter,
        workspace,
        clock,
    ));

    Ok(Engine {
        runner,
        daemon,
        cancel: CancellationToken::new(),
        session_id,
    })
}
