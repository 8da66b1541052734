//! Event definitions — the backbone of event sourcing.
//!
//! Every externally visible fact becomes an [`Event`]: an immutable
//! envelope around a typed payload. Events are totally ordered per
//! session by `(turn_id, seq)` and never modified after append.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::MemoryCandidate;
use crate::claim::ClaimType;
use crate::council::{CriticFinding, Intent, ResponseUrgency};
use crate::model::ModelTier;
use crate::modulators::ModulatorName;
use crate::sensors::{SensorMap, SensorName};
use crate::stance::StanceDim;

/// Turn id reserved for daemon events.
pub const DAEMON_TURN_ID: u64 = 0;

/// Current wire schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Pipeline stages, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Ingest,
    SensingFast,
    Context,
    Agents,
    Deliberation,
    Council,
    Voice,
    Critics,
    MemoryCommit,
    Completed,
}

impl TurnStage {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnStage::Ingest => "ingest",
            TurnStage::SensingFast => "sensing_fast",
            TurnStage::Context => "context",
            TurnStage::Agents => "agents",
            TurnStage::Deliberation => "deliberation",
            TurnStage::Council => "council",
            TurnStage::Voice => "voice",
            TurnStage::Critics => "critics",
            TurnStage::MemoryCommit => "memory_commit",
            TurnStage::Completed => "completed",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All event kinds, with stable wire identifiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // Lifecycle
    SessionStarted,
    SessionEnded,
    TurnStarted,
    TurnStageChanged,
    TurnCompleted,
    // Sensing
    SensorsFastUpdated,
    SensorsEnsembleUpdated,
    // Agents
    WaveStarted,
    WaveCompleted,
    AgentStarted,
    AgentCompleted,
    AgentFailed,
    // Workspace
    WorkspacePatched,
    StanceUpdated,
    ModulatorsUpdated,
    // Deliberation
    DelibRoundStarted,
    DelibRoundCompleted,
    ConsensusUpdated,
    // Decision
    CouncilDecisionMade,
    VoiceRendered,
    // Critics / safety
    CriticsUpdated,
    SafetyInterrupt,
    // Memory
    MemoryRetrieved,
    MemoryCandidatesProposed,
    MemoryCommitted,
    // Daemon
    DaemonTick,
    ProactiveNudge,
    ModulatorsDecayed,
    // Observability
    ModelCallStarted,
    ModelCallCompleted,
    TimingCheckpoint,
    // Error
    Error,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Kind-specific event data. The serde tag doubles as the wire `kind`
/// identifier, so the persisted log carries a closed, checkable schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    SessionStarted {},
    SessionEnded {},
    TurnStarted {
        user_input: String,
    },
    TurnStageChanged {
        stage: TurnStage,
    },
    TurnCompleted {
        total_time_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<String>,
    },
    SensorsFastUpdated {
        sensors: SensorMap,
    },
    SensorsEnsembleUpdated {
        sensors: SensorMap,
        disagreement: f64,
    },
    WaveStarted {
        wave: u32,
        agents: Vec<String>,
    },
    WaveCompleted {
        wave: u32,
    },
    AgentStarted {
        agent_id: String,
    },
    AgentCompleted {
        agent_id: String,
        observation: String,
        salience: f64,
        urgency: u8,
        confidence: u8,
        claim_count: u32,
        duration_ms: u64,
    },
    AgentFailed {
        agent_id: String,
        reason: String,
    },
    WorkspacePatched {
        source: String,
        patch: serde_json::Value,
    },
    StanceUpdated {
        delta: BTreeMap<StanceDim, f64>,
        current: BTreeMap<StanceDim, f64>,
    },
    ModulatorsUpdated {
        agent_id: String,
        current: BTreeMap<ModulatorName, f64>,
    },
    DelibRoundStarted {
        round: u32,
        contested: u32,
    },
    DelibRoundCompleted {
        round: u32,
        claim_count: u32,
        consensus: f64,
    },
    ConsensusUpdated {
        score: f64,
        by_type: BTreeMap<ClaimType, f64>,
        claim_count: u32,
    },
    CouncilDecisionMade {
        speak: bool,
        urgency: ResponseUrgency,
        intent: Intent,
        key_points: Vec<String>,
        rounds: u32,
        consensus: f64,
    },
    VoiceRendered {
        text: String,
        intent: Intent,
        token_count: u32,
        /// 1-based render attempt within the turn (regeneration bumps it).
        attempt: u32,
    },
    CriticsUpdated {
        passed: bool,
        findings: Vec<CriticFinding>,
    },
    SafetyInterrupt {
        sensor: SensorName,
        value: f64,
    },
    MemoryRetrieved {
        episode_count: u32,
        fact_count: u32,
    },
    MemoryCandidatesProposed {
        candidates: Vec<MemoryCandidate>,
    },
    MemoryCommitted {
        committed: u32,
    },
    DaemonTick {
        tick: u64,
    },
    ProactiveNudge {
        reason: String,
        suggestion: String,
        priority: u8,
        context: serde_json::Value,
        message_hint: String,
    },
    ModulatorsDecayed {
        current: BTreeMap<ModulatorName, f64>,
        deltas: BTreeMap<ModulatorName, f64>,
    },
    ModelCallStarted {
        component: String,
        tier: ModelTier,
        model: String,
    },
    ModelCallCompleted {
        component: String,
        model: String,
        prompt_tokens: u32,
        completion_tokens: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning_tokens: Option<u32>,
        latency_ms: u64,
    },
    TimingCheckpoint {
        label: String,
        elapsed_ms: u64,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<TurnStage>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SessionStarted {} => EventKind::SessionStarted,
            Self::SessionEnded {} => EventKind::SessionEnded,
            Self::TurnStarted { .. } => EventKind::TurnStarted,
            Self::TurnStageChanged { .. } => EventKind::TurnStageChanged,
            Self::TurnCompleted { .. } => EventKind::TurnCompleted,
            Self::SensorsFastUpdated { .. } => EventKind::SensorsFastUpdated,
            Self::SensorsEnsembleUpdated { .. } => EventKind::SensorsEnsembleUpdated,
            Self::WaveStarted { .. } => EventKind::WaveStarted,
            Self::WaveCompleted { .. } => EventKind::WaveCompleted,
            Self::AgentStarted { .. } => EventKind::AgentStarted,
            Self::AgentCompleted { .. } => EventKind::AgentCompleted,
            Self::AgentFailed { .. } => EventKind::AgentFailed,
            Self::WorkspacePatched { .. } => EventKind::WorkspacePatched,
            Self::StanceUpdated { .. } => EventKind::StanceUpdated,
            Self::ModulatorsUpdated { .. } => EventKind::ModulatorsUpdated,
            Self::DelibRoundStarted { .. } => EventKind::DelibRoundStarted,
            Self::DelibRoundCompleted { .. } => EventKind::DelibRoundCompleted,
            Self::ConsensusUpdated { .. } => EventKind::ConsensusUpdated,
            Self::CouncilDecisionMade { .. } => EventKind::CouncilDecisionMade,
            Self::VoiceRendered { .. } => EventKind::VoiceRendered,
            Self::CriticsUpdated { .. } => EventKind::CriticsUpdated,
            Self::SafetyInterrupt { .. } => EventKind::SafetyInterrupt,
            Self::MemoryRetrieved { .. } => EventKind::MemoryRetrieved,
            Self::MemoryCandidatesProposed { .. } => EventKind::MemoryCandidatesProposed,
            Self::MemoryCommitted { .. } => EventKind::MemoryCommitted,
            Self::DaemonTick { .. } => EventKind::DaemonTick,
            Self::ProactiveNudge { .. } => EventKind::ProactiveNudge,
            Self::ModulatorsDecayed { .. } => EventKind::ModulatorsDecayed,
            Self::ModelCallStarted { .. } => EventKind::ModelCallStarted,
            Self::ModelCallCompleted { .. } => EventKind::ModelCallCompleted,
            Self::TimingCheckpoint { .. } => EventKind::TimingCheckpoint,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable event envelope — the atomic unit of the system.
///
/// Ordering: for a fixed `session_id`, events are totally ordered by
/// `(turn_id, seq)` with `seq` strictly increasing within a turn.
/// `turn_id` 0 is reserved for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub session_id: String,
    pub turn_id: u64,
    pub seq: u64,
    /// Monotonic milliseconds since engine start, for durations.
    pub ts_monotonic_ms: u64,
    /// Wall clock, for display.
    pub ts_wall: DateTime<Utc>,
    #[serde(default = "d_schema_version")]
    pub schema_version: u32,
    pub payload: EventPayload,
}

fn d_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn is_daemon(&self) -> bool {
        self.turn_id == DAEMON_TURN_ID
    }
}
