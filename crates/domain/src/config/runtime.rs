//! Turn pipeline, scheduler, deliberation, workspace, and sensor tuning.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn timeouts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Per-agent timeout; expired agents are replaced by a quiet output.
    #[serde(default = "d_agent_timeout_ms")]
    pub agent_timeout_ms: u64,
    /// Per-wave bound, normally 2× the agent timeout.
    #[serde(default = "d_wave_timeout_ms")]
    pub wave_timeout_ms: u64,
    /// End-to-end turn bound; on expiry the runner jumps to council with
    /// whatever claims exist.
    #[serde(default = "d_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
    /// Maximum voice regenerations after a blocking critic finding.
    #[serde(default = "d_max_regen_attempts")]
    pub max_regen_attempts: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: d_agent_timeout_ms(),
            wave_timeout_ms: d_wave_timeout_ms(),
            turn_timeout_ms: d_turn_timeout_ms(),
            max_regen_attempts: d_max_regen_attempts(),
        }
    }
}

fn d_agent_timeout_ms() -> u64 {
    5000
}

fn d_wave_timeout_ms() -> u64 {
    10000
}

fn d_turn_timeout_ms() -> u64 {
    30000
}

fn d_max_regen_attempts() -> u32 {
    2
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "d_max_agents_per_wave")]
    pub max_agents_per_wave: usize,
    /// Fallback cooldown for manifests that do not declare one.
    #[serde(default = "d_default_cooldown_s")]
    pub default_cooldown_s: u64,
    /// Estimated-token budget per wave; low-score candidates are dropped
    /// once the budget is spent.
    #[serde(default = "d_token_budget")]
    pub token_budget: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_agents_per_wave: d_max_agents_per_wave(),
            default_cooldown_s: d_default_cooldown_s(),
            token_budget: d_token_budget(),
        }
    }
}

fn d_max_agents_per_wave() -> usize {
    10
}

fn d_default_cooldown_s() -> u64 {
    30
}

fn d_token_budget() -> u32 {
    10000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deliberation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationConfig {
    #[serde(default = "d_max_rounds")]
    pub max_rounds: u32,
    /// Consensus at or above this exits immediately with speak.
    #[serde(default = "d_consensus_threshold")]
    pub consensus_threshold: f64,
    /// After round 1, a non-improving score at or above this exits.
    #[serde(default = "d_early_exit_threshold")]
    pub early_exit_threshold: f64,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            max_rounds: d_max_rounds(),
            consensus_threshold: d_consensus_threshold(),
            early_exit_threshold: d_early_exit_threshold(),
        }
    }
}

fn d_max_rounds() -> u32 {
    3
}

fn d_consensus_threshold() -> f64 {
    0.9
}

fn d_early_exit_threshold() -> f64 {
    0.7
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workspace / reducer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Active-claim cap; oldest low-salience claims are evicted beyond it.
    #[serde(default = "d_max_active_claims")]
    pub max_active_claims: usize,
    /// Messages of conversation tail kept for prompt construction.
    #[serde(default = "d_conversation_window")]
    pub conversation_window: usize,
    /// Largest stance move a single output may cause, per dimension.
    #[serde(default = "d_max_stance_delta")]
    pub max_stance_delta: f64,
    /// Leaky-integration rate for stance updates.
    #[serde(default = "d_stance_alpha")]
    pub stance_alpha: f64,
    /// Token-Jaccard threshold above which same-type claims merge.
    #[serde(default = "d_claim_merge_jaccard")]
    pub claim_merge_jaccard: f64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            max_active_claims: d_max_active_claims(),
            conversation_window: d_conversation_window(),
            max_stance_delta: d_max_stance_delta(),
            stance_alpha: d_stance_alpha(),
            claim_merge_jaccard: d_claim_merge_jaccard(),
        }
    }
}

fn d_max_active_claims() -> usize {
    64
}

fn d_conversation_window() -> usize {
    5
}

fn d_max_stance_delta() -> f64 {
    0.15
}

fn d_stance_alpha() -> f64 {
    0.25
}

fn d_claim_merge_jaccard() -> f64 {
    0.7
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sensors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorsConfig {
    /// Fast safety_risk above this triggers the safety interrupt and the
    /// jump straight to council.
    #[serde(default = "d_safety_interrupt_threshold")]
    pub safety_interrupt_threshold: f64,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            safety_interrupt_threshold: d_safety_interrupt_threshold(),
        }
    }
}

fn d_safety_interrupt_threshold() -> f64 {
    0.8
}
