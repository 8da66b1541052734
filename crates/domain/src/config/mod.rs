mod daemon;
mod models;
mod runtime;
mod store;

pub use daemon::*;
pub use models::*;
pub use runtime::*;
pub use store::*;

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub deliberation: DeliberationConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory holding per-agent prompt templates (`<agent_id>.md`).
    /// Missing files fall back to the built-in generic template.
    #[serde(default = "d_prompts_dir")]
    pub dir: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            dir: d_prompts_dir(),
        }
    }
}

fn d_prompts_dir() -> String {
    "prompts".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate cross-field constraints. Returns all issues found;
    /// callers decide whether warnings are fatal.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        let unit_ranges = [
            (
                "deliberation.consensus_threshold",
                self.deliberation.consensus_threshold,
            ),
            (
                "deliberation.early_exit_threshold",
                self.deliberation.early_exit_threshold,
            ),
            (
                "workspace.claim_merge_jaccard",
                self.workspace.claim_merge_jaccard,
            ),
            (
                "sensors.safety_interrupt_threshold",
                self.sensors.safety_interrupt_threshold,
            ),
        ];
        for (field, value) in unit_ranges {
            if !(0.0..=1.0).contains(&value) {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: field.into(),
                    message: format!("must be in [0, 1], got {value}"),
                });
            }
        }

        if self.deliberation.max_rounds == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "deliberation.max_rounds".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.workspace.max_stance_delta <= 0.0 || self.workspace.max_stance_delta > 1.0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "workspace.max_stance_delta".into(),
                message: format!("must be in (0, 1], got {}", self.workspace.max_stance_delta),
            });
        }
        if self.turn.agent_timeout_ms == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "turn.agent_timeout_ms".into(),
                message: "must be positive".into(),
            });
        }
        if self.turn.wave_timeout_ms < self.turn.agent_timeout_ms {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "turn.wave_timeout_ms".into(),
                message: "wave timeout is shorter than the per-agent timeout".into(),
            });
        }
        if self.daemon.tick_interval_s <= 0.0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "daemon.tick_interval_s".into(),
                message: "must be positive".into(),
            });
        }

        issues
    }
}
