//! Open goals tracked across turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Open,
    InProgress,
    Completed,
    Abandoned,
}

/// An open goal or thread the system is tracking for the user. Goals with
/// deadlines feed the daemon's deadline-approaching nudge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Wall-clock deadline, if any.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// 0 = low, 3 = critical.
    #[serde(default = "d_priority")]
    pub priority: u8,
    #[serde(default = "d_status")]
    pub status: GoalStatus,
}

fn d_priority() -> u8 {
    1
}

fn d_status() -> GoalStatus {
    GoalStatus::Open
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            created_at: Utc::now(),
            deadline: None,
            priority: d_priority(),
            status: GoalStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, GoalStatus::Open | GoalStatus::InProgress)
    }
}
