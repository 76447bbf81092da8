use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A row of the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub preferences: Value,
    pub profile: Value,
}

// ── Profile ────────────────────────────────────────────────────

/// How Valyria should talk to a given person. Stored as JSON on the user row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub learning_style: String,
    pub tone: String,
    pub prefers_confirmation: bool,
    pub overwhelm_threshold: String,
    pub language: String,
    pub notes: Vec<ProfileNote>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            learning_style: "step_by_step".into(),
            tone: "calm".into(),
            prefers_confirmation: true,
            overwhelm_threshold: "medium".into(),
            language: "en".into(),
            notes: Vec::new(),
        }
    }
}

impl Profile {
    /// Read a profile from its stored JSON. Missing fields take defaults;
    /// an unreadable document yields the default profile.
    pub fn from_value(value: &Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "stored profile is malformed, using defaults");
                Self::default()
            }
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileNote {
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Partial profile update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub learning_style: Option<String>,
    pub tone: Option<String>,
    pub prefers_confirmation: Option<bool>,
    pub overwhelm_threshold: Option<String>,
    pub language: Option<String>,
}

impl ProfilePatch {
    pub fn apply(self, profile: &mut Profile) {
        if let Some(v) = self.learning_style {
            profile.learning_style = v;
        }
        if let Some(v) = self.tone {
            profile.tone = v;
        }
        if let Some(v) = self.prefers_confirmation {
            profile.prefers_confirmation = v;
        }
        if let Some(v) = self.overwhelm_threshold {
            profile.overwhelm_threshold = v;
        }
        if let Some(v) = self.language {
            profile.language = v;
        }
    }
}

// ── Conversations ──────────────────────────────────────────────

/// One user message and the answer Valyria gave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
    pub mode: String,
}

// ── Bracelet ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewReading {
    pub user_id: String,
    pub device_id: String,
    pub heart_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub battery_level: Option<i64>,
    pub energy_state: String,
    pub emergency_detected: bool,
    /// The payload exactly as the bracelet sent it.
    pub raw_data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BraceletReading {
    pub id: i64,
    pub user_id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub heart_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub battery_level: Option<i64>,
    pub energy_state: String,
    pub emergency_detected: bool,
    pub raw_data: Value,
}

// ── Memories ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Decisions ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewDecision {
    pub user_id: String,
    pub mode: String,
    pub tool: String,
    pub intent: String,
    pub decision: String,
    pub reason: String,
    pub uncertain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub mode: String,
    pub tool: String,
    pub intent: String,
    pub decision: String,
    pub reason: String,
    pub uncertain: bool,
}

// ── Proposals & playbooks ──────────────────────────────────────

fn default_priority() -> i64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProposal {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    pub topic: String,
    pub rule: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

/// A user-authored instruction injected into the system prompt when its
/// topic comes up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookRule {
    pub id: i64,
    pub topic: String,
    pub rule: String,
    pub priority: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playbooks {
    pub rules: Vec<PlaybookRule>,
}
