pub mod postgres;
pub mod records;
pub mod sqlite;

pub use postgres::PostgresStore;
pub use records::*;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use valyria_config::DatabaseConfig;
use valyria_config::schema::DatabaseTarget;
use valyria_core::{Result, ValyriaError};

/// SQL `LIMIT` value for a caller-supplied count. Counts beyond `i64::MAX`
/// mean "everything" rather than wrapping negative.
pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// In-place edit of a profile document, run by [`Store::modify_profile`].
pub type ProfileEdit = Box<dyn FnOnce(&mut Profile) + Send>;

/// Persistence used by the HTTP API and the brain.
///
/// Both backends share the same schema; listing methods document their
/// ordering because callers (prompt assembly, the history endpoint) rely on it.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs and `/status`.
    fn backend(&self) -> &'static str;

    // ── Users & profiles ───────────────────────────────────────

    /// Fetch a user, creating an empty record on first sight.
    async fn get_or_create_user(&self, user_id: &str) -> Result<UserRecord>;

    /// Apply `edit` to a user's profile under the backend's row lock and
    /// store the result. Concurrent edits of the same user are serialized.
    async fn modify_profile(&self, user_id: &str, edit: ProfileEdit) -> Result<Profile>;

    async fn get_profile(&self, user_id: &str) -> Result<Profile> {
        let user = self.get_or_create_user(user_id).await?;
        Ok(Profile::from_value(&user.profile))
    }

    async fn update_profile(&self, user_id: &str, patch: ProfilePatch) -> Result<Profile> {
        self.modify_profile(user_id, Box::new(move |profile| patch.apply(profile)))
            .await
    }

    async fn add_profile_note(&self, user_id: &str, note: &str) -> Result<()> {
        let note = note.trim();
        if note.is_empty() {
            return Err(ValyriaError::InvalidInput("note must not be empty".into()));
        }
        let note = ProfileNote {
            note: note.to_string(),
            created_at: Utc::now(),
        };
        self.modify_profile(user_id, Box::new(move |profile| profile.notes.push(note)))
            .await?;
        Ok(())
    }

    // ── Conversations ──────────────────────────────────────────

    async fn save_conversation(
        &self,
        user_id: &str,
        user_message: &str,
        assistant_message: &str,
        mode: &str,
    ) -> Result<()>;

    /// The latest `limit` turns, oldest first.
    async fn conversation_history(&self, user_id: &str, limit: usize)
    -> Result<Vec<ConversationTurn>>;

    /// Delete every turn of a user, returning how many were removed.
    async fn clear_conversation_history(&self, user_id: &str) -> Result<usize>;

    // ── Bracelet ───────────────────────────────────────────────

    async fn save_bracelet_reading(&self, reading: NewReading) -> Result<i64>;

    /// The latest `limit` readings of a user, oldest first.
    async fn recent_bracelet_readings(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<BraceletReading>>;

    // ── Memories ───────────────────────────────────────────────

    async fn save_memory(
        &self,
        user_id: &str,
        content: &str,
        memory_type: &str,
        context: Option<&str>,
    ) -> Result<i64>;

    /// Newest first, optionally filtered by type.
    async fn memories(&self, user_id: &str, memory_type: Option<&str>) -> Result<Vec<MemoryRecord>>;

    // ── Decisions ──────────────────────────────────────────────

    async fn log_decision(&self, decision: NewDecision) -> Result<i64>;

    /// Newest first.
    async fn decisions(&self, user_id: &str, limit: usize) -> Result<Vec<DecisionRecord>>;

    // ── Proposals & playbooks ──────────────────────────────────

    async fn add_proposal(&self, proposal: NewProposal) -> Result<Proposal>;

    /// Newest first.
    async fn list_proposals(&self) -> Result<Vec<Proposal>>;

    async fn add_playbook_rule(&self, rule: NewRule) -> Result<PlaybookRule>;

    async fn playbooks(&self) -> Result<Playbooks>;

    // ── Health ─────────────────────────────────────────────────

    async fn health(&self) -> Result<()>;
}

/// Open the store described by the database config and create its schema.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn Store>> {
    let target = config.target().map_err(ValyriaError::Config)?;
    match target {
        DatabaseTarget::Postgres(url) => {
            let store = PostgresStore::connect(&url, config.max_connections).await?;
            info!(backend = store.backend(), "store ready");
            Ok(Arc::new(store))
        }
        DatabaseTarget::Sqlite(path) => {
            let store = SqliteStore::open(&path)?;
            info!(backend = store.backend(), ?path, "store ready");
            Ok(Arc::new(store))
        }
    }
}
