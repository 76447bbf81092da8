use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use tracing::{debug, info};
use valyria_core::{Result, ValyriaError};

use crate::{ProfileEdit, Store, sql_limit};
use crate::records::*;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    name TEXT,
    created_at TEXT NOT NULL,
    preferences TEXT NOT NULL DEFAULT '{}',
    profile TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    user_message TEXT NOT NULL,
    assistant_message TEXT NOT NULL,
    mode TEXT NOT NULL DEFAULT 'CHAT'
);

CREATE TABLE IF NOT EXISTS bracelet_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    device_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    heart_rate REAL,
    temperature REAL,
    battery_level INTEGER,
    energy_state TEXT NOT NULL,
    emergency_detected INTEGER NOT NULL DEFAULT 0,
    raw_data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    memory_type TEXT NOT NULL DEFAULT 'general',
    content TEXT NOT NULL,
    context TEXT
);

CREATE TABLE IF NOT EXISTS decisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    mode TEXT NOT NULL,
    tool TEXT NOT NULL,
    intent TEXT NOT NULL,
    decision TEXT NOT NULL,
    reason TEXT NOT NULL,
    uncertain INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS proposals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    priority INTEGER NOT NULL DEFAULT 50,
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS playbook_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    rule TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 50,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);
CREATE INDEX IF NOT EXISTS idx_bracelet_user ON bracelet_data(user_id);
CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);
CREATE INDEX IF NOT EXISTS idx_decisions_user ON decisions(user_id);
";

/// SQLite-backed store. Used for local development and whenever no
/// PostgreSQL URL is configured.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening sqlite store");

        let conn = Connection::open(path).map_err(ValyriaError::storage)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(ValyriaError::storage)?;
        conn.execute_batch(SCHEMA).map_err(ValyriaError::storage)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Default::default()))
}

fn row_to_reading(row: &Row<'_>) -> rusqlite::Result<BraceletReading> {
    let ts: String = row.get("timestamp")?;
    let raw: String = row.get("raw_data")?;
    Ok(BraceletReading {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        device_id: row.get("device_id")?,
        timestamp: parse_ts(&ts),
        heart_rate: row.get("heart_rate")?,
        temperature: row.get("temperature")?,
        battery_level: row.get("battery_level")?,
        energy_state: row.get("energy_state")?,
        emergency_detected: row.get("emergency_detected")?,
        raw_data: parse_json(&raw),
    })
}

fn row_to_decision(row: &Row<'_>) -> rusqlite::Result<DecisionRecord> {
    let ts: String = row.get("timestamp")?;
    Ok(DecisionRecord {
        id: row.get("id")?,
        timestamp: parse_ts(&ts),
        user_id: row.get("user_id")?,
        mode: row.get("mode")?,
        tool: row.get("tool")?,
        intent: row.get("intent")?,
        decision: row.get("decision")?,
        reason: row.get("reason")?,
        uncertain: row.get("uncertain")?,
    })
}

fn row_to_proposal(row: &Row<'_>) -> rusqlite::Result<Proposal> {
    let ts: String = row.get("created_at")?;
    Ok(Proposal {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        priority: row.get("priority")?,
        status: row.get("status")?,
        created_at: parse_ts(&ts),
    })
}

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<PlaybookRule> {
    let ts: String = row.get("created_at")?;
    Ok(PlaybookRule {
        id: row.get("id")?,
        topic: row.get("topic")?,
        rule: row.get("rule")?,
        priority: row.get("priority")?,
        enabled: row.get("enabled")?,
        created_at: parse_ts(&ts),
    })
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn get_or_create_user(&self, user_id: &str) -> Result<UserRecord> {
        let db = self.db.lock();
        let inserted = db
            .execute(
                "INSERT OR IGNORE INTO users (user_id, created_at, preferences, profile)
                 VALUES (?1, ?2, '{}', '{}')",
                params![user_id, now()],
            )
            .map_err(ValyriaError::storage)?;
        if inserted > 0 {
            info!(user_id, "created new user");
        }
        db.query_row(
            "SELECT user_id, name, created_at, preferences, profile FROM users WHERE user_id = ?1",
            params![user_id],
            |row| {
                let created: String = row.get(2)?;
                let prefs: String = row.get(3)?;
                let profile: String = row.get(4)?;
                Ok(UserRecord {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_ts(&created),
                    preferences: parse_json(&prefs),
                    profile: parse_json(&profile),
                })
            },
        )
        .map_err(ValyriaError::storage)
    }

    async fn modify_profile(&self, user_id: &str, edit: ProfileEdit) -> Result<Profile> {
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(ValyriaError::storage)?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO users (user_id, created_at, preferences, profile)
                 VALUES (?1, ?2, '{}', '{}')",
                params![user_id, now()],
            )
            .map_err(ValyriaError::storage)?;
        if inserted > 0 {
            info!(user_id, "created new user");
        }
        let stored: String = tx
            .query_row(
                "SELECT profile FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(ValyriaError::storage)?;

        let mut profile = Profile::from_value(&parse_json(&stored));
        edit(&mut profile);
        tx.execute(
            "UPDATE users SET profile = ?2 WHERE user_id = ?1",
            params![user_id, profile.to_value().to_string()],
        )
        .map_err(ValyriaError::storage)?;
        tx.commit().map_err(ValyriaError::storage)?;
        debug!(user_id, "profile updated");
        Ok(profile)
    }

    async fn save_conversation(
        &self,
        user_id: &str,
        user_message: &str,
        assistant_message: &str,
        mode: &str,
    ) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO conversations (user_id, timestamp, user_message, assistant_message, mode)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, now(), user_message, assistant_message, mode],
        )
        .map_err(ValyriaError::storage)?;
        Ok(())
    }

    async fn conversation_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT user_message, assistant_message, timestamp, mode FROM conversations
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(ValyriaError::storage)?;
        let mut turns = stmt
            .query_map(params![user_id, sql_limit(limit)], |row| {
                let ts: String = row.get(2)?;
                Ok(ConversationTurn {
                    user: row.get(0)?,
                    assistant: row.get(1)?,
                    timestamp: parse_ts(&ts),
                    mode: row.get(3)?,
                })
            })
            .map_err(ValyriaError::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ValyriaError::storage)?;
        turns.reverse();
        Ok(turns)
    }

    async fn clear_conversation_history(&self, user_id: &str) -> Result<usize> {
        let db = self.db.lock();
        let removed = db
            .execute("DELETE FROM conversations WHERE user_id = ?1", params![user_id])
            .map_err(ValyriaError::storage)?;
        info!(user_id, removed, "cleared conversation history");
        Ok(removed)
    }

    async fn save_bracelet_reading(&self, reading: NewReading) -> Result<i64> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO bracelet_data (user_id, device_id, timestamp, heart_rate, temperature,
                battery_level, energy_state, emergency_detected, raw_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                reading.user_id,
                reading.device_id,
                now(),
                reading.heart_rate,
                reading.temperature,
                reading.battery_level,
                reading.energy_state,
                reading.emergency_detected,
                reading.raw_data.to_string(),
            ],
        )
        .map_err(ValyriaError::storage)?;
        Ok(db.last_insert_rowid())
    }

    async fn recent_bracelet_readings(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<BraceletReading>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT * FROM bracelet_data WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(ValyriaError::storage)?;
        let mut readings = stmt
            .query_map(params![user_id, sql_limit(limit)], row_to_reading)
            .map_err(ValyriaError::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ValyriaError::storage)?;
        readings.reverse();
        Ok(readings)
    }

    async fn save_memory(
        &self,
        user_id: &str,
        content: &str,
        memory_type: &str,
        context: Option<&str>,
    ) -> Result<i64> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO memories (user_id, created_at, memory_type, content, context)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, now(), memory_type, content, context],
        )
        .map_err(ValyriaError::storage)?;
        info!(user_id, memory_type, "saved memory");
        Ok(db.last_insert_rowid())
    }

    async fn memories(&self, user_id: &str, memory_type: Option<&str>) -> Result<Vec<MemoryRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, content, memory_type, context, created_at FROM memories
                 WHERE user_id = ?1 AND (?2 IS NULL OR memory_type = ?2)
                 ORDER BY id DESC",
            )
            .map_err(ValyriaError::storage)?;
        stmt.query_map(params![user_id, memory_type], |row| {
            let ts: String = row.get(4)?;
            Ok(MemoryRecord {
                id: row.get(0)?,
                content: row.get(1)?,
                memory_type: row.get(2)?,
                context: row.get(3)?,
                created_at: parse_ts(&ts),
            })
        })
        .map_err(ValyriaError::storage)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(ValyriaError::storage)
    }

    async fn log_decision(&self, d: NewDecision) -> Result<i64> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO decisions (user_id, timestamp, mode, tool, intent, decision, reason, uncertain)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                d.user_id, now(), d.mode, d.tool, d.intent, d.decision, d.reason, d.uncertain
            ],
        )
        .map_err(ValyriaError::storage)?;
        Ok(db.last_insert_rowid())
    }

    async fn decisions(&self, user_id: &str, limit: usize) -> Result<Vec<DecisionRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT * FROM decisions WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2")
            .map_err(ValyriaError::storage)?;
        stmt.query_map(params![user_id, sql_limit(limit)], row_to_decision)
            .map_err(ValyriaError::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ValyriaError::storage)
    }

    async fn add_proposal(&self, p: NewProposal) -> Result<Proposal> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO proposals (title, description, priority, status, created_at)
             VALUES (?1, ?2, ?3, 'open', ?4)",
            params![p.title, p.description, p.priority, now()],
        )
        .map_err(ValyriaError::storage)?;
        let id = db.last_insert_rowid();
        db.query_row("SELECT * FROM proposals WHERE id = ?1", params![id], row_to_proposal)
            .map_err(ValyriaError::storage)
    }

    async fn list_proposals(&self) -> Result<Vec<Proposal>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT * FROM proposals ORDER BY id DESC")
            .map_err(ValyriaError::storage)?;
        stmt.query_map([], row_to_proposal)
            .map_err(ValyriaError::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ValyriaError::storage)
    }

    async fn add_playbook_rule(&self, r: NewRule) -> Result<PlaybookRule> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO playbook_rules (topic, rule, priority, enabled, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![r.topic, r.rule, r.priority, now()],
        )
        .map_err(ValyriaError::storage)?;
        let id = db.last_insert_rowid();
        db.query_row("SELECT * FROM playbook_rules WHERE id = ?1", params![id], row_to_rule)
            .map_err(ValyriaError::storage)
    }

    async fn playbooks(&self) -> Result<Playbooks> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT * FROM playbook_rules ORDER BY id ASC")
            .map_err(ValyriaError::storage)?;
        let rules = stmt
            .query_map([], row_to_rule)
            .map_err(ValyriaError::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ValyriaError::storage)?;
        Ok(Playbooks { rules })
    }

    async fn health(&self) -> Result<()> {
        let db = self.db.lock();
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .optional()
            .map_err(ValyriaError::storage)?;
        Ok(())
    }
}
