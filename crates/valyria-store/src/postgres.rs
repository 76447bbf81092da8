use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{debug, info};
use valyria_core::{Result, ValyriaError};

use crate::{ProfileEdit, Store, sql_limit};
use crate::records::*;

/// One statement per entry: the extended query protocol rejects batches.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        name TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        preferences TEXT NOT NULL DEFAULT '{}',
        profile TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS conversations (
        id BIGSERIAL PRIMARY KEY,
        user_id TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
        user_message TEXT NOT NULL,
        assistant_message TEXT NOT NULL,
        mode TEXT NOT NULL DEFAULT 'CHAT'
    )",
    "CREATE TABLE IF NOT EXISTS bracelet_data (
        id BIGSERIAL PRIMARY KEY,
        user_id TEXT NOT NULL,
        device_id TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
        heart_rate DOUBLE PRECISION,
        temperature DOUBLE PRECISION,
        battery_level BIGINT,
        energy_state TEXT NOT NULL,
        emergency_detected BOOLEAN NOT NULL DEFAULT FALSE,
        raw_data TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS memories (
        id BIGSERIAL PRIMARY KEY,
        user_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        memory_type TEXT NOT NULL DEFAULT 'general',
        content TEXT NOT NULL,
        context TEXT
    )",
    "CREATE TABLE IF NOT EXISTS decisions (
        id BIGSERIAL PRIMARY KEY,
        user_id TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
        mode TEXT NOT NULL,
        tool TEXT NOT NULL,
        intent TEXT NOT NULL,
        decision TEXT NOT NULL,
        reason TEXT NOT NULL,
        uncertain BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS proposals (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        priority BIGINT NOT NULL DEFAULT 50,
        status TEXT NOT NULL DEFAULT 'open',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS playbook_rules (
        id BIGSERIAL PRIMARY KEY,
        topic TEXT NOT NULL,
        rule TEXT NOT NULL,
        priority BIGINT NOT NULL DEFAULT 50,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_bracelet_user ON bracelet_data(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_decisions_user ON decisions(user_id)",
];

/// PostgreSQL-backed store, selected when `DATABASE_URL` points at a
/// managed database.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        info!(max_connections, "connecting to postgres");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await
            .map_err(ValyriaError::storage)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(ValyriaError::storage)?;
        }
        debug!("postgres schema ready");
        Ok(())
    }
}

fn parse_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Default::default()))
}

fn row_to_reading(row: &PgRow) -> std::result::Result<BraceletReading, sqlx::Error> {
    let raw: String = row.try_get("raw_data")?;
    Ok(BraceletReading {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        device_id: row.try_get("device_id")?,
        timestamp: row.try_get("timestamp")?,
        heart_rate: row.try_get("heart_rate")?,
        temperature: row.try_get("temperature")?,
        battery_level: row.try_get("battery_level")?,
        energy_state: row.try_get("energy_state")?,
        emergency_detected: row.try_get("emergency_detected")?,
        raw_data: parse_json(&raw),
    })
}

fn row_to_decision(row: &PgRow) -> std::result::Result<DecisionRecord, sqlx::Error> {
    Ok(DecisionRecord {
        id: row.try_get("id")?,
        timestamp: row.try_get("timestamp")?,
        user_id: row.try_get("user_id")?,
        mode: row.try_get("mode")?,
        tool: row.try_get("tool")?,
        intent: row.try_get("intent")?,
        decision: row.try_get("decision")?,
        reason: row.try_get("reason")?,
        uncertain: row.try_get("uncertain")?,
    })
}

fn row_to_proposal(row: &PgRow) -> std::result::Result<Proposal, sqlx::Error> {
    Ok(Proposal {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        priority: row.try_get("priority")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_rule(row: &PgRow) -> std::result::Result<PlaybookRule, sqlx::Error> {
    Ok(PlaybookRule {
        id: row.try_get("id")?,
        topic: row.try_get("topic")?,
        rule: row.try_get("rule")?,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
    })
}

fn collect<T, F>(rows: Vec<PgRow>, map: F) -> Result<Vec<T>>
where
    F: Fn(&PgRow) -> std::result::Result<T, sqlx::Error>,
{
    rows.iter()
        .map(map)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(ValyriaError::storage)
}

#[async_trait]
impl Store for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get_or_create_user(&self, user_id: &str) -> Result<UserRecord> {
        let inserted = sqlx::query(
            "INSERT INTO users (user_id, preferences, profile) VALUES ($1, '{}', '{}')
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        if inserted.rows_affected() > 0 {
            info!(user_id, "created new user");
        }

        let row = sqlx::query(
            "SELECT user_id, name, created_at, preferences, profile FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;

        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(ValyriaError::storage)?;
        let prefs: String = row.try_get("preferences").map_err(ValyriaError::storage)?;
        let profile: String = row.try_get("profile").map_err(ValyriaError::storage)?;
        Ok(UserRecord {
            user_id: row.try_get("user_id").map_err(ValyriaError::storage)?,
            name: row.try_get("name").map_err(ValyriaError::storage)?,
            created_at,
            preferences: parse_json(&prefs),
            profile: parse_json(&profile),
        })
    }

    async fn modify_profile(&self, user_id: &str, edit: ProfileEdit) -> Result<Profile> {
        let mut tx = self.pool.begin().await.map_err(ValyriaError::storage)?;
        let inserted = sqlx::query(
            "INSERT INTO users (user_id, preferences, profile) VALUES ($1, '{}', '{}')
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(ValyriaError::storage)?;
        if inserted.rows_affected() > 0 {
            info!(user_id, "created new user");
        }

        let row = sqlx::query("SELECT profile FROM users WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(ValyriaError::storage)?;
        let stored: String = row.try_get("profile").map_err(ValyriaError::storage)?;

        let mut profile = Profile::from_value(&parse_json(&stored));
        edit(&mut profile);
        sqlx::query("UPDATE users SET profile = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(profile.to_value().to_string())
            .execute(&mut *tx)
            .await
            .map_err(ValyriaError::storage)?;
        tx.commit().await.map_err(ValyriaError::storage)?;
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
        sqlx::query(
            "INSERT INTO conversations (user_id, user_message, assistant_message, mode)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(user_message)
        .bind(assistant_message)
        .bind(mode)
        .execute(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        Ok(())
    }

    async fn conversation_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            "SELECT user_message, assistant_message, timestamp, mode FROM conversations
             WHERE user_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            turns.push(ConversationTurn {
                user: row.try_get("user_message").map_err(ValyriaError::storage)?,
                assistant: row.try_get("assistant_message").map_err(ValyriaError::storage)?,
                timestamp: row.try_get("timestamp").map_err(ValyriaError::storage)?,
                mode: row.try_get("mode").map_err(ValyriaError::storage)?,
            });
        }
        Ok(turns)
    }

    async fn clear_conversation_history(&self, user_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM conversations WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(ValyriaError::storage)?;
        let removed = result.rows_affected() as usize;
        info!(user_id, removed, "cleared conversation history");
        Ok(removed)
    }

    async fn save_bracelet_reading(&self, reading: NewReading) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO bracelet_data (user_id, device_id, heart_rate, temperature,
                battery_level, energy_state, emergency_detected, raw_data)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(&reading.user_id)
        .bind(&reading.device_id)
        .bind(reading.heart_rate)
        .bind(reading.temperature)
        .bind(reading.battery_level)
        .bind(&reading.energy_state)
        .bind(reading.emergency_detected)
        .bind(reading.raw_data.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        row.try_get("id").map_err(ValyriaError::storage)
    }

    async fn recent_bracelet_readings(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<BraceletReading>> {
        let rows = sqlx::query(
            "SELECT * FROM bracelet_data WHERE user_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        let mut readings = collect(rows, row_to_reading)?;
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
        let row = sqlx::query(
            "INSERT INTO memories (user_id, memory_type, content, context)
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(user_id)
        .bind(memory_type)
        .bind(content)
        .bind(context)
        .fetch_one(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        info!(user_id, memory_type, "saved memory");
        row.try_get("id").map_err(ValyriaError::storage)
    }

    async fn memories(&self, user_id: &str, memory_type: Option<&str>) -> Result<Vec<MemoryRecord>> {
        let rows = sqlx::query(
            "SELECT id, content, memory_type, context, created_at FROM memories
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR memory_type = $2)
             ORDER BY id DESC",
        )
        .bind(user_id)
        .bind(memory_type)
        .fetch_all(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        collect(rows, |row: &PgRow| {
            Ok(MemoryRecord {
                id: row.try_get("id")?,
                content: row.try_get("content")?,
                memory_type: row.try_get("memory_type")?,
                context: row.try_get("context")?,
                created_at: row.try_get("created_at")?,
            })
        })
    }

    async fn log_decision(&self, d: NewDecision) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO decisions (user_id, mode, tool, intent, decision, reason, uncertain)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(&d.user_id)
        .bind(&d.mode)
        .bind(&d.tool)
        .bind(&d.intent)
        .bind(&d.decision)
        .bind(&d.reason)
        .bind(d.uncertain)
        .fetch_one(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        row.try_get("id").map_err(ValyriaError::storage)
    }

    async fn decisions(&self, user_id: &str, limit: usize) -> Result<Vec<DecisionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM decisions WHERE user_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        collect(rows, row_to_decision)
    }

    async fn add_proposal(&self, p: NewProposal) -> Result<Proposal> {
        let row = sqlx::query(
            "INSERT INTO proposals (title, description, priority, status)
             VALUES ($1, $2, $3, 'open') RETURNING *",
        )
        .bind(&p.title)
        .bind(&p.description)
        .bind(p.priority)
        .fetch_one(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        row_to_proposal(&row).map_err(ValyriaError::storage)
    }

    async fn list_proposals(&self) -> Result<Vec<Proposal>> {
        let rows = sqlx::query("SELECT * FROM proposals ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(ValyriaError::storage)?;
        collect(rows, row_to_proposal)
    }

    async fn add_playbook_rule(&self, r: NewRule) -> Result<PlaybookRule> {
        let row = sqlx::query(
            "INSERT INTO playbook_rules (topic, rule, priority, enabled)
             VALUES ($1, $2, $3, TRUE) RETURNING *",
        )
        .bind(&r.topic)
        .bind(&r.rule)
        .bind(r.priority)
        .fetch_one(&self.pool)
        .await
        .map_err(ValyriaError::storage)?;
        row_to_rule(&row).map_err(ValyriaError::storage)
    }

    async fn playbooks(&self) -> Result<Playbooks> {
        let rows = sqlx::query("SELECT * FROM playbook_rules ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(ValyriaError::storage)?;
        Ok(Playbooks {
            rules: collect(rows, row_to_rule)?,
        })
    }

    async fn health(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(ValyriaError::storage)?;
        Ok(())
    }
}
