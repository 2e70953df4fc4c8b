//! Direct SQLite database access for Augury.
//!
//! This module owns every persisted shape of the memory engine: message
//! history, reflections, plans, the reference corpus used for importance
//! calibration, the durable session mirror, and per-user custom prompts.
//!
//! Every connection gets the `cosine_similarity` and `combined_score` scalar
//! functions registered (see [`vector`]), so vector ranking is computed by
//! the store itself.

pub mod vector;

pub use vector::{Table, VectorQuery, cosine_similarity, decode_embedding, encode_embedding};

use crate::error::{Error, Result};
use crate::types::*;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Schema applied by [`Database::migrate`]
pub const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open database at specific path and apply the schema
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(Error::Database)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database (tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        vector::register_functions(&conn)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Apply the schema (idempotent)
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn parse_kind(value: String) -> rusqlite::Result<ChatKind> {
        ChatKind::from_str(&value).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown chat kind: {}", value).into(),
            )
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Message Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a completed turn
    pub fn insert_message(&self, message: &NewMessage) -> Result<MessageRecord> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let id = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO message_history
             (id, user_id, session_id, kind, user_text, response_text, embedding,
              importance_score, private, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id,
                message.user_id,
                message.session_id,
                message.kind.as_str(),
                message.user_text,
                message.response_text,
                encode_embedding(&message.embedding),
                message.importance_score,
                message.private,
                message.created_at,
            ],
        )?;

        Ok(MessageRecord {
            id,
            user_id: message.user_id.clone(),
            session_id: message.session_id.clone(),
            kind: message.kind,
            user_text: message.user_text.clone(),
            response_text: message.response_text.clone(),
            embedding: message.embedding.clone(),
            importance_score: message.importance_score,
            private: message.private,
            created_at: message.created_at,
            updated_at: message.created_at,
        })
    }

    /// Most recent turns of a session created at or after `since` (ms),
    /// returned oldest-first
    pub fn recent_messages(
        &self,
        user_id: &str,
        session_id: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, session_id, kind, user_text, response_text, embedding,
                    importance_score, private, created_at, updated_at
             FROM message_history
             WHERE user_id = ?1 AND session_id = ?2 AND created_at >= ?3
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?4",
        )?;

        let mut messages = stmt
            .query_map(
                params![user_id, session_id, since, limit as i64],
                Self::map_message,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Count stored turns for a user
    pub fn count_messages(&self, user_id: &str) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM message_history WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn map_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRecord> {
        let embedding: Vec<u8> = row.get(6)?;
        Ok(MessageRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            kind: Self::parse_kind(row.get(3)?)?,
            user_text: row.get(4)?,
            response_text: row.get(5)?,
            embedding: decode_embedding(&embedding),
            importance_score: row.get(7)?,
            private: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reflection Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create or overwrite the user's latest reflection of a kind.
    ///
    /// Reflections are a rolling summary: when one already exists for
    /// (user, kind), its text, embedding and score are replaced in place.
    pub fn upsert_reflection(&self, reflection: &NewReflection) -> Result<ReflectionRecord> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Self::now();
        let embedding = encode_embedding(&reflection.embedding);

        let existing: Option<(String, i64)> = tx
            .query_row(
                "SELECT id, created_at FROM reflection
                 WHERE user_id = ?1 AND kind = ?2
                 ORDER BY updated_at DESC LIMIT 1",
                params![reflection.user_id, reflection.kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (id, created_at) = match existing {
            Some((id, created_at)) => {
                tx.execute(
                    "UPDATE reflection
                     SET reflection_text = ?1, embedding = ?2, importance_score = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        reflection.reflection_text,
                        embedding,
                        reflection.importance_score,
                        now,
                        id,
                    ],
                )?;
                (id, created_at)
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO reflection
                     (id, user_id, kind, reflection_text, embedding, importance_score,
                      created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    params![
                        id,
                        reflection.user_id,
                        reflection.kind.as_str(),
                        reflection.reflection_text,
                        embedding,
                        reflection.importance_score,
                        now,
                    ],
                )?;
                (id, now)
            }
        };
        tx.commit()?;

        Ok(ReflectionRecord {
            id,
            user_id: reflection.user_id.clone(),
            kind: reflection.kind,
            reflection_text: reflection.reflection_text.clone(),
            embedding: reflection.embedding.clone(),
            importance_score: reflection.importance_score,
            created_at,
            updated_at: now,
        })
    }

    /// Most recent reflections for a user, newest first
    pub fn recent_reflections(
        &self,
        user_id: &str,
        kind: Option<ChatKind>,
        limit: usize,
    ) -> Result<Vec<ReflectionRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let reflections = if let Some(kind) = kind {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, reflection_text, embedding, importance_score,
                        created_at, updated_at
                 FROM reflection WHERE user_id = ?1 AND kind = ?2
                 ORDER BY updated_at DESC LIMIT ?3",
            )?;
            stmt.query_map(
                params![user_id, kind.as_str(), limit as i64],
                Self::map_reflection,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, reflection_text, embedding, importance_score,
                        created_at, updated_at
                 FROM reflection WHERE user_id = ?1
                 ORDER BY updated_at DESC LIMIT ?2",
            )?;
            stmt.query_map(params![user_id, limit as i64], Self::map_reflection)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(reflections)
    }

    fn map_reflection(row: &rusqlite::Row) -> rusqlite::Result<ReflectionRecord> {
        let embedding: Vec<u8> = row.get(4)?;
        Ok(ReflectionRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: Self::parse_kind(row.get(2)?)?,
            reflection_text: row.get(3)?,
            embedding: decode_embedding(&embedding),
            importance_score: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plan Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// The user's currently active plan, if any
    pub fn active_plan(&self, user_id: &str) -> Result<Option<PlanRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, plan_text, active, created_at, updated_at
             FROM plan WHERE user_id = ?1 AND active = 1",
        )?;

        Ok(stmt.query_row(params![user_id], Self::map_plan).optional()?)
    }

    /// Insert a plan as the user's only active plan.
    ///
    /// Deactivation of the previous plans and the insert share one
    /// IMMEDIATE transaction.
    pub fn activate_plan(&self, plan: &NewPlan) -> Result<PlanRecord> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Self::now();

        let deactivated = tx.execute(
            "UPDATE plan SET active = 0, updated_at = ?1 WHERE user_id = ?2 AND active = 1",
            params![now, plan.user_id],
        )?;
        tx.execute(
            "INSERT INTO plan (id, user_id, kind, plan_text, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![id, plan.user_id, plan.kind.as_str(), plan.plan_text, now],
        )?;
        tx.commit()?;

        tracing::debug!(user_id = %plan.user_id, deactivated, "activated plan {}", id);

        Ok(PlanRecord {
            id,
            user_id: plan.user_id.clone(),
            kind: plan.kind,
            plan_text: plan.plan_text.clone(),
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// All plans for a user, newest first
    pub fn list_plans(&self, user_id: &str, limit: usize) -> Result<Vec<PlanRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, plan_text, active, created_at, updated_at
             FROM plan WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;

        let plans = stmt
            .query_map(params![user_id, limit as i64], Self::map_plan)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    fn map_plan(row: &rusqlite::Row) -> rusqlite::Result<PlanRecord> {
        Ok(PlanRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: Self::parse_kind(row.get(2)?)?,
            plan_text: row.get(3)?,
            active: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reference Sample Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a labeled sample; returns false when the text already exists
    pub fn insert_reference_sample(
        &self,
        sample_text: &str,
        label: u8,
        embedding: &[f32],
    ) -> Result<bool> {
        if !(1..=10).contains(&label) {
            return Err(Error::InvalidData(format!(
                "reference label must be 1-10, got {}",
                label
            )));
        }

        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let inserted = conn.execute(
            "INSERT INTO reference_sample (sample_text, label, embedding)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(sample_text) DO NOTHING",
            params![sample_text, label, encode_embedding(embedding)],
        )?;
        Ok(inserted > 0)
    }

    /// Top-k reference samples by cosine similarity, best first
    pub fn nearest_reference_samples(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(ReferenceSample, f64)>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, sample_text, label, embedding,
                    cosine_similarity(embedding, ?1) AS similarity
             FROM reference_sample
             ORDER BY similarity DESC, id ASC
             LIMIT ?2",
        )?;

        let samples = stmt
            .query_map(params![encode_embedding(embedding), k as i64], |row| {
                let embedding: Vec<u8> = row.get(3)?;
                Ok((
                    ReferenceSample {
                        id: row.get(0)?,
                        sample_text: row.get(1)?,
                        label: row.get(2)?,
                        embedding: decode_embedding(&embedding),
                    },
                    row.get::<_, f64>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Size of the reference corpus
    pub fn count_reference_samples(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM reference_sample", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Chat Session Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a session as active, reopening the row if it already exists
    pub fn upsert_chat_session(
        &self,
        session_id: &str,
        user_id: &str,
        kind: ChatKind,
        private: bool,
        title: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let now = Self::now();
        conn.execute(
            "INSERT INTO chat_session
             (id, user_id, kind, title, private, status, last_activity_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                created_at = CASE WHEN status = 'active' THEN created_at ELSE ?6 END,
                kind = ?3, private = ?5,
                status = 'active', last_activity_at = ?6, updated_at = ?6",
            params![session_id, user_id, kind.as_str(), title, private, now],
        )?;
        Ok(())
    }

    /// Refresh a session's last activity timestamp
    pub fn touch_chat_session(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let now = Self::now();
        conn.execute(
            "UPDATE chat_session SET last_activity_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![now, session_id],
        )?;
        Ok(())
    }

    /// Move a session into a terminal status
    pub fn close_chat_session(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let now = Self::now();
        conn.execute(
            "UPDATE chat_session SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, session_id],
        )?;
        Ok(())
    }

    /// Get session row by ID
    pub fn get_chat_session(&self, session_id: &str) -> Result<Option<ChatSessionRow>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, title, private, status, last_activity_at,
                    created_at, updated_at
             FROM chat_session WHERE id = ?1",
        )?;

        Ok(stmt
            .query_row(params![session_id], Self::map_chat_session)
            .optional()?)
    }

    /// Active sessions whose last activity is older than `before` (ms)
    pub fn stale_chat_sessions(&self, before: i64) -> Result<Vec<ChatSessionRow>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, title, private, status, last_activity_at,
                    created_at, updated_at
             FROM chat_session
             WHERE status = 'active' AND last_activity_at < ?1
             ORDER BY last_activity_at ASC",
        )?;

        let rows = stmt
            .query_map(params![before], Self::map_chat_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_chat_session(row: &rusqlite::Row) -> rusqlite::Result<ChatSessionRow> {
        let status: String = row.get(5)?;
        Ok(ChatSessionRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: Self::parse_kind(row.get(2)?)?,
            title: row.get(3)?,
            private: row.get(4)?,
            status: SessionStatus::from_str(&status).unwrap_or(SessionStatus::Closed),
            last_activity_at: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // User Prompt Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new custom prompt; the newest one wins
    pub fn set_user_prompt(&self, user_id: &str, kind: ChatKind, prompt_text: &str) -> Result<UserPrompt> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Self::now();
        conn.execute(
            "INSERT INTO user_prompt (id, user_id, kind, prompt_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, user_id, kind.as_str(), prompt_text, now],
        )?;

        Ok(UserPrompt {
            id,
            user_id: user_id.to_string(),
            kind,
            prompt_text: prompt_text.to_string(),
            created_at: now,
        })
    }

    /// Latest custom prompt of a user for a chat kind
    pub fn latest_user_prompt(&self, user_id: &str, kind: ChatKind) -> Result<Option<UserPrompt>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, prompt_text, created_at
             FROM user_prompt WHERE user_id = ?1 AND kind = ?2
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )?;

        Ok(stmt
            .query_row(params![user_id, kind.as_str()], |row| {
                Ok(UserPrompt {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    kind: Self::parse_kind(row.get(2)?)?,
                    prompt_text: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .optional()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Vector Search
    // ─────────────────────────────────────────────────────────────────────────

    /// Rank records by the store-computed combined score
    pub fn search(&self, query: &VectorQuery) -> Result<Vec<ScoredRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let (sql, params) = query.build();
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(param_refs.as_slice(), |row| query.map_row(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: &[f32]) -> Vec<f32> {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        values.iter().map(|v| v / norm).collect()
    }

    fn message(user_id: &str, session_id: &str, text: &str, embedding: Vec<f32>) -> NewMessage {
        NewMessage {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            kind: ChatKind::Counsellor,
            user_text: text.to_string(),
            response_text: format!("re: {}", text),
            embedding,
            importance_score: Some(5.0),
            private: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[test]
    fn test_insert_and_recent_messages() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..4 {
            let mut msg = message("7", "s1", &format!("turn {}", i), unit(&[1.0, 0.0]));
            msg.created_at += i;
            db.insert_message(&msg).unwrap();
        }
        db.insert_message(&message("7", "other", "elsewhere", unit(&[1.0, 0.0])))
            .unwrap();

        let recent = db.recent_messages("7", "s1", 0, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user_text, "turn 2");
        assert_eq!(recent[1].user_text, "turn 3");
        assert_eq!(recent[1].embedding, unit(&[1.0, 0.0]));
        assert_eq!(db.count_messages("7").unwrap(), 5);

        let since = recent[1].created_at;
        let newer = db.recent_messages("7", "s1", since, 10).unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].user_text, "turn 3");
    }

    #[test]
    fn test_reused_session_id_restarts_row() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_chat_session("s1", "7", ChatKind::Counsellor, false, None)
            .unwrap();
        let first = db.get_chat_session("s1").unwrap().unwrap();

        // Re-upserting a live row keeps its start time
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.upsert_chat_session("s1", "7", ChatKind::Counsellor, false, None)
            .unwrap();
        assert_eq!(db.get_chat_session("s1").unwrap().unwrap().created_at, first.created_at);

        db.close_chat_session("s1", SessionStatus::Expired).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.upsert_chat_session("s1", "7", ChatKind::Tarot, true, None)
            .unwrap();
        let reused = db.get_chat_session("s1").unwrap().unwrap();
        assert_eq!(reused.status, SessionStatus::Active);
        assert!(reused.created_at > first.created_at);
        assert_eq!(reused.kind, ChatKind::Tarot);
        assert!(reused.private);
    }

    #[test]
    fn test_reflection_upsert_overwrites_latest() {
        let db = Database::open_in_memory().unwrap();
        let first = db
            .upsert_reflection(&NewReflection {
                user_id: "7".into(),
                kind: ChatKind::Counsellor,
                reflection_text: "first".into(),
                embedding: unit(&[1.0, 0.0]),
                importance_score: Some(3.0),
            })
            .unwrap();
        let second = db
            .upsert_reflection(&NewReflection {
                user_id: "7".into(),
                kind: ChatKind::Counsellor,
                reflection_text: "second".into(),
                embedding: unit(&[0.0, 1.0]),
                importance_score: None,
            })
            .unwrap();

        assert_eq!(first.id, second.id);
        let all = db.recent_reflections("7", None, 10).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].reflection_text, "second");
        assert_eq!(all[0].importance_score, None);

        // Different kind gets its own row
        db.upsert_reflection(&NewReflection {
            user_id: "7".into(),
            kind: ChatKind::Tarot,
            reflection_text: "tarot".into(),
            embedding: unit(&[1.0, 0.0]),
            importance_score: None,
        })
        .unwrap();
        assert_eq!(db.recent_reflections("7", None, 10).unwrap().len(), 2);
        assert_eq!(
            db.recent_reflections("7", Some(ChatKind::Tarot), 10).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_activate_plan_keeps_single_active() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.active_plan("7").unwrap().is_none());

        for i in 0..3 {
            db.activate_plan(&NewPlan {
                user_id: "7".into(),
                kind: ChatKind::Counsellor,
                plan_text: format!("plan {}", i),
            })
            .unwrap();
        }
        db.activate_plan(&NewPlan {
            user_id: "8".into(),
            kind: ChatKind::Counsellor,
            plan_text: "someone else".into(),
        })
        .unwrap();

        let active = db.active_plan("7").unwrap().unwrap();
        assert_eq!(active.plan_text, "plan 2");
        let plans = db.list_plans("7", 10).unwrap();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans.iter().filter(|p| p.active).count(), 1);
    }

    #[test]
    fn test_single_active_index_rejects_direct_insert() {
        let db = Database::open_in_memory().unwrap();
        db.activate_plan(&NewPlan {
            user_id: "7".into(),
            kind: ChatKind::Counsellor,
            plan_text: "plan".into(),
        })
        .unwrap();

        let conn = db.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO plan (id, user_id, kind, plan_text, active, created_at, updated_at)
             VALUES ('x', '7', 'counsellor', 'rogue', 1, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_reference_samples() {
        let db = Database::open_in_memory().unwrap();
        assert!(db
            .insert_reference_sample("I'm in danger", 10, &unit(&[1.0, 0.0]))
            .unwrap());
        assert!(!db
            .insert_reference_sample("I'm in danger", 9, &unit(&[1.0, 0.0]))
            .unwrap());
        assert!(db
            .insert_reference_sample("Nice weather", 1, &unit(&[0.0, 1.0]))
            .unwrap());
        assert!(db.insert_reference_sample("bad", 11, &[1.0]).is_err());
        assert_eq!(db.count_reference_samples().unwrap(), 2);

        let nearest = db
            .nearest_reference_samples(&unit(&[0.9, 0.1]), 2)
            .unwrap();
        assert_eq!(nearest.len(), 2);
        assert_eq!(nearest[0].0.sample_text, "I'm in danger");
        assert_eq!(nearest[0].0.label, 10);
        assert!(nearest[0].1 > nearest[1].1);
    }

    #[test]
    fn test_chat_session_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_chat_session("s1", "7", ChatKind::Bagua, true, Some("Feng shui"))
            .unwrap();
        db.touch_chat_session("s1").unwrap();

        let row = db.get_chat_session("s1").unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Active);
        assert!(row.private);
        assert_eq!(row.kind, ChatKind::Bagua);

        db.close_chat_session("s1", SessionStatus::Expired).unwrap();
        let row = db.get_chat_session("s1").unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Expired);
        assert!(db.get_chat_session("missing").unwrap().is_none());
    }

    #[test]
    fn test_stale_chat_sessions() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_chat_session("old", "7", ChatKind::Tarot, false, None)
            .unwrap();
        db.upsert_chat_session("closed", "7", ChatKind::Tarot, false, None)
            .unwrap();
        db.close_chat_session("closed", SessionStatus::Closed).unwrap();

        let future = Database::now() + 1_000;
        let stale = db.stale_chat_sessions(future).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "old");
        assert!(db.stale_chat_sessions(0).unwrap().is_empty());
    }

    #[test]
    fn test_user_prompt_latest_wins() {
        let db = Database::open_in_memory().unwrap();
        assert!(db
            .latest_user_prompt("7", ChatKind::Counsellor)
            .unwrap()
            .is_none());
        db.set_user_prompt("7", ChatKind::Counsellor, "be brief").unwrap();
        db.set_user_prompt("7", ChatKind::Counsellor, "be gentle").unwrap();

        let prompt = db
            .latest_user_prompt("7", ChatKind::Counsellor)
            .unwrap()
            .unwrap();
        assert_eq!(prompt.prompt_text, "be gentle");
    }

    #[test]
    fn test_search_scopes_and_ranks() {
        let db = Database::open_in_memory().unwrap();
        let now = chrono::Utc::now().timestamp_millis();

        let mut near = message("7", "s1", "I feel so anxious", unit(&[0.95, 0.3122, 0.0]));
        near.importance_score = Some(8.0);
        near.created_at = now - 3_600_000;
        db.insert_message(&near).unwrap();

        for (i, axis) in [[0.0f32, 1.0, 0.0], [0.0, 0.0, 1.0]].iter().enumerate() {
            let mut far = message("7", "s0", &format!("unrelated {}", i), unit(axis));
            far.importance_score = Some(2.0);
            far.created_at = now - 30 * 86_400_000;
            db.insert_message(&far).unwrap();
        }

        let mut foreign = message("8", "s9", "I feel anxious too", unit(&[1.0, 0.0, 0.0]));
        foreign.importance_score = Some(10.0);
        db.insert_message(&foreign).unwrap();

        let query = VectorQuery::new(RecordKind::Message, "7", unit(&[1.0, 0.0, 0.0]))
            .now(now)
            .limit(3);
        let results = db.search(&query).unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.user_id == "7"));
        assert_eq!(results[0].text, "I feel so anxious");
        assert!((results[0].similarity - 0.95).abs() < 0.01);
        assert!(results[0].combined_score > results[1].combined_score);
        assert!(results[1].combined_score >= results[2].combined_score);

        let scoped = db.search(&query.clone().session("s0")).unwrap();
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|r| r.session_id.as_deref() == Some("s0")));
    }

    #[test]
    fn test_search_ties_broken_by_recency() {
        let db = Database::open_in_memory().unwrap();
        let now = chrono::Utc::now().timestamp_millis();
        let weights = ScoreWeights {
            similarity: 1.0,
            importance: 0.0,
            recency: 0.0,
            recency_days: 90.0,
        };

        let mut older = message("7", "s1", "older", unit(&[1.0, 0.0]));
        older.created_at = now - 10_000;
        db.insert_message(&older).unwrap();
        let mut newer = message("7", "s1", "newer", unit(&[1.0, 0.0]));
        newer.created_at = now - 1_000;
        db.insert_message(&newer).unwrap();

        let results = db
            .search(
                &VectorQuery::new(RecordKind::Message, "7", unit(&[1.0, 0.0]))
                    .weights(weights)
                    .now(now),
            )
            .unwrap();
        assert_eq!(results[0].text, "newer");
        assert_eq!(results[1].text, "older");
    }

    #[test]
    fn test_search_skips_rows_without_embedding() {
        let db = Database::open_in_memory().unwrap();
        let mut unembedded = message("7", "s1", "stored during an outage", Vec::new());
        unembedded.importance_score = Some(10.0);
        db.insert_message(&unembedded).unwrap();
        db.insert_message(&message("7", "s1", "embedded", unit(&[1.0, 0.0])))
            .unwrap();

        let results = db
            .search(&VectorQuery::new(RecordKind::Message, "7", unit(&[1.0, 0.0])).limit(5))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "embedded");
    }

    #[test]
    fn test_open_path_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("augury.db");
        {
            let db = Database::open_path(&path).unwrap();
            db.set_user_prompt("7", ChatKind::Tarot, "persist me").unwrap();
        }
        let db = Database::open_path(&path).unwrap();
        db.ping().unwrap();
        assert!(db.latest_user_prompt("7", ChatKind::Tarot).unwrap().is_some());
    }
}
