//! Coordination store: SQLite persistence for agents, messages, shared
//! state, work items and the transition-impact ledger.

mod agents;
mod ledger;
mod maintenance;
mod messages;
mod state;
mod work;

pub use agents::Agent;
pub use ledger::{NewTransitionImpact, TransitionImpact};
pub use maintenance::CleanupReport;
pub use messages::{Message, NewMessage};
pub use state::{SharedStateEntry, StateValue};
pub use work::{BlockNote, MessageRef, WorkCounts, WorkItem, WorkMetadata, MESSAGE_HISTORY_CAP};

use crate::config::RetentionConfig;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;

/// `store_meta` key recording that the soft retention trigger has fired.
const RETENTION_ENGAGED_KEY: &str = "retention_engaged";

// ---------------------------------------------------------------------------
// Timestamp helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 so that text comparison in SQL orders by time.
pub(crate) fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::warn!(value = s, "unparseable timestamp in store, using now");
            Utc::now()
        })
}

/// Decode a JSON column, degrading to the type's default on bad data.
pub(crate) fn decode_json<T: DeserializeOwned + Default>(raw: &str, column: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(column, error = %e, "malformed JSON column, using default");
        T::default()
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct Store {
    conn: Connection,
    retention: RetentionConfig,
    /// Set once the soft trigger has fired. Persisted in `store_meta`, so
    /// every later insert keeps the table at the hard cap across reopens.
    retention_engaged: bool,
}

impl Store {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path, retention: RetentionConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::init(conn, retention)
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub fn open_memory(retention: RetentionConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::init(conn, retention)
    }

    fn init(conn: Connection, retention: RetentionConfig) -> Result<Self> {
        let mut store = Self {
            conn,
            retention,
            retention_engaged: false,
        };
        store.create_tables()?;
        store.retention_engaged = store.meta(RETENTION_ENGAGED_KEY)?.as_deref() == Some("1");
        Ok(store)
    }

    pub(crate) fn meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub(crate) fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                capabilities TEXT NOT NULL DEFAULT '[]',
                session_info TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'active',
                last_seen TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_agent TEXT NOT NULL,
                to_agent TEXT NOT NULL,
                content TEXT NOT NULL,
                message_type TEXT NOT NULL DEFAULT 'general',
                harmony TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                read INTEGER NOT NULL DEFAULT 0,
                blessing_received INTEGER NOT NULL DEFAULT 0,
                field_impact REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_from
                ON messages(from_agent, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_to
                ON messages(to_agent, read);
            CREATE INDEX IF NOT EXISTS idx_messages_created
                ON messages(created_at);

            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS shared_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_by TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS work_items (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                assigned_to TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                progress INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS work_transition_impacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                work_id TEXT NOT NULL REFERENCES work_items(id) ON DELETE CASCADE,
                transition_type TEXT NOT NULL,
                milestone INTEGER,
                field_impact REAL NOT NULL,
                coherence_before REAL NOT NULL,
                coherence_after REAL NOT NULL,
                message_id INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transition_impacts_work
                ON work_transition_impacts(work_id);",
        )?;
        Ok(())
    }

    /// Expose the raw connection (for tests or advanced usage).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn retention(&self) -> &RetentionConfig {
        &self.retention
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
