use super::{fmt_dt, parse_dt, Store};
use crate::error::{Result, WeaveError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

/// A shared-state value as read back from the store. Values that no longer
/// parse as JSON come back verbatim instead of failing the read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    Json(serde_json::Value),
    Raw(String),
}

impl StateValue {
    fn decode(key: &str, raw: String) -> Self {
        match serde_json::from_str(&raw) {
            Ok(v) => StateValue::Json(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "shared state value is not JSON, returning raw");
                StateValue::Raw(raw)
            }
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            StateValue::Json(v) => Some(v),
            StateValue::Raw(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(|v| v.as_f64())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedStateEntry {
    pub key: String,
    pub value: StateValue,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<SharedStateEntry> {
    let key: String = row.get(0)?;
    let raw: String = row.get(1)?;
    Ok(SharedStateEntry {
        value: StateValue::decode(&key, raw),
        key,
        updated_by: row.get(2)?,
        updated_at: parse_dt(&row.get::<_, String>(3)?),
    })
}

impl Store {
    /// Upsert `key`. Last write wins.
    pub fn set_state(
        &self,
        key: &str,
        value: &serde_json::Value,
        updated_by: Option<&str>,
    ) -> Result<SharedStateEntry> {
        if key.trim().is_empty() {
            return Err(WeaveError::Validation("state key is required".to_string()));
        }
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO shared_state (key, value, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = ?2,
                updated_by = ?3,
                updated_at = ?4",
            params![key, serde_json::to_string(value)?, updated_by, fmt_dt(now)],
        )?;
        Ok(SharedStateEntry {
            key: key.to_string(),
            value: StateValue::Json(value.clone()),
            updated_by: updated_by.map(str::to_string),
            updated_at: now,
        })
    }

    pub fn get_state(&self, key: &str) -> Result<Option<SharedStateEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT key, value, updated_by, updated_at FROM shared_state WHERE key = ?1",
                params![key],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Every entry, ordered by key.
    pub fn all_state(&self) -> Result<Vec<SharedStateEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, updated_by, updated_at FROM shared_state ORDER BY key")?;
        let rows = stmt.query_map([], row_to_entry)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
