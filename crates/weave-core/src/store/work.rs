use super::{decode_json, fmt_dt, parse_dt, Store};
use crate::error::{Result, WeaveError};
use crate::types::{Harmony, TransitionType, WorkStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Most recent synthesized messages remembered per work item.
pub const MESSAGE_HISTORY_CAP: usize = 10;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub message_id: i64,
    pub transition: TransitionType,
    pub field_impact: f64,
    pub at: DateTime<Utc>,
}

/// Who blocked or unblocked an item, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNote {
    pub reason: String,
    pub by: String,
    pub at: DateTime<Utc>,
}

/// Work-item metadata. Engine-owned fields are typed; anything else the
/// caller supplied is carried through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harmony: Option<Harmony>,
    #[serde(default)]
    pub message_history: Vec<MessageRef>,
    #[serde(default)]
    pub cumulative_field_impact: f64,
    /// Present while the item is blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<BlockNote>,
    /// Resolution of the most recent block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unblocked: Option<BlockNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<TransitionType>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WorkMetadata {
    /// Build from caller-supplied JSON. Engine-owned bookkeeping is reset.
    pub fn from_caller(value: &serde_json::Value) -> Result<Self> {
        let mut meta: WorkMetadata = match value {
            serde_json::Value::Null => WorkMetadata::default(),
            serde_json::Value::Object(_) => serde_json::from_value(value.clone())?,
            other => {
                return Err(WeaveError::Validation(format!(
                    "work metadata must be an object, got {other}"
                )))
            }
        };
        meta.message_history.clear();
        meta.cumulative_field_impact = 0.0;
        meta.blocked = None;
        meta.unblocked = None;
        meta.last_transition = None;
        Ok(meta)
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.is_some()
    }

    /// Append a reference, dropping the oldest beyond the cap.
    pub fn push_message(&mut self, entry: MessageRef) {
        self.message_history.push(entry);
        if self.message_history.len() > MESSAGE_HISTORY_CAP {
            let excess = self.message_history.len() - MESSAGE_HISTORY_CAP;
            self.message_history.drain(..excess);
        }
    }
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub assigned_to: Option<String>,
    pub status: WorkStatus,
    pub progress: u8,
    pub metadata: WorkMetadata,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Status implied by progress and the block flag.
    pub fn derive_status(progress: u8, blocked: bool) -> WorkStatus {
        if progress >= 100 {
            WorkStatus::Completed
        } else if blocked {
            WorkStatus::Blocked
        } else if progress > 0 {
            WorkStatus::InProgress
        } else {
            WorkStatus::Pending
        }
    }

    pub fn refresh_status(&mut self) {
        self.status = Self::derive_status(self.progress, self.metadata.is_blocked());
    }
}

/// Counts of work items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkCounts {
    pub pending: u64,
    pub in_progress: u64,
    pub blocked: u64,
    pub completed: u64,
}

const WORK_COLUMNS: &str = "id, title, description, assigned_to, status, progress, metadata, \
     created_by, created_at, updated_at";

fn row_to_work(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    let id: String = row.get(0)?;
    let raw_status: String = row.get(4)?;
    let progress: i64 = row.get(5)?;
    let metadata: WorkMetadata = decode_json(&row.get::<_, String>(6)?, "work_items.metadata");
    let status = raw_status.parse().unwrap_or_else(|_| {
        tracing::warn!(work_id = %id, status = %raw_status, "unknown stored work status");
        WorkItem::derive_status(progress.clamp(0, 100) as u8, metadata.is_blocked())
    });
    Ok(WorkItem {
        id,
        title: row.get(1)?,
        description: row.get(2)?,
        assigned_to: row.get(3)?,
        status,
        progress: progress.clamp(0, 100) as u8,
        metadata,
        created_by: row.get(7)?,
        created_at: parse_dt(&row.get::<_, String>(8)?),
        updated_at: parse_dt(&row.get::<_, String>(9)?),
    })
}

/// Write the mutable columns of `item`. Shared with the ledger transaction.
pub(crate) fn write_work_row(conn: &Connection, item: &WorkItem) -> Result<()> {
    conn.execute(
        "UPDATE work_items SET
            assigned_to = ?2,
            status = ?3,
            progress = ?4,
            metadata = ?5,
            updated_at = ?6
         WHERE id = ?1",
        params![
            item.id,
            item.assigned_to,
            item.status.as_str(),
            item.progress as i64,
            serde_json::to_string(&item.metadata)?,
            fmt_dt(item.updated_at),
        ],
    )?;
    Ok(())
}

impl Store {
    pub fn insert_work_item(&self, item: &WorkItem) -> Result<()> {
        if self.get_work_item(&item.id)?.is_some() {
            return Err(WeaveError::WorkItemExists(item.id.clone()));
        }
        self.conn.execute(
            "INSERT INTO work_items (id, title, description, assigned_to, status, progress, metadata, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                item.id,
                item.title,
                item.description,
                item.assigned_to,
                item.status.as_str(),
                item.progress as i64,
                serde_json::to_string(&item.metadata)?,
                item.created_by,
                fmt_dt(item.created_at),
                fmt_dt(item.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_work_item(&self, id: &str) -> Result<Option<WorkItem>> {
        let sql = format!("SELECT {WORK_COLUMNS} FROM work_items WHERE id = ?1");
        let item = self
            .conn
            .query_row(&sql, params![id], row_to_work)
            .optional()?;
        Ok(item)
    }

    /// Persist progress, status, assignment, metadata and `updated_at`.
    pub fn update_work_item(&self, item: &WorkItem) -> Result<()> {
        write_work_row(&self.conn, item)
    }

    /// Items not yet completed, oldest first.
    pub fn list_active_work(&self) -> Result<Vec<WorkItem>> {
        let sql = format!(
            "SELECT {WORK_COLUMNS} FROM work_items WHERE status != 'completed' ORDER BY created_at, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_work)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn list_work(&self) -> Result<Vec<WorkItem>> {
        let sql = format!("SELECT {WORK_COLUMNS} FROM work_items ORDER BY created_at, id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_work)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn work_counts(&self) -> Result<WorkCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM work_items GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut counts = WorkCounts::default();
        for row in rows {
            let (status, n) = row?;
            let n = n as u64;
            match status.parse::<WorkStatus>() {
                Ok(WorkStatus::Pending) => counts.pending += n,
                Ok(WorkStatus::InProgress) => counts.in_progress += n,
                Ok(WorkStatus::Blocked) => counts.blocked += n,
                Ok(WorkStatus::Completed) => counts.completed += n,
                Err(_) => tracing::warn!(status, "unknown work status in counts"),
            }
        }
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionConfig;
    use serde_json::json;

    fn store() -> Store {
        Store::open_memory(RetentionConfig::default()).unwrap()
    }

    fn item(id: &str) -> WorkItem {
        let now = Utc::now();
        WorkItem {
            id: id.to_string(),
            title: format!("Task {id}"),
            description: String::new(),
            assigned_to: None,
            status: WorkStatus::Pending,
            progress: 0,
            metadata: WorkMetadata::default(),
            created_by: "A".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn mref(id: i64) -> MessageRef {
        MessageRef {
            message_id: id,
            transition: TransitionType::Progressed,
            field_impact: 0.01,
            at: Utc::now(),
        }
    }

    #[test]
    fn status_derivation() {
        assert_eq!(WorkItem::derive_status(0, false), WorkStatus::Pending);
        assert_eq!(WorkItem::derive_status(10, false), WorkStatus::InProgress);
        assert_eq!(WorkItem::derive_status(10, true), WorkStatus::Blocked);
        assert_eq!(WorkItem::derive_status(0, true), WorkStatus::Blocked);
        assert_eq!(WorkItem::derive_status(100, true), WorkStatus::Completed);
    }

    #[test]
    fn message_history_is_capped() {
        let mut meta = WorkMetadata::default();
        for i in 0..15 {
            meta.push_message(mref(i));
        }
        assert_eq!(meta.message_history.len(), MESSAGE_HISTORY_CAP);
        assert_eq!(meta.message_history[0].message_id, 5);
        assert_eq!(meta.message_history[9].message_id, 14);
    }

    #[test]
    fn metadata_keeps_unknown_fields_and_camel_case() {
        let meta = WorkMetadata::from_caller(&json!({
            "harmony": "vitality",
            "priority": "high",
            "cumulativeFieldImpact": 9.0
        }))
        .unwrap();
        assert_eq!(meta.harmony, Some(Harmony::Vitality));
        assert_eq!(meta.extra["priority"], "high");
        // Engine-owned fields cannot be seeded by callers.
        assert_eq!(meta.cumulative_field_impact, 0.0);

        let encoded = serde_json::to_value(&meta).unwrap();
        assert!(encoded.get("cumulativeFieldImpact").is_some());
        assert!(encoded.get("messageHistory").is_some());
        assert_eq!(encoded["priority"], "high");
    }

    #[test]
    fn metadata_rejects_non_objects() {
        assert!(WorkMetadata::from_caller(&json!([1, 2])).is_err());
        assert!(WorkMetadata::from_caller(&json!(null)).is_ok());
    }

    #[test]
    fn insert_get_and_duplicate() {
        let s = store();
        s.insert_work_item(&item("W")).unwrap();
        let got = s.get_work_item("W").unwrap().unwrap();
        assert_eq!(got.title, "Task W");
        assert_eq!(got.status, WorkStatus::Pending);
        assert!(matches!(
            s.insert_work_item(&item("W")).unwrap_err(),
            WeaveError::WorkItemExists(_)
        ));
        assert!(s.get_work_item("missing").unwrap().is_none());
    }

    #[test]
    fn update_and_list_active() {
        let s = store();
        s.insert_work_item(&item("W1")).unwrap();
        s.insert_work_item(&item("W2")).unwrap();
        let mut done = s.get_work_item("W2").unwrap().unwrap();
        done.progress = 100;
        done.refresh_status();
        s.update_work_item(&done).unwrap();

        let active: Vec<String> = s.list_active_work().unwrap().into_iter().map(|w| w.id).collect();
        assert_eq!(active, vec!["W1"]);
        let counts = s.work_counts().unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(s.list_work().unwrap().len(), 2);
    }

    #[test]
    fn corrupt_metadata_reads_as_default() {
        let s = store();
        s.insert_work_item(&item("W")).unwrap();
        s.conn()
            .execute("UPDATE work_items SET metadata = 'oops' WHERE id = 'W'", [])
            .unwrap();
        let got = s.get_work_item("W").unwrap().unwrap();
        assert_eq!(got.metadata, WorkMetadata::default());
    }
}
