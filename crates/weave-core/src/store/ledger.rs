use super::work::write_work_row;
use super::{fmt_dt, parse_dt, Store, WorkItem};
use crate::error::Result;
use crate::types::TransitionType;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

/// One row of the append-only transition-impact ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionImpact {
    pub id: i64,
    pub work_id: String,
    pub transition: TransitionType,
    /// Set for milestone rows: 25, 50 or 75.
    pub milestone: Option<u8>,
    pub field_impact: f64,
    pub coherence_before: f64,
    pub coherence_after: f64,
    pub message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl TransitionImpact {
    pub fn coherence_delta(&self) -> f64 {
        self.coherence_after - self.coherence_before
    }
}

#[derive(Debug, Clone)]
pub struct NewTransitionImpact {
    pub work_id: String,
    pub transition: TransitionType,
    pub milestone: Option<u8>,
    pub field_impact: f64,
    pub coherence_before: f64,
    pub coherence_after: f64,
    pub message_id: Option<i64>,
    pub at: DateTime<Utc>,
}

const LEDGER_COLUMNS: &str = "id, work_id, transition_type, milestone, field_impact, \
     coherence_before, coherence_after, message_id, created_at";

fn row_to_impact(row: &Row<'_>) -> rusqlite::Result<TransitionImpact> {
    let raw: String = row.get(2)?;
    let transition = raw.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown transition type '{raw}'").into(),
        )
    })?;
    Ok(TransitionImpact {
        id: row.get(0)?,
        work_id: row.get(1)?,
        transition,
        milestone: row.get::<_, Option<i64>>(3)?.map(|m| m as u8),
        field_impact: row.get(4)?,
        coherence_before: row.get(5)?,
        coherence_after: row.get(6)?,
        message_id: row.get(7)?,
        created_at: parse_dt(&row.get::<_, String>(8)?),
    })
}

impl Store {
    /// Append a ledger row and write the work item's updated state in one
    /// transaction, so the ledger sum and `cumulativeFieldImpact` move
    /// together.
    pub fn record_transition(
        &mut self,
        item: &WorkItem,
        entry: &NewTransitionImpact,
    ) -> Result<TransitionImpact> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO work_transition_impacts
                (work_id, transition_type, milestone, field_impact, coherence_before, coherence_after, message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.work_id,
                entry.transition.as_str(),
                entry.milestone.map(i64::from),
                entry.field_impact,
                entry.coherence_before,
                entry.coherence_after,
                entry.message_id,
                fmt_dt(entry.at),
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_work_row(&tx, item)?;
        tx.commit()?;

        Ok(TransitionImpact {
            id,
            work_id: entry.work_id.clone(),
            transition: entry.transition,
            milestone: entry.milestone,
            field_impact: entry.field_impact,
            coherence_before: entry.coherence_before,
            coherence_after: entry.coherence_after,
            message_id: entry.message_id,
            created_at: entry.at,
        })
    }

    /// Ledger rows for one work item, newest first.
    pub fn transitions_for(&self, work_id: &str) -> Result<Vec<TransitionImpact>> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM work_transition_impacts WHERE work_id = ?1 ORDER BY id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![work_id], row_to_impact)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn ledger_sum(&self, work_id: &str) -> Result<f64> {
        let sum: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(field_impact), 0.0) FROM work_transition_impacts WHERE work_id = ?1",
            params![work_id],
            |row| row.get(0),
        )?;
        Ok(sum)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionConfig;
    use crate::store::WorkMetadata;
    use crate::types::WorkStatus;

    fn seeded() -> (Store, WorkItem) {
        let s = Store::open_memory(RetentionConfig::default()).unwrap();
        let now = Utc::now();
        let item = WorkItem {
            id: "W".to_string(),
            title: "Write docs".to_string(),
            description: String::new(),
            assigned_to: None,
            status: WorkStatus::Pending,
            progress: 0,
            metadata: WorkMetadata::default(),
            created_by: "A".to_string(),
            created_at: now,
            updated_at: now,
        };
        s.insert_work_item(&item).unwrap();
        (s, item)
    }

    fn entry(t: TransitionType, impact: f64, before: f64) -> NewTransitionImpact {
        NewTransitionImpact {
            work_id: "W".to_string(),
            transition: t,
            milestone: (t == TransitionType::Milestone).then_some(25),
            field_impact: impact,
            coherence_before: before,
            coherence_after: before + impact,
            message_id: Some(1),
            at: Utc::now(),
        }
    }

    #[test]
    fn record_writes_row_and_item_together() {
        let (mut s, mut item) = seeded();
        item.progress = 25;
        item.metadata.cumulative_field_impact = 0.05;
        item.refresh_status();
        let row = s
            .record_transition(&item, &entry(TransitionType::Started, 0.05, 75.0))
            .unwrap();
        assert_eq!(row.transition, TransitionType::Started);
        assert!((row.coherence_delta() - 0.05).abs() < 1e-9);

        let stored = s.get_work_item("W").unwrap().unwrap();
        assert_eq!(stored.progress, 25);
        assert_eq!(stored.status, WorkStatus::InProgress);
        assert!((s.ledger_sum("W").unwrap() - stored.metadata.cumulative_field_impact).abs() < 1e-12);
    }

    #[test]
    fn transitions_newest_first() {
        let (mut s, item) = seeded();
        s.record_transition(&item, &entry(TransitionType::Blocked, 0.02, 75.0))
            .unwrap();
        s.record_transition(&item, &entry(TransitionType::Unblocked, 0.06, 75.02))
            .unwrap();
        let rows = s.transitions_for("W").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].transition, TransitionType::Unblocked);
        assert_eq!(rows[1].transition, TransitionType::Blocked);
        assert!(s.transitions_for("other").unwrap().is_empty());
        assert_eq!(s.ledger_sum("other").unwrap(), 0.0);
    }

    #[test]
    fn milestone_value_persists() {
        let (mut s, item) = seeded();
        s.record_transition(&item, &entry(TransitionType::Milestone, 0.07, 75.0))
            .unwrap();
        let rows = s.transitions_for("W").unwrap();
        assert_eq!(rows[0].milestone, Some(25));
    }
}
