use crate::error::Result;
use crate::field::FieldState;
use crate::store::{fmt_dt, Agent, Message, Store, WorkCounts, WorkItem};
use crate::types::{Harmony, MessageType, TransitionType};
use crate::weave::Weave;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// Recent messages shown on the dashboard.
pub const DASHBOARD_RECENT_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// Transition analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionStats {
    pub transition: TransitionType,
    pub count: u64,
    pub average_impact: f64,
    pub total_impact: f64,
    pub max_coherence_delta: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionOverall {
    pub unique_work_items: u64,
    pub total_transitions: u64,
    pub total_impact: f64,
    pub average_coherence_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionAnalytics {
    pub work_id: Option<String>,
    pub by_transition: Vec<TransitionStats>,
    pub overall: TransitionOverall,
}

// ---------------------------------------------------------------------------
// Message analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageOverview {
    pub total: u64,
    pub blessed: u64,
    pub average_impact: f64,
    pub total_impact: f64,
    /// Share of messages acknowledged with a blessing, 0..=1.
    pub blessing_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    pub message_type: MessageType,
    pub count: u64,
    pub average_impact: f64,
    pub total_impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonyStats {
    pub harmony: Harmony,
    pub count: u64,
    pub average_impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAnalytics {
    pub since: DateTime<Utc>,
    pub overview: MessageOverview,
    pub by_type: Vec<TypeStats>,
    pub by_harmony: Vec<HarmonyStats>,
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub active_agents: Vec<Agent>,
    pub recent_activity: Vec<Message>,
    pub messages_in_lookback: u64,
    pub pending_work: Vec<WorkItem>,
    pub work_counts: WorkCounts,
    pub field: FieldState,
    pub generated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Store queries
// ---------------------------------------------------------------------------

impl Store {
    pub fn transition_analytics(&self, work_id: Option<&str>) -> Result<TransitionAnalytics> {
        let mut stmt = self.conn().prepare(
            "SELECT transition_type, COUNT(*), AVG(field_impact), SUM(field_impact),
                    MAX(coherence_after - coherence_before)
             FROM work_transition_impacts
             WHERE (?1 IS NULL OR work_id = ?1)
             GROUP BY transition_type
             ORDER BY COUNT(*) DESC, transition_type",
        )?;
        let rows = stmt.query_map(params![work_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;
        let mut by_transition = Vec::new();
        for row in rows {
            let (raw, count, avg, total, max_delta) = row?;
            match raw.parse::<TransitionType>() {
                Ok(transition) => by_transition.push(TransitionStats {
                    transition,
                    count: count as u64,
                    average_impact: avg,
                    total_impact: total,
                    max_coherence_delta: max_delta,
                }),
                Err(_) => tracing::warn!(transition = %raw, "unknown transition type in ledger"),
            }
        }

        let overall = self.conn().query_row(
            "SELECT COUNT(DISTINCT work_id), COUNT(*), COALESCE(SUM(field_impact), 0.0),
                    COALESCE(AVG(coherence_after - coherence_before), 0.0)
             FROM work_transition_impacts
             WHERE (?1 IS NULL OR work_id = ?1)",
            params![work_id],
            |row| {
                Ok(TransitionOverall {
                    unique_work_items: row.get::<_, i64>(0)? as u64,
                    total_transitions: row.get::<_, i64>(1)? as u64,
                    total_impact: row.get(2)?,
                    average_coherence_delta: row.get(3)?,
                })
            },
        )?;

        Ok(TransitionAnalytics {
            work_id: work_id.map(str::to_string),
            by_transition,
            overall,
        })
    }

    pub fn message_analytics(&self, since: DateTime<Utc>) -> Result<MessageAnalytics> {
        let since_s = fmt_dt(since);
        let overview = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(blessing_received), 0),
                    COALESCE(AVG(field_impact), 0.0), COALESCE(SUM(field_impact), 0.0)
             FROM messages WHERE created_at >= ?1",
            params![since_s],
            |row| {
                let total = row.get::<_, i64>(0)? as u64;
                let blessed = row.get::<_, i64>(1)? as u64;
                Ok(MessageOverview {
                    total,
                    blessed,
                    average_impact: row.get(2)?,
                    total_impact: row.get(3)?,
                    blessing_rate: if total == 0 {
                        0.0
                    } else {
                        blessed as f64 / total as f64
                    },
                })
            },
        )?;

        let mut stmt = self.conn().prepare(
            "SELECT message_type, COUNT(*), AVG(field_impact), SUM(field_impact)
             FROM messages WHERE created_at >= ?1
             GROUP BY message_type ORDER BY COUNT(*) DESC, message_type",
        )?;
        let rows = stmt.query_map(params![since_s], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        let mut by_type = Vec::new();
        for row in rows {
            let (raw, count, avg, total) = row?;
            if let Ok(message_type) = raw.parse::<MessageType>() {
                by_type.push(TypeStats {
                    message_type,
                    count: count as u64,
                    average_impact: avg,
                    total_impact: total,
                });
            }
        }

        let mut stmt = self.conn().prepare(
            "SELECT harmony, COUNT(*), AVG(field_impact)
             FROM messages WHERE created_at >= ?1 AND harmony IS NOT NULL
             GROUP BY harmony ORDER BY COUNT(*) DESC, harmony",
        )?;
        let rows = stmt.query_map(params![since_s], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;
        let mut by_harmony = Vec::new();
        for row in rows {
            let (raw, count, avg) = row?;
            if let Ok(harmony) = raw.parse::<Harmony>() {
                by_harmony.push(HarmonyStats {
                    harmony,
                    count: count as u64,
                    average_impact: avg,
                });
            }
        }

        Ok(MessageAnalytics {
            since,
            overview,
            by_type,
            by_harmony,
        })
    }
}

// ---------------------------------------------------------------------------
// Weave API
// ---------------------------------------------------------------------------

impl Weave {
    /// Ledger rollup, optionally restricted to one work item.
    pub fn work_transition_analytics(&self, work_id: Option<&str>) -> Result<TransitionAnalytics> {
        self.lock()?.transition_analytics(work_id)
    }

    /// Message rollup over the configured lookback window.
    pub fn message_analytics(&self) -> Result<MessageAnalytics> {
        let since = self.lookback_start();
        self.lock()?.message_analytics(since)
    }

    pub fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let since = self.lookback_start();
        let store = self.lock()?;
        let recent_activity = store.recent_messages(since, DASHBOARD_RECENT_LIMIT)?;
        let messages_in_lookback = store.message_analytics(since)?.overview.total;
        Ok(DashboardSummary {
            active_agents: store.active_agents()?,
            recent_activity,
            messages_in_lookback,
            pending_work: store.list_active_work()?,
            work_counts: store.work_counts()?,
            field: self.field.snapshot(),
            generated_at: Utc::now(),
        })
    }

    fn lookback_start(&self) -> DateTime<Utc> {
        let hours = i64::from(self.config.retention.analytics_lookback_hours);
        Utc::now() - chrono::Duration::hours(hours)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
