use super::{decode_json, fmt_dt, parse_dt, Store};
use crate::error::{Result, WeaveError};
use crate::types::{AgentStatus, Harmony};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub session_info: serde_json::Value,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Harmonies named by the agent's capability tags.
    pub fn harmonies(&self) -> Vec<Harmony> {
        let mut out: Vec<Harmony> = self
            .capabilities
            .iter()
            .filter_map(|c| Harmony::from_capability(c))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

const AGENT_COLUMNS: &str = "id, capabilities, session_info, status, last_seen, created_at";

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let status: String = row.get(3)?;
    Ok(Agent {
        id: row.get(0)?,
        capabilities: decode_json(&row.get::<_, String>(1)?, "agents.capabilities"),
        session_info: decode_json(&row.get::<_, String>(2)?, "agents.session_info"),
        status: status.parse().unwrap_or(AgentStatus::Inactive),
        last_seen: parse_dt(&row.get::<_, String>(4)?),
        created_at: parse_dt(&row.get::<_, String>(5)?),
    })
}

/// Capability tags form a set; keep first-seen order.
fn dedup_capabilities(capabilities: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(capabilities.len());
    for c in capabilities {
        let c = c.trim();
        if !c.is_empty() && !out.iter().any(|x| x == c) {
            out.push(c.to_string());
        }
    }
    out
}

impl Store {
    /// Insert or refresh an agent. Re-registering replaces capabilities and
    /// session info, marks the agent active and bumps `last_seen`.
    pub fn register_agent(
        &self,
        id: &str,
        capabilities: &[String],
        session_info: &serde_json::Value,
    ) -> Result<Agent> {
        let id = id.trim();
        if id.is_empty() {
            return Err(WeaveError::Validation("agent id is required".to_string()));
        }
        let now = fmt_dt(Utc::now());
        let caps = serde_json::to_string(&dedup_capabilities(capabilities))?;
        let session = serde_json::to_string(session_info)?;

        self.conn.execute(
            "INSERT INTO agents (id, capabilities, session_info, status, last_seen, created_at)
             VALUES (?1, ?2, ?3, 'active', ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                capabilities = ?2,
                session_info = ?3,
                status = 'active',
                last_seen = ?4",
            params![id, caps, session, now],
        )?;

        self.get_agent(id)?
            .ok_or_else(|| WeaveError::Validation(format!("agent '{id}' vanished after upsert")))
    }

    pub fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1");
        let agent = self
            .conn
            .query_row(&sql, params![id], row_to_agent)
            .optional()?;
        Ok(agent)
    }

    /// All agents, ordered by id.
    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_agent)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Active agents, most recently seen first.
    pub fn active_agents(&self) -> Result<Vec<Agent>> {
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE status = 'active' ORDER BY last_seen DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_agent)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Refresh `last_seen` and reactivate. Returns false for unknown ids.
    pub fn heartbeat(&self, id: &str) -> Result<bool> {
        let now = fmt_dt(Utc::now());
        let changes = self.conn.execute(
            "UPDATE agents SET last_seen = ?2, status = 'active' WHERE id = ?1",
            params![id, now],
        )?;
        Ok(changes > 0)
    }

    /// Flip agents not seen since `cutoff` to inactive. Returns their ids.
    pub(crate) fn demote_inactive(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let cutoff = fmt_dt(cutoff);
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM agents WHERE status = 'active' AND last_seen < ?1")?;
        let ids: Vec<String> = stmt
            .query_map(params![&cutoff], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if !ids.is_empty() {
            self.conn.execute(
                "UPDATE agents SET status = 'inactive' WHERE status = 'active' AND last_seen < ?1",
                params![&cutoff],
            )?;
        }
        Ok(ids)
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

    fn caps(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn register_twice_keeps_one_row_with_latest_values() {
        let s = store();
        s.register_agent("A", &caps(&["review"]), &json!({"session": 1}))
            .unwrap();
        let second = s
            .register_agent("A", &caps(&["deploy", "resonance"]), &json!({"session": 2}))
            .unwrap();
        assert_eq!(second.capabilities, vec!["deploy", "resonance"]);
        assert_eq!(second.session_info["session"], 2);

        let all = s.list_agents().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].session_info["session"], 2);
    }

    #[test]
    fn register_requires_id() {
        let s = store();
        let err = s.register_agent("  ", &[], &json!({})).unwrap_err();
        assert!(matches!(err, WeaveError::Validation(_)));
    }

    #[test]
    fn capabilities_are_deduplicated() {
        let s = store();
        let a = s
            .register_agent("A", &caps(&["x", "x", " y ", ""]), &json!(null))
            .unwrap();
        assert_eq!(a.capabilities, vec!["x", "y"]);
    }

    #[test]
    fn harmonies_from_capabilities() {
        let s = store();
        let a = s
            .register_agent(
                "A",
                &caps(&["harmony:agency", "resonance", "code", "Agency"]),
                &json!({}),
            )
            .unwrap();
        assert_eq!(a.harmonies(), vec![Harmony::Resonance, Harmony::Agency]);
    }

    #[test]
    fn get_missing_agent_is_none() {
        assert!(store().get_agent("ghost").unwrap().is_none());
    }

    #[test]
    fn heartbeat_unknown_is_false() {
        let s = store();
        assert!(!s.heartbeat("ghost").unwrap());
        s.register_agent("A", &[], &json!({})).unwrap();
        assert!(s.heartbeat("A").unwrap());
    }

    #[test]
    fn demote_inactive_only_touches_stale_agents() {
        let s = store();
        s.register_agent("fresh", &[], &json!({})).unwrap();
        s.register_agent("stale", &[], &json!({})).unwrap();
        let old = fmt_dt(Utc::now() - chrono::Duration::minutes(10));
        s.conn()
            .execute(
                "UPDATE agents SET last_seen = ?1 WHERE id = 'stale'",
                params![old],
            )
            .unwrap();

        let demoted = s
            .demote_inactive(Utc::now() - chrono::Duration::minutes(5))
            .unwrap();
        assert_eq!(demoted, vec!["stale"]);

        let active: Vec<String> = s.active_agents().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(active, vec!["fresh"]);
        // Demotion never deletes.
        assert_eq!(s.list_agents().unwrap().len(), 2);
    }
}
