use super::{decode_json, fmt_dt, parse_dt, Store};
use crate::error::{Result, WeaveError};
use crate::impact::RecentSend;
use crate::progression::AgentStats;
use crate::types::{Harmony, MessageType, BROADCAST};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub from_agent: String,
    pub to_agent: String,
    pub content: String,
    pub message_type: MessageType,
    pub harmony: Option<Harmony>,
    pub metadata: serde_json::Value,
    pub read: bool,
    pub blessing_received: bool,
    pub field_impact: f64,
    pub created_at: DateTime<Utc>,
}

/// A message ready to persist, impact already computed.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub from: String,
    pub to: String,
    pub content: String,
    pub message_type: MessageType,
    pub harmony: Option<Harmony>,
    pub metadata: serde_json::Value,
    pub field_impact: f64,
}

const MESSAGE_COLUMNS: &str = "id, from_agent, to_agent, content, message_type, harmony, \
     metadata, read, blessing_received, field_impact, created_at";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let raw_type: String = row.get(4)?;
    let message_type = raw_type.parse().unwrap_or_else(|_| {
        tracing::warn!(id, message_type = %raw_type, "unknown stored message type");
        MessageType::General
    });
    let harmony = row
        .get::<_, Option<String>>(5)?
        .and_then(|h| h.parse::<Harmony>().ok());
    Ok(Message {
        id,
        from_agent: row.get(1)?,
        to_agent: row.get(2)?,
        content: row.get(3)?,
        message_type,
        harmony,
        metadata: decode_json(&row.get::<_, String>(6)?, "messages.metadata"),
        read: row.get(7)?,
        blessing_received: row.get(8)?,
        field_impact: row.get(9)?,
        created_at: parse_dt(&row.get::<_, String>(10)?),
    })
}

impl Store {
    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Persist a message, then apply retention.
    pub fn insert_message(&mut self, msg: &NewMessage, at: DateTime<Utc>) -> Result<Message> {
        if msg.from.trim().is_empty() {
            return Err(WeaveError::Validation("message sender is required".to_string()));
        }
        if msg.to.trim().is_empty() {
            return Err(WeaveError::Validation("message recipient is required".to_string()));
        }
        let metadata = if msg.metadata.is_null() {
            serde_json::json!({})
        } else {
            msg.metadata.clone()
        };
        let created_at = fmt_dt(at);

        self.conn.execute(
            "INSERT INTO messages (from_agent, to_agent, content, message_type, harmony, metadata, field_impact, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                msg.from,
                msg.to,
                msg.content,
                msg.message_type.as_str(),
                msg.harmony.map(|h| h.as_str()),
                serde_json::to_string(&metadata)?,
                msg.field_impact,
                created_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        self.enforce_retention()?;

        Ok(Message {
            id,
            from_agent: msg.from.clone(),
            to_agent: msg.to.clone(),
            content: msg.content.clone(),
            message_type: msg.message_type,
            harmony: msg.harmony,
            metadata,
            read: false,
            blessing_received: false,
            field_impact: msg.field_impact,
            created_at: parse_dt(&created_at),
        })
    }

    fn enforce_retention(&mut self) -> Result<()> {
        let count = self.message_count()?;
        let cap = self.retention.message_cap;
        let over_soft = count > self.retention.soft_limit as u64;
        if over_soft && !self.retention_engaged {
            tracing::info!(count, soft_limit = self.retention.soft_limit, "message retention engaged");
            self.set_meta(super::RETENTION_ENGAGED_KEY, "1")?;
            self.retention_engaged = true;
        }
        if over_soft || (self.retention_engaged && count > cap as u64) {
            let pruned = self.prune_messages(cap)?;
            tracing::debug!(pruned, cap, "pruned messages");
        }
        Ok(())
    }

    /// Delete all but the `keep` most recent messages. Returns rows removed.
    pub fn prune_messages(&self, keep: usize) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM messages WHERE id NOT IN
                (SELECT id FROM messages ORDER BY id DESC LIMIT ?1)",
            params![keep as i64],
        )?;
        Ok(removed)
    }

    pub fn mark_read(&self, id: i64) -> Result<bool> {
        let changes = self
            .conn
            .execute("UPDATE messages SET read = 1 WHERE id = ?1", params![id])?;
        Ok(changes > 0)
    }

    /// Record that the recipient received the message's blessing. Implies read.
    pub fn acknowledge_message(&self, id: i64) -> Result<bool> {
        let changes = self.conn.execute(
            "UPDATE messages SET blessing_received = 1, read = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(changes > 0)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get_message(&self, id: i64) -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
        let msg = self
            .conn
            .query_row(&sql, params![id], row_to_message)
            .optional()?;
        Ok(msg)
    }

    /// Inbox for `agent`: direct messages plus broadcasts, newest first.
    pub fn messages_for(&self, agent: &str, unread_only: bool, limit: usize) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (to_agent = ?1 OR to_agent = ?2) AND (?3 = 0 OR read = 0)
             ORDER BY id DESC LIMIT ?4"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![agent, BROADCAST, unread_only, limit as i64],
            row_to_message,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Messages created at or after `since`, newest first.
    pub fn recent_messages(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE created_at >= ?1 ORDER BY id DESC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![fmt_dt(since), limit as i64], row_to_message)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn message_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Messages sent from `from` to `to`, in that direction only.
    pub fn pair_count(&self, from: &str, to: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE from_agent = ?1 AND to_agent = ?2",
            params![from, to],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Sender's messages since `since`, oldest first.
    pub fn recent_sends(&self, sender: &str, since: DateTime<Utc>) -> Result<Vec<RecentSend>> {
        let mut stmt = self.conn.prepare(
            "SELECT message_type, created_at FROM messages
             WHERE from_agent = ?1 AND created_at >= ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![sender, fmt_dt(since)], |row| {
            let t: String = row.get(0)?;
            let at: String = row.get(1)?;
            Ok((t, at))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (t, at) = row?;
            if let Ok(message_type) = t.parse::<MessageType>() {
                out.push(RecentSend {
                    message_type,
                    sent_at: parse_dt(&at),
                });
            }
        }
        Ok(out)
    }

    /// Aggregates the progression assessor reads: categorized messages sent,
    /// distinct direct recipients, and whole days since the first of them.
    pub fn sender_stats(&self, sender: &str, now: DateTime<Utc>) -> Result<AgentStats> {
        let (sent, relationships, first): (i64, i64, Option<String>) = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT CASE WHEN to_agent != ?2 THEN to_agent END),
                    MIN(created_at)
             FROM messages WHERE from_agent = ?1 AND message_type != 'general'",
            params![sender, BROADCAST],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let days_active = first
            .map(|s| (now - parse_dt(&s)).num_days().max(0) as u64)
            .unwrap_or(0);
        Ok(AgentStats {
            messages_sent: sent as u64,
            unique_relationships: relationships as u64,
            days_active,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
