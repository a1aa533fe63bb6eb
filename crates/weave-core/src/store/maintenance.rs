use super::Store;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub agents_demoted: Vec<String>,
    pub messages_pruned: usize,
}

impl Store {
    /// Demote agents idle past the inactivity window and prune messages
    /// to the hard cap. Safe to call repeatedly.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let cutoff = now - chrono::Duration::seconds(self.retention.inactivity_secs as i64);
        let agents_demoted = self.demote_inactive(cutoff)?;
        let messages_pruned = self.prune_messages(self.retention.message_cap)?;
        Ok(CleanupReport {
            agents_demoted,
            messages_pruned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionConfig;
    use crate::store::{fmt_dt, NewMessage};
    use crate::types::MessageType;
    use rusqlite::params;
    use serde_json::json;

    #[test]
    fn cleanup_demotes_and_prunes_then_is_idempotent() {
        let mut s = Store::open_memory(RetentionConfig {
            message_cap: 3,
            soft_limit: 100,
            ..RetentionConfig::default()
        })
        .unwrap();
        s.register_agent("idle", &[], &json!({})).unwrap();
        s.register_agent("busy", &[], &json!({})).unwrap();
        s.conn()
            .execute(
                "UPDATE agents SET last_seen = ?1 WHERE id = 'idle'",
                params![fmt_dt(Utc::now() - chrono::Duration::seconds(301))],
            )
            .unwrap();
        for _ in 0..6 {
            s.insert_message(
                &NewMessage {
                    from: "busy".to_string(),
                    to: "idle".to_string(),
                    content: "hi".to_string(),
                    message_type: MessageType::General,
                    harmony: None,
                    metadata: json!({}),
                    field_impact: 0.0,
                },
                Utc::now(),
            )
            .unwrap();
        }

        let report = s.cleanup(Utc::now()).unwrap();
        assert_eq!(report.agents_demoted, vec!["idle"]);
        assert_eq!(report.messages_pruned, 3);
        assert_eq!(s.message_count().unwrap(), 3);

        let again = s.cleanup(Utc::now()).unwrap();
        assert_eq!(again, CleanupReport::default());
    }
}
