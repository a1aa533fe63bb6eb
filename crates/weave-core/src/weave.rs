use crate::config::WeaveConfig;
use crate::error::{Result, WeaveError};
use crate::events::{self, WeaveEvent};
use crate::field::{FieldState, FieldTracker, FieldUpdate, FIELD_STATE_KEY};
use crate::impact::{ImpactCalculator, ImpactInput, ImpactOutcome};
use crate::paths;
use crate::progression::{self, Level, LevelProgress};
use crate::store::{Agent, CleanupReport, Message, NewMessage, SharedStateEntry, Store};
use crate::types::{Harmony, MessageType, BROADCAST};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessage {
    pub from: String,
    pub to: String,
    pub content: String,
    pub message_type: MessageType,
    #[serde(default)]
    pub harmony: Option<Harmony>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SendMessage {
    pub fn new(from: &str, to: &str, content: &str, message_type: MessageType) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            content: content.to_string(),
            message_type,
            harmony: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_harmony(mut self, harmony: Harmony) -> Self {
        self.harmony = Some(harmony);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
    pub field_impact: f64,
    pub previous_coherence: f64,
    pub new_coherence: f64,
    pub explanation: ImpactOutcome,
}

// ---------------------------------------------------------------------------
// Weave
// ---------------------------------------------------------------------------

/// The coordinator. Owns the store, the field tracker and the event channel.
///
/// Every write goes through the store mutex; field updates happen while it
/// is held, so the lock order is always store then field.
pub struct Weave {
    pub(crate) store: Mutex<Store>,
    pub(crate) field: FieldTracker,
    pub(crate) config: WeaveConfig,
    pub(crate) events: broadcast::Sender<WeaveEvent>,
}

impl Weave {
    /// Open the weave rooted at `root`, reading `.weave/config.yaml`.
    pub fn open(root: &Path) -> Result<Self> {
        let config = WeaveConfig::load(root)?;
        Self::open_with(&paths::db_path(root), config)
    }

    pub fn open_with(db_path: &Path, config: WeaveConfig) -> Result<Self> {
        let store = Store::open(db_path, config.retention.clone())?;
        Self::from_store(store, config)
    }

    pub fn in_memory(config: WeaveConfig) -> Result<Self> {
        let store = Store::open_memory(config.retention.clone())?;
        Self::from_store(store, config)
    }

    fn from_store(store: Store, config: WeaveConfig) -> Result<Self> {
        let stored = store
            .get_state(FIELD_STATE_KEY)?
            .and_then(|entry| entry.value.as_f64());
        let initial = stored.unwrap_or(config.field.initial_coherence);
        debug!(coherence = initial, restored = stored.is_some(), "field initialised");
        Ok(Self {
            store: Mutex::new(store),
            field: FieldTracker::new(initial),
            config,
            events: events::channel(),
        })
    }

    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WeaveEvent> {
        self.events.subscribe()
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Store>> {
        self.store.lock().map_err(|_| WeaveError::LockPoisoned)
    }

    pub fn field_state(&self) -> FieldState {
        self.field.snapshot()
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    pub fn register_agent(
        &self,
        id: &str,
        capabilities: &[String],
        session_info: &serde_json::Value,
    ) -> Result<Agent> {
        let agent = self.lock()?.register_agent(id, capabilities, session_info)?;
        debug!(agent = %agent.id, "agent registered");
        Ok(agent)
    }

    pub fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        self.lock()?.get_agent(id)
    }

    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        self.lock()?.list_agents()
    }

    pub fn active_agents(&self) -> Result<Vec<Agent>> {
        self.lock()?.active_agents()
    }

    pub fn heartbeat(&self, id: &str) -> Result<bool> {
        self.lock()?.heartbeat(id)
    }

    /// Level and per-criterion progress toward the next one.
    pub fn agent_progress(&self, id: &str) -> Result<LevelProgress> {
        let stats = self.lock()?.sender_stats(id, Utc::now())?;
        Ok(progression::progress(id, &stats, &self.config.progression))
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn send_message(&self, req: &SendMessage) -> Result<SentMessage> {
        let mut store = self.lock()?;
        self.deliver(&mut store, req, Utc::now())
    }

    /// Score, persist and apply one message. Callers hold the store lock.
    pub(crate) fn deliver(
        &self,
        store: &mut Store,
        req: &SendMessage,
        now: DateTime<Utc>,
    ) -> Result<SentMessage> {
        let from = req.from.trim();
        let to = req.to.trim();
        if from.is_empty() {
            return Err(WeaveError::Validation("message sender is required".to_string()));
        }
        if to.is_empty() {
            return Err(WeaveError::Validation("message recipient is required".to_string()));
        }

        let stats = store.sender_stats(from, now)?;
        let level = progression::assess(&stats, &self.config.progression);
        let sender_harmonies = affinities(store.get_agent(from)?);
        let (recipient_harmonies, prior_pair_messages) = if to == BROADCAST {
            (Vec::new(), None)
        } else {
            (affinities(store.get_agent(to)?), Some(store.pair_count(from, to)?))
        };
        let recent_sends =
            store.recent_sends(from, now - self.config.impact.saturation_window())?;

        let outcome = ImpactCalculator::new(&self.config.impact).calculate(&ImpactInput {
            level,
            message_type: req.message_type,
            harmony: req.harmony,
            sender_harmonies: &sender_harmonies,
            recipient_harmonies: &recipient_harmonies,
            prior_pair_messages,
            recent_sends: &recent_sends,
            now,
            coherence: self.field.coherence(),
        });
        debug!(from, to, summary = %outcome.summary(), "impact computed");

        let message = store.insert_message(
            &NewMessage {
                from: from.to_string(),
                to: to.to_string(),
                content: req.content.clone(),
                message_type: req.message_type,
                harmony: req.harmony,
                metadata: req.metadata.clone(),
                field_impact: outcome.impact,
            },
            now,
        )?;

        let update = self.field.apply_delta(outcome.impact);
        self.after_field_update(store, &update, from);

        if let Err(e) = store.heartbeat(from) {
            warn!(agent = from, error = %e, "failed to refresh sender last_seen");
        }

        events::publish(
            &self.events,
            WeaveEvent::MessageSent {
                message_id: message.id,
                from: message.from_agent.clone(),
                to: message.to_agent.clone(),
                message_type: message.message_type,
                field_impact: outcome.impact,
            },
        );

        Ok(SentMessage {
            message_id: message.id,
            field_impact: outcome.impact,
            previous_coherence: update.old,
            new_coherence: update.new,
            explanation: outcome,
        })
    }

    /// Persist the new coherence and publish field events. Persistence is
    /// best-effort: the in-process value stays authoritative.
    fn after_field_update(&self, store: &Store, update: &FieldUpdate, actor: &str) {
        if update.new == update.old {
            return;
        }
        if let Err(e) = store.set_state(FIELD_STATE_KEY, &serde_json::json!(update.new), Some(actor)) {
            warn!(error = %e, "failed to persist field coherence");
        }
        events::publish(&self.events, WeaveEvent::FieldUpdated { update: *update });
        if let Some((from, to)) = update.quality_change() {
            info!(%from, %to, coherence = update.new, "field quality changed");
            events::publish(
                &self.events,
                WeaveEvent::QualityChanged {
                    from,
                    to,
                    coherence: update.new,
                },
            );
        }
    }

    pub fn get_messages(&self, agent: &str, unread_only: bool, limit: usize) -> Result<Vec<Message>> {
        self.lock()?.messages_for(agent, unread_only, limit)
    }

    pub fn mark_read(&self, message_id: i64) -> Result<bool> {
        self.lock()?.mark_read(message_id)
    }

    pub fn acknowledge_message(&self, message_id: i64) -> Result<bool> {
        self.lock()?.acknowledge_message(message_id)
    }

    // -----------------------------------------------------------------------
    // Shared state
    // -----------------------------------------------------------------------

    pub fn set_state(
        &self,
        key: &str,
        value: &serde_json::Value,
        updated_by: Option<&str>,
    ) -> Result<SharedStateEntry> {
        self.lock()?.set_state(key, value, updated_by)
    }

    pub fn get_state(&self, key: &str) -> Result<Option<SharedStateEntry>> {
        self.lock()?.get_state(key)
    }

    pub fn all_state(&self) -> Result<Vec<SharedStateEntry>> {
        self.lock()?.all_state()
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    pub fn cleanup(&self) -> Result<CleanupReport> {
        let report = self.lock()?.cleanup(Utc::now())?;
        info!(
            agents_demoted = report.agents_demoted.len(),
            messages_pruned = report.messages_pruned,
            "cleanup completed"
        );
        events::publish(
            &self.events,
            WeaveEvent::CleanupCompleted {
                report: report.clone(),
            },
        );
        Ok(report)
    }

    /// Current level of `agent`, as the next send would see it.
    pub fn level_of(&self, agent: &str) -> Result<Level> {
        let stats = self.lock()?.sender_stats(agent, Utc::now())?;
        Ok(progression::assess(&stats, &self.config.progression))
    }
}

fn affinities(agent: Option<Agent>) -> Vec<Harmony> {
    agent.map(|a| a.harmonies()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
