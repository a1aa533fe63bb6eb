//! Work-transition binder: every work lifecycle edge becomes exactly one
//! synthesized message and one ledger row.

use crate::error::{Result, WeaveError};
use crate::events::{self, WeaveEvent};
use crate::impact::ImpactOutcome;
use crate::paths;
use crate::store::{
    BlockNote, Message, MessageRef, NewTransitionImpact, Store, TransitionImpact, WorkItem,
    WorkMetadata,
};
use crate::types::{Harmony, MessageType, TransitionType, WorkStatus, BROADCAST, SYSTEM_AGENT};
use crate::weave::{SendMessage, Weave};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

pub const MILESTONES: [u8; 3] = [25, 50, 75];

// ---------------------------------------------------------------------------
// Edge detection
// ---------------------------------------------------------------------------

/// Transitions implied by moving from `old` to `new` progress, in firing
/// order. Decreases and unchanged values imply nothing.
pub fn detect_transitions(old: u8, new: u8) -> Vec<(TransitionType, Option<u8>)> {
    let mut out = Vec::new();
    if new <= old {
        return out;
    }
    let started = old == 0;
    if started {
        out.push((TransitionType::Started, None));
    } else if new < 100 {
        out.push((TransitionType::Progressed, None));
    }
    for m in MILESTONES {
        if old < m && m <= new {
            out.push((TransitionType::Milestone, Some(m)));
        }
    }
    if new >= 100 {
        out.push((TransitionType::Completed, None));
    }
    out
}

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWorkItem {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub created_by: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub transition: TransitionType,
    pub milestone: Option<u8>,
    pub message_id: i64,
    pub field_impact: f64,
    pub coherence_before: f64,
    pub coherence_after: f64,
    pub explanation: ImpactOutcome,
    /// False when the ledger write failed after the message went out.
    pub recorded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOutcome {
    pub item: WorkItem,
    pub transitions: Vec<TransitionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_message_id: Option<i64>,
}

impl WorkOutcome {
    fn unchanged(item: WorkItem) -> Self {
        Self {
            item,
            transitions: Vec::new(),
            note_message_id: None,
        }
    }
}

fn actor_or_system(actor: &str) -> &str {
    let actor = actor.trim();
    if actor.is_empty() {
        SYSTEM_AGENT
    } else {
        actor
    }
}

fn describe(item: &WorkItem, transition: TransitionType, milestone: Option<u8>, reason: Option<&str>) -> String {
    let title = &item.title;
    match transition {
        TransitionType::Created => format!("New work emerges: {title}"),
        TransitionType::Started => format!("Work begins on {title} ({}%)", item.progress),
        TransitionType::Progressed => format!("{title} progresses to {}%", item.progress),
        TransitionType::Milestone => format!(
            "{title} reached the {}% milestone",
            milestone.unwrap_or(item.progress)
        ),
        TransitionType::Blocked => format!("{title} is blocked: {}", reason.unwrap_or("")),
        TransitionType::Unblocked => format!("{title} is unblocked: {}", reason.unwrap_or("")),
        TransitionType::Completed => format!("{title} is complete"),
    }
}

// ---------------------------------------------------------------------------
// Weave work API
// ---------------------------------------------------------------------------

impl Weave {
    pub fn create_work_item(&self, new: NewWorkItem) -> Result<WorkOutcome> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(WeaveError::Validation("work item title is required".to_string()));
        }
        let created_by = new.created_by.trim();
        if created_by.is_empty() {
            return Err(WeaveError::Validation("work item creator is required".to_string()));
        }
        let id = match new.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => {
                paths::validate_work_id(id)?;
                id.to_string()
            }
            _ => paths::generate_work_id(),
        };
        let metadata = WorkMetadata::from_caller(&new.metadata)?;

        let now = Utc::now();
        let mut item = WorkItem {
            id,
            title: title.to_string(),
            description: new.description,
            assigned_to: new.assigned_to.filter(|a| !a.trim().is_empty()),
            status: WorkStatus::Pending,
            progress: 0,
            metadata,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut store = self.lock()?;
        store.insert_work_item(&item)?;
        info!(work_id = %item.id, title = %item.title, "work item created");

        let record = self.fire(
            &mut store,
            &mut item,
            TransitionType::Created,
            None,
            created_by,
            None,
            now,
        )?;
        Ok(WorkOutcome {
            item,
            transitions: vec![record],
            note_message_id: None,
        })
    }

    /// Set progress and fire every edge crossed since the stored value.
    /// `Ok(None)` means there is no such work item.
    pub fn update_work_progress(
        &self,
        id: &str,
        progress: i64,
        notes: Option<&str>,
        updated_by: Option<&str>,
    ) -> Result<Option<WorkOutcome>> {
        if !(0..=100).contains(&progress) {
            return Err(WeaveError::InvalidProgress(progress));
        }
        let progress = progress as u8;

        let mut store = self.lock()?;
        let Some(mut item) = store.get_work_item(id)? else {
            warn!(work_id = id, "progress update for unknown work item");
            return Ok(None);
        };
        if item.status.is_terminal() {
            return Err(WeaveError::InvalidTransition {
                from: item.status.to_string(),
                to: format!("{progress}%"),
                reason: "completed work accepts no further updates".to_string(),
            });
        }

        let now = Utc::now();
        let actor = updated_by.map(str::trim).unwrap_or("");

        let note_message_id = match notes.map(str::trim) {
            Some(notes) if !notes.is_empty() && !actor.is_empty() => {
                let req = SendMessage::new(actor, BROADCAST, notes, MessageType::General)
                    .with_metadata(json!({ "workId": item.id, "progress": progress }));
                match self.deliver(&mut store, &req, now) {
                    Ok(sent) => Some(sent.message_id),
                    Err(e) => {
                        warn!(work_id = %item.id, error = %e, "failed to send progress note");
                        None
                    }
                }
            }
            _ => None,
        };

        let old = item.progress;
        item.progress = progress;
        item.updated_at = now;
        if progress >= 100 {
            item.metadata.blocked = None;
        }
        item.refresh_status();
        store.update_work_item(&item)?;

        let mut transitions = Vec::new();
        for (transition, milestone) in detect_transitions(old, progress) {
            transitions.push(self.fire(&mut store, &mut item, transition, milestone, actor, None, now)?);
        }

        Ok(Some(WorkOutcome {
            item,
            transitions,
            note_message_id,
        }))
    }

    /// Block a work item. Blocking an already blocked item is a no-op.
    pub fn block_work(&self, id: &str, reason: &str, actor: &str) -> Result<Option<WorkOutcome>> {
        let mut store = self.lock()?;
        let Some(mut item) = store.get_work_item(id)? else {
            warn!(work_id = id, "block for unknown work item");
            return Ok(None);
        };
        if item.status.is_terminal() {
            return Err(WeaveError::InvalidTransition {
                from: item.status.to_string(),
                to: WorkStatus::Blocked.to_string(),
                reason: "completed work cannot be blocked".to_string(),
            });
        }
        if item.metadata.is_blocked() {
            return Ok(Some(WorkOutcome::unchanged(item)));
        }

        let now = Utc::now();
        let actor = actor_or_system(actor);
        item.metadata.blocked = Some(BlockNote {
            reason: reason.to_string(),
            by: actor.to_string(),
            at: now,
        });
        item.updated_at = now;
        item.refresh_status();
        store.update_work_item(&item)?;

        let record = self.fire(
            &mut store,
            &mut item,
            TransitionType::Blocked,
            None,
            actor,
            Some(reason),
            now,
        )?;
        Ok(Some(WorkOutcome {
            item,
            transitions: vec![record],
            note_message_id: None,
        }))
    }

    /// Clear a block. Unblocking an item that is not blocked is a no-op.
    pub fn unblock_work(&self, id: &str, reason: &str, actor: &str) -> Result<Option<WorkOutcome>> {
        let mut store = self.lock()?;
        let Some(mut item) = store.get_work_item(id)? else {
            warn!(work_id = id, "unblock for unknown work item");
            return Ok(None);
        };
        if item.status.is_terminal() {
            return Err(WeaveError::InvalidTransition {
                from: item.status.to_string(),
                to: WorkStatus::InProgress.to_string(),
                reason: "completed work cannot be unblocked".to_string(),
            });
        }
        if !item.metadata.is_blocked() {
            return Ok(Some(WorkOutcome::unchanged(item)));
        }

        let now = Utc::now();
        let actor = actor_or_system(actor);
        item.metadata.blocked = None;
        item.metadata.unblocked = Some(BlockNote {
            reason: reason.to_string(),
            by: actor.to_string(),
            at: now,
        });
        item.updated_at = now;
        item.refresh_status();
        store.update_work_item(&item)?;

        let record = self.fire(
            &mut store,
            &mut item,
            TransitionType::Unblocked,
            None,
            actor,
            Some(reason),
            now,
        )?;
        Ok(Some(WorkOutcome {
            item,
            transitions: vec![record],
            note_message_id: None,
        }))
    }

    /// Change the assignee. Fires no transition.
    pub fn assign_work(&self, id: &str, agent: Option<&str>) -> Result<Option<WorkItem>> {
        let store = self.lock()?;
        let Some(mut item) = store.get_work_item(id)? else {
            warn!(work_id = id, "assignment for unknown work item");
            return Ok(None);
        };
        item.assigned_to = agent.map(str::trim).filter(|a| !a.is_empty()).map(str::to_string);
        item.updated_at = Utc::now();
        store.update_work_item(&item)?;
        Ok(Some(item))
    }

    pub fn get_work_item(&self, id: &str) -> Result<Option<WorkItem>> {
        self.lock()?.get_work_item(id)
    }

    pub fn list_active_work(&self) -> Result<Vec<WorkItem>> {
        self.lock()?.list_active_work()
    }

    pub fn list_work(&self) -> Result<Vec<WorkItem>> {
        self.lock()?.list_work()
    }

    /// Ledger rows for one item, newest first.
    pub fn work_transitions(&self, id: &str) -> Result<Vec<TransitionImpact>> {
        self.lock()?.transitions_for(id)
    }

    /// Messages referenced by the item's history that survive retention,
    /// oldest first.
    pub fn work_message_history(&self, id: &str) -> Result<Option<Vec<Message>>> {
        let store = self.lock()?;
        let Some(item) = store.get_work_item(id)? else {
            return Ok(None);
        };
        let mut out = Vec::with_capacity(item.metadata.message_history.len());
        for entry in &item.metadata.message_history {
            if let Some(m) = store.get_message(entry.message_id)? {
                out.push(m);
            }
        }
        Ok(Some(out))
    }

    // -----------------------------------------------------------------------
    // Firing
    // -----------------------------------------------------------------------

    /// Synthesize and deliver the message for one transition, then append
    /// the ledger row and the item's bookkeeping in one transaction.
    #[allow(clippy::too_many_arguments)]
    fn fire(
        &self,
        store: &mut Store,
        item: &mut WorkItem,
        transition: TransitionType,
        milestone: Option<u8>,
        actor: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TransitionRecord> {
        let to = match transition {
            TransitionType::Created => BROADCAST,
            _ => item.assigned_to.as_deref().unwrap_or(BROADCAST),
        };
        let harmony = item.metadata.harmony.unwrap_or(Harmony::Coherence);
        let mut metadata = json!({
            "workId": item.id,
            "transition": transition.as_str(),
            "progress": item.progress,
        });
        if let Some(m) = milestone {
            metadata["milestone"] = json!(m);
        }
        if let Some(r) = reason {
            metadata["reason"] = json!(r);
        }
        let req = SendMessage::new(
            actor_or_system(actor),
            to,
            &describe(item, transition, milestone, reason),
            transition.message_type(),
        )
        .with_harmony(harmony)
        .with_metadata(metadata);

        let sent = self.deliver(store, &req, now)?;

        let before = item.metadata.clone();
        item.metadata.push_message(MessageRef {
            message_id: sent.message_id,
            transition,
            field_impact: sent.field_impact,
            at: now,
        });
        item.metadata.cumulative_field_impact += sent.field_impact;
        item.metadata.last_transition = Some(transition);
        item.updated_at = now;

        let entry = NewTransitionImpact {
            work_id: item.id.clone(),
            transition,
            milestone,
            field_impact: sent.field_impact,
            coherence_before: sent.previous_coherence,
            coherence_after: sent.new_coherence,
            message_id: Some(sent.message_id),
            at: now,
        };
        let recorded = match store.record_transition(item, &entry) {
            Ok(_) => true,
            Err(e) => {
                warn!(work_id = %item.id, %transition, error = %e, "failed to record transition");
                item.metadata = before;
                false
            }
        };

        info!(
            work_id = %item.id,
            %transition,
            milestone = ?milestone,
            impact = sent.field_impact,
            coherence = sent.new_coherence,
            "work transition"
        );
        events::publish(
            &self.events,
            WeaveEvent::WorkTransition {
                work_id: item.id.clone(),
                transition,
                milestone,
                field_impact: sent.field_impact,
            },
        );

        Ok(TransitionRecord {
            transition,
            milestone,
            message_id: sent.message_id,
            field_impact: sent.field_impact,
            coherence_before: sent.previous_coherence,
            coherence_after: sent.new_coherence,
            explanation: sent.explanation,
            recorded,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeaveConfig;
    use crate::store::MESSAGE_HISTORY_CAP;

    const EPS: f64 = 1e-9;

    fn weave() -> Weave {
        Weave::in_memory(WeaveConfig::new()).unwrap()
    }

    fn create(w: &Weave, id: &str) -> WorkOutcome {
        w.create_work_item(NewWorkItem {
            id: Some(id.to_string()),
            title: format!("Task {id}"),
            created_by: "A".to_string(),
            ..NewWorkItem::default()
        })
        .unwrap()
    }

    fn kinds(records: &[TransitionRecord]) -> Vec<(TransitionType, Option<u8>)> {
        records.iter().map(|r| (r.transition, r.milestone)).collect()
    }

    fn assert_ledger_consistent(w: &Weave, id: &str) {
        let item = w.get_work_item(id).unwrap().unwrap();
        let sum: f64 = w
            .work_transitions(id)
            .unwrap()
            .iter()
            .map(|r| r.field_impact)
            .sum();
        assert!(
            (item.metadata.cumulative_field_impact - sum).abs() < EPS,
            "cumulative {} != ledger {}",
            item.metadata.cumulative_field_impact,
            sum
        );
    }

    #[test]
    fn detect_edges() {
        use TransitionType::*;
        assert_eq!(detect_transitions(0, 10), vec![(Started, None)]);
        assert_eq!(
            detect_transitions(10, 30),
            vec![(Progressed, None), (Milestone, Some(25))]
        );
        assert_eq!(
            detect_transitions(0, 25),
            vec![(Started, None), (Milestone, Some(25))]
        );
        assert_eq!(
            detect_transitions(60, 100),
            vec![(Milestone, Some(75)), (Completed, None)]
        );
        assert_eq!(
            detect_transitions(0, 100),
            vec![
                (Started, None),
                (Milestone, Some(25)),
                (Milestone, Some(50)),
                (Milestone, Some(75)),
                (Completed, None)
            ]
        );
        assert!(detect_transitions(50, 50).is_empty());
        assert!(detect_transitions(50, 20).is_empty());
    }

    #[test]
    fn create_fires_emergence_to_broadcast() {
        let w = weave();
        let out = create(&w, "W");
        assert_eq!(kinds(&out.transitions), vec![(TransitionType::Created, None)]);
        let msg = w
            .lock()
            .unwrap()
            .get_message(out.transitions[0].message_id)
            .unwrap()
            .unwrap();
        assert_eq!(msg.message_type, MessageType::Emergence);
        assert_eq!(msg.to_agent, BROADCAST);
        assert_eq!(msg.from_agent, "A");
        assert_eq!(msg.harmony, Some(Harmony::Coherence));
        assert_eq!(msg.metadata["workId"], "W");
        assert_ledger_consistent(&w, "W");
    }

    #[test]
    fn create_validates_input() {
        let w = weave();
        let err = w
            .create_work_item(NewWorkItem {
                title: " ".into(),
                created_by: "A".into(),
                ..NewWorkItem::default()
            })
            .unwrap_err();
        assert!(matches!(err, WeaveError::Validation(_)));

        let err = w
            .create_work_item(NewWorkItem {
                id: Some("bad id".into()),
                title: "t".into(),
                created_by: "A".into(),
                ..NewWorkItem::default()
            })
            .unwrap_err();
        assert!(matches!(err, WeaveError::InvalidWorkId(_)));

        create(&w, "W");
        let err = w
            .create_work_item(NewWorkItem {
                id: Some("W".into()),
                title: "again".into(),
                created_by: "A".into(),
                ..NewWorkItem::default()
            })
            .unwrap_err();
        assert!(matches!(err, WeaveError::WorkItemExists(_)));
        // The rejected create wrote nothing to the ledger.
        assert_eq!(w.work_transitions("W").unwrap().len(), 1);
    }

    #[test]
    fn generated_id_when_absent() {
        let w = weave();
        let out = w
            .create_work_item(NewWorkItem {
                title: "anon".into(),
                created_by: "A".into(),
                ..NewWorkItem::default()
            })
            .unwrap();
        assert!(out.item.id.starts_with("work_"));
    }

    #[test]
    fn progress_to_25_fires_started_and_milestone() {
        let w = weave();
        create(&w, "W");
        let out = w.update_work_progress("W", 25, None, Some("A")).unwrap().unwrap();
        assert_eq!(
            kinds(&out.transitions),
            vec![
                (TransitionType::Started, None),
                (TransitionType::Milestone, Some(25))
            ]
        );
        assert_eq!(out.item.status, WorkStatus::InProgress);

        let rows = w.work_transitions("W").unwrap();
        // created + started + milestone, newest first.
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].transition, TransitionType::Milestone);
        assert_eq!(rows[1].transition, TransitionType::Started);

        let item = w.get_work_item("W").unwrap().unwrap();
        let expected = out.transitions.iter().map(|t| t.field_impact).sum::<f64>()
            + rows[2].field_impact;
        assert!((item.metadata.cumulative_field_impact - expected).abs() < EPS);
        assert_ledger_consistent(&w, "W");
    }

    #[test]
    fn edge_exact_milestones() {
        let w = weave();
        create(&w, "W");
        let mut all = Vec::new();
        for p in [10, 30, 60] {
            let out = w.update_work_progress("W", p, None, Some("A")).unwrap().unwrap();
            all.extend(kinds(&out.transitions));
        }
        let started = all.iter().filter(|t| t.0 == TransitionType::Started).count();
        let m25 = all.iter().filter(|t| **t == (TransitionType::Milestone, Some(25))).count();
        let m50 = all.iter().filter(|t| **t == (TransitionType::Milestone, Some(50))).count();
        let m75 = all.iter().filter(|t| **t == (TransitionType::Milestone, Some(75))).count();
        assert_eq!((started, m25, m50, m75), (1, 1, 1, 0));

        // Repeating the stored value fires nothing.
        let again = w.update_work_progress("W", 60, None, Some("A")).unwrap().unwrap();
        assert!(again.transitions.is_empty());
        assert_ledger_consistent(&w, "W");
    }

    #[test]
    fn unchanged_update_still_stamps_timestamp() {
        let w = weave();
        create(&w, "W");
        w.update_work_progress("W", 40, None, None).unwrap();
        let before = w.get_work_item("W").unwrap().unwrap().updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        w.update_work_progress("W", 40, None, None).unwrap();
        let after = w.get_work_item("W").unwrap().unwrap().updated_at;
        assert!(after > before);
    }

    #[test]
    fn completion_is_terminal() {
        let w = weave();
        create(&w, "W");
        let out = w.update_work_progress("W", 100, None, Some("A")).unwrap().unwrap();
        assert_eq!(out.item.status, WorkStatus::Completed);
        assert_eq!(out.transitions.last().unwrap().transition, TransitionType::Completed);

        assert!(matches!(
            w.update_work_progress("W", 100, None, Some("A")).unwrap_err(),
            WeaveError::InvalidTransition { .. }
        ));
        assert!(matches!(
            w.block_work("W", "late", "A").unwrap_err(),
            WeaveError::InvalidTransition { .. }
        ));
        assert!(w.list_active_work().unwrap().is_empty());
        assert_ledger_consistent(&w, "W");
    }

    #[test]
    fn completing_blocked_work_clears_block_and_refuses_unblock() {
        let w = weave();
        create(&w, "W");
        w.update_work_progress("W", 40, None, Some("A")).unwrap();
        w.block_work("W", "waiting", "A").unwrap();

        let out = w.update_work_progress("W", 100, None, Some("A")).unwrap().unwrap();
        assert_eq!(out.item.status, WorkStatus::Completed);
        assert!(out.item.metadata.blocked.is_none());
        assert!(!w.get_work_item("W").unwrap().unwrap().metadata.is_blocked());

        let before = w.field_state().coherence;
        assert!(matches!(
            w.unblock_work("W", "resolved", "A").unwrap_err(),
            WeaveError::InvalidTransition { .. }
        ));
        assert_eq!(w.field_state().coherence, before);
        assert!(w
            .work_transitions("W")
            .unwrap()
            .iter()
            .all(|r| r.transition != TransitionType::Unblocked));
        assert_ledger_consistent(&w, "W");
    }

    #[test]
    fn failed_note_does_not_abort_progress_update() {
        let w = weave();
        create(&w, "W");
        w.update_work_progress("W", 10, None, Some("A")).unwrap();
        let first = w.get_work_item("W").unwrap().unwrap().updated_at;
        w.lock()
            .unwrap()
            .conn()
            .execute_batch("DROP TABLE messages")
            .unwrap();

        let out = w
            .update_work_progress("W", 10, Some("still going"), Some("A"))
            .unwrap()
            .unwrap();
        assert!(out.note_message_id.is_none());
        assert!(out.transitions.is_empty());
        let stored = w.get_work_item("W").unwrap().unwrap();
        assert!(stored.updated_at > first);
    }

    #[test]
    fn out_of_range_progress_is_rejected() {
        let w = weave();
        create(&w, "W");
        assert!(matches!(
            w.update_work_progress("W", 101, None, None).unwrap_err(),
            WeaveError::InvalidProgress(101)
        ));
        assert!(matches!(
            w.update_work_progress("W", -1, None, None).unwrap_err(),
            WeaveError::InvalidProgress(-1)
        ));
    }

    #[test]
    fn unknown_item_is_none() {
        let w = weave();
        assert!(w.update_work_progress("nope", 10, None, None).unwrap().is_none());
        assert!(w.block_work("nope", "r", "A").unwrap().is_none());
        assert!(w.unblock_work("nope", "r", "A").unwrap().is_none());
        assert!(w.work_message_history("nope").unwrap().is_none());
    }

    #[test]
    fn block_then_unblock_records_both_in_order() {
        let w = weave();
        create(&w, "W");
        w.update_work_progress("W", 10, None, Some("A")).unwrap();

        let blocked = w.block_work("W", "waiting", "B").unwrap().unwrap();
        assert_eq!(blocked.item.status, WorkStatus::Blocked);
        let note = blocked.item.metadata.blocked.as_ref().unwrap();
        assert_eq!((note.reason.as_str(), note.by.as_str()), ("waiting", "B"));

        // Second block is a no-op.
        assert!(w.block_work("W", "still", "B").unwrap().unwrap().transitions.is_empty());

        let unblocked = w.unblock_work("W", "resolved", "B").unwrap().unwrap();
        assert_eq!(unblocked.item.status, WorkStatus::InProgress);
        assert_eq!(
            unblocked.item.metadata.unblocked.as_ref().unwrap().reason,
            "resolved"
        );
        assert!(w.unblock_work("W", "again", "B").unwrap().unwrap().transitions.is_empty());

        let rows = w.work_transitions("W").unwrap();
        let tail: Vec<TransitionType> = rows.iter().take(2).map(|r| r.transition).collect();
        assert_eq!(tail, vec![TransitionType::Unblocked, TransitionType::Blocked]);
        assert_eq!(
            rows.iter().filter(|r| r.transition == TransitionType::Blocked).count(),
            1
        );
        for r in rows.iter().take(2) {
            assert!(r.coherence_after >= r.coherence_before);
        }
        assert_ledger_consistent(&w, "W");
    }

    #[test]
    fn progress_while_blocked_keeps_blocked_status() {
        let w = weave();
        create(&w, "W");
        w.block_work("W", "waiting", "A").unwrap();
        let out = w.update_work_progress("W", 20, None, Some("A")).unwrap().unwrap();
        assert_eq!(out.item.status, WorkStatus::Blocked);
        assert_eq!(kinds(&out.transitions), vec![(TransitionType::Started, None)]);
    }

    #[test]
    fn messages_go_to_assignee_with_work_harmony() {
        let w = weave();
        w.create_work_item(NewWorkItem {
            id: Some("W".into()),
            title: "Ship".into(),
            assigned_to: Some("B".into()),
            created_by: "A".into(),
            metadata: json!({"harmony": "vitality"}),
            ..NewWorkItem::default()
        })
        .unwrap();
        let out = w.update_work_progress("W", 5, None, Some("")).unwrap().unwrap();
        let msg = w
            .lock()
            .unwrap()
            .get_message(out.transitions[0].message_id)
            .unwrap()
            .unwrap();
        assert_eq!(msg.to_agent, "B");
        assert_eq!(msg.from_agent, SYSTEM_AGENT);
        assert_eq!(msg.harmony, Some(Harmony::Vitality));
        assert_eq!(msg.message_type, MessageType::Invocation);
    }

    #[test]
    fn notes_send_a_general_message_first() {
        let w = weave();
        create(&w, "W");
        let out = w
            .update_work_progress("W", 30, Some("wired the parser"), Some("A"))
            .unwrap()
            .unwrap();
        let note_id = out.note_message_id.unwrap();
        assert!(note_id < out.transitions[0].message_id);
        let note = w.lock().unwrap().get_message(note_id).unwrap().unwrap();
        assert_eq!(note.message_type, MessageType::General);
        assert_eq!(note.to_agent, BROADCAST);

        // Notes without an updater are not sent.
        let out = w.update_work_progress("W", 40, Some("quiet"), None).unwrap().unwrap();
        assert!(out.note_message_id.is_none());
    }

    #[test]
    fn message_history_capped_and_resolvable() {
        let w = weave();
        create(&w, "W");
        for p in 1..=14 {
            w.update_work_progress("W", p, None, Some("A")).unwrap();
        }
        let item = w.get_work_item("W").unwrap().unwrap();
        assert_eq!(item.metadata.message_history.len(), MESSAGE_HISTORY_CAP);
        let history = w.work_message_history("W").unwrap().unwrap();
        assert_eq!(history.len(), MESSAGE_HISTORY_CAP);
        assert_eq!(
            history.last().unwrap().id,
            item.metadata.message_history.last().unwrap().message_id
        );
        // 15 transitions in the ledger even though history holds 10.
        assert_eq!(w.work_transitions("W").unwrap().len(), 15);
        assert_ledger_consistent(&w, "W");
    }

    #[test]
    fn assign_changes_recipient_without_transition() {
        let w = weave();
        create(&w, "W");
        let item = w.assign_work("W", Some("C")).unwrap().unwrap();
        assert_eq!(item.assigned_to.as_deref(), Some("C"));
        assert_eq!(w.work_transitions("W").unwrap().len(), 1);
        assert!(w.assign_work("nope", Some("C")).unwrap().is_none());
    }

    #[test]
    fn transitions_emit_events() {
        let w = weave();
        let mut rx = w.subscribe();
        create(&w, "W");
        let mut saw = false;
        while let Ok(ev) = rx.try_recv() {
            if let WeaveEvent::WorkTransition { work_id, transition, .. } = ev {
                assert_eq!(work_id, "W");
                assert_eq!(transition, TransitionType::Created);
                saw = true;
            }
        }
        assert!(saw);
    }
}
