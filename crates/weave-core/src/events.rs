use crate::field::{FieldQuality, FieldUpdate};
use crate::store::CleanupReport;
use crate::types::{MessageType, TransitionType};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Receivers that fall this far behind start seeing `Lagged`.
pub const EVENT_CAPACITY: usize = 256;

/// Notifications published by the coordinator after a write commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WeaveEvent {
    FieldUpdated {
        update: FieldUpdate,
    },
    QualityChanged {
        from: FieldQuality,
        to: FieldQuality,
        coherence: f64,
    },
    MessageSent {
        message_id: i64,
        from: String,
        to: String,
        message_type: MessageType,
        field_impact: f64,
    },
    WorkTransition {
        work_id: String,
        transition: TransitionType,
        milestone: Option<u8>,
        field_impact: f64,
    },
    CleanupCompleted {
        report: CleanupReport,
    },
}

pub fn channel() -> broadcast::Sender<WeaveEvent> {
    let (tx, _) = broadcast::channel(EVENT_CAPACITY);
    tx
}

/// Publish without caring whether anyone is listening.
pub(crate) fn publish(tx: &broadcast::Sender<WeaveEvent>, event: WeaveEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_receivers_is_silent() {
        let tx = channel();
        publish(
            &tx,
            WeaveEvent::CleanupCompleted {
                report: CleanupReport::default(),
            },
        );
    }

    #[test]
    fn subscribers_see_events_in_order() {
        let tx = channel();
        let mut rx = tx.subscribe();
        publish(
            &tx,
            WeaveEvent::QualityChanged {
                from: FieldQuality::Flowing,
                to: FieldQuality::HighlyCoherent,
                coherence: 70.01,
            },
        );
        publish(
            &tx,
            WeaveEvent::CleanupCompleted {
                report: CleanupReport::default(),
            },
        );
        assert!(matches!(rx.try_recv().unwrap(), WeaveEvent::QualityChanged { .. }));
        assert!(matches!(rx.try_recv().unwrap(), WeaveEvent::CleanupCompleted { .. }));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = WeaveEvent::WorkTransition {
            work_id: "W".into(),
            transition: TransitionType::Milestone,
            milestone: Some(50),
            field_impact: 0.07,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "work_transition");
        assert_eq!(v["transition"], "milestone");
    }
}
