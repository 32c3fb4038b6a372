//! Stage-entry events
//!
//! The engine declares notification intents; it never delivers them.
//! Subscribers (notification, document and scheduling subsystems) receive
//! one event per entered stage, only after the unit that entered it has
//! committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::broadcast;
use workflow_types::{
    ApplicationId, DefinitionId, NotificationTrigger, RoleId, Stage, StageId, TransitionId,
    ON_ENTER_EVENT,
};

/// Emitted whenever an application enters a stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageEnteredEvent {
    pub application_id: ApplicationId,
    pub definition_id: DefinitionId,
    pub stage_id: StageId,
    pub stage_name: String,
    /// None for the initial stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entered_via: Option<TransitionId>,
    pub entered_at: DateTime<Utc>,
    /// The stage's `on_enter` triggers
    pub notification_triggers: Vec<NotificationTrigger>,
    pub required_documents: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_role: Option<RoleId>,
}

impl StageEnteredEvent {
    pub fn new(
        application_id: ApplicationId,
        stage: &Stage,
        entered_via: Option<TransitionId>,
        entered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            application_id,
            definition_id: stage.definition_id,
            stage_id: stage.id,
            stage_name: stage.name.clone(),
            entered_via,
            entered_at,
            notification_triggers: stage.triggers_for(ON_ENTER_EVENT),
            required_documents: stage.required_documents.clone(),
            assigned_role: stage.assigned_role.clone(),
        }
    }
}

/// Broadcast channel for stage-entry events
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<StageEnteredEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEnteredEvent> {
        self.sender.subscribe()
    }

    /// Publish committed events in order; returns how many were delivered
    pub fn publish(&self, events: Vec<StageEnteredEvent>) -> usize {
        let mut delivered = 0;
        for event in events {
            let stage_id = event.stage_id;
            match self.sender.send(event) {
                Ok(_) => delivered += 1,
                Err(_) => {
                    tracing::trace!(stage_id = %stage_id, "No subscribers for stage-entry event");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_types::NotificationChannel;

    #[tokio::test]
    async fn test_subscribers_receive_on_enter_triggers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let stage = Stage::new(StageId::new(2), DefinitionId::new(1), "Interview", 2)
            .with_trigger(
                NotificationTrigger::on_enter()
                    .notify(RoleId::new("applicant"))
                    .via(NotificationChannel::Email),
            )
            .with_trigger(NotificationTrigger::new("on_exit"));

        let event = StageEnteredEvent::new(
            ApplicationId::new("APP-1"),
            &stage,
            Some(TransitionId::new(4)),
            Utc::now(),
        );
        assert_eq!(bus.publish(vec![event]), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.stage_name, "Interview");
        assert_eq!(received.notification_triggers.len(), 1);
        assert_eq!(received.notification_triggers[0].event, ON_ENTER_EVENT);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        let stage = Stage::new(StageId::new(1), DefinitionId::new(1), "Submitted", 1);
        let event = StageEnteredEvent::new(ApplicationId::new("APP-1"), &stage, None, Utc::now());
        assert_eq!(bus.publish(vec![event]), 0);
    }
}
