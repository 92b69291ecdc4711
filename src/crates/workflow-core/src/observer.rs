//! Step observers for live log streaming
//!
//! Delivery is best-effort. Observers are called synchronously from the run
//! driver and must not block; a missing or lagging subscriber never affects
//! the run.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::run::{Run, RunStatus, StepRecord};

/// Receives each step record right after it is persisted
pub trait StepObserver: Send + Sync {
    fn on_step(&self, run_id: &str, step: &StepRecord);

    /// Called once with the terminal run
    fn on_finished(&self, _run: &Run) {}
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StepObserver for NoopObserver {
    fn on_step(&self, _run_id: &str, _step: &StepRecord) {}
}

/// Event published on the broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    /// One step record appended to a run's log
    Step { run_id: String, step: StepRecord },

    /// A run reached a terminal status
    Finished {
        run_id: String,
        status: RunStatus,
        steps: usize,
    },
}

impl StepEvent {
    pub fn run_id(&self) -> &str {
        match self {
            StepEvent::Step { run_id, .. } | StepEvent::Finished { run_id, .. } => run_id,
        }
    }
}

/// Fans step events out to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<StepEvent>,
}

impl BroadcastObserver {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StepEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, event: StepEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl StepObserver for BroadcastObserver {
    fn on_step(&self, run_id: &str, step: &StepRecord) {
        self.publish(StepEvent::Step {
            run_id: run_id.to_string(),
            step: step.clone(),
        });
    }

    fn on_finished(&self, run: &Run) {
        self.publish(StepEvent::Finished {
            run_id: run.run_id.clone(),
            status: run.status,
            steps: run.log.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::StepStatus;
    use crate::state::State;
    use chrono::Utc;

    fn step() -> StepRecord {
        StepRecord {
            node_id: "a".into(),
            node_type: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            input_state: State::new(),
            output_state: State::new(),
            status: StepStatus::Completed,
            error: None,
            tool_name: None,
            tool_params: None,
            limit_exceeded: None,
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let observer = BroadcastObserver::new();
        assert_eq!(observer.subscriber_count(), 0);
        observer.on_step("r1", &step());
    }

    #[tokio::test]
    async fn test_subscriber_receives_steps() {
        let observer = BroadcastObserver::with_capacity(4);
        let mut rx = observer.subscribe();

        observer.on_step("r1", &step());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.run_id(), "r1");
        assert!(matches!(event, StepEvent::Step { .. }));
    }

    #[test]
    fn test_event_serialization() {
        let event = StepEvent::Finished {
            run_id: "r1".into(),
            status: RunStatus::Completed,
            steps: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "finished");
        assert_eq!(json["status"], "completed");
    }
}
