//! Execution event fan-out.
//!
//! The engine publishes every lifecycle transition to an `EventBus`. Any
//! number of observers may subscribe; each gets its own bounded buffer, and
//! an observer that falls behind skips the oldest events instead of slowing
//! executions down.

use aeon_types::event::WorkflowEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

/// Broadcast channel for `WorkflowEvent`s. Clones publish to the same
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer. Zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Deliver to current subscribers. Dropped when nobody is listening.
    pub fn publish(&self, event: WorkflowEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("no event subscribers");
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

/// One execution's slice of the event stream.
///
/// Wraps a receiver taken before the execution was triggered, so its
/// `ExecutionStarted` is not missed. Ends after `ExecutionFinished`.
pub struct ExecutionEvents {
    rx: broadcast::Receiver<WorkflowEvent>,
    execution_id: Uuid,
    finished: bool,
}

impl ExecutionEvents {
    pub fn new(rx: broadcast::Receiver<WorkflowEvent>, execution_id: Uuid) -> Self {
        Self {
            rx,
            execution_id,
            finished: false,
        }
    }

    /// Next event of this execution.
    ///
    /// `Err(Lagged(n))` reports events lost to a full buffer; the stream
    /// continues afterwards. `Err(Closed)` means the execution has finished
    /// or the bus is gone.
    pub async fn recv(&mut self) -> Result<WorkflowEvent, RecvError> {
        if self.finished {
            return Err(RecvError::Closed);
        }
        loop {
            let event = self.rx.recv().await?;
            if event.execution_id() != self.execution_id {
                continue;
            }
            if matches!(event, WorkflowEvent::ExecutionFinished { .. }) {
                self.finished = true;
            }
            return Ok(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeon_types::workflow::ExecutionStatus;

    fn skipped(execution_id: Uuid, step_id: &str) -> WorkflowEvent {
        WorkflowEvent::StepSkipped {
            execution_id,
            step_id: step_id.to_string(),
        }
    }

    fn finished(execution_id: Uuid) -> WorkflowEvent {
        WorkflowEvent::ExecutionFinished {
            execution_id,
            workflow_id: "wf".to_string(),
            status: ExecutionStatus::Completed,
            error: None,
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.clone().subscribe();
        let id = Uuid::now_v7();

        bus.publish(skipped(id, "a"));

        for rx in [&mut first, &mut second] {
            let event = rx.recv().await.unwrap();
            assert!(matches!(event, WorkflowEvent::StepSkipped { ref step_id, .. } if step_id == "a"));
        }
    }

    #[test]
    fn events_before_subscribing_are_not_replayed() {
        let bus = EventBus::new(16);
        bus.publish(skipped(Uuid::now_v7(), "early"));

        let mut rx = bus.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let id = Uuid::now_v7();

        for i in 0..10 {
            bus.publish(skipped(id, &format!("step-{i}")));
        }

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(6))
        ));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn zero_capacity_still_delivers() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(skipped(Uuid::now_v7(), "a"));
        assert!(rx.try_recv().is_ok());
        assert!(format!("{bus:?}").contains("subscribers: 1"));
    }

    #[tokio::test]
    async fn execution_events_filter_and_end_at_finish() {
        let bus = EventBus::new(16);
        let mine = Uuid::now_v7();
        let other = Uuid::now_v7();
        let mut events = ExecutionEvents::new(bus.subscribe(), mine);

        bus.publish(skipped(other, "x"));
        bus.publish(skipped(mine, "a"));
        bus.publish(finished(other));
        bus.publish(finished(mine));
        bus.publish(skipped(mine, "late"));

        let first = events.recv().await.unwrap();
        assert!(matches!(first, WorkflowEvent::StepSkipped { ref step_id, .. } if step_id == "a"));
        let last = events.recv().await.unwrap();
        assert!(matches!(last, WorkflowEvent::ExecutionFinished { execution_id, .. } if execution_id == mine));
        assert!(matches!(events.recv().await, Err(RecvError::Closed)));
    }
}
