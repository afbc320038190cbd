// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for Orchestration Events
//
// In-memory event streaming over a tokio broadcast channel. Each task's
// runner publishes phase transitions, agent lifecycle and recovery events;
// the CLI and any other caller-facing layer subscribe per task.
//
// Events are not persisted here; the execution record is the durable log.

use crate::domain::events::OrchestrationEvent;
use crate::domain::task::TaskId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to orchestration events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<OrchestrationEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Slow subscribers lose the oldest events once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: OrchestrationEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to events of every task
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of one task
    pub fn subscribe_task(&self, task_id: TaskId) -> TaskEventReceiver {
        TaskEventReceiver {
            receiver: self.sender.subscribe(),
            task_id,
            finished: false,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all orchestration events
pub struct EventReceiver {
    receiver: broadcast::Receiver<OrchestrationEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<OrchestrationEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<OrchestrationEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for a single task's events.
///
/// Yields `Closed` after the task's `TaskFinished` event has been delivered.
pub struct TaskEventReceiver {
    receiver: broadcast::Receiver<OrchestrationEvent>,
    task_id: TaskId,
    finished: bool,
}

impl TaskEventReceiver {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Receive the next event for the task, skipping events of other tasks
    pub async fn recv(&mut self) -> Result<OrchestrationEvent, EventBusError> {
        if self.finished {
            return Err(EventBusError::Closed);
        }
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.task_id() == self.task_id {
                self.finished = event.is_terminal();
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::phase::{PhaseId, PhaseState};
    use crate::domain::task::TaskStatus;
    use chrono::Utc;

    fn transition(task_id: TaskId, phase: &str) -> OrchestrationEvent {
        OrchestrationEvent::PhaseStateChanged {
            task_id,
            phase_id: PhaseId::new(phase),
            from: PhaseState::Pending,
            to: PhaseState::Ready,
            changed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let task_id = TaskId::new();

        event_bus.publish(transition(task_id, "1"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.task_id(), task_id);
    }

    #[tokio::test]
    async fn test_task_event_filtering() {
        let event_bus = EventBus::new(10);
        let task_id = TaskId::new();
        let other_task_id = TaskId::new();
        let mut receiver = event_bus.subscribe_task(task_id);

        event_bus.publish(transition(other_task_id, "x"));
        event_bus.publish(transition(task_id, "1"));

        match receiver.recv().await.unwrap() {
            OrchestrationEvent::PhaseStateChanged { phase_id, .. } => {
                assert_eq!(phase_id, PhaseId::new("1"));
            }
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_task_receiver_closes_after_finish() {
        let event_bus = EventBus::new(10);
        let task_id = TaskId::new();
        let mut receiver = event_bus.subscribe_task(task_id);

        event_bus.publish(OrchestrationEvent::TaskFinished {
            task_id,
            status: TaskStatus::Completed,
            finished_at: Utc::now(),
        });
        event_bus.publish(transition(task_id, "late"));

        assert!(receiver.recv().await.unwrap().is_terminal());
        assert!(matches!(receiver.recv().await, Err(EventBusError::Closed)));
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_subscriber_count() {
        let event_bus = EventBus::default();
        assert_eq!(event_bus.subscriber_count(), 0);
        let _a = event_bus.subscribe();
        let _b = event_bus.subscribe_task(TaskId::new());
        assert_eq!(event_bus.subscriber_count(), 2);
    }
}
