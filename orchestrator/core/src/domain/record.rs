// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Record
//!
//! Append-only audit log of one task. Every phase transition, agent lifecycle
//! change and recovery decision lands here in the order it happened; entries
//! are never rewritten.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Audit trail and learning-store payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::phase::{PhaseId, PhaseState};
use crate::domain::recovery::{AttemptOutcome, PastOutcome, RecoveryAttempt};
use crate::domain::role::Role;
use crate::domain::task::{TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecordEvent {
    TaskStarted {
        goal: String,
        phase_count: usize,
    },
    PhaseTransition {
        phase_id: PhaseId,
        from: PhaseState,
        to: PhaseState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
    AgentSpawned {
        agent_id: AgentId,
        role: Role,
    },
    AgentTerminated {
        agent_id: AgentId,
        reason: String,
    },
    RecoveryAttempted(RecoveryAttempt),
    TaskFinished {
        status: TaskStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub sequence: u64,
    pub at: DateTime<Utc>,
    pub event: RecordEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    task_id: TaskId,
    goal: String,
    entries: Vec<RecordEntry>,
}

impl ExecutionRecord {
    pub fn new(task_id: TaskId, goal: impl Into<String>) -> Self {
        Self {
            task_id,
            goal: goal.into(),
            entries: Vec::new(),
        }
    }

    /// Rebuild a record from entries read back from storage.
    pub fn restore(task_id: TaskId, goal: impl Into<String>, mut entries: Vec<RecordEntry>) -> Self {
        entries.sort_by_key(|e| e.sequence);
        Self {
            task_id,
            goal: goal.into(),
            entries,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(&mut self, event: RecordEvent) -> &RecordEntry {
        let entry = RecordEntry {
            sequence: self.entries.len() as u64 + 1,
            at: Utc::now(),
            event,
        };
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn recovery_attempts(&self) -> impl Iterator<Item = &RecoveryAttempt> {
        self.entries.iter().filter_map(|e| match &e.event {
            RecordEvent::RecoveryAttempted(attempt) => Some(attempt),
            _ => None,
        })
    }

    pub fn attempts_for<'a>(&'a self, phase: &'a PhaseId) -> impl Iterator<Item = &'a RecoveryAttempt> {
        self.recovery_attempts().filter(move |a| &a.phase_id == phase)
    }

    pub fn final_status(&self) -> Option<TaskStatus> {
        self.entries.iter().rev().find_map(|e| match e.event {
            RecordEvent::TaskFinished { status } => Some(status),
            _ => None,
        })
    }

    /// Outcome of every retry this record scheduled: a retry succeeded when
    /// the phase reached COMPLETED before its next recovery decision. Retries
    /// still in flight are left out.
    pub fn past_outcomes(&self) -> Vec<PastOutcome> {
        self.resolved_retries()
            .into_iter()
            .map(|(_, outcome)| outcome)
            .collect()
    }

    /// [`past_outcomes`](Self::past_outcomes) without the retries of `phase`.
    pub fn past_outcomes_excluding(&self, phase: &PhaseId) -> Vec<PastOutcome> {
        self.resolved_retries()
            .into_iter()
            .filter(|(id, _)| *id != phase)
            .map(|(_, outcome)| outcome)
            .collect()
    }

    fn resolved_retries(&self) -> Vec<(&PhaseId, PastOutcome)> {
        let mut outcomes = Vec::new();

        for (index, entry) in self.entries.iter().enumerate() {
            let RecordEvent::RecoveryAttempted(attempt) = &entry.event else {
                continue;
            };
            if attempt.outcome != AttemptOutcome::RetryScheduled {
                continue;
            }

            let resolved = self.entries[index + 1..]
                .iter()
                .find_map(|later| match &later.event {
                    RecordEvent::RecoveryAttempted(next) if next.phase_id == attempt.phase_id => {
                        Some(false)
                    }
                    RecordEvent::PhaseTransition {
                        phase_id,
                        to: PhaseState::Completed,
                        ..
                    } if phase_id == &attempt.phase_id => Some(true),
                    RecordEvent::TaskFinished { .. } => Some(false),
                    _ => None,
                });
            let Some(succeeded) = resolved else {
                continue;
            };

            outcomes.push((
                &attempt.phase_id,
                PastOutcome {
                    class: attempt.classification,
                    strategy: attempt.strategy,
                    succeeded,
                },
            ));
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recovery::{FailureClass, RecoveryStrategy};

    fn attempt(phase: &str, outcome: AttemptOutcome) -> RecoveryAttempt {
        RecoveryAttempt {
            phase_id: PhaseId::new(phase),
            attempt: 1,
            classification: FailureClass::TransientInfra,
            strategy: RecoveryStrategy::RetryWithBackoff,
            confidence: 0.9,
            outcome,
            escalation: None,
            error: "connection reset".to_string(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_sequences_are_monotonic() {
        let mut record = ExecutionRecord::new(TaskId::new(), "goal");
        record.append(RecordEvent::TaskStarted {
            goal: "goal".to_string(),
            phase_count: 1,
        });
        record.append(RecordEvent::TaskFinished {
            status: TaskStatus::Completed,
        });

        let sequences: Vec<u64> = record.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(record.final_status(), Some(TaskStatus::Completed));
    }

    #[test]
    fn test_past_outcomes_track_retry_success() {
        let mut record = ExecutionRecord::new(TaskId::new(), "goal");
        record.append(RecordEvent::RecoveryAttempted(attempt("a", AttemptOutcome::RetryScheduled)));
        record.append(RecordEvent::RecoveryAttempted(attempt("a", AttemptOutcome::RetryScheduled)));
        record.append(RecordEvent::PhaseTransition {
            phase_id: PhaseId::new("a"),
            from: PhaseState::Running,
            to: PhaseState::Completed,
            cause: None,
        });
        record.append(RecordEvent::RecoveryAttempted(attempt("b", AttemptOutcome::Escalated)));

        let outcomes: Vec<bool> = record.past_outcomes().iter().map(|o| o.succeeded).collect();
        assert_eq!(outcomes, vec![false, true]);
        assert_eq!(record.attempts_for(&PhaseId::new("a")).count(), 2);
    }

    #[test]
    fn test_pending_retry_is_not_an_outcome() {
        let mut record = ExecutionRecord::new(TaskId::new(), "goal");
        record.append(RecordEvent::RecoveryAttempted(attempt("a", AttemptOutcome::RetryScheduled)));
        assert!(record.past_outcomes().is_empty());

        record.append(RecordEvent::TaskFinished {
            status: TaskStatus::Cancelled,
        });
        let outcomes = record.past_outcomes();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].succeeded);
    }

    #[test]
    fn test_outcomes_of_the_failing_phase_can_be_excluded() {
        let mut record = ExecutionRecord::new(TaskId::new(), "goal");
        record.append(RecordEvent::RecoveryAttempted(attempt("a", AttemptOutcome::RetryScheduled)));
        record.append(RecordEvent::RecoveryAttempted(attempt("b", AttemptOutcome::RetryScheduled)));
        record.append(RecordEvent::RecoveryAttempted(attempt("a", AttemptOutcome::RetryScheduled)));
        record.append(RecordEvent::RecoveryAttempted(attempt("b", AttemptOutcome::RetryScheduled)));

        assert_eq!(record.past_outcomes().len(), 2);
        let others = record.past_outcomes_excluding(&PhaseId::new("a"));
        assert_eq!(others.len(), 1);
        assert!(!others[0].succeeded);
    }
}
