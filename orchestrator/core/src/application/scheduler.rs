// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Scheduler
//!
//! Owns the execution plan of one task and is the only place phase state is
//! changed. Each `tick` promotes phases whose dependencies have completed and
//! assigns as many READY phases as the concurrency caps allow, in declaration
//! order. Everything else (agent acquisition, running, recovery) is driven by
//! the task runner calling back into the scheduler.
//!
//! Every state change is queued as a [`Transition`] and handed to the runner
//! through [`Scheduler::drain_transitions`] for recording and publishing.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Ready-set computation and capped dispatch

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::config::SchedulerConfig;
use crate::domain::phase::{CancelCause, PhaseError, PhaseId, PhaseState};
use crate::domain::plan::ExecutionPlan;
use crate::domain::role::Role;
use crate::domain::task::TaskStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub phase_id: PhaseId,
    pub from: PhaseState,
    pub to: PhaseState,
    pub cause: Option<String>,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unknown phase '{0}'")]
    UnknownPhase(PhaseId),

    #[error("Phase '{phase}' cannot run before dependency '{dependency}' completes")]
    DependencyNotCompleted { phase: PhaseId, dependency: PhaseId },

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

pub struct Scheduler {
    plan: ExecutionPlan,
    max_concurrent: usize,
    role_caps: BTreeMap<Role, usize>,
    transitions: Vec<Transition>,
    cancelled: bool,
}

impl Scheduler {
    pub fn new(plan: ExecutionPlan, config: &SchedulerConfig) -> Self {
        Self {
            plan,
            max_concurrent: config.max_concurrent_agents.max(1),
            role_caps: config.per_role_caps.clone(),
            transitions: Vec::new(),
            cancelled: false,
        }
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn into_plan(self) -> ExecutionPlan {
        self.plan
    }

    pub fn state_of(&self, id: &PhaseId) -> Option<PhaseState> {
        self.plan.state_of(id)
    }

    /// Phases holding an agent slot (ASSIGNED or RUNNING).
    pub fn active_count(&self) -> usize {
        self.plan
            .phases()
            .iter()
            .filter(|p| p.state().is_active())
            .count()
    }

    fn active_for_role(&self, role: Role) -> usize {
        self.plan
            .phases()
            .iter()
            .filter(|p| p.role == role && p.state().is_active())
            .count()
    }

    /// Promote newly ready phases and assign READY phases up to the caps.
    /// Returns the phases moved to ASSIGNED, in declaration order.
    pub fn tick(&mut self) -> Vec<PhaseId> {
        if self.cancelled {
            return Vec::new();
        }

        for id in self.plan.ready_candidates() {
            // Candidates are PENDING with met dependencies.
            if let Err(e) = self.transition(&id, PhaseState::Ready, None) {
                warn!("Phase '{}' could not become ready: {}", id, e);
            }
        }

        let ready: Vec<(PhaseId, Role)> = self
            .plan
            .phases()
            .iter()
            .filter(|p| p.state() == PhaseState::Ready)
            .map(|p| (p.id.clone(), p.role))
            .collect();

        let mut assigned = Vec::new();
        for (id, role) in ready {
            if self.active_count() >= self.max_concurrent {
                break;
            }
            if let Some(cap) = self.role_caps.get(&role) {
                if self.active_for_role(role) >= *cap {
                    continue;
                }
            }
            if self.transition(&id, PhaseState::Assigned, None).is_ok() {
                assigned.push(id);
            }
        }

        if !assigned.is_empty() {
            debug!("Assigned {} phase(s): {:?}", assigned.len(), assigned);
        }
        assigned
    }

    /// ASSIGNED → RUNNING. Refuses to start a phase whose dependencies have
    /// not all completed.
    pub fn mark_running(&mut self, id: &PhaseId) -> Result<(), SchedulerError> {
        let phase = self
            .plan
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownPhase(id.clone()))?;
        if let Some(dependency) = phase
            .dependencies
            .iter()
            .find(|d| self.plan.state_of(d) != Some(PhaseState::Completed))
        {
            return Err(SchedulerError::DependencyNotCompleted {
                phase: id.clone(),
                dependency: dependency.clone(),
            });
        }
        self.transition(id, PhaseState::Running, None)
    }

    /// ASSIGNED → READY, when no agent could be leased.
    pub fn unassign(&mut self, id: &PhaseId) -> Result<(), SchedulerError> {
        self.transition(id, PhaseState::Ready, Some("no agent available".to_string()))
    }

    pub fn complete(&mut self, id: &PhaseId, output: serde_json::Value) -> Result<(), SchedulerError> {
        let phase = self.phase_mut(id)?;
        let from = phase.complete(output)?;
        self.push(id, from, PhaseState::Completed, None);
        Ok(())
    }

    pub fn fail(&mut self, id: &PhaseId, error: &str) -> Result<(), SchedulerError> {
        let phase = self.phase_mut(id)?;
        let from = phase.fail(error)?;
        self.push(id, from, PhaseState::Failed, Some(error.to_string()));
        Ok(())
    }

    pub fn begin_recovery(&mut self, id: &PhaseId) -> Result<(), SchedulerError> {
        self.transition(id, PhaseState::Recovering, None)
    }

    /// Swap in replacement instructions for a RECOVERING phase.
    pub fn revise(
        &mut self,
        id: &PhaseId,
        description: String,
        estimated_cost: Option<f64>,
    ) -> Result<(), SchedulerError> {
        self.phase_mut(id)?.revise(description, estimated_cost)?;
        Ok(())
    }

    /// RECOVERING → PENDING; the phase re-enters the ready set on the next tick.
    pub fn retry(&mut self, id: &PhaseId) -> Result<(), SchedulerError> {
        self.transition(id, PhaseState::Pending, Some("retry".to_string()))
    }

    /// Escalate a failed or recovering phase and cancel everything that
    /// transitively depends on it. Returns the cancelled phases.
    pub fn escalate(&mut self, id: &PhaseId, reason: &str) -> Result<Vec<PhaseId>, SchedulerError> {
        self.transition(id, PhaseState::Escalated, Some(reason.to_string()))?;

        let mut cancelled = Vec::new();
        for dependent in self.plan.downstream(id) {
            let cause = CancelCause::UpstreamEscalated { phase_id: id.clone() };
            if self.cancel(&dependent, cause)? {
                cancelled.push(dependent);
            }
        }
        Ok(cancelled)
    }

    /// Cancel every non-terminal phase and stop dispatching.
    pub fn cancel_all(&mut self) -> Vec<PhaseId> {
        self.cancelled = true;
        self.cancel_remaining(CancelCause::TaskCancelled)
    }

    /// Cancel non-terminal phases that can no longer make progress.
    pub fn cancel_stalled(&mut self) -> Vec<PhaseId> {
        self.cancel_remaining(CancelCause::Stalled)
    }

    fn cancel_remaining(&mut self, cause: CancelCause) -> Vec<PhaseId> {
        let open: Vec<PhaseId> = self
            .plan
            .phases()
            .iter()
            .filter(|p| !p.state().is_terminal())
            .map(|p| p.id.clone())
            .collect();

        open.into_iter()
            .filter(|id| matches!(self.cancel(id, cause.clone()), Ok(true)))
            .collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_settled(&self) -> bool {
        self.plan.is_settled()
    }

    /// Terminal status implied by the current phase states.
    pub fn outcome(&self) -> TaskStatus {
        if self.cancelled {
            return TaskStatus::Cancelled;
        }
        if !self.plan.is_settled() {
            return TaskStatus::Running;
        }

        let completed = self.plan.count_in(PhaseState::Completed);
        if completed == self.plan.len() {
            TaskStatus::Completed
        } else if completed == 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::Partial
        }
    }

    pub fn drain_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    fn cancel(&mut self, id: &PhaseId, cause: CancelCause) -> Result<bool, SchedulerError> {
        let phase = self.phase_mut(id)?;
        if phase.state().is_terminal() {
            return Ok(false);
        }
        let reason = cause.to_string();
        let from = phase.cancel(cause)?;
        self.push(id, from, PhaseState::Cancelled, Some(reason));
        Ok(true)
    }

    fn transition(
        &mut self,
        id: &PhaseId,
        to: PhaseState,
        cause: Option<String>,
    ) -> Result<(), SchedulerError> {
        let from = self.phase_mut(id)?.transition_to(to)?;
        self.push(id, from, to, cause);
        Ok(())
    }

    fn phase_mut(&mut self, id: &PhaseId) -> Result<&mut crate::domain::phase::Phase, SchedulerError> {
        self.plan
            .get_mut(id)
            .ok_or_else(|| SchedulerError::UnknownPhase(id.clone()))
    }

    fn push(&mut self, id: &PhaseId, from: PhaseState, to: PhaseState, cause: Option<String>) {
        metrics::counter!("conductor_phase_transitions_total", "to" => to.as_str()).increment(1);
        self.transitions.push(Transition {
            phase_id: id.clone(),
            from,
            to,
            cause,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::validation::PlanValidator;
    use crate::domain::phase::RawPhase;
    use crate::domain::task::TaskId;

    fn plan(edges: &[(&str, &str, &[&str])]) -> ExecutionPlan {
        let raw: Vec<RawPhase> = edges
            .iter()
            .map(|(id, role, deps)| RawPhase {
                id: id.to_string(),
                description: String::new(),
                role: role.to_string(),
                dependencies: deps.iter().map(|d| d.to_string()).collect(),
                estimated_cost: None,
            })
            .collect();
        PlanValidator::default().validate(TaskId::new(), &raw).unwrap()
    }

    fn config(max: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_agents: max,
            ..SchedulerConfig::default()
        }
    }

    fn run_to_completion(scheduler: &mut Scheduler, id: &str) {
        let id = PhaseId::new(id);
        scheduler.mark_running(&id).unwrap();
        scheduler.complete(&id, serde_json::Value::Null).unwrap();
    }

    #[test]
    fn test_tick_respects_global_cap_in_declaration_order() {
        let mut s = Scheduler::new(
            plan(&[("a", "code", &[]), ("b", "code", &[]), ("c", "code", &[])]),
            &config(2),
        );

        assert_eq!(s.tick(), vec![PhaseId::new("a"), PhaseId::new("b")]);
        assert_eq!(s.state_of(&PhaseId::new("c")), Some(PhaseState::Ready));
        assert!(s.tick().is_empty());

        run_to_completion(&mut s, "a");
        assert_eq!(s.tick(), vec![PhaseId::new("c")]);
    }

    #[test]
    fn test_per_role_cap_skips_without_blocking_other_roles() {
        let mut cfg = config(3);
        cfg.per_role_caps.insert(Role::Code, 1);
        let mut s = Scheduler::new(
            plan(&[("a", "code", &[]), ("b", "code", &[]), ("c", "qa", &[])]),
            &cfg,
        );

        assert_eq!(s.tick(), vec![PhaseId::new("a"), PhaseId::new("c")]);
    }

    #[test]
    fn test_dependents_wait_for_completion() {
        let mut s = Scheduler::new(
            plan(&[("1", "code", &[]), ("2", "code", &["1"]), ("3", "code", &["1"])]),
            &config(2),
        );

        assert_eq!(s.tick(), vec![PhaseId::new("1")]);
        assert_eq!(s.state_of(&PhaseId::new("2")), Some(PhaseState::Pending));

        run_to_completion(&mut s, "1");
        assert_eq!(s.tick(), vec![PhaseId::new("2"), PhaseId::new("3")]);
        run_to_completion(&mut s, "2");
        run_to_completion(&mut s, "3");

        assert!(s.is_settled());
        assert_eq!(s.outcome(), TaskStatus::Completed);
    }

    #[test]
    fn test_escalation_cascades_to_transitive_dependents() {
        let mut s = Scheduler::new(
            plan(&[
                ("a", "code", &[]),
                ("b", "code", &["a"]),
                ("c", "code", &["b"]),
                ("d", "code", &[]),
            ]),
            &config(4),
        );
        s.tick();
        s.mark_running(&PhaseId::new("a")).unwrap();
        s.fail(&PhaseId::new("a"), "boom").unwrap();
        s.begin_recovery(&PhaseId::new("a")).unwrap();
        let cancelled = s.escalate(&PhaseId::new("a"), "budget").unwrap();
        assert_eq!(cancelled, vec![PhaseId::new("b"), PhaseId::new("c")]);

        run_to_completion(&mut s, "d");
        assert_eq!(s.outcome(), TaskStatus::Partial);

        let b = s.plan().get(&PhaseId::new("b")).unwrap();
        assert_eq!(
            b.cancel_cause(),
            Some(&CancelCause::UpstreamEscalated {
                phase_id: PhaseId::new("a")
            })
        );
    }

    #[test]
    fn test_nothing_completed_is_failed() {
        let mut s = Scheduler::new(plan(&[("a", "code", &[])]), &config(1));
        s.tick();
        s.mark_running(&PhaseId::new("a")).unwrap();
        s.fail(&PhaseId::new("a"), "boom").unwrap();
        s.escalate(&PhaseId::new("a"), "no budget").unwrap();
        assert_eq!(s.outcome(), TaskStatus::Failed);
    }

    #[test]
    fn test_retry_reenters_ready_set() {
        let mut s = Scheduler::new(plan(&[("a", "code", &[])]), &config(1));
        s.tick();
        s.mark_running(&PhaseId::new("a")).unwrap();
        s.fail(&PhaseId::new("a"), "flaky").unwrap();
        s.begin_recovery(&PhaseId::new("a")).unwrap();
        s.retry(&PhaseId::new("a")).unwrap();

        assert_eq!(s.tick(), vec![PhaseId::new("a")]);
        s.mark_running(&PhaseId::new("a")).unwrap();
        assert_eq!(s.plan().get(&PhaseId::new("a")).unwrap().attempts(), 2);
    }

    #[test]
    fn test_cancel_all_stops_dispatch() {
        let mut s = Scheduler::new(
            plan(&[("a", "code", &[]), ("b", "code", &["a"])]),
            &config(1),
        );
        s.tick();
        s.mark_running(&PhaseId::new("a")).unwrap();
        s.drain_transitions();

        let cancelled = s.cancel_all();
        assert_eq!(cancelled, vec![PhaseId::new("a"), PhaseId::new("b")]);
        assert!(s.tick().is_empty());
        assert_eq!(s.outcome(), TaskStatus::Cancelled);
        assert!(s
            .drain_transitions()
            .iter()
            .all(|t| t.to == PhaseState::Cancelled));
    }

    #[test]
    fn test_unassign_returns_phase_to_ready() {
        let mut s = Scheduler::new(plan(&[("a", "code", &[])]), &config(1));
        s.tick();
        s.unassign(&PhaseId::new("a")).unwrap();
        assert_eq!(s.state_of(&PhaseId::new("a")), Some(PhaseState::Ready));
        assert_eq!(s.tick(), vec![PhaseId::new("a")]);
    }
}
