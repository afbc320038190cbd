// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Plan
//!
//! The validated dependency graph of one task. Phases are kept in the order
//! the planner declared them; that order is the tie-break for every
//! deterministic decision made over the plan (dispatch, cycle reporting,
//! status output).
//!
//! An `ExecutionPlan` is only ever produced by the plan validator, so holders
//! may rely on it being acyclic with every dependency resolvable.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** DAG of phases and the violations that prevent one

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use thiserror::Error;

use crate::domain::phase::{Phase, PhaseId, PhaseState};
use crate::domain::role::Role;
use crate::domain::task::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    task_id: TaskId,
    phases: Vec<Phase>,
}

impl ExecutionPlan {
    pub(crate) fn from_validated(task_id: TaskId, phases: Vec<Phase>) -> Self {
        Self { task_id, phases }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn get(&self, id: &PhaseId) -> Option<&Phase> {
        self.phases.iter().find(|p| &p.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &PhaseId) -> Option<&mut Phase> {
        self.phases.iter_mut().find(|p| &p.id == id)
    }

    pub(crate) fn phases_mut(&mut self) -> impl Iterator<Item = &mut Phase> {
        self.phases.iter_mut()
    }

    pub fn state_of(&self, id: &PhaseId) -> Option<PhaseState> {
        self.get(id).map(Phase::state)
    }

    pub fn count_in(&self, state: PhaseState) -> usize {
        self.phases.iter().filter(|p| p.state() == state).count()
    }

    /// Every dependency of `id` has COMPLETED.
    pub fn dependencies_met(&self, id: &PhaseId) -> bool {
        match self.get(id) {
            Some(phase) => phase
                .dependencies
                .iter()
                .all(|dep| self.state_of(dep) == Some(PhaseState::Completed)),
            None => false,
        }
    }

    /// PENDING phases whose dependencies have all COMPLETED, in declaration order.
    pub fn ready_candidates(&self) -> Vec<PhaseId> {
        self.phases
            .iter()
            .filter(|p| p.state() == PhaseState::Pending)
            .filter(|p| self.dependencies_met(&p.id))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Phases that list `id` as a direct dependency.
    pub fn dependents(&self, id: &PhaseId) -> Vec<PhaseId> {
        self.phases
            .iter()
            .filter(|p| p.dependencies.contains(id))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Transitive dependents of `id`, in declaration order.
    pub fn downstream(&self, id: &PhaseId) -> Vec<PhaseId> {
        let mut reached: HashSet<PhaseId> = HashSet::new();
        let mut queue: VecDeque<PhaseId> = VecDeque::from([id.clone()]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents(&current) {
                if reached.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        self.phases
            .iter()
            .filter(|p| reached.contains(&p.id))
            .map(|p| p.id.clone())
            .collect()
    }

    /// All phases are COMPLETED, CANCELLED or ESCALATED.
    pub fn is_settled(&self) -> bool {
        self.phases.iter().all(|p| p.state().is_terminal())
    }

    /// Id and dependency list of every phase, ignoring runtime state.
    pub fn structure(&self) -> Vec<(PhaseId, Role, Vec<PhaseId>)> {
        self.phases
            .iter()
            .map(|p| (p.id.clone(), p.role, p.dependencies.clone()))
            .collect()
    }

    /// Topological levels: wave `n` holds phases whose longest dependency
    /// chain has length `n`.
    pub fn waves(&self) -> Vec<Vec<PhaseId>> {
        let mut level: HashMap<&PhaseId, usize> = HashMap::new();
        let mut remaining: Vec<&Phase> = self.phases.iter().collect();

        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|phase| {
                let phase: &Phase = *phase;
                let deps: Option<Vec<usize>> = phase
                    .dependencies
                    .iter()
                    .map(|d| level.get(d).copied())
                    .collect();
                match deps {
                    Some(levels) => {
                        let own = levels.into_iter().max().map(|l| l + 1).unwrap_or(0);
                        level.insert(&phase.id, own);
                        false
                    }
                    None => true,
                }
            });
            if remaining.len() == before {
                break;
            }
        }

        let depth = level.values().copied().max().map(|l| l + 1).unwrap_or(0);
        let mut waves = vec![Vec::new(); depth];
        for phase in &self.phases {
            if let Some(l) = level.get(&phase.id) {
                waves[*l].push(phase.id.clone());
            }
        }
        waves
    }

    pub fn summary(&self) -> PlanSummary {
        let mut roles: BTreeMap<Role, usize> = BTreeMap::new();
        for phase in &self.phases {
            *roles.entry(phase.role).or_insert(0) += 1;
        }

        PlanSummary {
            task_id: self.task_id,
            phase_count: self.phases.len(),
            roles,
            roots: self
                .phases
                .iter()
                .filter(|p| p.dependencies.is_empty())
                .map(|p| p.id.clone())
                .collect(),
            waves: self.waves(),
            estimated_cost: self.phases.iter().filter_map(|p| p.estimated_cost).sum(),
        }
    }
}

/// Shape of an accepted plan, returned to the caller on submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub task_id: TaskId,
    pub phase_count: usize,
    pub roles: BTreeMap<Role, usize>,
    pub roots: Vec<PhaseId>,
    pub waves: Vec<Vec<PhaseId>>,
    pub estimated_cost: f64,
}

// ============================================================================
// Validation Failures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum PlanViolation {
    EmptyPlan,
    EmptyId { position: usize },
    DuplicateId { id: String },
    UnknownRole { phase: String, role: String },
    UnsupportedRole { phase: String, role: Role },
    MissingDependency { phase: String, dependency: String },
    /// Phase ids along the cycle, starting at the node the traversal re-entered.
    Cycle { path: Vec<PhaseId> },
}

impl fmt::Display for PlanViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanViolation::EmptyPlan => write!(f, "plan contains no phases"),
            PlanViolation::EmptyId { position } => {
                write!(f, "phase at position {} has an empty id", position)
            }
            PlanViolation::DuplicateId { id } => write!(f, "duplicate phase id '{}'", id),
            PlanViolation::UnknownRole { phase, role } => {
                write!(f, "phase '{}' uses unknown role '{}'", phase, role)
            }
            PlanViolation::UnsupportedRole { phase, role } => write!(
                f,
                "phase '{}' needs role '{}' which the agent pool does not serve",
                phase, role
            ),
            PlanViolation::MissingDependency { phase, dependency } => write!(
                f,
                "phase '{}' depends on '{}' which is not in the plan",
                phase, dependency
            ),
            PlanViolation::Cycle { path } => {
                let mut chain: Vec<&str> = path.iter().map(PhaseId::as_str).collect();
                if let Some(first) = path.first() {
                    chain.push(first.as_str());
                }
                write!(f, "dependency cycle {}", chain.join(" -> "))
            }
        }
    }
}

/// Rejection of a raw plan, carrying every violation that was found.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("plan rejected with {} violation(s): {}", .violations.len(), render(.violations))]
pub struct PlanValidationError {
    pub violations: Vec<PlanViolation>,
}

impl PlanValidationError {
    pub fn cycles(&self) -> impl Iterator<Item = &[PhaseId]> {
        self.violations.iter().filter_map(|v| match v {
            PlanViolation::Cycle { path } => Some(path.as_slice()),
            _ => None,
        })
    }
}

fn render(violations: &[PlanViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
