// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Plan Validator
//!
//! Turns a planner's raw phase list into an [`ExecutionPlan`], or rejects it
//! with every violation found. The validator never repairs a plan.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pure raw-plan to DAG transform

use std::collections::{HashMap, HashSet};

use crate::domain::phase::{Phase, PhaseId, RawPhase};
use crate::domain::plan::{ExecutionPlan, PlanValidationError, PlanViolation};
use crate::domain::role::{RoleCatalog, RoleError};
use crate::domain::task::TaskId;

#[derive(Debug, Clone, Default)]
pub struct PlanValidator {
    catalog: RoleCatalog,
}

impl PlanValidator {
    pub fn new(catalog: RoleCatalog) -> Self {
        Self { catalog }
    }

    pub fn validate(
        &self,
        task_id: TaskId,
        raw: &[RawPhase],
    ) -> Result<ExecutionPlan, PlanValidationError> {
        if raw.is_empty() {
            return Err(PlanValidationError {
                violations: vec![PlanViolation::EmptyPlan],
            });
        }

        let mut violations = Vec::new();

        // Index of the first declaration of each id.
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut duplicates: HashSet<&str> = HashSet::new();
        for (position, phase) in raw.iter().enumerate() {
            let id = phase.id.trim();
            if id.is_empty() {
                violations.push(PlanViolation::EmptyId { position });
                continue;
            }
            if index.contains_key(id) {
                if duplicates.insert(id) {
                    violations.push(PlanViolation::DuplicateId { id: id.to_string() });
                }
            } else {
                index.insert(id, position);
            }
        }

        let mut roles = Vec::with_capacity(raw.len());
        for phase in raw {
            match self.catalog.resolve(&phase.role) {
                Ok(role) => roles.push(Some(role)),
                Err(RoleError::Unknown(role)) => {
                    violations.push(PlanViolation::UnknownRole {
                        phase: phase.id.trim().to_string(),
                        role,
                    });
                    roles.push(None);
                }
                Err(RoleError::Unsupported(role)) => {
                    violations.push(PlanViolation::UnsupportedRole {
                        phase: phase.id.trim().to_string(),
                        role,
                    });
                    roles.push(None);
                }
            }
        }

        for phase in raw {
            for dependency in &phase.dependencies {
                if !index.contains_key(dependency.trim()) {
                    violations.push(PlanViolation::MissingDependency {
                        phase: phase.id.trim().to_string(),
                        dependency: dependency.trim().to_string(),
                    });
                }
            }
        }

        for path in find_cycles(raw, &index) {
            violations.push(PlanViolation::Cycle { path });
        }

        if !violations.is_empty() {
            return Err(PlanValidationError { violations });
        }

        let phases = raw
            .iter()
            .zip(roles)
            .filter_map(|(phase, role)| {
                let role = role?;
                let mut dependencies: Vec<PhaseId> = Vec::with_capacity(phase.dependencies.len());
                for dependency in &phase.dependencies {
                    let dependency = PhaseId::new(dependency.trim());
                    if !dependencies.contains(&dependency) {
                        dependencies.push(dependency);
                    }
                }
                Some(Phase::new(
                    PhaseId::new(phase.id.trim()),
                    phase.description.clone(),
                    role,
                    dependencies,
                    phase.estimated_cost,
                ))
            })
            .collect();

        Ok(ExecutionPlan::from_validated(task_id, phases))
    }
}

/// Depth-first search over dependency edges, roots taken in declaration
/// order. Every back-edge yields the cycle from the re-entered node to the
/// current one; rotations of an already reported cycle are skipped.
fn find_cycles(raw: &[RawPhase], index: &HashMap<&str, usize>) -> Vec<Vec<PhaseId>> {
    fn visit(
        node: usize,
        raw: &[RawPhase],
        index: &HashMap<&str, usize>,
        visited: &mut [bool],
        stack: &mut Vec<usize>,
        on_stack: &mut [bool],
        cycles: &mut Vec<Vec<usize>>,
    ) {
        visited[node] = true;
        on_stack[node] = true;
        stack.push(node);

        for dependency in &raw[node].dependencies {
            let Some(&next) = index.get(dependency.trim()) else {
                continue;
            };
            if on_stack[next] {
                if let Some(start) = stack.iter().position(|n| *n == next) {
                    cycles.push(stack[start..].to_vec());
                }
            } else if !visited[next] {
                visit(next, raw, index, visited, stack, on_stack, cycles);
            }
        }

        stack.pop();
        on_stack[node] = false;
    }

    let mut visited = vec![false; raw.len()];
    let mut on_stack = vec![false; raw.len()];
    let mut stack = Vec::new();
    let mut found: Vec<Vec<usize>> = Vec::new();

    for node in 0..raw.len() {
        // Later duplicates of an id are not graph nodes.
        if index.get(raw[node].id.trim()) != Some(&node) {
            continue;
        }
        if !visited[node] {
            visit(node, raw, index, &mut visited, &mut stack, &mut on_stack, &mut found);
        }
    }

    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    let mut cycles = Vec::new();
    for cycle in found {
        if seen.insert(canonical(&cycle)) {
            cycles.push(
                cycle
                    .into_iter()
                    .map(|n| PhaseId::new(raw[n].id.trim()))
                    .collect(),
            );
        }
    }
    cycles
}

fn canonical(cycle: &[usize]) -> Vec<usize> {
    let pivot = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[pivot..].iter().chain(&cycle[..pivot]).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::Role;

    fn raw(id: &str, role: &str, deps: &[&str]) -> RawPhase {
        RawPhase {
            id: id.to_string(),
            description: format!("phase {}", id),
            role: role.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            estimated_cost: None,
        }
    }

    fn ids(path: &[PhaseId]) -> Vec<&str> {
        path.iter().map(PhaseId::as_str).collect()
    }

    #[test]
    fn test_valid_plan_keeps_declaration_order() {
        let plan = PlanValidator::default()
            .validate(
                TaskId::new(),
                &[raw("1", "code", &[]), raw("2", "qa", &["1"]), raw("3", "coding", &["1", "1"])],
            )
            .unwrap();

        let order: Vec<&str> = plan.phases().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "3"]);
        assert_eq!(plan.phases()[2].role, Role::Code);
        assert_eq!(plan.phases()[2].dependencies, vec![PhaseId::new("1")]);
    }

    #[test]
    fn test_two_node_cycle_reports_exact_path() {
        let err = PlanValidator::default()
            .validate(TaskId::new(), &[raw("1", "code", &["2"]), raw("2", "code", &["1"])])
            .unwrap_err();

        let cycles: Vec<Vec<&str>> = err.cycles().map(ids).collect();
        assert_eq!(cycles, vec![vec!["1", "2"]]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = PlanValidator::default()
            .validate(TaskId::new(), &[raw("a", "code", &["a"])])
            .unwrap_err();
        let cycles: Vec<Vec<&str>> = err.cycles().map(ids).collect();
        assert_eq!(cycles, vec![vec!["a"]]);
    }

    #[test]
    fn test_all_violations_are_reported_together() {
        let err = PlanValidator::new(RoleCatalog::new([Role::Code]))
            .validate(
                TaskId::new(),
                &[
                    raw("a", "code", &["ghost"]),
                    raw("a", "code", &[]),
                    raw("b", "astronaut", &[]),
                    raw("c", "writer", &[]),
                    raw("", "code", &[]),
                ],
            )
            .unwrap_err();

        assert!(err.violations.contains(&PlanViolation::MissingDependency {
            phase: "a".to_string(),
            dependency: "ghost".to_string(),
        }));
        assert!(err
            .violations
            .contains(&PlanViolation::DuplicateId { id: "a".to_string() }));
        assert!(err.violations.contains(&PlanViolation::UnknownRole {
            phase: "b".to_string(),
            role: "astronaut".to_string(),
        }));
        assert!(err.violations.contains(&PlanViolation::UnsupportedRole {
            phase: "c".to_string(),
            role: Role::Writer,
        }));
        assert!(err.violations.contains(&PlanViolation::EmptyId { position: 4 }));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let validator = PlanValidator::default();
        let task_id = TaskId::new();
        let phases = [
            raw("fetch", "research", &[]),
            raw("build", "code", &["fetch"]),
            raw("docs", "writer", &["fetch"]),
            raw("check", "qa", &["build", "docs"]),
        ];

        let shape = |plan: &ExecutionPlan| -> Vec<(PhaseId, Role, Vec<PhaseId>)> {
            plan.phases()
                .iter()
                .map(|p| (p.id.clone(), p.role, p.dependencies.clone()))
                .collect()
        };

        let first = validator.validate(task_id, &phases).unwrap();
        let second = validator.validate(task_id, &phases).unwrap();
        assert_eq!(shape(&first), shape(&second));
        assert_eq!(first.summary(), second.summary());

        let broken = [raw("a", "code", &["b"]), raw("b", "code", &["a", "ghost"])];
        let first = validator.validate(task_id, &broken).unwrap_err();
        let second = validator.validate(task_id, &broken).unwrap_err();
        assert_eq!(first.violations, second.violations);
    }

    #[test]
    fn test_empty_plan_is_rejected() {
        let err = PlanValidator::default().validate(TaskId::new(), &[]).unwrap_err();
        assert_eq!(err.violations, vec![PlanViolation::EmptyPlan]);
    }

    #[test]
    fn test_rotations_are_reported_once() {
        let err = PlanValidator::default()
            .validate(
                TaskId::new(),
                &[
                    raw("x", "code", &["y"]),
                    raw("y", "code", &["z"]),
                    raw("z", "code", &["x"]),
                ],
            )
            .unwrap_err();
        let cycles: Vec<Vec<&str>> = err.cycles().map(ids).collect();
        assert_eq!(cycles, vec![vec!["x", "y", "z"]]);
    }
}
