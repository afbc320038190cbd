// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types and ports of the orchestrator. No I/O lives here; adapters
//! implementing the ports are in [`crate::infrastructure`].
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`task`] | `TaskId`, `Goal`, `TaskStatus`, `StatusReport` |
//! | [`phase`] | `Phase`, `PhaseId`, `PhaseState`, `RawPhase` |
//! | [`plan`] | `ExecutionPlan`, `PlanViolation`, `PlanValidationError` |
//! | [`role`] | `Role`, `RoleCatalog` |
//! | [`agent`] | `Agent`, `AgentId`, `AgentState` |
//! | [`recovery`] | `FailureClass`, `RecoveryStrategy`, `FailureClassifier` |
//! | [`record`] | `ExecutionRecord`, `RecordEvent` |
//! | [`events`] | `OrchestrationEvent` |
//! | [`runtime`] | `ExecutionEnvironment`, `AgentHandle` ports |
//! | [`planner`] | `Planner` port |
//! | [`repository`] | `TaskRepository`, `LearningStore` ports |
//! | [`coordination`] | `CoordinationPort` |
//! | [`config`] | `OrchestratorConfig` |

pub mod agent;
pub mod config;
pub mod coordination;
pub mod events;
pub mod phase;
pub mod plan;
pub mod planner;
pub mod record;
pub mod recovery;
pub mod repository;
pub mod role;
pub mod runtime;
pub mod task;
