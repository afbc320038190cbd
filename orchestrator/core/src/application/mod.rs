// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod validation;
pub mod scheduler;
pub mod pool;
pub mod recovery;
pub mod runner;
pub mod orchestration;

// Re-export use cases for convenience
pub use validation::PlanValidator;
pub use scheduler::{Scheduler, SchedulerError, Transition};
pub use pool::{AgentPoolManager, HealthIssue, HealthVerdict, Lease, PoolError};
pub use recovery::{RecoveryDecision, RecoveryEngine, RecoveryRequest, RecoveryResult};
pub use runner::{RunnerServices, TaskProgress, TaskRunner};
pub use orchestration::{
    CancelAck, OrchestrationDeps, OrchestrationError, OrchestrationService,
    StandardOrchestrationService, Submission,
};
