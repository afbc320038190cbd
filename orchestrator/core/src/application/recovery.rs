// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Recovery Engine
//!
//! Decides what happens to a FAILED phase. The failure is classified, the
//! per-phase and per-task budgets are checked, and then either the strategy
//! mapped to the failure class is applied (confident classification) or
//! sibling agents are asked for help (unknown or low-confidence
//! classification). Budget exhaustion, an unanswered help request or a
//! recovery action that itself fails escalates the phase.
//!
//! The engine never touches phase state. It returns a [`RecoveryDecision`]
//! together with the [`RecoveryAttempt`] to append to the execution record;
//! the task runner applies both through the scheduler.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Failure classification, strategy selection, budgets

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::config::RecoveryConfig;
use crate::domain::coordination::{CoordinationPort, HelpOutcome, HelpRequest};
use crate::domain::phase::{Phase, RawPhase};
use crate::domain::planner::{FailureContext, Planner, RepairMode};
use crate::domain::recovery::{
    AttemptOutcome, Classification, EscalationReason, FailureClass, FailureClassifier,
    PastOutcome, RecoveryAttempt, RecoveryStrategy,
};
use crate::domain::runtime::{AgentHandle, PhaseFailure};
use crate::domain::task::TaskId;

/// Everything the engine needs to decide on one failure.
pub struct RecoveryRequest {
    pub task_id: TaskId,
    /// Snapshot of the failed phase; `attempts()` is the number of runs so far.
    pub phase: Phase,
    pub failure: PhaseFailure,
    /// Recovery decisions already taken for this task.
    pub task_attempts: u32,
    /// The agent that ran the failed attempt, if it is still alive.
    pub agent: Option<Arc<dyn AgentHandle>>,
    /// Outcomes of earlier recoveries, in this task and in similar past runs.
    pub history: Vec<PastOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDecision {
    Retry {
        delay: Duration,
        /// Discard the agent that failed and lease a new one.
        fresh_agent: bool,
        /// Replacement instructions from the planner.
        revised: Option<RawPhase>,
        /// Suggestion from a sibling agent, passed to the next attempt.
        hint: Option<String>,
    },
    Escalate {
        reason: EscalationReason,
    },
}

impl RecoveryDecision {
    pub fn is_retry(&self) -> bool {
        matches!(self, RecoveryDecision::Retry { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub decision: RecoveryDecision,
    pub attempt: RecoveryAttempt,
}

pub struct RecoveryEngine {
    config: RecoveryConfig,
    classifier: Arc<dyn FailureClassifier>,
    planner: Arc<dyn Planner>,
    coordination: Arc<dyn CoordinationPort>,
}

impl RecoveryEngine {
    pub fn new(
        config: RecoveryConfig,
        classifier: Arc<dyn FailureClassifier>,
        planner: Arc<dyn Planner>,
        coordination: Arc<dyn CoordinationPort>,
    ) -> Self {
        Self {
            config,
            classifier,
            planner,
            coordination,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub async fn recover(&self, request: RecoveryRequest) -> RecoveryResult {
        let classification = self.classifier.classify(&request.failure, &request.history);
        let attempts = request.phase.attempts();
        debug!(
            "Phase '{}' failure classified as {} ({:.2})",
            request.phase.id, classification.class, classification.confidence
        );

        let (strategy, decision) = if attempts >= self.config.max_attempts_per_phase {
            (
                RecoveryStrategy::Escalate,
                RecoveryDecision::Escalate {
                    reason: EscalationReason::PhaseBudgetExhausted {
                        attempts,
                        max: self.config.max_attempts_per_phase,
                    },
                },
            )
        } else if request.task_attempts >= self.config.max_task_recovery_attempts {
            (
                RecoveryStrategy::Escalate,
                RecoveryDecision::Escalate {
                    reason: EscalationReason::TaskBudgetExhausted {
                        attempts: request.task_attempts,
                        max: self.config.max_task_recovery_attempts,
                    },
                },
            )
        } else if self.is_confident(&classification) {
            let strategy = classification.class.default_strategy();
            let decision = self.apply(strategy, &classification, &request).await;
            (strategy, decision)
        } else {
            let decision = self.request_help(&classification, &request).await;
            (RecoveryStrategy::RequestHelp, decision)
        };

        let (outcome, escalation) = match &decision {
            RecoveryDecision::Retry { .. } => (AttemptOutcome::RetryScheduled, None),
            RecoveryDecision::Escalate { reason } => (AttemptOutcome::Escalated, Some(reason.clone())),
        };

        metrics::counter!("conductor_recovery_attempts_total", "strategy" => strategy.as_str())
            .increment(1);
        match &escalation {
            Some(reason) => warn!(
                "Escalating phase '{}' after {} attempt(s): {}",
                request.phase.id, attempts, reason
            ),
            None => info!(
                "Recovering phase '{}' with {} (attempt {})",
                request.phase.id, strategy, attempts
            ),
        }

        RecoveryResult {
            decision,
            attempt: RecoveryAttempt {
                phase_id: request.phase.id.clone(),
                attempt: attempts,
                classification: classification.class,
                strategy,
                confidence: classification.confidence,
                outcome,
                escalation,
                error: request.failure.message.clone(),
                at: Utc::now(),
            },
        }
    }

    fn is_confident(&self, classification: &Classification) -> bool {
        classification.class != FailureClass::Unknown
            && classification.confidence > self.config.confidence_threshold
    }

    async fn apply(
        &self,
        strategy: RecoveryStrategy,
        classification: &Classification,
        request: &RecoveryRequest,
    ) -> RecoveryDecision {
        match strategy {
            RecoveryStrategy::RetryWithBackoff => RecoveryDecision::Retry {
                delay: self.config.backoff_for(request.phase.attempts()),
                fresh_agent: false,
                revised: None,
                hint: None,
            },
            RecoveryStrategy::InstallDependency => self.install(classification, request).await,
            RecoveryStrategy::AlternateApproach => {
                self.repair(RepairMode::AlternateApproach, classification, request, true)
                    .await
            }
            RecoveryStrategy::SimplifyTask => {
                self.repair(RepairMode::Simplify, classification, request, false)
                    .await
            }
            RecoveryStrategy::RequestHelp => self.request_help(classification, request).await,
            RecoveryStrategy::Escalate => RecoveryDecision::Escalate {
                reason: EscalationReason::RecoveryActionFailed {
                    detail: "no automatic strategy".to_string(),
                },
            },
        }
    }

    async fn install(&self, classification: &Classification, request: &RecoveryRequest) -> RecoveryDecision {
        let Some(dependency) = classification.dependency.as_deref() else {
            return action_failed("missing dependency could not be identified");
        };
        let Some(agent) = request.agent.as_ref() else {
            return action_failed("no live agent to install into");
        };

        match agent.install(dependency).await {
            Ok(()) => {
                info!("Installed '{}' for phase '{}'", dependency, request.phase.id);
                RecoveryDecision::Retry {
                    delay: Duration::ZERO,
                    fresh_agent: false,
                    revised: None,
                    hint: None,
                }
            }
            Err(e) => action_failed(e.to_string()),
        }
    }

    async fn repair(
        &self,
        mode: RepairMode,
        classification: &Classification,
        request: &RecoveryRequest,
        fresh_agent: bool,
    ) -> RecoveryDecision {
        let context = FailureContext {
            phase_id: request.phase.id.clone(),
            classification: classification.class,
            error: request.failure.to_string(),
            attempt: request.phase.attempts(),
            mode,
        };

        match self.planner.repair_phase(&request.phase, &context).await {
            Ok(revised) => RecoveryDecision::Retry {
                delay: Duration::ZERO,
                fresh_agent,
                revised: Some(revised),
                hint: None,
            },
            Err(e) => action_failed(e.to_string()),
        }
    }

    async fn request_help(&self, classification: &Classification, request: &RecoveryRequest) -> RecoveryDecision {
        let help = HelpRequest {
            task_id: request.task_id,
            phase_id: request.phase.id.clone(),
            role: request.phase.role,
            problem: request.failure.to_string(),
            classification: classification.class,
        };

        match self
            .coordination
            .request_help(help, self.config.help_timeout)
            .await
        {
            HelpOutcome::Help(response) => {
                info!(
                    "Agent {} offered help for phase '{}'",
                    response.responder, request.phase.id
                );
                RecoveryDecision::Retry {
                    delay: Duration::ZERO,
                    fresh_agent: true,
                    revised: None,
                    hint: Some(response.suggestion),
                }
            }
            HelpOutcome::NoHelp => RecoveryDecision::Escalate {
                reason: EscalationReason::NoHelpAvailable,
            },
        }
    }
}

fn action_failed(detail: impl Into<String>) -> RecoveryDecision {
    RecoveryDecision::Escalate {
        reason: EscalationReason::RecoveryActionFailed {
            detail: detail.into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use crate::domain::coordination::HelpResponse;
    use crate::domain::phase::{PhaseId, PhaseState};
    use crate::domain::planner::PlannerError;
    use crate::domain::recovery::HeuristicClassifier;
    use crate::domain::role::Role;
    use crate::domain::runtime::{PhaseAssignment, PhaseOutput, RuntimeError};
    use crate::domain::task::Goal;
    use async_trait::async_trait;
    use chrono::DateTime;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct RepairingPlanner {
        modes: Mutex<Vec<RepairMode>>,
    }

    #[async_trait]
    impl Planner for RepairingPlanner {
        async fn decompose(
            &self,
            _goal: &Goal,
            _context: &HashMap<String, serde_json::Value>,
        ) -> Result<Vec<RawPhase>, PlannerError> {
            Ok(Vec::new())
        }

        async fn repair_phase(
            &self,
            phase: &Phase,
            failure: &FailureContext,
        ) -> Result<RawPhase, PlannerError> {
            self.modes.lock().push(failure.mode);
            Ok(RawPhase {
                id: phase.id.to_string(),
                description: format!("{} (revised)", phase.description),
                role: phase.role.to_string(),
                dependencies: Vec::new(),
                estimated_cost: None,
            })
        }
    }

    struct FixedHelp(Option<String>);

    #[async_trait]
    impl CoordinationPort for FixedHelp {
        async fn join(&self, _task_id: TaskId, _agent_id: AgentId, _role: Role) {}

        async fn leave(&self, _task_id: TaskId, _agent_id: AgentId) {}

        async fn request_help(&self, _request: HelpRequest, _timeout: Duration) -> HelpOutcome {
            match &self.0 {
                Some(suggestion) => HelpOutcome::Help(HelpResponse {
                    responder: AgentId::new(),
                    suggestion: suggestion.clone(),
                }),
                None => HelpOutcome::NoHelp,
            }
        }

        async fn close_task(&self, _task_id: TaskId) {}
    }

    struct InstallingAgent {
        installed: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl AgentHandle for InstallingAgent {
        async fn run(&self, _assignment: PhaseAssignment) -> Result<PhaseOutput, PhaseFailure> {
            Ok(PhaseOutput::new(serde_json::Value::Null))
        }

        async fn install(&self, dependency: &str) -> Result<(), RuntimeError> {
            if self.fail {
                return Err(RuntimeError::InstallFailed(dependency.to_string()));
            }
            self.installed.lock().push(dependency.to_string());
            Ok(())
        }

        async fn terminate(&self) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn heartbeat(&self) -> Result<DateTime<Utc>, RuntimeError> {
            Ok(Utc::now())
        }
    }

    fn engine(help: Option<&str>) -> (RecoveryEngine, Arc<RepairingPlanner>) {
        let planner = Arc::new(RepairingPlanner {
            modes: Mutex::new(Vec::new()),
        });
        let engine = RecoveryEngine::new(
            RecoveryConfig::default(),
            Arc::new(HeuristicClassifier::new()),
            planner.clone(),
            Arc::new(FixedHelp(help.map(str::to_string))),
        );
        (engine, planner)
    }

    /// A phase that has run `runs` times and is now FAILED.
    fn failed_phase(runs: u32) -> Phase {
        let mut phase = Phase::new(PhaseId::new("build"), "build it".to_string(), Role::Code, Vec::new(), Some(4.0));
        for i in 0..runs {
            if i > 0 {
                phase.transition_to(PhaseState::Recovering).unwrap();
                phase.transition_to(PhaseState::Pending).unwrap();
            }
            phase.transition_to(PhaseState::Ready).unwrap();
            phase.transition_to(PhaseState::Assigned).unwrap();
            phase.transition_to(PhaseState::Running).unwrap();
            phase.fail("boom").unwrap();
        }
        phase
    }

    fn request(phase: Phase, failure: PhaseFailure) -> RecoveryRequest {
        RecoveryRequest {
            task_id: TaskId::new(),
            phase,
            failure,
            task_attempts: 0,
            agent: None,
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_retries_with_backoff() {
        let (engine, _) = engine(None);
        let result = engine
            .recover(request(failed_phase(2), PhaseFailure::new("connection reset by peer")))
            .await;

        assert_eq!(
            result.decision,
            RecoveryDecision::Retry {
                delay: Duration::from_secs(4),
                fresh_agent: false,
                revised: None,
                hint: None,
            }
        );
        assert_eq!(result.attempt.strategy, RecoveryStrategy::RetryWithBackoff);
        assert_eq!(result.attempt.outcome, AttemptOutcome::RetryScheduled);
        assert_eq!(result.attempt.attempt, 2);
    }

    #[tokio::test]
    async fn test_phase_budget_forces_escalation() {
        let (engine, _) = engine(Some("try harder"));
        let result = engine
            .recover(request(failed_phase(3), PhaseFailure::new("connection reset by peer")))
            .await;

        assert_eq!(
            result.decision,
            RecoveryDecision::Escalate {
                reason: EscalationReason::PhaseBudgetExhausted { attempts: 3, max: 3 },
            }
        );
        assert_eq!(result.attempt.outcome, AttemptOutcome::Escalated);
        assert_eq!(result.attempt.classification, FailureClass::TransientInfra);
    }

    #[tokio::test]
    async fn test_task_budget_forces_escalation() {
        let (engine, _) = engine(None);
        let mut req = request(failed_phase(1), PhaseFailure::new("connection reset by peer"));
        req.task_attempts = 10;

        let result = engine.recover(req).await;
        assert!(matches!(
            result.decision,
            RecoveryDecision::Escalate {
                reason: EscalationReason::TaskBudgetExhausted { attempts: 10, max: 10 }
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_dependency_is_installed_before_retry() {
        let (engine, _) = engine(None);
        let agent = Arc::new(InstallingAgent {
            installed: Mutex::new(Vec::new()),
            fail: false,
        });
        let mut req = request(failed_phase(1), PhaseFailure::new("No module named 'requests'"));
        req.agent = Some(agent.clone());

        let result = engine.recover(req).await;
        assert!(result.decision.is_retry());
        assert_eq!(result.attempt.strategy, RecoveryStrategy::InstallDependency);
        assert_eq!(*agent.installed.lock(), vec!["requests".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_install_escalates() {
        let (engine, _) = engine(None);
        let mut req = request(failed_phase(1), PhaseFailure::new("No module named 'requests'"));
        req.agent = Some(Arc::new(InstallingAgent {
            installed: Mutex::new(Vec::new()),
            fail: true,
        }));

        let result = engine.recover(req).await;
        assert!(matches!(
            result.decision,
            RecoveryDecision::Escalate {
                reason: EscalationReason::RecoveryActionFailed { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_logic_error_asks_planner_for_alternate_approach() {
        let (engine, planner) = engine(None);
        let result = engine
            .recover(request(failed_phase(1), PhaseFailure::new("AssertionError: expected 3")))
            .await;

        match result.decision {
            RecoveryDecision::Retry {
                fresh_agent,
                revised: Some(revised),
                ..
            } => {
                assert!(fresh_agent);
                assert_eq!(revised.description, "build it (revised)");
            }
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(*planner.modes.lock(), vec![RepairMode::AlternateApproach]);
    }

    #[tokio::test]
    async fn test_resource_exhaustion_simplifies() {
        let (engine, planner) = engine(None);
        let result = engine
            .recover(request(failed_phase(1), PhaseFailure::new("quota exceeded for project")))
            .await;

        assert_eq!(result.attempt.strategy, RecoveryStrategy::SimplifyTask);
        assert!(result.decision.is_retry());
        assert_eq!(*planner.modes.lock(), vec![RepairMode::Simplify]);
    }

    #[tokio::test]
    async fn test_unknown_failure_uses_sibling_help() {
        let (engine, _) = engine(Some("set the locale first"));
        let result = engine
            .recover(request(failed_phase(1), PhaseFailure::new("it just stopped")))
            .await;

        assert_eq!(result.attempt.strategy, RecoveryStrategy::RequestHelp);
        assert!(matches!(
            result.decision,
            RecoveryDecision::Retry { hint: Some(ref h), fresh_agent: true, .. } if h == "set the locale first"
        ));
    }

    #[tokio::test]
    async fn test_unanswered_help_escalates() {
        let (engine, _) = engine(None);
        let result = engine
            .recover(request(failed_phase(1), PhaseFailure::new("it just stopped")))
            .await;

        assert_eq!(
            result.decision,
            RecoveryDecision::Escalate {
                reason: EscalationReason::NoHelpAvailable,
            }
        );
        assert_eq!(result.attempt.classification, FailureClass::Unknown);
    }

    #[tokio::test]
    async fn test_failed_retry_history_still_retries() {
        let (engine, _) = engine(None);
        let mut req = request(failed_phase(1), PhaseFailure::new("connection reset by peer"));
        req.history = (0..3)
            .map(|_| PastOutcome {
                class: FailureClass::TransientInfra,
                strategy: RecoveryStrategy::RetryWithBackoff,
                succeeded: false,
            })
            .collect();

        let result = engine.recover(req).await;
        assert!(result.decision.is_retry());
        assert_eq!(result.attempt.strategy, RecoveryStrategy::RetryWithBackoff);
        assert!(result.attempt.confidence < 0.8);
    }
}
