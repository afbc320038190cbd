// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Planner Port
//!
//! Turns a goal into a raw phase list, and rewrites single phases when the
//! recovery engine asks for another way to do them.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Interface to the external planning component

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::phase::{Phase, PhaseId, RawPhase};
use crate::domain::recovery::FailureClass;
use crate::domain::task::Goal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    /// Same scope, different method.
    AlternateApproach,
    /// Reduced scope or cost.
    Simplify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureContext {
    pub phase_id: PhaseId,
    pub classification: FailureClass,
    pub error: String,
    pub attempt: u32,
    pub mode: RepairMode,
}

#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    #[error("Planner unavailable: {0}")]
    Unavailable(String),

    #[error("Planner could not produce a plan: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Break a goal into phases. `context` carries hints such as outcomes of
    /// similar past runs.
    async fn decompose(
        &self,
        goal: &Goal,
        context: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<RawPhase>, PlannerError>;

    /// Produce replacement instructions for a failed phase. The returned
    /// phase keeps the id, role and dependencies of the original.
    async fn repair_phase(
        &self,
        phase: &Phase,
        failure: &FailureContext,
    ) -> Result<RawPhase, PlannerError>;
}
