// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Static Plan File Planner
//!
//! A [`Planner`] that returns a phase list read from a YAML or JSON document
//! instead of consulting a model. Used by the CLI and for reproducible runs.
//!
//! # Document Format
//!
//! Either a bare list of phases or a mapping with a `phases` key:
//!
//! ```yaml
//! phases:
//!   - id: research
//!     role: research
//!     description: Collect prior art
//!   - id: build
//!     role: code
//!     description: Implement the tool
//!     dependencies: [research]
//!     estimated_cost: 3.5
//! ```
//!
//! Repairs are deterministic: the failure is appended to the phase
//! instructions, and simplify mode also halves the estimated cost.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::domain::phase::{Phase, RawPhase};
use crate::domain::planner::{FailureContext, Planner, PlannerError, RepairMode};
use crate::domain::task::Goal;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlanDocument {
    List(Vec<RawPhase>),
    Wrapped { phases: Vec<RawPhase> },
}

#[derive(Debug, Clone)]
pub struct StaticPlanner {
    phases: Vec<RawPhase>,
}

impl StaticPlanner {
    pub fn new(phases: Vec<RawPhase>) -> Self {
        Self { phases }
    }

    /// Load a plan file. JSON is a subset of YAML, so one parser reads both.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read plan file {:?}: {}", path, e))?;
        Self::from_yaml_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse plan file {:?}: {}", path, e))
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let document: PlanDocument = serde_yaml::from_str(content)?;
        let phases = match document {
            PlanDocument::List(phases) => phases,
            PlanDocument::Wrapped { phases } => phases,
        };
        Ok(Self::new(phases))
    }

    pub fn phases(&self) -> &[RawPhase] {
        &self.phases
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn decompose(
        &self,
        _goal: &Goal,
        _context: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<RawPhase>, PlannerError> {
        if self.phases.is_empty() {
            return Err(PlannerError::Rejected("plan file contains no phases".to_string()));
        }
        Ok(self.phases.clone())
    }

    async fn repair_phase(
        &self,
        phase: &Phase,
        failure: &FailureContext,
    ) -> Result<RawPhase, PlannerError> {
        let (description, estimated_cost) = match failure.mode {
            RepairMode::AlternateApproach => (
                format!(
                    "{}\n\nAttempt {} failed ({}): {}\nUse a different approach.",
                    phase.description, failure.attempt, failure.classification, failure.error
                ),
                phase.estimated_cost,
            ),
            RepairMode::Simplify => (
                format!(
                    "{}\n\nAttempt {} ran out of resources: {}\nReduce the scope to the essential result.",
                    phase.description, failure.attempt, failure.error
                ),
                phase.estimated_cost.map(|cost| cost / 2.0),
            ),
        };

        Ok(RawPhase {
            id: phase.id.to_string(),
            description,
            role: phase.role.to_string(),
            dependencies: phase.dependencies.iter().map(|d| d.to_string()).collect(),
            estimated_cost,
        })
    }
}
