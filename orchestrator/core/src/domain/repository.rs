// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Interfaces
//!
//! Persistence ports for task state and cross-run learning. Implementations
//! live in the infrastructure layer.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Storage abstractions for plans, records and outcomes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::plan::ExecutionPlan;
use crate::domain::recovery::PastOutcome;
use crate::domain::record::{ExecutionRecord, RecordEntry};
use crate::domain::task::{Goal, TaskId, TaskStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn append_record(&self, task_id: TaskId, entry: &RecordEntry) -> Result<(), RepositoryError>;

    async fn read_record(&self, task_id: TaskId) -> Result<Vec<RecordEntry>, RepositoryError>;

    async fn save_plan(&self, plan: &ExecutionPlan) -> Result<(), RepositoryError>;

    async fn read_plan(&self, task_id: TaskId) -> Result<Option<ExecutionPlan>, RepositoryError>;

    async fn write_status(&self, task_id: TaskId, status: TaskStatus) -> Result<(), RepositoryError>;

    async fn read_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>, RepositoryError>;
}

/// A finished run that resembles the goal being planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastRun {
    pub task_id: TaskId,
    pub goal: String,
    /// Similarity to the queried goal, in `(0, 1]`.
    pub similarity: f64,
    pub status: Option<TaskStatus>,
    pub outcomes: Vec<PastOutcome>,
}

#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn record_outcome(&self, record: &ExecutionRecord) -> Result<(), RepositoryError>;

    /// Most similar finished runs first.
    async fn similar_past_runs(&self, goal: &Goal, limit: usize) -> Result<Vec<PastRun>, RepositoryError>;
}
