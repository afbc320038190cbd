// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the persistence ports defined in
//! [`crate::domain::repository`].
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve plans, records and run outcomes
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryTaskRepository** - Thread-safe HashMap-backed task storage
//! - **InMemoryLearningStore** - Finished runs ranked by goal token overlap

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domain::plan::ExecutionPlan;
use crate::domain::record::{ExecutionRecord, RecordEntry};
use crate::domain::repository::{LearningStore, PastRun, RepositoryError, TaskRepository};
use crate::domain::task::{Goal, TaskId, TaskStatus};

#[derive(Default)]
struct TaskEntry {
    plan: Option<ExecutionPlan>,
    status: Option<TaskStatus>,
    record: Vec<RecordEntry>,
}

#[derive(Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<TaskId, TaskEntry>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn append_record(&self, task_id: TaskId, entry: &RecordEntry) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write();
        let record = &mut tasks.entry(task_id).or_default().record;
        if let Some(last) = record.last() {
            if entry.sequence <= last.sequence {
                return Err(RepositoryError::Storage(format!(
                    "record of task {} is append-only: sequence {} after {}",
                    task_id, entry.sequence, last.sequence
                )));
            }
        }
        record.push(entry.clone());
        Ok(())
    }

    async fn read_record(&self, task_id: TaskId) -> Result<Vec<RecordEntry>, RepositoryError> {
        Ok(self
            .tasks
            .read()
            .get(&task_id)
            .map(|t| t.record.clone())
            .unwrap_or_default())
    }

    async fn save_plan(&self, plan: &ExecutionPlan) -> Result<(), RepositoryError> {
        self.tasks
            .write()
            .entry(plan.task_id())
            .or_default()
            .plan = Some(plan.clone());
        Ok(())
    }

    async fn read_plan(&self, task_id: TaskId) -> Result<Option<ExecutionPlan>, RepositoryError> {
        Ok(self.tasks.read().get(&task_id).and_then(|t| t.plan.clone()))
    }

    async fn write_status(&self, task_id: TaskId, status: TaskStatus) -> Result<(), RepositoryError> {
        self.tasks.write().entry(task_id).or_default().status = Some(status);
        Ok(())
    }

    async fn read_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>, RepositoryError> {
        Ok(self.tasks.read().get(&task_id).and_then(|t| t.status))
    }
}

/// Finished runs kept in memory, ranked by Jaccard similarity of goal tokens.
#[derive(Clone, Default)]
pub struct InMemoryLearningStore {
    runs: Arc<RwLock<Vec<ExecutionRecord>>>,
}

impl InMemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[async_trait]
impl LearningStore for InMemoryLearningStore {
    async fn record_outcome(&self, record: &ExecutionRecord) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write();
        runs.retain(|r| r.task_id() != record.task_id());
        runs.push(record.clone());
        Ok(())
    }

    async fn similar_past_runs(&self, goal: &Goal, limit: usize) -> Result<Vec<PastRun>, RepositoryError> {
        let wanted = tokens(&goal.text);
        let mut ranked: Vec<PastRun> = self
            .runs
            .read()
            .iter()
            .filter_map(|record| {
                let similarity = jaccard(&wanted, &tokens(record.goal()));
                (similarity > 0.0).then(|| PastRun {
                    task_id: record.task_id(),
                    goal: record.goal().to_string(),
                    similarity,
                    status: record.final_status(),
                    outcomes: record.past_outcomes(),
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::RecordEvent;

    #[tokio::test]
    async fn test_record_is_append_only() {
        let repo = InMemoryTaskRepository::new();
        let task_id = TaskId::new();
        let mut record = ExecutionRecord::new(task_id, "goal");
        let first = record
            .append(RecordEvent::TaskStarted {
                goal: "goal".to_string(),
                phase_count: 1,
            })
            .clone();

        repo.append_record(task_id, &first).await.unwrap();
        assert!(repo.append_record(task_id, &first).await.is_err());
        assert_eq!(repo.read_record(task_id).await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let repo = InMemoryTaskRepository::new();
        let task_id = TaskId::new();
        assert_eq!(repo.read_status(task_id).await.unwrap(), None);

        repo.write_status(task_id, TaskStatus::Partial).await.unwrap();
        assert_eq!(repo.read_status(task_id).await.unwrap(), Some(TaskStatus::Partial));
    }

    #[tokio::test]
    async fn test_similar_runs_are_ranked() {
        let store = InMemoryLearningStore::new();
        let close = ExecutionRecord::new(TaskId::new(), "build a python web scraper");
        let far = ExecutionRecord::new(TaskId::new(), "write a python poem");
        let unrelated = ExecutionRecord::new(TaskId::new(), "paint the fence");
        for record in [&far, &close, &unrelated] {
            store.record_outcome(record).await.unwrap();
        }

        let runs = store
            .similar_past_runs(&Goal::new("python web scraper for news"), 5)
            .await
            .unwrap();

        let goals: Vec<&str> = runs.iter().map(|r| r.goal.as_str()).collect();
        assert_eq!(goals, vec!["build a python web scraper", "write a python poem"]);
        assert!(runs[0].similarity > runs[1].similarity);
    }

    #[tokio::test]
    async fn test_recording_twice_replaces_run() {
        let store = InMemoryLearningStore::new();
        let record = ExecutionRecord::new(TaskId::new(), "goal text here");
        store.record_outcome(&record).await.unwrap();
        store.record_outcome(&record).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
