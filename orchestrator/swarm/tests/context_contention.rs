// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use conductor_core::domain::agent::AgentId;
use conductor_core::domain::config::BusConfig;
use conductor_core::domain::role::Role;
use conductor_core::domain::task::TaskId;
use conductor_swarm::{BusError, ContextError, ContextWrite, CoordinationBus, Endpoint};
use serde_json::json;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_on_same_version_have_one_winner() {
    let bus = Arc::new(CoordinationBus::new(BusConfig::default()));
    let task = TaskId::new();
    let writers: Vec<AgentId> = (0..8).map(|_| AgentId::new()).collect();
    for writer in &writers {
        bus.add_member(task, *writer, Role::Code).unwrap();
    }

    let handles: Vec<_> = writers
        .iter()
        .map(|writer| {
            let bus = bus.clone();
            let writer = *writer;
            tokio::spawn(async move {
                bus.write_context(
                    task,
                    ContextWrite {
                        key: "design".to_string(),
                        value: json!(writer.to_string()),
                        observed_version: 0,
                        writer: Endpoint::Agent(writer),
                    },
                )
            })
        })
        .collect();

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(version) => {
                assert_eq!(version, 1);
                winners += 1;
            }
            Err(BusError::Context(ContextError::VersionConflict { observed, current, .. })) => {
                assert_eq!((observed, current), (0, 1));
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(conflicts, writers.len() - 1);

    let stored = bus.read_context(task, "design").unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.value, json!(stored.written_by.to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_with_retry_lose_nothing() {
    let bus = Arc::new(CoordinationBus::new(BusConfig::default()));
    let task = TaskId::new();
    bus.open_task(task);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.update_context(task, "completed", Endpoint::Orchestrator, 64, |current| {
                    json!(current.and_then(|v| v.as_u64()).unwrap_or(0) + 1)
                })
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = bus.read_context(task, "completed").unwrap();
    assert_eq!(stored.value, json!(16));
    assert_eq!(stored.version, 16);
}
