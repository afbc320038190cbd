// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod event_bus;
pub mod planner;
pub mod process_runtime;
pub mod coordination;

pub use coordination::DetachedCoordination;
pub use event_bus::{EventBus, EventBusError, EventReceiver, TaskEventReceiver};
pub use planner::StaticPlanner;
pub use process_runtime::{ProcessAgent, ProcessEnvironment};
pub use repositories::{InMemoryLearningStore, InMemoryTaskRepository};
