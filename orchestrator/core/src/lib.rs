// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `conductor-core` - Orchestration Core
//!
//! Decomposes a goal into a dependency-ordered plan of phases, runs the plan
//! on a bounded pool of role-specialized agents and recovers from partial
//! failures without aborting the whole task.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Plan validation, scheduling, agent pooling, recovery and
//!   the caller-facing orchestration service
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | entities, state machines, ports |
//! | [`application`] | Application | validator, scheduler, pool, recovery engine, task runner |
//! | [`infrastructure`] | Infrastructure | event bus, in-memory stores, file planner, process environment |

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
