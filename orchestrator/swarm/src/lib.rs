// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `conductor-swarm` - Coordination Bus
//!
//! Messaging and shared state for the agents of one Conductor task (a
//! **Swarm**). Every task id gets an isolated channel set: mailboxes, a
//! versioned shared context, synchronization points and a bounded message
//! history. Nothing is shared across tasks.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Swarm`, `Message`, `Outbox`, `SharedContext`, `SyncPoint` |
//! | [`application`] | Application | `CoordinationBus` |
//!
//! ## Key Concepts
//!
//! - **Delivery**: direct, task-scoped broadcast and help request/response.
//!   At-least-once with per-(sender, destination) sequence numbers; the bus
//!   drops re-delivered messages.
//! - **SharedContext**: optimistic concurrency. A write carries the version
//!   the writer last observed and is rejected if the key moved on.
//! - **Help**: the orchestrator broadcasts a problem to sibling agents and
//!   waits a bounded time; silence resolves to `NoHelp`, never an error.
//!
//! ⚠️ Channels live in memory only; a restarted orchestrator starts with an
//! empty bus.

pub mod domain;
pub mod application;

pub use domain::*;
pub use application::*;
