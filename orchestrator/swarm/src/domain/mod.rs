// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types for multi-agent coordination. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`swarm`] | `Swarm`, `SwarmError` |
//! | [`message`] | `Message`, `Endpoint`, `MessageType`, `Outbox` |
//! | [`context`] | `SharedContext`, `VersionedValue`, `ContextWrite` |
//! | [`sync`] | `SyncPoint` |

pub mod context;
pub mod message;
pub mod swarm;
pub mod sync;

pub use context::*;
pub use message::*;
pub use swarm::*;
pub use sync::*;
