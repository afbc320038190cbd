// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Application Layer
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`bus`] | `CoordinationBus`, `MailboxReceiver`, `SendReport`, `BusError` |

pub mod bus;

pub use bus::*;
