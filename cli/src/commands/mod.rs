// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for Conductor CLI

pub mod config;
pub mod plan;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::plan::PlanCommand;
pub use self::run::RunArgs;
