// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Shared Context
//!
//! Per-task key/value store with one version counter per key. Writes are
//! conditional on the version the writer last observed; version `0` means
//! "the key does not exist yet". Read-modify-write is always
//! read-version → compute → conditional write, retried on conflict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::message::Endpoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: serde_json::Value,
    pub version: u64,
    pub written_by: Endpoint,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWrite {
    pub key: String,
    pub value: serde_json::Value,
    pub observed_version: u64,
    pub writer: Endpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Version conflict on '{key}': observed {observed}, current {current}")]
    VersionConflict {
        key: String,
        observed: u64,
        current: u64,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedContext {
    entries: HashMap<String, VersionedValue>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&VersionedValue> {
        self.entries.get(key)
    }

    pub fn version(&self, key: &str) -> u64 {
        self.entries.get(key).map(|v| v.version).unwrap_or(0)
    }

    /// Apply the write if `observed_version` is current; returns the new version.
    pub fn apply(&mut self, write: ContextWrite) -> Result<u64, ContextError> {
        let current = self.version(&write.key);
        if write.observed_version != current {
            return Err(ContextError::VersionConflict {
                key: write.key,
                observed: write.observed_version,
                current,
            });
        }

        let version = current + 1;
        self.entries.insert(
            write.key,
            VersionedValue {
                value: write.value,
                version,
                written_by: write.writer,
                written_at: Utc::now(),
            },
        );
        Ok(version)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
