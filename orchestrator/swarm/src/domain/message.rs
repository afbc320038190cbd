// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Messages
//!
//! Unit of coordination bus traffic. Wire shape:
//!
//! ```json
//! {"from": "orchestrator", "to": "broadcast", "type": "help_request",
//!  "payload": {...}, "sequence": 7, "timestamp": 1767225600000}
//! ```
//!
//! `from`/`to` are `"orchestrator"`, `"broadcast"` (only as `to`) or an agent
//! UUID. `timestamp` is milliseconds since the Unix epoch. Messages are
//! immutable once sent.

use chrono::Utc;
use conductor_core::domain::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const ORCHESTRATOR: &str = "orchestrator";
const BROADCAST: &str = "broadcast";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Endpoint {
    Orchestrator,
    /// Every member of the task except the sender.
    Broadcast,
    Agent(AgentId),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Orchestrator => f.write_str(ORCHESTRATOR),
            Endpoint::Broadcast => f.write_str(BROADCAST),
            Endpoint::Agent(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ORCHESTRATOR => Ok(Endpoint::Orchestrator),
            BROADCAST => Ok(Endpoint::Broadcast),
            other => Uuid::parse_str(other)
                .map(|uuid| Endpoint::Agent(AgentId::from_uuid(uuid)))
                .map_err(|_| format!("invalid endpoint '{}'", other)),
        }
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgentId> for Endpoint {
    fn from(id: AgentId) -> Self {
        Endpoint::Agent(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Direct,
    Broadcast,
    StatusUpdate,
    DataShare,
    HelpRequest,
    HelpResponse,
    ContextWrite,
    Coordination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: Endpoint,
    pub to: Endpoint,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    /// Monotonic per (from, to); starts at 1.
    pub sequence: u64,
    pub timestamp: u64,
}

impl Message {
    pub fn new(
        from: Endpoint,
        to: Endpoint,
        message_type: MessageType,
        payload: serde_json::Value,
        sequence: u64,
    ) -> Self {
        Self {
            from,
            to,
            message_type,
            payload,
            sequence,
            timestamp: Utc::now().timestamp_millis().max(0) as u64,
        }
    }
}

/// Sender-side sequence numbering, one counter per destination.
#[derive(Debug, Clone)]
pub struct Outbox {
    owner: Endpoint,
    next: HashMap<Endpoint, u64>,
}

impl Outbox {
    pub fn new(owner: Endpoint) -> Self {
        Self {
            owner,
            next: HashMap::new(),
        }
    }

    pub fn owner(&self) -> Endpoint {
        self.owner
    }

    pub fn compose(
        &mut self,
        to: Endpoint,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Message {
        let counter = self.next.entry(to).or_insert(0);
        *counter += 1;
        Message::new(self.owner, to, message_type, payload, *counter)
    }
}
