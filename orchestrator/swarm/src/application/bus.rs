// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordination Bus
//!
//! Per-task message routing, shared context and synchronization points.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Implements [`CoordinationPort`] for the orchestrator and the
//!   agent-facing messaging surface
//!
//! All state sits behind one `parking_lot::Mutex`; no lock is held across an
//! `.await`. Mailboxes are unbounded `mpsc` channels whose receiving half is
//! parked until its owner claims it.

use async_trait::async_trait;
use conductor_core::domain::agent::AgentId;
use conductor_core::domain::config::BusConfig;
use conductor_core::domain::coordination::{
    CoordinationPort, HelpOutcome, HelpRequest, HelpResponse,
};
use conductor_core::domain::role::Role;
use conductor_core::domain::task::TaskId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::domain::{
    ContextError, ContextWrite, Endpoint, Message, MessageType, Outbox, SharedContext, Swarm,
    SwarmError, SyncPoint, VersionedValue,
};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Task {0} has no coordination channel")]
    UnknownTask(TaskId),

    #[error("Channels of task {0} are closed")]
    TaskClosed(TaskId),

    #[error("No mailbox for {0}")]
    UnknownRecipient(Endpoint),

    #[error("Mailbox of {0} was already claimed")]
    MailboxClaimed(Endpoint),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unknown sync point '{0}'")]
    UnknownSyncPoint(String),

    #[error("Context update on '{key}' still conflicting after {attempts} attempts")]
    ContentionExhausted { key: String, attempts: u32 },

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Swarm(#[from] SwarmError),
}

/// Outcome of a single `send`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub delivered: usize,
    pub duplicates: usize,
}

/// Receiving half of a mailbox. Yields `None` once the task is closed.
pub struct MailboxReceiver {
    owner: Endpoint,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl MailboxReceiver {
    pub fn owner(&self) -> Endpoint {
        self.owner
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HelpRequestPayload {
    request_id: u64,
    #[serde(flatten)]
    request: HelpRequest,
}

#[derive(Debug, Serialize, Deserialize)]
struct HelpResponsePayload {
    request_id: u64,
    suggestion: String,
}

/// Sequences seen on one (from, to) pair. Everything at or below `floor` has
/// been seen; `above` holds sequences that arrived past a gap.
#[derive(Debug, Default)]
struct SeenSequences {
    floor: u64,
    above: BTreeSet<u64>,
}

impl SeenSequences {
    /// Returns `false` if `sequence` was already seen.
    fn insert(&mut self, sequence: u64) -> bool {
        if sequence <= self.floor || !self.above.insert(sequence) {
            return false;
        }
        while self.above.remove(&(self.floor + 1)) {
            self.floor += 1;
        }
        true
    }

    fn contains(&self, sequence: u64) -> bool {
        sequence <= self.floor || self.above.contains(&sequence)
    }
}

struct Mailbox {
    sender: mpsc::UnboundedSender<Message>,
    parked: Option<mpsc::UnboundedReceiver<Message>>,
    seen: HashMap<(Endpoint, Endpoint), SeenSequences>,
}

impl Mailbox {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            parked: Some(receiver),
            seen: HashMap::new(),
        }
    }

    /// Returns `false` for a re-delivery.
    fn offer(&mut self, message: &Message) -> bool {
        let seen = self.seen.entry((message.from, message.to)).or_default();
        if !seen.insert(message.sequence) {
            return false;
        }
        // A dropped receiver still counts as delivered; the owner gave up listening.
        let _ = self.sender.send(message.clone());
        true
    }
}

struct SyncSlot {
    point: SyncPoint,
    released: watch::Sender<bool>,
}

struct TaskChannel {
    swarm: Swarm,
    mailboxes: HashMap<Endpoint, Mailbox>,
    context: SharedContext,
    history: VecDeque<Message>,
    outbox: Outbox,
    pending_help: HashMap<u64, oneshot::Sender<HelpResponse>>,
    next_help_id: u64,
    sync_points: HashMap<String, SyncSlot>,
    /// Context writes applied through `send`, per (from, to).
    applied_writes: HashMap<(Endpoint, Endpoint), SeenSequences>,
}

impl TaskChannel {
    fn new(task_id: TaskId) -> Self {
        let mut mailboxes = HashMap::new();
        mailboxes.insert(Endpoint::Orchestrator, Mailbox::new());
        Self {
            swarm: Swarm::new(task_id),
            mailboxes,
            context: SharedContext::new(),
            history: VecDeque::new(),
            outbox: Outbox::new(Endpoint::Orchestrator),
            pending_help: HashMap::new(),
            next_help_id: 1,
            sync_points: HashMap::new(),
            applied_writes: HashMap::new(),
        }
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.swarm.is_closed() {
            return Err(BusError::TaskClosed(self.swarm.task_id));
        }
        Ok(())
    }

    fn recipients(&self, message: &Message) -> Result<Vec<Endpoint>, BusError> {
        match message.to {
            Endpoint::Broadcast => {
                let sender = match message.from {
                    Endpoint::Agent(id) => Some(id),
                    _ => None,
                };
                Ok(self
                    .swarm
                    .siblings(sender)
                    .into_iter()
                    .map(Endpoint::Agent)
                    .collect())
            }
            to if self.mailboxes.contains_key(&to) => Ok(vec![to]),
            to => Err(BusError::UnknownRecipient(to)),
        }
    }

    fn record(&mut self, message: Message, limit: usize) {
        self.history.push_back(message);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    fn resolve_help(&mut self, request_id: u64, response: HelpResponse) -> bool {
        match self.pending_help.remove(&request_id) {
            Some(waiter) => waiter.send(response).is_ok(),
            None => false,
        }
    }
}

/// In-memory coordination bus, one isolated channel set per task.
pub struct CoordinationBus {
    config: BusConfig,
    tasks: Mutex<HashMap<TaskId, TaskChannel>>,
}

impl CoordinationBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Create the task's channels if they do not exist yet.
    pub fn open_task(&self, task_id: TaskId) {
        self.tasks
            .lock()
            .entry(task_id)
            .or_insert_with(|| TaskChannel::new(task_id));
    }

    pub fn is_closed(&self, task_id: TaskId) -> bool {
        self.tasks
            .lock()
            .get(&task_id)
            .is_some_and(|channel| channel.swarm.is_closed())
    }

    pub fn add_member(&self, task_id: TaskId, agent_id: AgentId, role: Role) -> Result<(), BusError> {
        let mut tasks = self.tasks.lock();
        let channel = tasks
            .entry(task_id)
            .or_insert_with(|| TaskChannel::new(task_id));
        if channel.swarm.join(agent_id, role)? {
            channel
                .mailboxes
                .insert(Endpoint::Agent(agent_id), Mailbox::new());
            debug!(task_id = %task_id, agent_id = %agent_id, role = %role, "Agent joined swarm");
        }
        Ok(())
    }

    pub fn remove_member(&self, task_id: TaskId, agent_id: AgentId) -> bool {
        let mut tasks = self.tasks.lock();
        let Some(channel) = tasks.get_mut(&task_id) else {
            return false;
        };
        channel.mailboxes.remove(&Endpoint::Agent(agent_id));
        channel.swarm.leave(agent_id)
    }

    pub fn members(&self, task_id: TaskId) -> Vec<AgentId> {
        self.tasks
            .lock()
            .get(&task_id)
            .map(|channel| channel.swarm.siblings(None))
            .unwrap_or_default()
    }

    /// Take the receiving half of an endpoint's mailbox. Can be claimed once.
    pub fn claim_mailbox(&self, task_id: TaskId, owner: Endpoint) -> Result<MailboxReceiver, BusError> {
        let mut tasks = self.tasks.lock();
        let channel = tasks.get_mut(&task_id).ok_or(BusError::UnknownTask(task_id))?;
        channel.ensure_open()?;
        let mailbox = channel
            .mailboxes
            .get_mut(&owner)
            .ok_or(BusError::UnknownRecipient(owner))?;
        let receiver = mailbox.parked.take().ok_or(BusError::MailboxClaimed(owner))?;
        Ok(MailboxReceiver { owner, receiver })
    }

    /// Route a message. Re-delivered `(from, to, sequence)` triples are
    /// dropped per recipient and reported as duplicates.
    pub fn send(&self, task_id: TaskId, message: Message) -> Result<SendReport, BusError> {
        if message.sequence == 0 {
            return Err(BusError::InvalidMessage("sequence numbers start at 1".to_string()));
        }
        if message.from == Endpoint::Broadcast {
            return Err(BusError::InvalidMessage("broadcast is not a sender".to_string()));
        }

        let mut tasks = self.tasks.lock();
        let channel = tasks.get_mut(&task_id).ok_or(BusError::UnknownTask(task_id))?;
        channel.ensure_open()?;

        if message.message_type == MessageType::ContextWrite {
            let pair = (message.from, message.to);
            let already_applied = channel
                .applied_writes
                .get(&pair)
                .is_some_and(|seen| seen.contains(message.sequence));
            if already_applied {
                metrics::counter!("conductor_bus_duplicates_total").increment(1);
                debug!(
                    task_id = %task_id,
                    from = %message.from,
                    sequence = message.sequence,
                    "Dropped re-delivered context write"
                );
                return Ok(SendReport { delivered: 0, duplicates: 1 });
            }

            let write: ContextWrite = serde_json::from_value(message.payload.clone())
                .map_err(|e| BusError::InvalidMessage(e.to_string()))?;
            let result = channel.context.apply(write);
            if result.is_err() {
                metrics::counter!("conductor_context_conflicts_total").increment(1);
            }
            result?;
            // Rejected writes stay unmarked so a corrected re-send can land.
            channel.applied_writes.entry(pair).or_default().insert(message.sequence);
            channel.record(message, self.config.history_limit);
            return Ok(SendReport::default());
        }

        let help_reply = if message.message_type == MessageType::HelpResponse
            && message.to == Endpoint::Orchestrator
        {
            match (message.from, serde_json::from_value::<HelpResponsePayload>(message.payload.clone())) {
                (Endpoint::Agent(responder), Ok(payload)) => Some((responder, payload)),
                (_, Err(e)) => return Err(BusError::InvalidMessage(e.to_string())),
                _ => None,
            }
        } else {
            None
        };

        let mut report = SendReport::default();
        for recipient in channel.recipients(&message)? {
            let Some(mailbox) = channel.mailboxes.get_mut(&recipient) else {
                continue;
            };
            if mailbox.offer(&message) {
                report.delivered += 1;
            } else {
                report.duplicates += 1;
            }
        }

        if report.duplicates > 0 {
            metrics::counter!("conductor_bus_duplicates_total").increment(report.duplicates as u64);
            debug!(
                task_id = %task_id,
                from = %message.from,
                sequence = message.sequence,
                "Dropped re-delivered message"
            );
        }

        if report.delivered > 0 {
            metrics::counter!("conductor_bus_messages_total", "type" => message_type_label(message.message_type))
                .increment(1);
            if let Some((responder, payload)) = help_reply {
                channel.resolve_help(
                    payload.request_id,
                    HelpResponse {
                        responder,
                        suggestion: payload.suggestion,
                    },
                );
            }
            channel.record(message, self.config.history_limit);
        }

        Ok(report)
    }

    /// Answer an outstanding help request. Returns `false` if the request
    /// has already been answered or timed out.
    pub fn respond_help(
        &self,
        task_id: TaskId,
        request_id: u64,
        responder: AgentId,
        suggestion: impl Into<String>,
    ) -> Result<bool, BusError> {
        let suggestion = suggestion.into();
        let mut tasks = self.tasks.lock();
        let channel = tasks.get_mut(&task_id).ok_or(BusError::UnknownTask(task_id))?;
        channel.ensure_open()?;

        let answered = channel.resolve_help(
            request_id,
            HelpResponse {
                responder,
                suggestion: suggestion.clone(),
            },
        );
        if answered {
            let message = Message::new(
                Endpoint::Agent(responder),
                Endpoint::Orchestrator,
                MessageType::HelpResponse,
                serde_json::to_value(HelpResponsePayload { request_id, suggestion })
                    .unwrap_or_default(),
                request_id,
            );
            channel.record(message, self.config.history_limit);
        }
        Ok(answered)
    }

    /// Broadcast a help request to every member and wait up to `timeout`
    /// for the first answer.
    pub async fn ask_for_help(&self, request: HelpRequest, timeout: Duration) -> HelpOutcome {
        let task_id = request.task_id;
        let phase_id = request.phase_id.clone();

        let (request_id, waiter) = {
            let mut tasks = self.tasks.lock();
            let Some(channel) = tasks.get_mut(&task_id) else {
                return HelpOutcome::NoHelp;
            };
            if channel.swarm.is_closed() || channel.swarm.is_empty() {
                return HelpOutcome::NoHelp;
            }

            let request_id = channel.next_help_id;
            channel.next_help_id += 1;
            let (tx, rx) = oneshot::channel();
            channel.pending_help.insert(request_id, tx);

            let payload = match serde_json::to_value(HelpRequestPayload { request_id, request }) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Failed to encode help request");
                    channel.pending_help.remove(&request_id);
                    return HelpOutcome::NoHelp;
                }
            };
            let message = channel
                .outbox
                .compose(Endpoint::Broadcast, MessageType::HelpRequest, payload);
            for recipient in channel.swarm.siblings(None) {
                if let Some(mailbox) = channel.mailboxes.get_mut(&Endpoint::Agent(recipient)) {
                    mailbox.offer(&message);
                }
            }
            channel.record(message, self.config.history_limit);
            (request_id, rx)
        };

        info!(task_id = %task_id, phase_id = %phase_id, request_id, "Requested help from swarm");

        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(response)) => {
                metrics::counter!("conductor_help_requests_total", "outcome" => "answered").increment(1);
                HelpOutcome::Help(response)
            }
            _ => {
                if let Some(channel) = self.tasks.lock().get_mut(&task_id) {
                    channel.pending_help.remove(&request_id);
                }
                metrics::counter!("conductor_help_requests_total", "outcome" => "unanswered").increment(1);
                debug!(task_id = %task_id, phase_id = %phase_id, "Help request went unanswered");
                HelpOutcome::NoHelp
            }
        }
    }

    pub fn read_context(&self, task_id: TaskId, key: &str) -> Option<VersionedValue> {
        self.tasks
            .lock()
            .get(&task_id)
            .and_then(|channel| channel.context.get(key).cloned())
    }

    pub fn context_snapshot(&self, task_id: TaskId) -> HashMap<String, serde_json::Value> {
        self.tasks
            .lock()
            .get(&task_id)
            .map(|channel| channel.context.snapshot())
            .unwrap_or_default()
    }

    /// Conditional write; returns the key's new version.
    pub fn write_context(&self, task_id: TaskId, write: ContextWrite) -> Result<u64, BusError> {
        let mut tasks = self.tasks.lock();
        let channel = tasks.get_mut(&task_id).ok_or(BusError::UnknownTask(task_id))?;
        channel.ensure_open()?;
        channel.context.apply(write).map_err(|e| {
            metrics::counter!("conductor_context_conflicts_total").increment(1);
            BusError::from(e)
        })
    }

    /// Read-version, compute, conditional write; retried up to `max_attempts`
    /// times while other writers keep winning.
    pub fn update_context<F>(
        &self,
        task_id: TaskId,
        key: &str,
        writer: Endpoint,
        max_attempts: u32,
        mut compute: F,
    ) -> Result<u64, BusError>
    where
        F: FnMut(Option<&serde_json::Value>) -> serde_json::Value,
    {
        for _ in 0..max_attempts.max(1) {
            let current = self.read_context(task_id, key);
            let write = ContextWrite {
                key: key.to_string(),
                value: compute(current.as_ref().map(|v| &v.value)),
                observed_version: current.map(|v| v.version).unwrap_or(0),
                writer,
            };
            match self.write_context(task_id, write) {
                Err(BusError::Context(ContextError::VersionConflict { .. })) => continue,
                other => return other,
            }
        }
        Err(BusError::ContentionExhausted {
            key: key.to_string(),
            attempts: max_attempts.max(1),
        })
    }

    pub fn open_sync_point(&self, task_id: TaskId, name: &str, expected: usize) -> Result<(), BusError> {
        let mut tasks = self.tasks.lock();
        let channel = tasks.get_mut(&task_id).ok_or(BusError::UnknownTask(task_id))?;
        channel.ensure_open()?;
        channel.sync_points.entry(name.to_string()).or_insert_with(|| {
            let (released, _) = watch::channel(false);
            SyncSlot {
                point: SyncPoint::new(name, expected),
                released,
            }
        });
        Ok(())
    }

    /// Returns `true` once the point is released.
    pub fn arrive(&self, task_id: TaskId, name: &str, agent_id: AgentId) -> Result<bool, BusError> {
        let mut tasks = self.tasks.lock();
        let channel = tasks.get_mut(&task_id).ok_or(BusError::UnknownTask(task_id))?;
        channel.ensure_open()?;
        let slot = channel
            .sync_points
            .get_mut(name)
            .ok_or_else(|| BusError::UnknownSyncPoint(name.to_string()))?;
        let released = slot.point.arrive(agent_id);
        if released {
            slot.released.send_replace(true);
        }
        Ok(released)
    }

    /// Wait until the point is released. `Ok(false)` on timeout or when the
    /// task closes first.
    pub async fn wait_for_sync(&self, task_id: TaskId, name: &str, timeout: Duration) -> Result<bool, BusError> {
        let mut released = {
            let tasks = self.tasks.lock();
            let channel = tasks.get(&task_id).ok_or(BusError::UnknownTask(task_id))?;
            let slot = channel
                .sync_points
                .get(name)
                .ok_or_else(|| BusError::UnknownSyncPoint(name.to_string()))?;
            slot.released.subscribe()
        };

        let wait = async {
            loop {
                let done = *released.borrow_and_update();
                if done {
                    return true;
                }
                if released.changed().await.is_err() {
                    return false;
                }
            }
        };
        Ok(tokio::time::timeout(timeout, wait).await.unwrap_or(false))
    }

    /// Messages seen on the task, oldest first.
    pub fn history(&self, task_id: TaskId) -> Vec<Message> {
        self.tasks
            .lock()
            .get(&task_id)
            .map(|channel| channel.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Close the task's channels: mailboxes end, pending help resolves to
    /// `NoHelp`, sync waiters give up. History stays readable.
    pub fn shutdown_task(&self, task_id: TaskId) {
        let mut tasks = self.tasks.lock();
        let Some(channel) = tasks.get_mut(&task_id) else {
            return;
        };
        if channel.swarm.is_closed() {
            return;
        }
        channel.swarm.close();
        channel.mailboxes.clear();
        channel.pending_help.clear();
        channel.sync_points.clear();
        info!(task_id = %task_id, messages = channel.history.len(), "Closed coordination channels");
    }
}

fn message_type_label(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::Direct => "direct",
        MessageType::Broadcast => "broadcast",
        MessageType::StatusUpdate => "status_update",
        MessageType::DataShare => "data_share",
        MessageType::HelpRequest => "help_request",
        MessageType::HelpResponse => "help_response",
        MessageType::ContextWrite => "context_write",
        MessageType::Coordination => "coordination",
    }
}

#[async_trait]
impl CoordinationPort for CoordinationBus {
    async fn join(&self, task_id: TaskId, agent_id: AgentId, role: Role) {
        if let Err(e) = self.add_member(task_id, agent_id, role) {
            warn!(task_id = %task_id, agent_id = %agent_id, error = %e, "Agent could not join swarm");
        }
    }

    async fn leave(&self, task_id: TaskId, agent_id: AgentId) {
        self.remove_member(task_id, agent_id);
    }

    async fn request_help(&self, request: HelpRequest, timeout: Duration) -> HelpOutcome {
        self.ask_for_help(request, timeout).await
    }

    async fn close_task(&self, task_id: TaskId) {
        self.shutdown_task(task_id);
    }
}
