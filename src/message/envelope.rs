/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! The cross-language message envelope.
//!
//! One envelope is one line of JSON on the wire between the host and an
//! out-of-process agent. Field names are camelCase to stay compatible with
//! the agents already deployed on other language runtimes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::runtime::Language;

/// The protocol-level kind of a message envelope.
///
/// Inbound `type` strings outside the closed set deserialize to `Other` so
/// that protocol extensions from foreign runtimes degrade to logging rather
/// than parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Event,
    Command,
    Response,
    Error,
    Heartbeat,
    #[serde(other)]
    Other,
}

/// Delivery priority carried in envelope metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Identifies one side of an envelope hop: which agent, on which language
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAddress {
    pub agent_id: String,
    pub language: Language,
    /// Free-form runtime tag, e.g. "python3" or "tokio".
    pub runtime: String,
}

impl AgentAddress {
    pub fn new(agent_id: impl Into<String>, language: Language, runtime: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            language,
            runtime: runtime.into(),
        }
    }

    /// The address of the host orchestration runtime itself.
    pub fn host(agent_id: impl Into<String>) -> Self {
        Self::new(agent_id, Language::Rust, "tokio")
    }
}

/// Where an envelope is bound: a specific agent, every agent of a language,
/// or a broadcast to all registered agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default)]
    pub broadcast: bool,
}

impl Destination {
    /// Addresses a single agent by identifier.
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Self::default()
        }
    }

    /// Addresses every agent on the given language runtime.
    pub fn language(language: Language) -> Self {
        Self {
            language: Some(language),
            ..Self::default()
        }
    }

    /// Addresses every registered agent.
    pub fn broadcast() -> Self {
        Self {
            broadcast: true,
            ..Self::default()
        }
    }
}

/// Envelope metadata: priority, correlation, and retry/timeout budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageMetadata {
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_ms: u64,
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            correlation_id: None,
            retry_count: 0,
            max_retries: 0,
            timeout_ms: 5_000,
        }
    }
}

/// The wire-neutral unit of communication between agents.
///
/// Immutable after creation; consumed by exactly one runtime adapter per hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub source: AgentAddress,
    pub destination: Destination,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl MessageEnvelope {
    /// Creates an envelope with a generated id and the current timestamp.
    pub fn new(
        kind: MessageKind,
        source: AgentAddress,
        destination: Destination,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            source,
            destination,
            payload,
            metadata: MessageMetadata::default(),
        }
    }

    /// An `event`-kind envelope carrying a domain event payload.
    pub fn event(source: AgentAddress, destination: Destination, payload: serde_json::Value) -> Self {
        Self::new(MessageKind::Event, source, destination, payload)
    }

    /// A `command`-kind envelope.
    pub fn command(
        source: AgentAddress,
        destination: Destination,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(MessageKind::Command, source, destination, payload)
    }

    /// A `response`-kind envelope correlated to the message it answers.
    pub fn response_to(original: &MessageEnvelope, source: AgentAddress, payload: serde_json::Value) -> Self {
        let mut envelope = Self::new(
            MessageKind::Response,
            source,
            Destination::agent(original.source.agent_id.clone()),
            payload,
        );
        envelope.metadata.correlation_id = Some(original.id.clone());
        envelope
    }

    /// A low-priority broadcast heartbeat, matching the liveness traffic the
    /// foreign-runtime base agents emit.
    pub fn heartbeat(source: AgentAddress, payload: serde_json::Value) -> Self {
        let mut envelope = Self::new(MessageKind::Heartbeat, source, Destination::broadcast(), payload);
        envelope.metadata.priority = Priority::Low;
        envelope.metadata.timeout_ms = 1_000;
        envelope
    }

    /// The graceful-termination command sent to an out-of-process agent
    /// before the kill escalation.
    pub fn shutdown_command(source: AgentAddress, agent_id: impl Into<String>) -> Self {
        let mut envelope = Self::new(
            MessageKind::Command,
            source,
            Destination::agent(agent_id),
            serde_json::json!({ "command": "shutdown" }),
        );
        envelope.metadata.priority = Priority::High;
        envelope
    }

    /// Overrides the default metadata.
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Overrides the delivery priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = priority;
        self
    }

    /// Serializes the envelope as one wire line (without the trailing newline).
    pub fn to_line(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
