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

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::agent::AgentContext;
use crate::message::MessageEnvelope;

/// Health of one running agent instance as observed by its adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Stopped,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The physical channel an adapter uses to reach its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Direct calls into a code unit loaded in the host process.
    InProcess,
    /// Line-delimited envelopes over a child process's standard streams.
    Stdio,
    /// A networked request/response channel.
    Network,
}

/// The live, process-level view of one running agent.
///
/// Owned and mutated by the runtime adapter; supervisors and monitoring
/// read cloned snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    pub health: HealthStatus,
    pub channel: ChannelKind,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub memory_mb: Option<u64>,
    pub cpu_percent: Option<f32>,
}

impl ExecutionContext {
    pub(crate) fn new(channel: ChannelKind) -> Self {
        Self {
            health: HealthStatus::Stopped,
            channel,
            last_heartbeat: None,
            restart_count: 0,
            memory_mb: None,
            cpu_percent: None,
        }
    }

    /// True when the last heartbeat is older than `max_age` (or missing).
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.last_heartbeat {
            Some(at) => Utc::now() - at > max_age,
            None => true,
        }
    }
}

/// Adapter-internal shared handle to the execution context, so I/O pump
/// tasks can update health without holding the adapter itself.
pub(crate) type SharedContext = Arc<Mutex<ExecutionContext>>;

pub(crate) fn shared_context(channel: ChannelKind) -> SharedContext {
    Arc::new(Mutex::new(ExecutionContext::new(channel)))
}

/// Per-language strategy that starts, stops, and exchanges messages with one
/// agent instance, abstracting whether it runs in-process or as a separate
/// operating-system process.
///
/// This is the narrow seam between the supervisor (a pure state machine)
/// and the transport. Adapters own the [`ExecutionContext`]; everything
/// else crosses as [`MessageEnvelope`]s.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Brings the agent instance up. Suspends until the spawn or load
    /// completes, or fails.
    async fn start(&mut self, context: &AgentContext) -> anyhow::Result<()>;

    /// Takes the agent instance down, gracefully where the transport allows.
    async fn stop(&mut self) -> anyhow::Result<()>;

    /// Delivers one envelope toward the agent instance. Sends before the
    /// channel is ready must be queued and flushed in arrival order.
    async fn send(&mut self, envelope: MessageEnvelope) -> anyhow::Result<()>;

    /// A read-only snapshot of the agent's process-level state.
    fn execution_context(&self) -> ExecutionContext;

    /// Hands out the inbound envelope stream, for transports that have one.
    /// Returns `None` after the first call, or for call-based transports.
    fn take_inbound(&mut self) -> Option<UnboundedReceiver<MessageEnvelope>> {
        None
    }
}
