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

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::common::OrchestratorError;
use crate::runtime::HealthStatus;

/// Lifecycle status of one agent.
///
/// Legal transitions: `stopped → starting → running ⇄ paused → stopping →
/// stopped`, with `error` reachable from `starting`, `running`, or
/// `stopping`. `error` is recoverable only by a `start` retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
    Error,
}

impl AgentStatus {
    /// Whether moving to `next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Error, Starting)
                | (Starting, Running)
                | (Starting, Error)
                | (Running, Paused)
                | (Running, Stopping)
                | (Running, Error)
                | (Paused, Running)
                | (Paused, Stopping)
                | (Stopping, Stopped)
                | (Stopping, Error)
        )
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentStatus::Stopped => "stopped",
            AgentStatus::Starting => "starting",
            AgentStatus::Running => "running",
            AgentStatus::Paused => "paused",
            AgentStatus::Stopping => "stopping",
            AgentStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Mutable runtime state for one agent, owned exclusively by its
/// supervisor. Monitoring reads [`AgentStatusSnapshot`]s instead.
#[derive(Debug)]
pub struct AgentRuntimeState {
    pub status: AgentStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub processed_messages: u64,
    pub error_count: u64,
}

impl Default for AgentRuntimeState {
    fn default() -> Self {
        Self {
            status: AgentStatus::Stopped,
            started_at: None,
            last_activity: None,
            processed_messages: 0,
            error_count: 0,
        }
    }
}

impl AgentRuntimeState {
    /// Applies a lifecycle transition, rejecting illegal ones.
    pub(crate) fn transition(&mut self, next: AgentStatus) -> Result<(), OrchestratorError> {
        if !self.status.can_transition_to(next) {
            return Err(OrchestratorError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        tracing::trace!(from = %self.status, to = %next, "lifecycle transition");
        self.status = next;
        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }
}

/// Read-only monitoring view of one agent, combining supervisor state with
/// the adapter's health observation.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusSnapshot {
    pub agent_id: String,
    pub name: String,
    pub status: AgentStatus,
    pub health: HealthStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub processed_messages: u64,
    pub error_count: u64,
    /// Whether a scheduled-task timer is currently armed.
    pub scheduled: bool,
}
