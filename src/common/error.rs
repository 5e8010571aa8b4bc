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

use crate::agent::AgentStatus;
use crate::runtime::Language;

/// Represents errors surfaced synchronously by the orchestrator and registry.
#[derive(Debug)]
pub enum OrchestratorError {
    /// An agent with the same identifier is already registered.
    DuplicateAgent(String),
    /// No agent with the given identifier exists in the registry.
    UnknownAgent(String),
    /// A lifecycle transition outside the legal state machine was requested.
    IllegalTransition {
        /// The agent's current status.
        from: AgentStatus,
        /// The requested status.
        to: AgentStatus,
    },
    /// An event-type name failed validation at the boundary.
    InvalidEventKind(String),
    /// No runtime environment is configured for the requested language.
    NoRuntimeEnvironment(Language),
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OrchestratorError::DuplicateAgent(id) => {
                write!(f, "Agent '{}' is already registered", id)
            }
            OrchestratorError::UnknownAgent(id) => write!(f, "Unknown agent '{}'", id),
            OrchestratorError::IllegalTransition { from, to } => {
                write!(f, "Illegal lifecycle transition: {} -> {}", from, to)
            }
            OrchestratorError::InvalidEventKind(raw) => {
                write!(f, "Invalid event type name: '{}'", raw)
            }
            OrchestratorError::NoRuntimeEnvironment(language) => {
                write!(f, "No runtime environment configured for language '{}'", language)
            }
        }
    }
}

impl std::error::Error for OrchestratorError {}
