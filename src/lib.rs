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

#![forbid(unsafe_code)]
//! Haven Agents Library
//!
//! This library provides the agent orchestration core for the Haven
//! community-services dashboard: agent registration and lifecycle
//! supervision, scheduled task execution, domain-event distribution, and
//! the cross-language envelope protocol used to talk to agents running
//! as separate operating-system processes.

/// Agent descriptors, runtime state, supervision, and scheduling.
pub(crate) mod agent;

pub(crate) mod common;
pub(crate) mod message;
pub(crate) mod runtime;
/// Capability trait definitions used at the seams of the runtime.
pub(crate) mod traits;

/// Prelude module for convenient imports.
///
/// Re-exports the types most callers need: the orchestrator, the agent
/// builder, the wire envelope, and the capability traits.
pub mod prelude {
    pub use async_trait::async_trait;

    pub use crate::agent::{
        parse_schedule, AgentBuilder, AgentContext, AgentDescriptor, AgentRuntimeState,
        AgentStatus, AgentStatusSnapshot, AgentSupervisor,
    };
    pub use crate::common::{
        AgentOrchestrator, BatchFailure, OrchestratorConfig, OrchestratorError,
    };
    pub use crate::message::{
        AgentAddress, Destination, DomainEvent, EventKind, MessageEnvelope, MessageKind,
        MessageMetadata, Priority,
    };
    pub use crate::runtime::{
        ChannelKind, ExecutionContext, HealthStatus, InProcessAdapter, Language, ResourceLimits,
        RuntimeAdapter, RuntimeEnvironment, SubprocessAdapter,
    };
    pub use crate::traits::{InProcessAgent, MemoryStateStore, MessageDelivery, StateStore};
}
