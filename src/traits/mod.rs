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

//! Capability traits at the seams of the runtime: the in-process code-unit
//! hooks, the key/value persistence collaborator, and the outbound
//! message-delivery collaborator.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use crate::agent::AgentContext;
use crate::message::MessageEnvelope;

/// Hooks implemented by an agent code unit loaded in the host process.
///
/// `initialize` runs once when the supervisor starts the agent, `cleanup`
/// when it stops. `handle_message` receives envelopes delivered through the
/// in-process adapter and may return a reply.
#[async_trait]
pub trait InProcessAgent: Send + Sync {
    async fn initialize(&mut self, context: &AgentContext) -> anyhow::Result<()>;

    async fn cleanup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn handle_message(
        &mut self,
        _envelope: &MessageEnvelope,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        Ok(None)
    }
}

/// Generic key/value persistence collaborator for small JSON blobs.
///
/// Agents reach it through [`AgentContext`], which prefixes every key with
/// the agent's identifier. The store itself is a capability, not owned
/// state; the engine behind it is out of scope.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()>;
    async fn load(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// An in-memory [`StateStore`], the default when the host application does
/// not supply one. Also used by tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, serde_json::Value>,
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        trace!(key, "saving state blob");
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Generic message-delivery collaborator (e.g. an SMS provider wrapper).
///
/// The runtime guarantees envelope and queuing semantics up to the point of
/// handoff; delivery confirmation is the collaborator's concern.
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    async fn deliver(&self, recipient: &str, body: &str) -> anyhow::Result<()>;
}
