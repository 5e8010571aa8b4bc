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

use async_trait::async_trait;
use tracing::{debug, instrument, trace};

use crate::agent::AgentContext;
use crate::message::MessageEnvelope;
use crate::runtime::adapter::{shared_context, ChannelKind, ExecutionContext, HealthStatus, RuntimeAdapter, SharedContext};
use crate::traits::InProcessAgent;

/// Runtime adapter for agents whose code unit lives in the host process.
///
/// `start` runs the agent's `initialize` hook and marks the instance
/// healthy; `send` dispatches directly to `handle_message`; `stop` runs
/// `cleanup`. There is no I/O channel, so sends never queue.
pub struct InProcessAdapter {
    agent: Box<dyn InProcessAgent>,
    context: SharedContext,
    initialized: bool,
}

impl InProcessAdapter {
    pub fn new(agent: Box<dyn InProcessAgent>) -> Self {
        Self {
            agent,
            context: shared_context(ChannelKind::InProcess),
            initialized: false,
        }
    }

    fn set_health(&self, health: HealthStatus) {
        self.context.lock().expect("execution context lock poisoned").health = health;
    }
}

#[async_trait]
impl RuntimeAdapter for InProcessAdapter {
    #[instrument(skip(self, context), fields(agent_id = %context.agent_id()))]
    async fn start(&mut self, context: &AgentContext) -> anyhow::Result<()> {
        if self.initialized {
            trace!("code unit already initialized");
            self.set_health(HealthStatus::Healthy);
            return Ok(());
        }
        match self.agent.initialize(context).await {
            Ok(()) => {
                self.initialized = true;
                self.set_health(HealthStatus::Healthy);
                Ok(())
            }
            Err(e) => {
                self.set_health(HealthStatus::Unhealthy);
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    async fn stop(&mut self) -> anyhow::Result<()> {
        if self.initialized {
            self.initialized = false;
            if let Err(e) = self.agent.cleanup().await {
                self.set_health(HealthStatus::Unhealthy);
                return Err(e);
            }
        }
        self.set_health(HealthStatus::Stopped);
        Ok(())
    }

    async fn send(&mut self, envelope: MessageEnvelope) -> anyhow::Result<()> {
        trace!(kind = ?envelope.kind, id = %envelope.id, "dispatching envelope to in-process agent");
        if let Some(reply) = self.agent.handle_message(&envelope).await? {
            // No return channel for call-based agents; replies are logged.
            debug!(id = %reply.id, kind = ?reply.kind, "in-process agent produced a reply");
        }
        Ok(())
    }

    fn execution_context(&self) -> ExecutionContext {
        self.context.lock().expect("execution context lock poisoned").clone()
    }
}
