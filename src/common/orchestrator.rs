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

//! The orchestrator: agent registry, batch lifecycle operations, event
//! distribution, and broadcast messaging.

use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace, warn};

use crate::agent::{
    AgentBuilder, AgentContext, AgentStatusSnapshot, AgentSupervisor, EventHandler, RuntimeChoice,
};
use crate::common::config::OrchestratorConfig;
use crate::common::error::OrchestratorError;
use crate::common::event_bus::EventBus;
use crate::message::{AgentAddress, Destination, DomainEvent, MessageEnvelope};
use crate::runtime::{InProcessAdapter, RuntimeAdapter, SubprocessAdapter};
use crate::traits::{MemoryStateStore, MessageDelivery, StateStore};

/// One failed agent inside a best-effort batch operation.
#[derive(Debug)]
pub struct BatchFailure {
    pub agent_id: String,
    pub error: anyhow::Error,
}

struct OrchestratorInner {
    config: OrchestratorConfig,
    agents: DashMap<String, Arc<AgentSupervisor>>,
    /// Registration order; bus iteration is deterministic, not
    /// event-dependent.
    order: StdMutex<Vec<String>>,
    bus: Mutex<EventBus>,
    store: Arc<dyn StateStore>,
    delivery: Option<Arc<dyn MessageDelivery>>,
}

/// Top-level owner of the agent registry and the event distribution bus.
///
/// Internal maps are never exposed by reference; everything crosses as
/// snapshots or message-passing operations. Cloning is cheap and shares
/// the same registry.
#[derive(Clone)]
pub struct AgentOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl AgentOrchestrator {
    /// Launches an orchestrator with default configuration and an
    /// in-memory state store.
    pub fn launch() -> Self {
        Self::launch_with(OrchestratorConfig::default())
    }

    pub fn launch_with(config: OrchestratorConfig) -> Self {
        Self::launch_full(config, Arc::new(MemoryStateStore::default()), None)
    }

    /// Launches with explicit persistence and delivery collaborators.
    pub fn launch_full(
        config: OrchestratorConfig,
        store: Arc<dyn StateStore>,
        delivery: Option<Arc<dyn MessageDelivery>>,
    ) -> Self {
        let bus = EventBus::new(config.queue_warn_depth);
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                agents: DashMap::new(),
                order: StdMutex::new(Vec::new()),
                bus: Mutex::new(bus),
                store,
                delivery,
            }),
        }
    }

    /// Registers an agent. The descriptor is immutable from here on;
    /// re-registering the same identifier is an error.
    #[instrument(skip(self, builder), fields(agent_id = %builder.descriptor().id))]
    pub fn register(&self, builder: AgentBuilder) -> Result<(), OrchestratorError> {
        let (descriptor, mut handlers, scheduled, runtime) = builder.into_parts();
        let agent_id = descriptor.id.clone();

        let adapter: Box<dyn RuntimeAdapter> = match runtime {
            RuntimeChoice::InProcess(agent) => Box::new(InProcessAdapter::new(agent)),
            RuntimeChoice::Subprocess {
                language,
                environment,
            } => {
                let environment = match environment {
                    Some(environment) => environment,
                    None => self
                        .inner
                        .config
                        .environment_for(language)
                        .ok_or(OrchestratorError::NoRuntimeEnvironment(language))?,
                };
                // Out-of-process agents receive their subscribed events as
                // envelopes; install forwarding handlers for any kind the
                // builder did not cover explicitly.
                for kind in &descriptor.event_types {
                    if !handlers.contains_key(kind) {
                        handlers.insert(kind.clone(), forwarding_handler(&agent_id));
                    }
                }
                Box::new(SubprocessAdapter::new(
                    agent_id.clone(),
                    environment,
                    self.inner.config.shutdown_grace(),
                ))
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let context = AgentContext::new(
            agent_id.clone(),
            outbound_tx,
            self.inner.store.clone(),
            self.inner.delivery.clone(),
        );

        match self.inner.agents.entry(agent_id.clone()) {
            Entry::Occupied(_) => Err(OrchestratorError::DuplicateAgent(agent_id)),
            Entry::Vacant(vacancy) => {
                let supervisor = Arc::new(AgentSupervisor::assemble(
                    Arc::new(descriptor),
                    handlers,
                    scheduled,
                    adapter,
                    context,
                    outbound_rx,
                ));
                vacancy.insert(supervisor);
                self.inner
                    .order
                    .lock()
                    .expect("registration order lock poisoned")
                    .push(agent_id.clone());
                debug!("agent registered");
                Ok(())
            }
        }
    }

    pub fn agent_count(&self) -> usize {
        self.inner.agents.len()
    }

    /// The supervisor for one agent, for direct interaction (messaging,
    /// inbound streams).
    pub fn supervisor(&self, agent_id: &str) -> Option<Arc<AgentSupervisor>> {
        self.inner.agents.get(agent_id).map(|entry| entry.value().clone())
    }

    pub async fn start_agent(&self, agent_id: &str) -> anyhow::Result<()> {
        self.lookup(agent_id)?.start().await
    }

    pub async fn stop_agent(&self, agent_id: &str) -> anyhow::Result<()> {
        self.lookup(agent_id)?.stop().await
    }

    pub async fn pause_agent(&self, agent_id: &str) -> anyhow::Result<()> {
        self.lookup(agent_id)?.pause().await
    }

    pub async fn resume_agent(&self, agent_id: &str) -> anyhow::Result<()> {
        self.lookup(agent_id)?.resume().await
    }

    /// Starts every enabled agent, best-effort. Failures are collected
    /// per agent rather than aborting the batch.
    #[instrument(skip(self))]
    pub async fn start_all(&self) -> Vec<BatchFailure> {
        let mut failures = Vec::new();
        for supervisor in self.snapshot_agents() {
            if !supervisor.descriptor().enabled {
                trace!(agent_id = %supervisor.id(), "agent disabled, skipping start");
                continue;
            }
            if let Err(error) = supervisor.start().await {
                warn!(agent_id = %supervisor.id(), error = %error, "agent failed to start");
                failures.push(BatchFailure {
                    agent_id: supervisor.id().to_string(),
                    error,
                });
            }
        }
        failures
    }

    /// Stops every agent in registration order, best-effort.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) -> Vec<BatchFailure> {
        let mut failures = Vec::new();
        for supervisor in self.snapshot_agents() {
            if let Err(error) = supervisor.stop().await {
                warn!(agent_id = %supervisor.id(), error = %error, "agent failed to stop");
                failures.push(BatchFailure {
                    agent_id: supervisor.id().to_string(),
                    error,
                });
            }
        }
        failures
    }

    /// Sends a command envelope to every registered agent, collecting
    /// per-agent failures without failing the overall call.
    #[instrument(skip(self, payload))]
    pub async fn broadcast(&self, payload: serde_json::Value) -> Vec<BatchFailure> {
        let supervisors = self.snapshot_agents();
        let envelope = MessageEnvelope::command(
            self.address(),
            Destination::broadcast(),
            payload,
        );
        let sends = supervisors.iter().map(|supervisor| {
            let envelope = envelope.clone();
            async move {
                supervisor
                    .send_message(envelope)
                    .await
                    .map_err(|error| BatchFailure {
                        agent_id: supervisor.id().to_string(),
                        error,
                    })
            }
        });
        join_all(sends)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }

    /// Publishes a domain event and, unless a drain pass is already in
    /// flight, drains the queue to completion.
    ///
    /// Handlers are awaited sequentially, agent by agent, in registration
    /// order; one slow or failing handler delays but never halts delivery
    /// to the rest.
    #[instrument(skip(self, event), fields(kind = %event.kind, event_id = %event.id))]
    pub async fn publish(&self, event: DomainEvent) {
        {
            let mut bus = self.inner.bus.lock().await;
            bus.enqueue(event);
            if !bus.begin_drain() {
                trace!("drain pass already in flight, event queued");
                return;
            }
        }
        self.drain().await;
    }

    async fn drain(&self) {
        loop {
            let next = {
                let mut bus = self.inner.bus.lock().await;
                bus.next()
            };
            let Some(mut event) = next else { break };
            let supervisors = self.snapshot_agents();
            for supervisor in supervisors {
                if !supervisor.descriptor().subscribes_to(&event.kind) {
                    continue;
                }
                match supervisor.handle_event(&mut event).await {
                    Ok(delivered) => {
                        trace!(agent_id = %supervisor.id(), delivered, "event dispatched");
                    }
                    Err(error) => {
                        // Isolation: a failing handler never halts
                        // distribution to the remaining agents.
                        warn!(agent_id = %supervisor.id(), error = %error, "event handler failed");
                    }
                }
            }
        }
    }

    pub async fn status(&self, agent_id: &str) -> anyhow::Result<AgentStatusSnapshot> {
        Ok(self.lookup(agent_id)?.snapshot().await)
    }

    /// Snapshots of every agent, in registration order.
    pub async fn all_statuses(&self) -> Vec<AgentStatusSnapshot> {
        let supervisors = self.snapshot_agents();
        let snapshots = supervisors.iter().map(|s| s.snapshot());
        join_all(snapshots).await
    }

    /// The orchestrator's own envelope address.
    pub fn address(&self) -> AgentAddress {
        AgentAddress::host("orchestrator")
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    fn lookup(&self, agent_id: &str) -> Result<Arc<AgentSupervisor>, OrchestratorError> {
        self.inner
            .agents
            .get(agent_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrchestratorError::UnknownAgent(agent_id.to_string()))
    }

    fn snapshot_agents(&self) -> Vec<Arc<AgentSupervisor>> {
        let order = self
            .inner
            .order
            .lock()
            .expect("registration order lock poisoned");
        order
            .iter()
            .filter_map(|id| self.inner.agents.get(id).map(|entry| entry.value().clone()))
            .collect()
    }
}

/// Wraps a domain event into an `event`-kind envelope bound for the agent's
/// own runtime channel. Used for out-of-process agents, whose handler table
/// forwards rather than executes.
fn forwarding_handler(agent_id: &str) -> EventHandler {
    let agent_id = agent_id.to_string();
    Box::new(move |ctx: AgentContext, event: DomainEvent| {
        let agent_id = agent_id.clone();
        Box::pin(async move {
            let payload = serde_json::to_value(&event)?;
            let envelope =
                MessageEnvelope::event(ctx.address(), Destination::agent(agent_id), payload);
            ctx.send(envelope)
        })
    })
}
