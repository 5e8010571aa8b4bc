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

//! Per-agent supervision: the lifecycle state machine, the scheduled-task
//! timer, and the inbound event-handler table.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, trace, warn};

use crate::agent::descriptor::AgentDescriptor;
use crate::agent::scheduler::{self, ScheduleHandle};
use crate::agent::state::{AgentRuntimeState, AgentStatus, AgentStatusSnapshot};
use crate::message::{AgentAddress, DomainEvent, EventKind, MessageEnvelope};
use crate::runtime::{ExecutionContext, Language, RuntimeAdapter, RuntimeEnvironment};
use crate::traits::{InProcessAgent, MessageDelivery, StateStore};

/// The future type returned by event handlers and hooks.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A registered handler for one event kind.
pub type EventHandler = Box<dyn Fn(AgentContext, DomainEvent) -> HandlerFuture + Send + Sync>;

pub(crate) type ScheduledHook = Box<dyn Fn(AgentContext) -> HandlerFuture + Send + Sync>;

/// The capability view handed to event handlers and hooks: the agent's
/// identity, its outbound message queue, and the shared collaborators.
#[derive(Clone)]
pub struct AgentContext {
    agent_id: String,
    outbound: UnboundedSender<MessageEnvelope>,
    store: Arc<dyn StateStore>,
    delivery: Option<Arc<dyn MessageDelivery>>,
}

impl fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContext")
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

impl AgentContext {
    pub(crate) fn new(
        agent_id: String,
        outbound: UnboundedSender<MessageEnvelope>,
        store: Arc<dyn StateStore>,
        delivery: Option<Arc<dyn MessageDelivery>>,
    ) -> Self {
        Self {
            agent_id,
            outbound,
            store,
            delivery,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// This agent's address on the host runtime, for authoring envelopes.
    pub fn address(&self) -> AgentAddress {
        AgentAddress::host(self.agent_id.clone())
    }

    /// Appends an envelope to the agent's outbound queue. The supervisor
    /// pumps the queue into the runtime adapter after each invocation.
    pub fn send(&self, envelope: MessageEnvelope) -> anyhow::Result<()> {
        self.outbound
            .send(envelope)
            .map_err(|_| anyhow::anyhow!("agent outbound queue is closed"))
    }

    /// Saves a small JSON blob under `<agent_id>.<key>`.
    pub async fn save_state(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        self.store.save(&self.scoped_key(key), value).await
    }

    /// Loads the blob saved under `<agent_id>.<key>`, if any.
    pub async fn load_state(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        self.store.load(&self.scoped_key(key)).await
    }

    pub async fn delete_state(&self, key: &str) -> anyhow::Result<()> {
        self.store.delete(&self.scoped_key(key)).await
    }

    /// Hands a notification to the external delivery collaborator.
    pub async fn notify(&self, recipient: &str, body: &str) -> anyhow::Result<()> {
        match &self.delivery {
            Some(delivery) => delivery.deliver(recipient, body).await,
            None => Err(anyhow::anyhow!("no message-delivery collaborator configured")),
        }
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("{}.{}", self.agent_id, key)
    }
}

/// How a registered agent's logic executes.
pub(crate) enum RuntimeChoice {
    /// A code unit loaded into the host process.
    InProcess(Box<dyn InProcessAgent>),
    /// A child process on the given language runtime, optionally with a
    /// full environment override.
    Subprocess {
        language: Language,
        environment: Option<RuntimeEnvironment>,
    },
}

/// Builder for registering one agent: descriptor, event handlers,
/// scheduled hook, and runtime choice.
///
/// Registering a handler for an event kind also subscribes the descriptor
/// to that kind.
pub struct AgentBuilder {
    descriptor: AgentDescriptor,
    handlers: HashMap<EventKind, EventHandler>,
    scheduled: Option<ScheduledHook>,
    runtime: RuntimeChoice,
}

impl AgentBuilder {
    pub fn new(descriptor: AgentDescriptor) -> Self {
        Self {
            descriptor,
            handlers: HashMap::new(),
            scheduled: None,
            runtime: RuntimeChoice::InProcess(Box::new(NoopAgent)),
        }
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    /// Registers an asynchronous handler for one event kind.
    pub fn on_event<F, Fut>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(AgentContext, DomainEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if !self.descriptor.subscribes_to(&kind) {
            self.descriptor.event_types.push(kind.clone());
        }
        self.handlers
            .insert(kind, Box::new(move |ctx, event| Box::pin(handler(ctx, event))));
        self
    }

    /// Registers the hook invoked on each scheduled-task tick.
    pub fn on_scheduled<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(AgentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.scheduled = Some(Box::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Backs the agent with an in-process code unit.
    pub fn in_process(mut self, agent: Box<dyn InProcessAgent>) -> Self {
        self.runtime = RuntimeChoice::InProcess(agent);
        self
    }

    /// Backs the agent with a child process using the orchestrator's
    /// default environment for `language`.
    pub fn subprocess(mut self, language: Language) -> Self {
        self.runtime = RuntimeChoice::Subprocess {
            language,
            environment: None,
        };
        self
    }

    /// Backs the agent with a child process using an explicit environment.
    pub fn subprocess_with(mut self, environment: RuntimeEnvironment) -> Self {
        self.runtime = RuntimeChoice::Subprocess {
            language: environment.language,
            environment: Some(environment),
        };
        self
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        AgentDescriptor,
        HashMap<EventKind, EventHandler>,
        Option<ScheduledHook>,
        RuntimeChoice,
    ) {
        (self.descriptor, self.handlers, self.scheduled, self.runtime)
    }
}

/// Default code unit for agents defined purely by their handler table.
struct NoopAgent;

#[async_trait::async_trait]
impl InProcessAgent for NoopAgent {
    async fn initialize(&mut self, _context: &AgentContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Everything the supervisor mutates, behind one lock so the scheduled-task
/// timer and the event bus serialize their state updates. The lock is never
/// held across a handler or hook await; those futures are `'static` and run
/// with the guard released so they may reenter the bus.
pub(crate) struct SupervisorCell {
    state: AgentRuntimeState,
    handlers: HashMap<EventKind, EventHandler>,
    scheduled: Option<ScheduledHook>,
    adapter: Box<dyn RuntimeAdapter>,
    schedule: Option<ScheduleHandle>,
    context: AgentContext,
    outbound_rx: UnboundedReceiver<MessageEnvelope>,
}

/// Owns one agent's lifecycle state machine, its scheduled-task timer, and
/// its inbound event-handler table.
pub struct AgentSupervisor {
    descriptor: Arc<AgentDescriptor>,
    cell: Arc<Mutex<SupervisorCell>>,
}

impl fmt::Debug for AgentSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSupervisor")
            .field("agent_id", &self.descriptor.id)
            .finish()
    }
}

impl AgentSupervisor {
    pub(crate) fn assemble(
        descriptor: Arc<AgentDescriptor>,
        handlers: HashMap<EventKind, EventHandler>,
        scheduled: Option<ScheduledHook>,
        adapter: Box<dyn RuntimeAdapter>,
        context: AgentContext,
        outbound_rx: UnboundedReceiver<MessageEnvelope>,
    ) -> Self {
        Self {
            descriptor,
            cell: Arc::new(Mutex::new(SupervisorCell {
                state: AgentRuntimeState::default(),
                handlers,
                scheduled,
                adapter,
                schedule: None,
                context,
                outbound_rx,
            })),
        }
    }

    pub fn descriptor(&self) -> &Arc<AgentDescriptor> {
        &self.descriptor
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Starts the agent: `stopped → starting → running`, arming the
    /// scheduled-task timer if the descriptor carries a schedule.
    ///
    /// A failure inside the adapter's start (which runs the agent's
    /// `initialize` hook) transitions to `error` and re-raises.
    #[instrument(skip(self), fields(agent_id = %self.descriptor.id))]
    pub async fn start(&self) -> anyhow::Result<()> {
        let mut cell = self.cell.lock().await;
        cell.state.transition(AgentStatus::Starting)?;
        let context = cell.context.clone();
        if let Err(e) = cell.adapter.start(&context).await {
            error!(error = %e, "agent failed to start");
            cell.state.transition(AgentStatus::Error).ok();
            cell.state.error_count += 1;
            return Err(e);
        }
        self.arm_schedule(&mut cell);
        cell.state.transition(AgentStatus::Running)?;
        cell.state.started_at = Some(chrono::Utc::now());
        cell.state.touch();
        Self::pump_outbound(&mut cell).await;
        debug!("agent running");
        Ok(())
    }

    /// Stops the agent: `running/paused → stopping → stopped`, disarming
    /// the timer and running the agent's `cleanup` hook.
    ///
    /// Stopping an already-stopped agent is a no-op; stopping an errored
    /// agent is too, since nothing of it is live.
    #[instrument(skip(self), fields(agent_id = %self.descriptor.id))]
    pub async fn stop(&self) -> anyhow::Result<()> {
        let mut cell = self.cell.lock().await;
        match cell.state.status {
            AgentStatus::Stopped => {
                trace!("stop on a stopped agent is a no-op");
                return Ok(());
            }
            AgentStatus::Error => {
                debug!("stop on an errored agent is a no-op");
                return Ok(());
            }
            _ => {}
        }
        cell.state.transition(AgentStatus::Stopping)?;
        if let Some(handle) = cell.schedule.take() {
            handle.disarm();
        }
        if let Err(e) = cell.adapter.stop().await {
            error!(error = %e, "agent failed to stop cleanly");
            cell.state.transition(AgentStatus::Error).ok();
            cell.state.error_count += 1;
            return Err(e);
        }
        cell.state.transition(AgentStatus::Stopped)?;
        debug!("agent stopped");
        Ok(())
    }

    /// Pauses a running agent, disarming its timer without running
    /// `cleanup`.
    #[instrument(skip(self), fields(agent_id = %self.descriptor.id))]
    pub async fn pause(&self) -> anyhow::Result<()> {
        let mut cell = self.cell.lock().await;
        cell.state.transition(AgentStatus::Paused)?;
        if let Some(handle) = cell.schedule.take() {
            handle.disarm();
        }
        Ok(())
    }

    /// Resumes a paused agent, re-arming its timer without running
    /// `initialize`.
    #[instrument(skip(self), fields(agent_id = %self.descriptor.id))]
    pub async fn resume(&self) -> anyhow::Result<()> {
        let mut cell = self.cell.lock().await;
        cell.state.transition(AgentStatus::Running)?;
        self.arm_schedule(&mut cell);
        Ok(())
    }

    /// Delivers one domain event to this agent's handler table.
    ///
    /// Returns `Ok(true)` when a handler ran successfully, `Ok(false)` when
    /// the agent was not running or had no handler for the kind. Handler
    /// failures increment the error counter and re-raise to the bus, which
    /// isolates them per agent.
    #[instrument(skip(self, event), fields(agent_id = %self.descriptor.id, kind = %event.kind))]
    pub async fn handle_event(&self, event: &mut DomainEvent) -> anyhow::Result<bool> {
        // Build the handler future under the lock, then release it before
        // awaiting: a handler may publish back into the bus, which dispatches
        // to this same supervisor.
        let fut = {
            let cell = self.cell.lock().await;
            if cell.state.status != AgentStatus::Running {
                trace!(status = %cell.state.status, "agent not running, skipping event");
                return Ok(false);
            }
            let Some(handler) = cell.handlers.get(&event.kind) else {
                debug!("no handler registered for event kind, dropping");
                return Ok(false);
            };
            handler(cell.context.clone(), event.clone())
        };
        let result = fut.await;
        let mut cell = self.cell.lock().await;
        match result {
            Ok(()) => {
                event.processed = true;
                cell.state.processed_messages += 1;
                cell.state.touch();
                Self::pump_outbound(&mut cell).await;
                Ok(true)
            }
            Err(e) => {
                cell.state.error_count += 1;
                Err(e)
            }
        }
    }

    /// Queues an envelope for delivery by this agent's runtime adapter.
    pub async fn send_message(&self, envelope: MessageEnvelope) -> anyhow::Result<()> {
        let mut cell = self.cell.lock().await;
        cell.adapter.send(envelope).await
    }

    /// Read-only snapshot for monitoring.
    pub async fn snapshot(&self) -> AgentStatusSnapshot {
        let cell = self.cell.lock().await;
        let execution = cell.adapter.execution_context();
        AgentStatusSnapshot {
            agent_id: self.descriptor.id.clone(),
            name: self.descriptor.name.clone(),
            status: cell.state.status,
            health: execution.health,
            started_at: cell.state.started_at,
            last_activity: cell.state.last_activity,
            processed_messages: cell.state.processed_messages,
            error_count: cell.state.error_count,
            scheduled: cell.schedule.is_some(),
        }
    }

    /// The adapter's process-level view of this agent.
    pub async fn execution_context(&self) -> ExecutionContext {
        self.cell.lock().await.adapter.execution_context()
    }

    /// Hands out the inbound envelope stream from an out-of-process agent.
    pub async fn take_inbound(&self) -> Option<UnboundedReceiver<MessageEnvelope>> {
        self.cell.lock().await.adapter.take_inbound()
    }

    fn arm_schedule(&self, cell: &mut SupervisorCell) {
        let Some(expression) = self.descriptor.schedule.as_deref() else {
            return;
        };
        if cell.scheduled.is_none() {
            debug!(agent_id = %self.descriptor.id, "schedule configured but no scheduled hook registered");
        }
        let interval = scheduler::parse_schedule(expression);
        let agent_id = self.descriptor.id.clone();
        let cell_ref = Arc::clone(&self.cell);
        let handle = scheduler::arm(interval, move || {
            let cell_ref = Arc::clone(&cell_ref);
            let agent_id = agent_id.clone();
            async move {
                // Same locking discipline as handle_event: the hook runs
                // outside the lock so it may publish events this agent
                // handles.
                let fut = {
                    let cell = cell_ref.lock().await;
                    if cell.state.status != AgentStatus::Running {
                        return;
                    }
                    let Some(hook) = cell.scheduled.as_ref() else {
                        return;
                    };
                    hook(cell.context.clone())
                };
                // Scheduled-task failures are logged and counted, never
                // propagated; the timer keeps ticking.
                let result = fut.await;
                let mut cell = cell_ref.lock().await;
                match result {
                    Ok(()) => cell.state.touch(),
                    Err(e) => {
                        warn!(agent_id, error = %e, "scheduled task failed");
                        cell.state.error_count += 1;
                    }
                }
                Self::pump_outbound(&mut cell).await;
            }
        });
        cell.schedule = Some(handle);
    }

    /// Moves everything the last invocation queued into the adapter,
    /// preserving arrival order. Bounded to the messages present on entry
    /// so an agent replying to itself cannot starve the caller.
    async fn pump_outbound(cell: &mut SupervisorCell) {
        let mut batch = Vec::new();
        while let Ok(envelope) = cell.outbound_rx.try_recv() {
            batch.push(envelope);
        }
        for envelope in batch {
            if let Err(e) = cell.adapter.send(envelope).await {
                warn!(error = %e, "failed to deliver outbound message");
                cell.state.error_count += 1;
            }
        }
    }
}
