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

//! Runtime adapter for agents running as separate operating-system
//! processes, speaking line-delimited JSON envelopes over stdin/stdout.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::agent::AgentContext;
use crate::message::{AgentAddress, MessageEnvelope, MessageKind};
use crate::runtime::adapter::{
    shared_context, ChannelKind, ExecutionContext, HealthStatus, RuntimeAdapter, SharedContext,
};
use crate::runtime::environment::RuntimeEnvironment;

/// Runtime adapter that owns one child process and its stdio channel.
///
/// Sends issued before the spawn completes queue in arrival order and are
/// flushed ahead of new sends once the channel is ready. `stop` sends the
/// protocol-level shutdown command, closes the child's stdin, and escalates
/// to a forced kill after the grace period.
pub struct SubprocessAdapter {
    agent_id: String,
    environment: RuntimeEnvironment,
    context: SharedContext,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    pending: VecDeque<MessageEnvelope>,
    ready: bool,
    started_once: bool,
    grace: Duration,
    pumps: CancellationToken,
    inbound_tx: UnboundedSender<MessageEnvelope>,
    inbound_rx: Option<UnboundedReceiver<MessageEnvelope>>,
}

impl SubprocessAdapter {
    pub fn new(agent_id: impl Into<String>, environment: RuntimeEnvironment, grace: Duration) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            agent_id: agent_id.into(),
            environment,
            context: shared_context(ChannelKind::Stdio),
            child: None,
            stdin: None,
            pending: VecDeque::new(),
            ready: false,
            started_once: false,
            grace,
            pumps: CancellationToken::new(),
            inbound_tx,
            inbound_rx: Some(inbound_rx),
        }
    }

    fn set_health(&self, health: HealthStatus) {
        self.context.lock().expect("execution context lock poisoned").health = health;
    }

    fn build_command(&self) -> Command {
        let env = &self.environment;
        let mut command = Command::new(&env.executable);
        command.args(&env.args);
        if env.agent_id_arg {
            command.arg("--agent-id").arg(&self.agent_id);
        }
        if let Some(dir) = &env.working_dir {
            command.current_dir(dir);
        }
        command.envs(&env.env);
        command.env("HAVEN_AGENT_ID", &self.agent_id);
        command.env("HAVEN_MAX_MEMORY_MB", env.limits.max_memory_mb.to_string());
        command.env("HAVEN_MAX_CPU_PERCENT", env.limits.max_cpu_percent.to_string());
        command.env("HAVEN_TIMEOUT_MS", env.limits.timeout_ms.to_string());
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Reads the child's stdout. Each line is one envelope; lines that fail
    /// to parse are opaque agent log output, not protocol errors.
    fn spawn_stdout_pump(
        &self,
        stdout: tokio::process::ChildStdout,
        cancel: CancellationToken,
    ) {
        let agent_id = self.agent_id.clone();
        let context = self.context.clone();
        let inbound = self.inbound_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = lines.next_line() => match next {
                        Ok(Some(line)) => match serde_json::from_str::<MessageEnvelope>(&line) {
                            Ok(envelope) if envelope.kind == MessageKind::Heartbeat => {
                                trace!(agent_id, "heartbeat received");
                                let mut ctx = context.lock().expect("execution context lock poisoned");
                                ctx.last_heartbeat = Some(Utc::now());
                                ctx.health = HealthStatus::Healthy;
                            }
                            Ok(envelope) => {
                                trace!(agent_id, kind = ?envelope.kind, id = %envelope.id, "envelope received");
                                // Receiver dropped means nobody is listening; fine.
                                let _ = inbound.send(envelope);
                            }
                            Err(_) => {
                                info!(agent_id, output = %line, "agent output");
                            }
                        },
                        Ok(None) => {
                            let mut ctx = context.lock().expect("execution context lock poisoned");
                            if ctx.health != HealthStatus::Stopped {
                                warn!(agent_id, "agent process exited unexpectedly");
                                ctx.health = HealthStatus::Unhealthy;
                            }
                            break;
                        }
                        Err(e) => {
                            warn!(agent_id, error = %e, "error reading agent stdout");
                            break;
                        }
                    },
                }
            }
            trace!(agent_id, "stdout pump finished");
        });
    }

    fn spawn_stderr_pump(
        &self,
        stderr: tokio::process::ChildStderr,
        cancel: CancellationToken,
    ) {
        let agent_id = self.agent_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = lines.next_line() => match next {
                        Ok(Some(line)) => warn!(agent_id, stderr = %line, "agent stderr"),
                        _ => break,
                    },
                }
            }
        });
    }

    async fn write_envelope(stdin: &mut ChildStdin, envelope: &MessageEnvelope) -> anyhow::Result<()> {
        let mut line = envelope.to_line()?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    fn host_address(&self) -> AgentAddress {
        AgentAddress::host("orchestrator")
    }
}

#[async_trait]
impl RuntimeAdapter for SubprocessAdapter {
    #[instrument(skip(self, _context), fields(agent_id = %self.agent_id, executable = %self.environment.executable))]
    async fn start(&mut self, _context: &AgentContext) -> anyhow::Result<()> {
        let mut child = match self.build_command().spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, "failed to spawn agent process");
                self.set_health(HealthStatus::Unhealthy);
                return Err(e.into());
            }
        };
        if self.started_once {
            self.context.lock().expect("execution context lock poisoned").restart_count += 1;
        }
        self.started_once = true;

        self.pumps = CancellationToken::new();
        if let Some(stdout) = child.stdout.take() {
            self.spawn_stdout_pump(stdout, self.pumps.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_stderr_pump(stderr, self.pumps.clone());
        }
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("child process has no stdin pipe"))?;

        // Channel is up; flush everything queued before the spawn, in
        // arrival order, ahead of any new sends.
        while let Some(envelope) = self.pending.pop_front() {
            Self::write_envelope(&mut stdin, &envelope).await?;
        }
        self.stdin = Some(stdin);
        self.child = Some(child);
        self.ready = true;
        self.set_health(HealthStatus::Healthy);
        debug!("agent process started");
        Ok(())
    }

    #[instrument(skip(self), fields(agent_id = %self.agent_id))]
    async fn stop(&mut self) -> anyhow::Result<()> {
        self.ready = false;
        // Mark stopped before the pumps observe EOF, so a deliberate stop
        // is not reported as an unexpected exit.
        self.set_health(HealthStatus::Stopped);

        if let Some(mut stdin) = self.stdin.take() {
            let shutdown =
                MessageEnvelope::shutdown_command(self.host_address(), self.agent_id.clone());
            if let Err(e) = Self::write_envelope(&mut stdin, &shutdown).await {
                debug!(error = %e, "could not deliver shutdown command");
            }
            // Dropping stdin closes the pipe; line-loop agents exit on EOF.
            drop(stdin);
        }

        if let Some(mut child) = self.child.take() {
            match timeout(self.grace, child.wait()).await {
                Ok(Ok(status)) => trace!(?status, "agent process exited"),
                Ok(Err(e)) => warn!(error = %e, "error awaiting agent process exit"),
                Err(_) => {
                    warn!(grace = ?self.grace, "agent did not exit within grace period, killing");
                    child.start_kill().ok();
                    child.wait().await.ok();
                }
            }
        }
        self.pumps.cancel();
        Ok(())
    }

    async fn send(&mut self, envelope: MessageEnvelope) -> anyhow::Result<()> {
        if !self.ready {
            trace!(agent_id = %self.agent_id, id = %envelope.id, "channel not ready, queueing send");
            self.pending.push_back(envelope);
            return Ok(());
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("agent channel is not open"))?;
        if let Err(e) = Self::write_envelope(stdin, &envelope).await {
            self.set_health(HealthStatus::Unhealthy);
            return Err(e);
        }
        Ok(())
    }

    fn execution_context(&self) -> ExecutionContext {
        self.context.lock().expect("execution context lock poisoned").clone()
    }

    fn take_inbound(&mut self) -> Option<UnboundedReceiver<MessageEnvelope>> {
        self.inbound_rx.take()
    }
}
