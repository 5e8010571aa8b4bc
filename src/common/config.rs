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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::runtime::{Language, RuntimeEnvironment};

/// Orchestrator-wide configuration, loadable from TOML.
///
/// ```toml
/// queue_warn_depth = 2048
/// shutdown_grace_ms = 5000
///
/// [[environments]]
/// language = "python"
/// executable = "python3"
/// args = ["src/agents/python/example_analytics_agent.py"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Queue depth above which the bus logs a warning.
    pub queue_warn_depth: usize,
    /// Grace period before an out-of-process agent is force-killed.
    pub shutdown_grace_ms: u64,
    /// Heartbeat age past which an out-of-process agent counts as stale.
    pub heartbeat_stale_ms: u64,
    /// Per-language runtime-environment defaults.
    pub environments: Vec<RuntimeEnvironment>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_warn_depth: 1_024,
            shutdown_grace_ms: 5_000,
            heartbeat_stale_ms: 90_000,
            environments: vec![RuntimeEnvironment::python(), RuntimeEnvironment::node()],
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// The default environment for a language, if one is configured.
    pub fn environment_for(&self, language: Language) -> Option<RuntimeEnvironment> {
        self.environments
            .iter()
            .find(|env| env.language == language)
            .cloned()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn heartbeat_stale(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.heartbeat_stale_ms as i64)
    }
}
