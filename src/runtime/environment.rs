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

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Language runtimes an agent may execute on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    Javascript,
    Typescript,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
        };
        f.write_str(name)
    }
}

/// Advisory resource limits exported to the child process environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_memory_mb: u64,
    pub max_cpu_percent: u8,
    pub timeout_ms: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 256,
            max_cpu_percent: 50,
            timeout_ms: 30_000,
        }
    }
}

/// How to start one out-of-process agent: interpreter, arguments, working
/// directory, environment variables, and advisory limits.
///
/// One instance per supported language is defaulted by the orchestrator
/// configuration; agents may override it at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEnvironment {
    pub language: Language,
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub limits: ResourceLimits,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Whether to append `--agent-id <id>` to the child's arguments, the
    /// convention the deployed Python agents parse on startup.
    #[serde(default = "default_agent_id_arg")]
    pub agent_id_arg: bool,
}

fn default_agent_id_arg() -> bool {
    true
}

impl RuntimeEnvironment {
    /// A bare environment running the given executable.
    pub fn new(language: Language, executable: impl Into<String>) -> Self {
        Self {
            language,
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            limits: ResourceLimits::default(),
            dependencies: Vec::new(),
            agent_id_arg: true,
        }
    }

    /// The default Python 3 environment.
    pub fn python() -> Self {
        Self::new(Language::Python, "python3")
    }

    /// The default Node.js environment.
    pub fn node() -> Self {
        Self::new(Language::Javascript, "node")
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Disables the `--agent-id` argument convention.
    pub fn without_agent_id_arg(mut self) -> Self {
        self.agent_id_arg = false;
        self
    }
}
