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

use serde::{Deserialize, Serialize};

use crate::message::EventKind;

/// Static configuration for one agent.
///
/// Immutable once registered; re-registering the same identifier is an
/// error. The subscribed event-type list drives bus delivery, the schedule
/// expression (if any) drives the supervisor's periodic task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Microservice tags this agent participates in.
    #[serde(default)]
    pub microservices: Vec<String>,
    #[serde(default)]
    pub event_types: Vec<EventKind>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            microservices: Vec::new(),
            event_types: Vec::new(),
            schedule: None,
            enabled: true,
            settings: HashMap::new(),
        }
    }

    pub fn with_events(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.event_types.extend(kinds);
        self
    }

    pub fn with_schedule(mut self, expression: impl Into<String>) -> Self {
        self.schedule = Some(expression.into());
        self
    }

    pub fn with_microservices(
        mut self,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.microservices.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Excludes the agent from `start_all` batches.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn subscribes_to(&self, kind: &EventKind) -> bool {
        self.event_types.contains(kind)
    }
}
