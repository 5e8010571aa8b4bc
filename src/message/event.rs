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

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::common::OrchestratorError;

/// The kind of a domain event.
///
/// The dashboard's well-known event kinds form a closed set; names arriving
/// from external collaborators that fall outside it are carried through the
/// validated `Custom` variant rather than dispatched on raw strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A client completed intake and was added to the registry.
    ClientRegistered,
    /// Shelter bed occupancy changed.
    OccupancyChanged,
    /// A client checked out of a shelter or service.
    Checkout,
    /// A weather condition relevant to shelter operations.
    WeatherAlert,
    /// Food, water, or sanitation stock dropped below threshold.
    ResourceLow,
    /// A supervisor's own scheduled task fired.
    ScheduledWakeup,
    /// A validated event-type name from an external collaborator.
    Custom(String),
}

impl EventKind {
    /// Returns the wire name of this event kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ClientRegistered => "client_registered",
            EventKind::OccupancyChanged => "occupancy_changed",
            EventKind::Checkout => "checkout",
            EventKind::WeatherAlert => "weather_alert",
            EventKind::ResourceLow => "resource_low",
            EventKind::ScheduledWakeup => "scheduled_wakeup",
            EventKind::Custom(name) => name,
        }
    }
}

impl FromStr for EventKind {
    type Err = OrchestratorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim();
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(OrchestratorError::InvalidEventKind(raw.to_string()));
        }
        Ok(match name {
            "client_registered" => EventKind::ClientRegistered,
            "occupancy_changed" => EventKind::OccupancyChanged,
            "checkout" => EventKind::Checkout,
            "weather_alert" => EventKind::WeatherAlert,
            "resource_low" => EventKind::ResourceLow,
            "scheduled_wakeup" => EventKind::ScheduledWakeup,
            other => EventKind::Custom(other.to_string()),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A domain event published by dashboard collaborators or by a supervisor's
/// own scheduled task, and distributed to subscribed running agents.
///
/// The `processed` flag is informational: the bus marks it after the first
/// successful delivery. It is not a de-duplication guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Optional source device or location tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub processed: bool,
}

impl DomainEvent {
    /// Creates a new unprocessed event with a generated id and the current time.
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            timestamp: Utc::now(),
            source: None,
            data,
            processed: false,
        }
    }

    /// Tags the event with its originating device or location.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
