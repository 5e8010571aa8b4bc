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
#![allow(dead_code)]

use std::sync::Arc;

use haven_agents::prelude::*;

use crate::setup::agents::{CounterUnit, FlakyUnit, RecordingDelivery, SequencedUnit};
use crate::setup::initialize_tracing;

mod setup;

/// Agent identifiers are unique; a second registration under the same id
/// is rejected and the original stays in place.
#[tokio::test]
async fn duplicate_registration_is_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let orchestrator = AgentOrchestrator::launch();
    let (first, _) = CounterUnit::boxed();
    let (second, _) = CounterUnit::boxed();
    orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("intake", "Intake", "1.0.0")).in_process(first),
    )?;

    let result = orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("intake", "Intake Copy", "2.0.0"))
            .in_process(second),
    );
    assert!(matches!(result, Err(OrchestratorError::DuplicateAgent(id)) if id == "intake"));
    assert_eq!(orchestrator.agent_count(), 1);
    Ok(())
}

/// Lifecycle operations on unregistered identifiers fail cleanly.
#[tokio::test]
async fn unknown_agent_operations_fail() {
    initialize_tracing();
    let orchestrator = AgentOrchestrator::launch();
    assert!(orchestrator.start_agent("ghost").await.is_err());
    assert!(orchestrator.stop_agent("ghost").await.is_err());
    assert!(orchestrator.status("ghost").await.is_err());
    assert!(orchestrator.supervisor("ghost").is_none());
}

/// `start_all` skips disabled agents and collects per-agent failures
/// without aborting the batch.
#[tokio::test]
async fn start_all_skips_disabled_and_collects_failures() -> anyhow::Result<()> {
    initialize_tracing();
    let orchestrator = AgentOrchestrator::launch();
    let (healthy, _) = CounterUnit::boxed();
    let (broken, _) = FlakyUnit::boxed(usize::MAX);
    let (parked, _) = CounterUnit::boxed();
    orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("healthy", "Healthy", "1.0.0")).in_process(healthy),
    )?;
    orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("broken", "Broken", "1.0.0")).in_process(broken),
    )?;
    orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("parked", "Parked", "1.0.0").disabled())
            .in_process(parked),
    )?;

    let failures = orchestrator.start_all().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].agent_id, "broken");

    assert_eq!(orchestrator.status("healthy").await?.status, AgentStatus::Running);
    assert_eq!(orchestrator.status("broken").await?.status, AgentStatus::Error);
    assert_eq!(orchestrator.status("parked").await?.status, AgentStatus::Stopped);
    Ok(())
}

/// `stop_all` brings every running agent down, in registration order like
/// the other batch operations.
#[tokio::test]
async fn stop_all_stops_running_agents_in_order() -> anyhow::Result<()> {
    initialize_tracing();
    let orchestrator = AgentOrchestrator::launch();
    let sequence = Arc::new(std::sync::Mutex::new(Vec::new()));
    for id in ["a", "b", "c"] {
        orchestrator.register(
            AgentBuilder::new(AgentDescriptor::new(id, id, "1.0.0"))
                .in_process(SequencedUnit::boxed(id, sequence.clone())),
        )?;
    }
    assert!(orchestrator.start_all().await.is_empty());
    assert!(orchestrator.stop_all().await.is_empty());
    for status in orchestrator.all_statuses().await {
        assert_eq!(status.status, AgentStatus::Stopped);
    }
    assert_eq!(*sequence.lock().unwrap(), vec!["a", "b", "c"]);
    Ok(())
}

/// Status listings come back in registration order.
#[tokio::test]
async fn statuses_list_in_registration_order() -> anyhow::Result<()> {
    initialize_tracing();
    let orchestrator = AgentOrchestrator::launch();
    for id in ["zulu", "alpha", "mike"] {
        let (unit, _) = CounterUnit::boxed();
        orchestrator.register(
            AgentBuilder::new(AgentDescriptor::new(id, id, "1.0.0")).in_process(unit),
        )?;
    }
    let ids: Vec<String> = orchestrator
        .all_statuses()
        .await
        .into_iter()
        .map(|s| s.agent_id)
        .collect();
    assert_eq!(ids, vec!["zulu", "alpha", "mike"]);
    Ok(())
}

/// A broadcast command is dispatched to every registered agent's runtime
/// channel.
#[tokio::test]
async fn broadcast_reaches_every_agent() -> anyhow::Result<()> {
    initialize_tracing();
    let orchestrator = AgentOrchestrator::launch();
    let (first, first_probe) = CounterUnit::boxed();
    let (second, second_probe) = CounterUnit::boxed();
    orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("one", "One", "1.0.0")).in_process(first),
    )?;
    orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("two", "Two", "1.0.0")).in_process(second),
    )?;
    orchestrator.start_all().await;

    let failures = orchestrator
        .broadcast(serde_json::json!({ "command": "refresh" }))
        .await;
    assert!(failures.is_empty());
    assert_eq!(first_probe.messages(), 1);
    assert_eq!(second_probe.messages(), 1);
    Ok(())
}

/// Agent state blobs are namespaced per agent in the shared store.
#[tokio::test]
async fn state_store_keys_are_scoped_per_agent() -> anyhow::Result<()> {
    initialize_tracing();
    let store = Arc::new(MemoryStateStore::default());
    let orchestrator =
        AgentOrchestrator::launch_full(OrchestratorConfig::default(), store.clone(), None);

    orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("tracker", "Tracker", "1.0.0")).on_event(
            EventKind::Checkout,
            |ctx, event| async move {
                ctx.save_state("last_checkout", event.data.clone()).await?;
                Ok(())
            },
        ),
    )?;
    orchestrator.start_agent("tracker").await?;
    orchestrator
        .publish(DomainEvent::new(
            EventKind::Checkout,
            serde_json::json!({ "clientId": "c-3" }),
        ))
        .await;

    let saved = store.load("tracker.last_checkout").await?;
    assert_eq!(saved, Some(serde_json::json!({ "clientId": "c-3" })));
    assert_eq!(store.load("last_checkout").await?, None);
    Ok(())
}

/// `notify` hands off to the configured delivery collaborator; without one
/// it fails rather than silently dropping the notification.
#[tokio::test]
async fn notify_uses_the_delivery_collaborator() -> anyhow::Result<()> {
    initialize_tracing();
    let delivery = Arc::new(RecordingDelivery::default());
    let orchestrator = AgentOrchestrator::launch_full(
        OrchestratorConfig::default(),
        Arc::new(MemoryStateStore::default()),
        Some(delivery.clone()),
    );

    orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("alerter", "Alerter", "1.0.0")).on_event(
            EventKind::ResourceLow,
            |ctx, _event| async move {
                ctx.notify("+15550100", "water stock is low").await?;
                Ok(())
            },
        ),
    )?;
    orchestrator.start_agent("alerter").await?;
    orchestrator
        .publish(DomainEvent::new(EventKind::ResourceLow, serde_json::json!({})))
        .await;

    assert_eq!(
        delivery.sent(),
        vec![("+15550100".to_string(), "water stock is low".to_string())]
    );
    Ok(())
}

/// Configuration loads from TOML with per-language environment overrides;
/// unspecified fields keep their defaults.
#[tokio::test]
async fn config_loads_from_toml() -> anyhow::Result<()> {
    initialize_tracing();
    let config = OrchestratorConfig::from_toml_str(
        r#"
        queue_warn_depth = 64

        [[environments]]
        language = "python"
        executable = "/usr/bin/python3.11"
        args = ["agents/analytics.py"]
        "#,
    )?;
    assert_eq!(config.queue_warn_depth, 64);
    assert_eq!(config.shutdown_grace_ms, 5_000);
    let python = config.environment_for(Language::Python).unwrap();
    assert_eq!(python.executable, "/usr/bin/python3.11");
    assert!(python.agent_id_arg);
    assert!(config.environment_for(Language::Javascript).is_none());
    Ok(())
}

/// Registering a subprocess agent for a language with no configured
/// environment fails at registration, not at start.
#[tokio::test]
async fn subprocess_without_environment_is_rejected() {
    initialize_tracing();
    let config = OrchestratorConfig {
        environments: Vec::new(),
        ..OrchestratorConfig::default()
    };
    let orchestrator = AgentOrchestrator::launch_with(config);
    let result = orchestrator.register(
        AgentBuilder::new(AgentDescriptor::new("py", "Py", "1.0.0"))
            .subprocess(Language::Python),
    );
    assert!(matches!(
        result,
        Err(OrchestratorError::NoRuntimeEnvironment(Language::Python))
    ));
}
