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

//! Test doubles: instrumented in-process code units and a recording
//! delivery collaborator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use haven_agents::prelude::*;

/// Shared counters observing one [`CounterUnit`] from the outside.
#[derive(Clone, Default)]
pub struct CounterProbe {
    pub initialized: Arc<AtomicUsize>,
    pub cleaned_up: Arc<AtomicUsize>,
    pub messages: Arc<AtomicUsize>,
}

impl CounterProbe {
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn cleaned_up(&self) -> usize {
        self.cleaned_up.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> usize {
        self.messages.load(Ordering::SeqCst)
    }
}

/// An in-process code unit that counts its hook invocations.
pub struct CounterUnit {
    probe: CounterProbe,
}

impl CounterUnit {
    pub fn boxed() -> (Box<dyn InProcessAgent>, CounterProbe) {
        let probe = CounterProbe::default();
        (
            Box::new(Self {
                probe: probe.clone(),
            }),
            probe,
        )
    }
}

#[async_trait]
impl InProcessAgent for CounterUnit {
    async fn initialize(&mut self, _context: &AgentContext) -> anyhow::Result<()> {
        self.probe.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup(&mut self) -> anyhow::Result<()> {
        self.probe.cleaned_up.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn handle_message(
        &mut self,
        _envelope: &MessageEnvelope,
    ) -> anyhow::Result<Option<MessageEnvelope>> {
        self.probe.messages.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// An in-process code unit whose `initialize` fails a configured number of
/// times before succeeding.
pub struct FlakyUnit {
    remaining_failures: usize,
    probe: CounterProbe,
}

impl FlakyUnit {
    pub fn boxed(failures: usize) -> (Box<dyn InProcessAgent>, CounterProbe) {
        let probe = CounterProbe::default();
        (
            Box::new(Self {
                remaining_failures: failures,
                probe: probe.clone(),
            }),
            probe,
        )
    }
}

#[async_trait]
impl InProcessAgent for FlakyUnit {
    async fn initialize(&mut self, _context: &AgentContext) -> anyhow::Result<()> {
        if self.remaining_failures > 0 {
            self.remaining_failures -= 1;
            anyhow::bail!("intake service unavailable");
        }
        self.probe.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An in-process code unit that logs its `cleanup` into a shared sequence,
/// for asserting batch ordering.
pub struct SequencedUnit {
    tag: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl SequencedUnit {
    pub fn boxed(tag: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Box<dyn InProcessAgent> {
        Box::new(Self {
            tag: tag.into(),
            log,
        })
    }
}

#[async_trait]
impl InProcessAgent for SequencedUnit {
    async fn initialize(&mut self, _context: &AgentContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&mut self) -> anyhow::Result<()> {
        self.log
            .lock()
            .expect("sequence log lock poisoned")
            .push(self.tag.clone());
        Ok(())
    }
}

/// A delivery collaborator that records every handoff.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingDelivery {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("delivery record lock poisoned").clone()
    }
}

#[async_trait]
impl MessageDelivery for RecordingDelivery {
    async fn deliver(&self, recipient: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("delivery record lock poisoned")
            .push((recipient.to_string(), body.to_string()));
        Ok(())
    }
}
