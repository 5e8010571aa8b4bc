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

use std::collections::VecDeque;

use tracing::warn;

use crate::message::DomainEvent;

/// The shared append-only event queue and its single in-flight drain guard.
///
/// The orchestrator holds this behind one lock. A publisher that observes
/// `begin_drain() == false` leaves the event for the pass already running;
/// the draining pass pops via [`EventBus::next`], which clears the guard
/// atomically with observing emptiness, so events appended mid-drain are
/// always picked up before the pass exits.
pub(crate) struct EventBus {
    queue: VecDeque<DomainEvent>,
    draining: bool,
    warn_depth: usize,
}

impl EventBus {
    pub(crate) fn new(warn_depth: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            draining: false,
            warn_depth,
        }
    }

    /// Appends an event in arrival order.
    pub(crate) fn enqueue(&mut self, event: DomainEvent) {
        self.queue.push_back(event);
        if self.queue.len() > self.warn_depth {
            warn!(depth = self.queue.len(), "event queue depth exceeds threshold");
        }
    }

    /// Claims the drain guard. Returns false when a pass is already
    /// in flight.
    pub(crate) fn begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    /// Pops the next event, or releases the drain guard when empty.
    pub(crate) fn next(&mut self) -> Option<DomainEvent> {
        match self.queue.pop_front() {
            Some(event) => Some(event),
            None => {
                self.draining = false;
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.queue.len()
    }
}
