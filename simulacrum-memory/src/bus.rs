// Copyright 2026 Simulacrum Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-process memory event bus
//!
//! Publish-to-all broadcast over a tokio channel. Errors are isolated per
//! subscriber: a lagging receiver observes `Lagged` on its own handle, a
//! dropped receiver is simply gone, and neither blocks the publisher or
//! the other subscribers.

use tokio::sync::broadcast;

use crate::chunk::{ChunkId, ChunkTier};
use simulacrum_core::{LearningId, TurnId};

/// Events published by the memory engine
#[derive(Debug, Clone)]
pub enum MemoryEvent {
    TurnAppended {
        turn_id: TurnId,
    },
    LearningAdded {
        learning_id: LearningId,
    },
    LearningSuperseded {
        old: LearningId,
        new: LearningId,
    },
    ChunkDemoted {
        chunk_id: ChunkId,
        from: ChunkTier,
        to: ChunkTier,
    },
    ConsolidationCompleted {
        hot_to_warm: usize,
        warm_to_cold: usize,
    },
}

/// Broadcast bus for memory events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MemoryEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers. Having none is not an error.
    pub fn publish(&self, event: MemoryEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(MemoryEvent::TurnAppended {
            turn_id: TurnId("t1".to_string()),
        });

        assert!(matches!(
            a.recv().await.unwrap(),
            MemoryEvent::TurnAppended { .. }
        ));
        assert!(matches!(
            b.recv().await.unwrap(),
            MemoryEvent::TurnAppended { .. }
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(MemoryEvent::ConsolidationCompleted {
            hot_to_warm: 1,
            warm_to_cold: 0,
        });
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_affect_others() {
        let bus = EventBus::default();
        let a = bus.subscribe();
        let mut b = bus.subscribe();
        drop(a);

        bus.publish(MemoryEvent::LearningAdded {
            learning_id: LearningId("l1".to_string()),
        });
        assert!(matches!(
            b.recv().await.unwrap(),
            MemoryEvent::LearningAdded { .. }
        ));
    }

    #[tokio::test]
    async fn test_lagged_subscriber_isolated() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();
        for i in 0..5 {
            bus.publish(MemoryEvent::ConsolidationCompleted {
                hot_to_warm: i,
                warm_to_cold: 0,
            });
        }
        let mut healthy = bus.subscribe();
        bus.publish(MemoryEvent::ConsolidationCompleted {
            hot_to_warm: 99,
            warm_to_cold: 0,
        });

        // The lagging subscriber errors on its own handle only
        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        // A healthy subscriber is unaffected
        match healthy.recv().await.unwrap() {
            MemoryEvent::ConsolidationCompleted { hot_to_warm, .. } => {
                assert_eq!(hot_to_warm, 99)
            }
            other => panic!("unexpected event {other:?}"),
        }
        // And the laggard recovers on subsequent receives
        assert!(slow.recv().await.is_ok());
    }
}
