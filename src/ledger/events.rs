// Notifications published by the ledger after a call commits.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::crypto::{Address, Hash256};
use super::transaction::Transaction;

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    AccountCreated {
        address: Address,
        address_hash: Hash256,
    },
    PowChecked {
        digest: Hash256,
        accepted: bool,
    },
    TransactionMinted {
        index: u64,
        receiver: Address,
        transaction: Transaction,
    },
    CoinsSent {
        from: Address,
        to: Address,
        amount: u64,
    },
}

/// An event with its position in the ledger's notification stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Strictly increasing, in call order
    pub sequence: u64,

    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub kind: EventKind,
}

/// Receiving end handed to each subscriber
pub type EventReceiver = mpsc::UnboundedReceiver<LedgerEvent>;

/// Fan-out of ledger events to any number of subscribers
///
/// Every subscriber owns an unbounded queue, so a slow reader never loses
/// events. Queues whose receiver was dropped are pruned on the next publish.
#[derive(Debug, Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<LedgerEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Publishes an event; having no subscribers is not an error
    pub fn publish(&self, sequence: u64, kind: EventKind) {
        let event = LedgerEvent {
            sequence,
            timestamp: Utc::now(),
            kind,
        };

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();

        // send only fails once the receiver is gone
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());

        if subscribers.len() < before {
            debug!("Dropped {} closed event subscriber(s)", before - subscribers.len());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(0, EventKind::CoinsSent {
            from: Address("a".to_string()),
            to: Address("b".to_string()),
            amount: 1,
        });
    }

    #[test]
    fn test_subscribers_receive_in_order() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(0, EventKind::PowChecked {
            digest: Hash256::ZERO,
            accepted: true,
        });
        bus.publish(1, EventKind::CoinsSent {
            from: Address("a".to_string()),
            to: Address("b".to_string()),
            amount: 5,
        });

        let first = receiver.try_recv().unwrap();
        let second = receiver.try_recv().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert!(matches!(second.kind, EventKind::CoinsSent { amount: 5, .. }));
    }

    #[test]
    fn test_slow_subscriber_misses_nothing() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        for sequence in 0..5_000u64 {
            bus.publish(sequence, EventKind::PowChecked {
                digest: Hash256::ZERO,
                accepted: sequence % 2 == 0,
            });
        }

        let sequences: Vec<u64> = std::iter::from_fn(|| receiver.try_recv().ok())
            .map(|event| event.sequence)
            .collect();
        assert_eq!(sequences, (0..5_000u64).collect::<Vec<_>>());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let mut kept = bus.subscribe();
        let dropped = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(dropped);
        bus.publish(0, EventKind::CoinsSent {
            from: Address("a".to_string()),
            to: Address("b".to_string()),
            amount: 1,
        });

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap().sequence, 0);
    }

    #[test]
    fn test_event_json_shape() {
        let event = LedgerEvent {
            sequence: 3,
            timestamp: Utc::now(),
            kind: EventKind::CoinsSent {
                from: Address("a".to_string()),
                to: Address("b".to_string()),
                amount: 7,
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "coins_sent");
        assert_eq!(value["sequence"], 3);
        assert_eq!(value["amount"], 7);
    }
}
