use crate::address::Address;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// The kind of change that was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A change notification. Observers should re-query rather than trust the
/// payload; it only says where and roughly what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// The address that was written.
    pub address: Address,
    pub kind: ChangeKind,
    /// Rows affected by the write that produced this event.
    pub rows: usize,
    pub at: DateTime<Utc>,
}

struct Observer {
    address: Address,
    tx: SyncSender<ChangeEvent>,
}

#[derive(Default)]
struct Observers {
    next_id: u64,
    entries: HashMap<u64, Observer>,
}

/// Publish/subscribe registry keyed by address.
///
/// A published change reaches every subscription whose address equals, or
/// is an ancestor of, one of the published addresses. Delivery is
/// best-effort: a subscription whose receiver is gone is dropped on the next
/// publish.
///
/// Each subscription holds at most one pending event. While one is waiting,
/// further changes are folded into it; observers re-query on wake-up, so the
/// pending event only means "something changed since you last looked".
#[derive(Clone, Default)]
pub struct ChangeRegistry {
    inner: Arc<Mutex<Observers>>,
}

impl ChangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in `address`. Dropping the returned handle
    /// deregisters it.
    pub fn subscribe(&self, address: Address) -> Subscription {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut observers = self.observers();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.entries.insert(
            id,
            Observer {
                address: address.clone(),
                tx,
            },
        );
        log::debug!("Observer {id} subscribed to {address}");

        Subscription {
            id,
            address,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Notify observers of a single address. Returns how many were reached.
    pub fn publish(&self, address: &Address, kind: ChangeKind, rows: usize) -> usize {
        self.publish_all(std::slice::from_ref(address), kind, rows)
    }

    /// Notify observers of several addresses written by one operation. Each
    /// observer receives at most one event, carrying the first address in
    /// `addresses` it covers.
    pub fn publish_all(&self, addresses: &[Address], kind: ChangeKind, rows: usize) -> usize {
        let at = Utc::now();
        let mut observers = self.observers();
        let mut reached = 0;
        let mut dead = Vec::new();

        for (id, observer) in &observers.entries {
            let Some(address) = addresses.iter().find(|a| observer.address.covers(a)) else {
                continue;
            };
            let event = ChangeEvent {
                address: address.clone(),
                kind,
                rows,
                at,
            };
            match observer.tx.try_send(event) {
                Ok(()) | Err(TrySendError::Full(_)) => reached += 1,
                Err(TrySendError::Disconnected(_)) => dead.push(*id),
            }
        }

        for id in dead {
            log::warn!("Dropping unreachable observer {id}");
            observers.entries.remove(&id);
        }

        reached
    }

    /// Number of live subscriptions.
    pub fn observer_count(&self) -> usize {
        self.observers().entries.len()
    }
}

/// A registered interest in changes at an address.
pub struct Subscription {
    id: u64,
    address: Address,
    rx: Receiver<ChangeEvent>,
    registry: Weak<Mutex<Observers>>,
}

impl Subscription {
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Take the next pending event without blocking.
    pub fn try_next(&self) -> Option<ChangeEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain every pending event.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            let mut observers = inner.lock().unwrap_or_else(PoisonError::into_inner);
            observers.entries.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DEFAULT_AUTHORITY;

    #[test]
    fn test_item_write_reaches_item_and_collection() {
        let registry = ChangeRegistry::new();
        let collection = registry.subscribe(Address::products(DEFAULT_AUTHORITY));
        let item = registry.subscribe(Address::product(DEFAULT_AUTHORITY, 1));
        let other = registry.subscribe(Address::product(DEFAULT_AUTHORITY, 2));

        let reached = registry.publish(&Address::product(DEFAULT_AUTHORITY, 1), ChangeKind::Updated, 1);

        assert_eq!(reached, 2);
        assert!(collection.try_next().is_some());
        assert_eq!(item.try_next().unwrap().kind, ChangeKind::Updated);
        assert!(other.try_next().is_none());
    }

    #[test]
    fn test_collection_write_does_not_reach_items() {
        let registry = ChangeRegistry::new();
        let item = registry.subscribe(Address::product(DEFAULT_AUTHORITY, 1));
        registry.publish(&Address::products(DEFAULT_AUTHORITY), ChangeKind::Inserted, 1);
        assert!(item.try_next().is_none());
    }

    #[test]
    fn test_publish_all_delivers_once_per_observer() {
        let registry = ChangeRegistry::new();
        let collection = registry.subscribe(Address::products(DEFAULT_AUTHORITY));
        let item = registry.subscribe(Address::product(DEFAULT_AUTHORITY, 3));

        registry.publish_all(
            &[
                Address::product(DEFAULT_AUTHORITY, 3),
                Address::product(DEFAULT_AUTHORITY, 4),
                Address::products(DEFAULT_AUTHORITY),
            ],
            ChangeKind::Deleted,
            2,
        );

        assert_eq!(collection.drain().len(), 1);
        let events = item.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].address, Address::product(DEFAULT_AUTHORITY, 3));
        assert_eq!(events[0].rows, 2);
    }

    #[test]
    fn test_unread_changes_coalesce() {
        let registry = ChangeRegistry::new();
        let sub = registry.subscribe(Address::products(DEFAULT_AUTHORITY));

        for id in 1..=50 {
            let reached = registry.publish(&Address::product(DEFAULT_AUTHORITY, id), ChangeKind::Updated, 1);
            assert_eq!(reached, 1);
        }

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].address, Address::product(DEFAULT_AUTHORITY, 1));

        registry.publish(&Address::products(DEFAULT_AUTHORITY), ChangeKind::Inserted, 1);
        assert_eq!(sub.try_next().unwrap().kind, ChangeKind::Inserted);
    }

    #[test]
    fn test_drop_deregisters() {
        let registry = ChangeRegistry::new();
        let sub = registry.subscribe(Address::products(DEFAULT_AUTHORITY));
        assert_eq!(registry.observer_count(), 1);
        drop(sub);
        assert_eq!(registry.observer_count(), 0);
        assert_eq!(
            registry.publish(&Address::products(DEFAULT_AUTHORITY), ChangeKind::Inserted, 1),
            0
        );
    }

    #[test]
    fn test_subscription_outlives_registry() {
        let registry = ChangeRegistry::new();
        let sub = registry.subscribe(Address::products(DEFAULT_AUTHORITY));
        drop(registry);
        assert!(sub.try_next().is_none());
        drop(sub);
    }

    #[test]
    fn test_cross_thread_delivery() {
        let registry = ChangeRegistry::new();
        let sub = registry.subscribe(Address::products(DEFAULT_AUTHORITY));
        let publisher = registry.clone();
        std::thread::spawn(move || {
            publisher.publish(&Address::product(DEFAULT_AUTHORITY, 8), ChangeKind::Updated, 1);
        })
        .join()
        .unwrap();
        let event = sub.next_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event.address, Address::product(DEFAULT_AUTHORITY, 8));
    }
}
