//! Notification bus for newly captured records
//!
//! Each subscriber owns a small bounded mailbox. Publishing never blocks:
//! when a mailbox is full the oldest undelivered notification is dropped.
//! Subscribers that miss a push recover through `list_events`.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

use crate::interface::StoredRecord;

pub type SubscriptionId = u64;

struct Mailbox {
    queue: Mutex<VecDeque<StoredRecord>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.queue.lock().clear();
        self.notify.notify_one();
    }
}

struct BusInner {
    subscribers: Mutex<HashMap<SubscriptionId, Arc<Mailbox>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl BusInner {
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.lock().remove(&id);
        match removed {
            Some(mailbox) => {
                mailbox.close();
                true
            }
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl NotificationBus {
    /// `capacity` is the per-subscriber queue length (at least 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mailbox = Arc::new(Mailbox::new(self.inner.capacity));
        self.inner.subscribers.lock().insert(id, mailbox.clone());
        tracing::debug!(subscription = id, "subscriber registered");
        Subscription {
            id,
            mailbox,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Stop deliveries to `id` immediately. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.inner.unsubscribe(id) {
            tracing::debug!(subscription = id, "subscriber unregistered");
        }
    }

    /// Queue `record` for every subscriber. Returns how many received it.
    pub fn publish(&self, record: &StoredRecord) -> usize {
        let subscribers = self.inner.subscribers.lock();
        for (id, mailbox) in subscribers.iter() {
            {
                let mut queue = mailbox.queue.lock();
                if queue.len() >= self.inner.capacity {
                    queue.pop_front();
                    mailbox.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(subscription = id, "subscriber lagging; dropped oldest pending notification");
                }
                queue.push_back(record.clone());
            }
            mailbox.notify.notify_one();
        }
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// Receiving end of one registration. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    mailbox: Arc<Mailbox>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next pending record without waiting
    pub fn try_recv(&self) -> Option<StoredRecord> {
        self.mailbox.queue.lock().pop_front()
    }

    /// Wait for the next record. Returns None once unsubscribed.
    pub async fn recv(&self) -> Option<StoredRecord> {
        loop {
            if self.mailbox.closed.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(record) = self.try_recv() {
                return Some(record);
            }
            self.mailbox.notify.notified().await;
        }
    }

    /// Notifications discarded because this subscriber fell behind
    pub fn dropped(&self) -> u64 {
        self.mailbox.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.closed.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ClipboardEvent;
    use chrono::Utc;
    use tokio::time::{timeout, Duration};

    fn record(id: i64) -> StoredRecord {
        StoredRecord::new(id, ClipboardEvent::from_text(&format!("item {}", id)), Utc::now())
    }

    #[tokio::test]
    async fn publish_and_receive_record() {
        let bus = NotificationBus::new(8);
        let sub = bus.subscribe();

        assert_eq!(bus.publish(&record(1)), 1);

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("recv");
        assert_eq!(received.id, 1);
    }

    #[tokio::test]
    async fn recv_waits_for_later_publish() {
        let bus = NotificationBus::new(8);
        let sub = bus.subscribe();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(&record(42));
        });

        let received = timeout(Duration::from_secs(1), sub.recv()).await.expect("timeout");
        assert_eq!(received.map(|r| r.id), Some(42));
    }

    #[test]
    fn full_mailbox_drops_oldest_pending() {
        let bus = NotificationBus::new(2);
        let sub = bus.subscribe();

        for id in 1..=4 {
            bus.publish(&record(id));
        }

        assert_eq!(sub.dropped(), 2);
        assert_eq!(sub.try_recv().map(|r| r.id), Some(3));
        assert_eq!(sub.try_recv().map(|r| r.id), Some(4));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn slow_subscriber_does_not_affect_others() {
        let bus = NotificationBus::new(1);
        let slow = bus.subscribe();
        let fast = bus.subscribe();

        bus.publish(&record(1));
        assert_eq!(fast.try_recv().map(|r| r.id), Some(1));
        bus.publish(&record(2));

        assert_eq!(fast.try_recv().map(|r| r.id), Some(2));
        assert_eq!(fast.dropped(), 0);
        assert_eq!(slow.try_recv().map(|r| r.id), Some(2));
        assert_eq!(slow.dropped(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_immediate_and_idempotent() {
        let bus = NotificationBus::new(4);
        let sub = bus.subscribe();
        let id = sub.id();

        bus.publish(&record(1));
        bus.unsubscribe(id);
        bus.unsubscribe(id);

        assert!(sub.is_closed());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(&record(2)), 0);
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let bus = NotificationBus::new(4);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_wakes_pending_recv() {
        let bus = NotificationBus::new(4);
        let sub = Arc::new(bus.subscribe());
        let id = sub.id();

        let waiter = {
            let sub = sub.clone();
            tokio::spawn(async move { sub.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.unsubscribe(id);

        let result = timeout(Duration::from_secs(1), waiter).await.expect("timeout").unwrap();
        assert!(result.is_none());
    }
}
