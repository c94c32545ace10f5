use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::models::{NotificationEvent, NotificationId};

/// Owned collection of live-channel notifications, newest arrival first.
///
/// Only the channel task and the explicit mutation methods write to it; every
/// consumer reads through a [`watch::Receiver`] from [`LiveFeed::subscribe`].
#[derive(Clone)]
pub struct LiveFeed {
    sender: Arc<watch::Sender<Vec<NotificationEvent>>>,
    capacity: usize,
}

impl LiveFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = watch::channel(Vec::new());
        Self {
            sender: Arc::new(sender),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<NotificationEvent>> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> Vec<NotificationEvent> {
        self.sender.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.sender.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prepend a freshly received event. No dedupe happens here; the merge view
    /// resolves duplicate ids.
    pub fn prepend(&self, event: NotificationEvent) {
        let capacity = self.capacity;
        self.sender.send_modify(|events| {
            events.insert(0, event);
            if events.len() > capacity {
                let evicted = events.len() - capacity;
                events.truncate(capacity);
                debug!(evicted, capacity, "Live feed over capacity, evicted oldest arrivals");
            }
        });
    }

    /// Remove every entry with `id`. Returns whether anything was removed.
    pub fn remove(&self, id: &NotificationId) -> bool {
        self.sender.send_if_modified(|events| {
            let before = events.len();
            events.retain(|e| &e.id != id);
            events.len() != before
        })
    }

    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&NotificationEvent) -> bool,
    {
        self.sender.send_if_modified(|events| {
            let before = events.len();
            events.retain(|e| keep(e));
            events.len() != before
        });
    }

    pub fn clear(&self) {
        self.sender.send_if_modified(|events| {
            let had_entries = !events.is_empty();
            events.clear();
            had_entries
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn event(id: i64) -> NotificationEvent {
        NotificationEvent::new(id, Category::Generic)
    }

    #[test]
    fn test_prepend_keeps_newest_arrival_first() {
        let feed = LiveFeed::new(10);
        feed.prepend(event(1));
        feed.prepend(event(2));

        let ids: Vec<_> = feed.snapshot().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![NotificationId::from(2), NotificationId::from(1)]);
    }

    #[test]
    fn test_capacity_evicts_oldest_arrivals() {
        let feed = LiveFeed::new(2);
        for id in 1..=4 {
            feed.prepend(event(id));
        }

        let ids: Vec<_> = feed.snapshot().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![NotificationId::from(4), NotificationId::from(3)]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let feed = LiveFeed::new(10);
        feed.prepend(event(1));
        feed.prepend(event(2));

        assert!(feed.remove(&NotificationId::from(1)));
        let once = feed.snapshot();
        assert!(!feed.remove(&NotificationId::from(1)));
        assert_eq!(feed.snapshot(), once);
    }

    #[test]
    fn test_remove_missing_id_is_noop() {
        let feed = LiveFeed::new(10);
        feed.prepend(event(1));
        let rx = feed.subscribe();

        assert!(!feed.remove(&NotificationId::from(42)));
        assert_eq!(feed.len(), 1);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_subscribers_see_updates() {
        let feed = LiveFeed::new(10);
        let mut rx = feed.subscribe();
        feed.prepend(event(5));

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        feed.clear();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }
}
