use std::collections::HashSet;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{NotifyError, Result};
use crate::history::HistoryApi;
use crate::live_feed::LiveFeed;
use crate::merge::{count_matching, filter_matching, merge_notifications, BadgeCounts};
use crate::models::{NotificationEvent, NotificationId};

/// Handed out by [`NotificationView::focus`]; a snapshot is only applied if it
/// carries the ticket of the latest focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTicket {
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    Empty,
    Loading,
    Loaded,
    Failed(String),
}

/// One screen's view over the REST history and the live feed (drawer badges,
/// notification list, chat thread).
pub struct NotificationView {
    label: String,
    feed: LiveFeed,
    live: watch::Receiver<Vec<NotificationEvent>>,
    snapshot: Vec<NotificationEvent>,
    status: SnapshotStatus,
    read_overlay: HashSet<NotificationId>,
    epoch: u64,
    mounted: bool,
}

impl NotificationView {
    pub fn new(label: impl Into<String>, feed: &LiveFeed) -> Self {
        Self {
            label: label.into(),
            feed: feed.clone(),
            live: feed.subscribe(),
            snapshot: Vec::new(),
            status: SnapshotStatus::Empty,
            read_overlay: HashSet::new(),
            epoch: 0,
            mounted: true,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> &SnapshotStatus {
        &self.status
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Start a new history fetch cycle. Results from earlier cycles become stale.
    pub fn focus(&mut self) -> FocusTicket {
        self.epoch += 1;
        self.status = SnapshotStatus::Loading;
        FocusTicket { epoch: self.epoch }
    }

    pub fn unmount(&mut self) {
        self.mounted = false;
        debug!(view = %self.label, "View unmounted");
    }

    /// Apply the outcome of a history fetch.
    ///
    /// A fetch error leaves this view empty with a [`SnapshotStatus::Failed`]
    /// status; other views are unaffected.
    pub fn apply_snapshot(
        &mut self,
        ticket: FocusTicket,
        result: Result<Vec<NotificationEvent>>,
    ) -> Result<()> {
        if !self.mounted || ticket.epoch != self.epoch {
            debug!(view = %self.label, "Discarding stale history result");
            return Err(NotifyError::StaleUpdate);
        }

        match result {
            Ok(events) => {
                let confirmed: Vec<NotificationId> = self
                    .read_overlay
                    .iter()
                    .filter(|id| events.iter().any(|e| &e.id == *id && e.is_read))
                    .cloned()
                    .collect();
                // A confirmed read retires the live copy too, so an unread live
                // entry cannot win the merge once the overlay mark is gone.
                for id in &confirmed {
                    self.feed.remove(id);
                    self.read_overlay.remove(id);
                }
                self.snapshot = events;
                self.status = SnapshotStatus::Loaded;
            }
            Err(e) => {
                warn!(view = %self.label, error = %e, "History unavailable for view");
                self.snapshot.clear();
                self.status = SnapshotStatus::Failed(e.to_string());
            }
        }
        Ok(())
    }

    /// Focus, fetch and apply in one step.
    pub async fn refresh<H: HistoryApi>(&mut self, history: &H) -> Result<()> {
        let ticket = self.focus();
        let result = history.fetch_history().await;
        self.apply_snapshot(ticket, result)
    }

    /// Wait for the next live feed update. Returns `false` once the feed is gone.
    pub async fn changed(&mut self) -> bool {
        self.live.changed().await.is_ok()
    }

    /// Snapshot and live feed merged, newest first, with optimistic read marks.
    pub fn merged(&self) -> Vec<NotificationEvent> {
        let mut merged = merge_notifications(&self.snapshot, &self.live.borrow());
        if !self.read_overlay.is_empty() {
            for event in merged.iter_mut() {
                if self.read_overlay.contains(&event.id) {
                    event.is_read = true;
                }
            }
        }
        merged
    }

    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&NotificationEvent) -> bool,
    {
        count_matching(&self.merged(), predicate)
    }

    pub fn filtered<P>(&self, predicate: P) -> Vec<NotificationEvent>
    where
        P: Fn(&NotificationEvent) -> bool,
    {
        filter_matching(&self.merged(), predicate)
    }

    pub fn badges(&self) -> BadgeCounts {
        BadgeCounts::from_events(&self.merged())
    }

    fn is_read(&self, id: &NotificationId) -> bool {
        self.read_overlay.contains(id)
            || self.merged().iter().any(|e| &e.id == id && e.is_read)
    }

    /// Mark one notification read: optimistic locally, then on the server, then
    /// evicted from the live feed once acknowledged. Already-read ids skip the
    /// request.
    pub async fn mark_read<H: HistoryApi>(
        &mut self,
        id: &NotificationId,
        history: &H,
    ) -> Result<()> {
        if self.is_read(id) {
            self.feed.remove(id);
            return Ok(());
        }

        self.read_overlay.insert(id.clone());
        history.mark_read(id).await?;
        self.feed.remove(id);
        debug!(view = %self.label, id = %id, "Notification marked read");
        Ok(())
    }

    pub async fn mark_all_read<H: HistoryApi>(&mut self, history: &H) -> Result<()> {
        let known: HashSet<NotificationId> = self.merged().into_iter().map(|e| e.id).collect();
        self.read_overlay.extend(known.iter().cloned());

        history.mark_all_read().await?;
        // Anything that arrived after the request went out stays.
        self.feed.retain(|e| !known.contains(&e.id));
        info!(view = %self.label, count = known.len(), "All notifications marked read");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{is_unread, unread_in};
    use crate::models::{decode_payload, Category};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeHistory {
        events: Vec<NotificationEvent>,
        fail_fetch: bool,
        fail_marks: bool,
        marked: Mutex<Vec<String>>,
    }

    impl HistoryApi for FakeHistory {
        async fn fetch_history(&self) -> Result<Vec<NotificationEvent>> {
            if self.fail_fetch {
                return Err(NotifyError::Fetch("history endpoint returned 500".into()));
            }
            Ok(self.events.clone())
        }

        async fn mark_read(&self, id: &NotificationId) -> Result<()> {
            if self.fail_marks {
                return Err(NotifyError::Fetch("mark read returned 503".into()));
            }
            self.marked.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn mark_all_read(&self) -> Result<()> {
            self.marked.lock().unwrap().push("*".to_string());
            Ok(())
        }
    }

    fn event(raw: &str) -> NotificationEvent {
        decode_payload(raw).unwrap()
    }

    fn history(events: Vec<NotificationEvent>) -> FakeHistory {
        FakeHistory {
            events,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_views_share_the_feed_but_filter_independently() {
        let feed = LiveFeed::new(50);
        let backend = history(vec![
            event(r#"{"id": 1, "createdAt": "2024-01-01T00:00:00Z", "promotionId": 2}"#),
            event(r#"{"id": 2, "createdAt": "2024-01-02T00:00:00Z", "repairId": 7}"#),
        ]);

        let mut promotions = NotificationView::new("promotions", &feed);
        let mut chat = NotificationView::new("chat", &feed);
        promotions.refresh(&backend).await.unwrap();
        chat.refresh(&backend).await.unwrap();

        feed.prepend(event(r#"{"id": 3, "createdAt": "2024-01-03T00:00:00Z", "repairId": 7}"#));

        assert_eq!(promotions.count(unread_in(Category::Promotion)), 1);
        assert_eq!(chat.count(unread_in(Category::ChatMessage)), 2);
        assert_eq!(chat.merged()[0].id, NotificationId::from(3));
        assert_eq!(chat.badges().total(), 3);
    }

    #[tokio::test]
    async fn test_live_update_wakes_the_view() {
        let feed = LiveFeed::new(50);
        let mut view = NotificationView::new("drawer", &feed);

        let producer = feed.clone();
        tokio::spawn(async move {
            producer.prepend(NotificationEvent::new(5, Category::Generic));
        });

        assert!(view.changed().await);
        assert_eq!(view.count(is_unread), 1);
    }

    #[test]
    fn test_outdated_ticket_is_stale() {
        let feed = LiveFeed::new(50);
        let mut view = NotificationView::new("list", &feed);

        let first = view.focus();
        let second = view.focus();

        let late = view.apply_snapshot(first, Ok(vec![NotificationEvent::new(1, Category::Generic)]));
        assert_eq!(late, Err(NotifyError::StaleUpdate));
        assert!(view.merged().is_empty());

        view.apply_snapshot(second, Ok(vec![NotificationEvent::new(2, Category::Generic)]))
            .unwrap();
        assert_eq!(view.merged().len(), 1);
        assert_eq!(view.status(), &SnapshotStatus::Loaded);
    }

    #[tokio::test]
    async fn test_result_after_unmount_is_discarded() {
        let feed = LiveFeed::new(50);
        let mut view = NotificationView::new("chat", &feed);
        let backend = std::sync::Arc::new(history(vec![NotificationEvent::new(1, Category::Generic)]));

        let ticket = view.focus();
        let fetch = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.fetch_history().await })
        };
        view.unmount();

        let result = view.apply_snapshot(ticket, fetch.await.unwrap());
        assert_eq!(result, Err(NotifyError::StaleUpdate));
        assert!(view.merged().is_empty());
        assert!(!view.is_mounted());
    }

    #[tokio::test]
    async fn test_fetch_error_only_affects_that_view() {
        let feed = LiveFeed::new(50);
        feed.prepend(NotificationEvent::new(9, Category::Generic));

        let failing = FakeHistory {
            fail_fetch: true,
            ..Default::default()
        };
        let mut broken = NotificationView::new("list", &feed);
        broken.refresh(&failing).await.unwrap();

        assert!(matches!(broken.status(), SnapshotStatus::Failed(_)));
        // live entries still show
        assert_eq!(broken.merged().len(), 1);

        let mut healthy = NotificationView::new("drawer", &feed);
        healthy
            .refresh(&history(vec![NotificationEvent::new(1, Category::Generic)]))
            .await
            .unwrap();
        assert_eq!(healthy.merged().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_is_optimistic_and_idempotent() {
        let feed = LiveFeed::new(50);
        feed.prepend(event(r#"{"id": 4, "createdAt": "2024-01-04T00:00:00Z"}"#));
        let backend = history(vec![event(r#"{"id": 1, "createdAt": "2024-01-01T00:00:00Z"}"#)]);

        let mut view = NotificationView::new("list", &feed);
        view.refresh(&backend).await.unwrap();
        assert_eq!(view.count(is_unread), 2);

        view.mark_read(&NotificationId::from(4), &backend).await.unwrap();
        assert!(feed.is_empty());
        assert_eq!(view.count(is_unread), 1);

        view.mark_read(&NotificationId::from(1), &backend).await.unwrap();
        view.mark_read(&NotificationId::from(1), &backend).await.unwrap();
        assert_eq!(view.count(is_unread), 0);
        assert_eq!(*backend.marked.lock().unwrap(), vec!["4".to_string(), "1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_mark_keeps_entry_read_locally() {
        let feed = LiveFeed::new(50);
        feed.prepend(NotificationEvent::new(4, Category::PriceOffer));
        let backend = FakeHistory {
            fail_marks: true,
            ..Default::default()
        };

        let mut view = NotificationView::new("offers", &feed);
        let result = view.mark_read(&NotificationId::from(4), &backend).await;

        assert!(matches!(result, Err(NotifyError::Fetch(_))));
        // never flips back to unread, but stays in the feed until acknowledged
        assert_eq!(view.count(unread_in(Category::PriceOffer)), 0);
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_confirmation_clears_overlay() {
        let feed = LiveFeed::new(50);
        let mut backend = history(vec![event(r#"{"id": 1, "isRead": false}"#)]);

        let mut view = NotificationView::new("list", &feed);
        view.refresh(&backend).await.unwrap();
        view.mark_read(&NotificationId::from(1), &backend).await.unwrap();
        assert!(view.read_overlay.contains(&NotificationId::from(1)));

        backend.events = vec![event(r#"{"id": 1, "isRead": true}"#)];
        view.refresh(&backend).await.unwrap();
        assert!(view.read_overlay.is_empty());
        assert_eq!(view.count(is_unread), 0);
    }

    #[tokio::test]
    async fn test_mark_all_read_keeps_later_arrivals() {
        let feed = LiveFeed::new(50);
        feed.prepend(NotificationEvent::new(2, Category::ChatMessage));
        let backend = history(vec![NotificationEvent::new(1, Category::Promotion)]);

        let mut view = NotificationView::new("drawer", &feed);
        view.refresh(&backend).await.unwrap();
        view.mark_all_read(&backend).await.unwrap();

        assert_eq!(view.badges().total(), 0);
        assert!(feed.is_empty());

        feed.prepend(NotificationEvent::new(3, Category::ChatMessage));
        assert_eq!(view.badges().chat_messages, 1);
        assert_eq!(*backend.marked.lock().unwrap(), vec!["*".to_string()]);
    }

    #[tokio::test]
    async fn test_server_confirmed_read_never_reverts_to_unread() {
        let feed = LiveFeed::new(50);
        feed.prepend(event(r#"{"id": 4, "isRead": false}"#));
        let mut backend = FakeHistory {
            fail_marks: true,
            ..Default::default()
        };

        let mut view = NotificationView::new("list", &feed);
        assert!(view.mark_read(&NotificationId::from(4), &backend).await.is_err());
        assert_eq!(view.count(is_unread), 0);
        assert_eq!(feed.len(), 1);

        // The write went through after all; the next snapshot says so.
        backend.events = vec![event(r#"{"id": 4, "isRead": true}"#)];
        view.refresh(&backend).await.unwrap();

        assert_eq!(view.count(is_unread), 0);
        assert!(view.read_overlay.is_empty());
        assert!(feed.is_empty());
        assert!(view.merged()[0].is_read);
    }
}
