use std::collections::HashMap;

use crate::models::{Category, NotificationEvent, NotificationId};

/// Merge a REST snapshot with the live collection.
///
/// `live` is expected newest arrival first, as [`crate::live_feed::LiveFeed`]
/// holds it. Snapshot entries are inserted first, then live entries from the
/// oldest arrival to the newest; on an id collision the later insertion replaces
/// the value but keeps the slot of the first one. The result is stably sorted
/// newest first, entries without a timestamp last.
pub fn merge_notifications(
    snapshot: &[NotificationEvent],
    live: &[NotificationEvent],
) -> Vec<NotificationEvent> {
    let mut slots: HashMap<&NotificationId, usize> =
        HashMap::with_capacity(snapshot.len() + live.len());
    let mut merged: Vec<NotificationEvent> = Vec::with_capacity(snapshot.len() + live.len());

    for event in snapshot.iter().chain(live.iter().rev()) {
        match slots.get(&event.id) {
            Some(&slot) => merged[slot] = event.clone(),
            None => {
                slots.insert(&event.id, merged.len());
                merged.push(event.clone());
            }
        }
    }

    merged.sort_by(|a, b| b.sort_timestamp().cmp(&a.sort_timestamp()));
    merged
}

pub fn count_matching<P>(events: &[NotificationEvent], predicate: P) -> usize
where
    P: Fn(&NotificationEvent) -> bool,
{
    events.iter().filter(|&e| predicate(e)).count()
}

pub fn filter_matching<P>(events: &[NotificationEvent], predicate: P) -> Vec<NotificationEvent>
where
    P: Fn(&NotificationEvent) -> bool,
{
    events.iter().filter(|&e| predicate(e)).cloned().collect()
}

pub fn is_unread(event: &NotificationEvent) -> bool {
    !event.is_read
}

pub fn in_category(category: Category) -> impl Fn(&NotificationEvent) -> bool {
    move |event| event.category == category
}

pub fn unread_in(category: Category) -> impl Fn(&NotificationEvent) -> bool {
    move |event| !event.is_read && event.category == category
}

/// Unread counts for the drawer and tab badges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BadgeCounts {
    pub chat_messages: usize,
    pub price_offers: usize,
    pub promotions: usize,
    pub generic: usize,
}

impl BadgeCounts {
    pub fn from_events(events: &[NotificationEvent]) -> Self {
        let mut counts = BadgeCounts::default();
        for event in events.iter().filter(|&e| is_unread(e)) {
            match event.category {
                Category::ChatMessage => counts.chat_messages += 1,
                Category::PriceOffer => counts.price_offers += 1,
                Category::Promotion => counts.promotions += 1,
                Category::Generic => counts.generic += 1,
            }
        }
        counts
    }

    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::ChatMessage => self.chat_messages,
            Category::PriceOffer => self.price_offers,
            Category::Promotion => self.promotions,
            Category::Generic => self.generic,
        }
    }

    pub fn total(&self) -> usize {
        self.chat_messages + self.price_offers + self.promotions + self.generic
    }
}
