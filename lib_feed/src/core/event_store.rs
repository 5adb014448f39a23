//! # Bounded Event Store
//!
//! An in-memory, newest-first buffer of [`FeedEvent`]s with a hard capacity and
//! idempotent insertion. The store is a plain owned value: whoever constructs it
//! owns it for the session, and readers only ever see derived projections.
//!
//! ## Core Design Principles:
//!
//! 1.  **Insertion Order, Not Timestamp Order**: New events go to the front
//!     regardless of their producer timestamp.
//! 2.  **Deterministic Eviction**: When the buffer is full, the oldest entries
//!     (the tail) are dropped. Eviction also releases their ids, so an id can be
//!     accepted again once it has left the retention window.
//! 3.  **O(1) Deduplication**: A `HashSet` of held ids mirrors the buffer.
//! 4.  **Recomputed Projections**: `filtered_view` and `counts_by_category` are
//!     derived from the buffer on every call and never cached, so truncation and
//!     dedup cannot make them drift.

use std::collections::{BTreeMap, HashSet, VecDeque};

use super::event::{Category, FeedEvent};

/// Default number of events retained.
pub const DEFAULT_CAPACITY: usize = 100;

/// Result of [`EventStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The event was prepended; `evicted` tail entries were dropped to make room.
    Inserted {
        /// Number of events dropped from the tail.
        evicted: usize,
    },
    /// An event with the same id is already held; nothing changed.
    Duplicate,
}

/// Per-category event counts, including the virtual `All` total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCounts(BTreeMap<Category, usize>);

impl CategoryCounts {
    /// Count for one category (`All` is the buffer length).
    pub fn get(&self, category: Category) -> usize {
        self.0.get(&category).copied().unwrap_or(0)
    }

    /// Iterates `(category, count)` pairs in category order, `All` first.
    pub fn iter(&self) -> impl Iterator<Item = (Category, usize)> + '_ {
        self.0.iter().map(|(c, n)| (*c, *n))
    }
}

/// # Event Store
///
/// See the module documentation for the ordering, eviction and dedup rules.
#[derive(Debug, Clone)]
pub struct EventStore {
    events: VecDeque<FeedEvent>,
    ids: HashSet<String>,
    capacity: usize,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventStore {
    /// Creates an empty store holding at most [`DEFAULT_CAPACITY`] events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with a custom bound. A capacity of zero is
    /// raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// # Insert
    ///
    /// Prepends `event` unless its id is already held, then truncates the tail
    /// back down to the capacity bound.
    pub fn insert(&mut self, event: FeedEvent) -> InsertOutcome {
        if self.ids.contains(event.id()) {
            log::trace!("Dropping duplicate event '{}'", event.id());
            return InsertOutcome::Duplicate;
        }

        self.ids.insert(event.id().to_string());
        self.events.push_front(event);

        let mut evicted = 0;
        while self.events.len() > self.capacity {
            if let Some(old) = self.events.pop_back() {
                self.ids.remove(old.id());
                evicted += 1;
            }
        }

        InsertOutcome::Inserted { evicted }
    }

    /// Empties the buffer unconditionally.
    pub fn clear(&mut self) {
        self.events.clear();
        self.ids.clear();
    }

    /// # Filtered View
    ///
    /// Returns, in stored order, the events whose category matches `category`
    /// (`All` matches everything) and whose title or body contains `search`
    /// case-insensitively. An empty `search` matches every event.
    pub fn filtered_view(&self, category: Category, search: &str) -> Vec<&FeedEvent> {
        let needle = search.to_lowercase();
        self.events
            .iter()
            .filter(|event| category.matches(event.category()))
            .filter(|event| event.matches_search(&needle))
            .collect()
    }

    /// # Counts By Category
    ///
    /// Counts held events for every category; `All` is the total.
    pub fn counts_by_category(&self) -> CategoryCounts {
        let mut counts: BTreeMap<Category, usize> =
            Category::ALL_CATEGORIES.iter().map(|c| (*c, 0)).collect();

        for event in &self.events {
            *counts.entry(event.category()).or_insert(0) += 1;
        }
        counts.insert(Category::All, self.events.len());

        CategoryCounts(counts)
    }

    /// Number of events held.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of events held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether an event with this id is currently held.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Most recently inserted event.
    pub fn latest(&self) -> Option<&FeedEvent> {
        self.events.front()
    }

    /// Iterates the buffer newest-first.
    pub fn iter(&self) -> impl Iterator<Item = &FeedEvent> + '_ {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, category: Category, title: &str, body: Option<&str>) -> FeedEvent {
        FeedEvent::new(id, category, 0, title, body.map(str::to_string)).unwrap()
    }

    fn news(id: &str) -> FeedEvent {
        event(id, Category::News, "Platform Launches New Features", None)
    }

    fn ids(store: &EventStore) -> Vec<&str> {
        store.iter().map(FeedEvent::id).collect()
    }

    #[test]
    fn evicts_oldest_and_drops_duplicates() {
        let mut store = EventStore::with_capacity(2);
        store.insert(news("a"));
        store.insert(news("b"));
        assert_eq!(store.insert(news("c")), InsertOutcome::Inserted { evicted: 1 });
        assert_eq!(ids(&store), vec!["c", "b"]);

        assert_eq!(store.insert(news("b")), InsertOutcome::Duplicate);
        assert_eq!(ids(&store), vec!["c", "b"]);
    }

    #[test]
    fn first_inserted_duplicate_wins() {
        let mut store = EventStore::new();
        store.insert(event("x", Category::News, "first", None));
        store.insert(event("x", Category::Price, "impostor", None));
        assert_eq!(store.len(), 1);
        let held = store.latest().unwrap();
        assert_eq!(held.title(), "first");
        assert_eq!(held.category(), Category::News);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut store = EventStore::with_capacity(7);
        for i in 0..50 {
            store.insert(news(&format!("e{}", i)));
            assert!(store.len() <= store.capacity());
        }
        assert_eq!(store.len(), 7);
        assert_eq!(store.latest().unwrap().id(), "e49");
    }

    #[test]
    fn eviction_releases_the_id() {
        let mut store = EventStore::with_capacity(1);
        store.insert(news("a"));
        store.insert(news("b"));
        assert!(!store.contains("a"));
        assert_eq!(store.insert(news("a")), InsertOutcome::Inserted { evicted: 1 });
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut store = EventStore::with_capacity(0);
        assert_eq!(store.capacity(), 1);
        store.insert(news("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_empties_everything() {
        let mut store = EventStore::new();
        store.insert(news("a"));
        store.clear();
        assert!(store.is_empty());
        assert!(!store.contains("a"));
        assert_eq!(store.insert(news("a")), InsertOutcome::Inserted { evicted: 0 });
    }

    #[test]
    fn unfiltered_view_is_the_whole_buffer_in_order() {
        let mut store = EventStore::new();
        for id in ["a", "b", "c"] {
            store.insert(news(id));
        }
        let view: Vec<&str> = store.filtered_view(Category::All, "").into_iter().map(FeedEvent::id).collect();
        assert_eq!(view, vec!["c", "b", "a"]);
    }

    #[test]
    fn filters_by_category_and_search_text() {
        let mut store = EventStore::new();
        store.insert(event("n1", Category::News, "Security Advisory Published", None));
        store.insert(event("m1", Category::Market, "Merger Talks Confirmed", Some("Further details soon")));
        store.insert(event("p1", Category::Price, "Volume Spike Detected", Some("Merger rumours")));
        store.insert(event("n2", Category::News, "Tech Giant Announces Major Update", None));

        let news: Vec<&str> = store.filtered_view(Category::News, "").into_iter().map(FeedEvent::id).collect();
        assert_eq!(news, vec!["n2", "n1"]);

        // Title match in one category, body match in another.
        let merger: Vec<&str> = store.filtered_view(Category::All, "MERGER").into_iter().map(FeedEvent::id).collect();
        assert_eq!(merger, vec!["p1", "m1"]);

        let merger_price: Vec<&str> =
            store.filtered_view(Category::Price, "merger").into_iter().map(FeedEvent::id).collect();
        assert_eq!(merger_price, vec!["p1"]);

        assert!(store.filtered_view(Category::Market, "advisory").is_empty());
    }

    #[test]
    fn counts_are_consistent_with_the_buffer() {
        let mut store = EventStore::with_capacity(4);
        store.insert(event("n1", Category::News, "t", None));
        store.insert(event("n2", Category::News, "t", None));
        store.insert(event("m1", Category::Market, "t", None));
        store.insert(event("p1", Category::Price, "t", None));
        store.insert(event("p2", Category::Price, "t", None)); // evicts n1
        store.insert(event("p2", Category::Price, "t", None)); // duplicate

        let counts = store.counts_by_category();
        assert_eq!(counts.get(Category::All), store.len());
        assert_eq!(counts.get(Category::News), 1);
        assert_eq!(counts.get(Category::Market), 1);
        assert_eq!(counts.get(Category::Price), 2);

        let real_sum: usize = Category::REAL.iter().map(|c| counts.get(*c)).sum();
        assert_eq!(real_sum, counts.get(Category::All));
        assert_eq!(counts.iter().count(), 4);
    }

    #[test]
    fn counts_on_empty_store_are_zero() {
        let counts = EventStore::new().counts_by_category();
        for category in Category::ALL_CATEGORIES {
            assert_eq!(counts.get(category), 0);
        }
    }
}
