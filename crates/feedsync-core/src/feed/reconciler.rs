use std::collections::{HashSet, VecDeque};

use serde_json::Value;
use tracing::{debug, warn};

use super::buffer::FeedBuffer;
use super::{Generation, HistoryPage};
use crate::constants::DEFERRED_LIVE_MAX;
use crate::models::{Message, MessageKey, ScopeFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Waiting for the first page of the current scope
    Empty,
    Loaded,
    LoadingOlder,
}

/// What happened to the buffer. Delivered to observers after the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferChange {
    /// Scope changed; the buffer is empty until the first page lands
    Cleared,
    /// A fresh first page became the buffer
    Reset { len: usize },
    /// Older history was spliced onto the front
    Prepended { count: usize },
    /// Live messages were inserted, normally at the end
    Appended { count: usize },
}

/// Result of handing data to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied(BufferChange),
    /// Current generation, but nothing to insert (filtered, duplicate or deferred)
    Unchanged,
    /// Tagged with a generation that is no longer current
    Stale,
}

pub type BufferObserver = Box<dyn FnMut(&BufferChange, &[Message]) + Send>;

/// Validate raw payloads, dropping malformed ones with a diagnostic.
pub fn decode_messages<I>(raw: I, source_account: Option<&str>, origin: &str) -> Vec<Message>
where
    I: IntoIterator<Item = Value>,
{
    raw.into_iter()
        .filter_map(|value| match Message::from_value(value, source_account) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(origin, error = %e, "dropping malformed message");
                None
            }
        })
        .collect()
}

/// Sole writer of the feed buffer.
///
/// Merges first pages, older pages and live arrivals for one generation at a
/// time; anything tagged with another generation is discarded.
pub struct FeedReconciler {
    buffer: FeedBuffer,
    state: FeedState,
    generation: Generation,
    scope: ScopeFilter,
    /// Live arrivals held back until the first page of the generation lands
    deferred_live: VecDeque<Message>,
    deferred_keys: HashSet<MessageKey>,
    observers: Vec<BufferObserver>,
}

impl FeedReconciler {
    pub fn new() -> Self {
        Self {
            buffer: FeedBuffer::new(),
            state: FeedState::Empty,
            generation: Generation::default(),
            scope: ScopeFilter::default(),
            deferred_live: VecDeque::new(),
            deferred_keys: HashSet::new(),
            observers: Vec::new(),
        }
    }

    pub fn buffer(&self) -> &FeedBuffer {
        &self.buffer
    }

    pub fn messages(&self) -> &[Message] {
        self.buffer.messages()
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn on_buffer_changed(&mut self, observer: BufferObserver) {
        self.observers.push(observer);
    }

    fn notify(&mut self, change: BufferChange) -> Outcome {
        let messages = self.buffer.messages();
        for observer in self.observers.iter_mut() {
            observer(&change, messages);
        }
        Outcome::Applied(change)
    }

    fn is_stale(&self, generation: Generation, what: &str) -> bool {
        if generation != self.generation {
            debug!(
                %generation,
                current = %self.generation,
                what,
                "discarding stale response"
            );
            return true;
        }
        false
    }

    /// Discard everything and start waiting for `generation`'s first page.
    pub fn reset(&mut self, generation: Generation, scope: ScopeFilter) -> Outcome {
        self.buffer = FeedBuffer::new();
        self.state = FeedState::Empty;
        self.generation = generation;
        self.scope = scope;
        self.deferred_live.clear();
        self.deferred_keys.clear();
        self.notify(BufferChange::Cleared)
    }

    pub fn apply_first_page(&mut self, page: HistoryPage) -> Outcome {
        if self.is_stale(page.generation, "first page") {
            return Outcome::Stale;
        }
        if self.state != FeedState::Empty {
            debug!(generation = %page.generation, "first page already applied");
            return Outcome::Unchanged;
        }

        let mut buffer = FeedBuffer::new();
        buffer.insert(page.messages);
        buffer.record_page(page.page_number, page.exhausted);
        let deferred = Vec::from(std::mem::take(&mut self.deferred_live));
        self.deferred_keys.clear();
        buffer.insert(deferred);

        self.buffer = buffer;
        self.state = FeedState::Loaded;
        let len = self.buffer.len();
        self.notify(BufferChange::Reset { len })
    }

    /// Reserve the next older page. `None` while a fetch is in flight, before the
    /// first page has landed, or once history is exhausted.
    pub fn begin_load_older(&mut self) -> Option<u32> {
        if self.state != FeedState::Loaded || !self.buffer.has_more_older() {
            return None;
        }
        self.state = FeedState::LoadingOlder;
        Some(self.buffer.oldest_loaded_page() + 1)
    }

    pub fn apply_older_page(&mut self, page: HistoryPage) -> Outcome {
        if self.is_stale(page.generation, "older page") {
            return Outcome::Stale;
        }
        if self.state != FeedState::LoadingOlder {
            debug!(page = page.page_number, "older page arrived with no fetch pending");
            return Outcome::Unchanged;
        }

        let count = self.buffer.prepend(page.messages);
        self.buffer.record_page(page.page_number, page.exhausted);
        self.state = FeedState::Loaded;
        self.notify(BufferChange::Prepended { count })
    }

    /// An older-page fetch failed: pagination state is left as it was.
    pub fn older_page_failed(&mut self, generation: Generation) -> Outcome {
        if self.is_stale(generation, "older page failure") {
            return Outcome::Stale;
        }
        if self.state == FeedState::LoadingOlder {
            self.state = FeedState::Loaded;
        }
        Outcome::Unchanged
    }

    /// Insert live arrivals that pass the full scope predicate.
    pub fn apply_live(&mut self, generation: Generation, messages: Vec<Message>) -> Outcome {
        if self.is_stale(generation, "live messages") {
            return Outcome::Stale;
        }

        let matching: Vec<Message> = messages
            .into_iter()
            .filter(|message| {
                let keep = self.scope.matches(message);
                if !keep {
                    debug!(chat_id = %message.chat_id, id = %message.id, "live message outside scope");
                }
                keep
            })
            .collect();
        if matching.is_empty() {
            return Outcome::Unchanged;
        }

        if self.state == FeedState::Empty {
            self.defer_live(matching);
            return Outcome::Unchanged;
        }

        let count = self.buffer.insert(matching);
        if count == 0 {
            return Outcome::Unchanged;
        }
        self.notify(BufferChange::Appended { count })
    }
}

impl FeedReconciler {
    /// Hold live arrivals until page 1 lands. Duplicates are dropped and only
    /// the newest `DEFERRED_LIVE_MAX` arrivals are kept.
    fn defer_live(&mut self, messages: Vec<Message>) {
        for message in messages {
            if !self.deferred_keys.insert(message.key()) {
                continue;
            }
            self.deferred_live.push_back(message);
            if self.deferred_live.len() > DEFERRED_LIVE_MAX {
                if let Some(dropped) = self.deferred_live.pop_front() {
                    self.deferred_keys.remove(&dropped.key());
                    debug!(chat_id = %dropped.chat_id, id = %dropped.id, "deferred live backlog full");
                }
            }
        }
    }
}

impl Default for FeedReconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::buffer::tests::msg;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn page(generation: Generation, page_number: u32, mut newest_first: Vec<Message>, exhausted: bool) -> HistoryPage {
        newest_first.reverse();
        HistoryPage {
            generation,
            page_number,
            messages: newest_first,
            exhausted,
        }
    }

    fn timestamps(reconciler: &FeedReconciler) -> Vec<i64> {
        reconciler
            .messages()
            .iter()
            .map(|m| m.timestamp.timestamp())
            .collect()
    }

    fn loaded(scope: ScopeFilter) -> (FeedReconciler, Generation) {
        let mut reconciler = FeedReconciler::new();
        let generation = Generation::default().next();
        reconciler.reset(generation, scope);
        let first = page(
            generation,
            1,
            vec![msg("g1", "10", 10), msg("g1", "9", 9), msg("g1", "8", 8)],
            false,
        );
        reconciler.apply_first_page(first);
        (reconciler, generation)
    }

    #[test]
    fn test_first_page_is_ascending() {
        let (reconciler, _) = loaded(ScopeFilter::default().with_chat("g1"));
        assert_eq!(timestamps(&reconciler), vec![8, 9, 10]);
        assert_eq!(reconciler.state(), FeedState::Loaded);
    }

    #[test]
    fn test_older_page_is_prepended() {
        let (mut reconciler, generation) = loaded(ScopeFilter::default().with_chat("g1"));
        assert_eq!(reconciler.begin_load_older(), Some(2));
        assert_eq!(reconciler.state(), FeedState::LoadingOlder);
        assert_eq!(reconciler.begin_load_older(), None);

        let older = page(generation, 2, vec![msg("g1", "7", 7), msg("g1", "6", 6)], true);
        assert_eq!(
            reconciler.apply_older_page(older),
            Outcome::Applied(BufferChange::Prepended { count: 2 })
        );
        assert_eq!(timestamps(&reconciler), vec![6, 7, 8, 9, 10]);
        assert!(!reconciler.buffer().has_more_older());
        assert_eq!(reconciler.begin_load_older(), None);
    }

    #[test]
    fn test_loading_same_older_page_twice_adds_nothing() {
        let (mut reconciler, generation) = loaded(ScopeFilter::default());
        let older = || page(generation, 2, vec![msg("g1", "7", 7), msg("g1", "6", 6)], false);

        reconciler.begin_load_older();
        reconciler.apply_older_page(older());
        reconciler.begin_load_older();
        assert_eq!(
            reconciler.apply_older_page(older()),
            Outcome::Applied(BufferChange::Prepended { count: 0 })
        );
        assert_eq!(reconciler.messages().len(), 5);
    }

    #[test]
    fn test_failed_older_page_keeps_pagination() {
        let (mut reconciler, generation) = loaded(ScopeFilter::default());
        assert_eq!(reconciler.begin_load_older(), Some(2));
        reconciler.older_page_failed(generation);
        assert_eq!(reconciler.state(), FeedState::Loaded);
        assert_eq!(reconciler.buffer().oldest_loaded_page(), 1);
        assert_eq!(reconciler.begin_load_older(), Some(2));
    }

    #[test]
    fn test_live_message_outside_chat_is_ignored() {
        let (mut reconciler, generation) = loaded(ScopeFilter::default().with_chat("g1"));
        let outcome = reconciler.apply_live(generation, vec![msg("g2", "11", 11)]);
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(reconciler.messages().len(), 3);
    }

    #[test]
    fn test_duplicate_live_message_is_ignored() {
        let (mut reconciler, generation) = loaded(ScopeFilter::default().with_chat("g1"));
        assert_eq!(
            reconciler.apply_live(generation, vec![msg("g1", "10", 10)]),
            Outcome::Unchanged
        );
        assert_eq!(
            reconciler.apply_live(generation, vec![msg("g1", "11", 11)]),
            Outcome::Applied(BufferChange::Appended { count: 1 })
        );
        assert_eq!(timestamps(&reconciler), vec![8, 9, 10, 11]);
    }

    #[test]
    fn test_live_search_is_reapplied() {
        let (mut reconciler, generation) = loaded(ScopeFilter::default().with_search("pump"));
        let matching = Message::from_value(
            json!({"id": "20", "chat_id": "g1", "content": "PUMP incoming", "timestamp": 20}),
            None,
        )
        .unwrap();
        let other = Message::from_value(
            json!({"id": "21", "chat_id": "g1", "content": "hello", "timestamp": 21}),
            None,
        )
        .unwrap();
        reconciler.apply_live(generation, vec![matching, other]);
        assert_eq!(reconciler.messages().last().unwrap().id, "20");
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let mut reconciler = FeedReconciler::new();
        let a = Generation::default().next();
        let b = a.next();
        reconciler.reset(a, ScopeFilter::default().with_chat("a"));
        reconciler.reset(b, ScopeFilter::default().with_chat("b"));

        let b_page = page(b, 1, vec![msg("b", "2", 2)], true);
        reconciler.apply_first_page(b_page);

        let a_page = page(a, 1, vec![msg("a", "1", 1)], true);
        assert_eq!(reconciler.apply_first_page(a_page), Outcome::Stale);
        assert_eq!(reconciler.apply_live(a, vec![msg("b", "3", 3)]), Outcome::Stale);
        assert_eq!(reconciler.older_page_failed(a), Outcome::Stale);

        let ids: Vec<_> = reconciler.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[test]
    fn test_live_arrivals_before_first_page_are_deferred() {
        let mut reconciler = FeedReconciler::new();
        let generation = Generation::default().next();
        reconciler.reset(generation, ScopeFilter::default());

        assert_eq!(
            reconciler.apply_live(generation, vec![msg("g1", "11", 11), msg("g1", "10", 10)]),
            Outcome::Unchanged
        );
        assert!(reconciler.messages().is_empty());

        let first = page(generation, 1, vec![msg("g1", "10", 10), msg("g1", "9", 9)], true);
        assert_eq!(
            reconciler.apply_first_page(first),
            Outcome::Applied(BufferChange::Reset { len: 3 })
        );
        assert_eq!(timestamps(&reconciler), vec![9, 10, 11]);
    }

    #[test]
    fn test_deferred_backlog_is_deduplicated_and_bounded() {
        let mut reconciler = FeedReconciler::new();
        let generation = Generation::default().next();
        reconciler.reset(generation, ScopeFilter::default());

        reconciler.apply_live(generation, vec![msg("g1", "1", 1), msg("g1", "1", 1)]);
        reconciler.apply_live(generation, vec![msg("g1", "1", 1)]);
        assert_eq!(reconciler.deferred_live.len(), 1);

        let flood: Vec<_> = (0..DEFERRED_LIVE_MAX as i64 + 10)
            .map(|i| msg("g2", &i.to_string(), 100 + i))
            .collect();
        reconciler.apply_live(generation, flood);
        assert_eq!(reconciler.deferred_live.len(), DEFERRED_LIVE_MAX);
        assert_eq!(reconciler.deferred_keys.len(), DEFERRED_LIVE_MAX);
        // the oldest arrivals went first
        assert!(!reconciler.deferred_keys.contains(&msg("g1", "1", 1).key()));

        let first = page(generation, 1, vec![], true);
        assert_eq!(
            reconciler.apply_first_page(first),
            Outcome::Applied(BufferChange::Reset { len: DEFERRED_LIVE_MAX })
        );
        assert!(reconciler.deferred_keys.is_empty());
    }

    #[test]
    fn test_observers_see_every_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut reconciler = FeedReconciler::new();
        reconciler.on_buffer_changed(Box::new(move |change, messages| {
            sink.lock().unwrap().push((*change, messages.len()));
        }));

        let generation = Generation::default().next();
        reconciler.reset(generation, ScopeFilter::default());
        reconciler.apply_first_page(page(generation, 1, vec![msg("g1", "1", 1)], false));
        reconciler.apply_live(generation, vec![msg("g1", "2", 2)]);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (BufferChange::Cleared, 0),
                (BufferChange::Reset { len: 1 }, 1),
                (BufferChange::Appended { count: 1 }, 2),
            ]
        );
    }

    #[test]
    fn test_decode_messages_drops_malformed() {
        let messages = decode_messages(
            vec![
                json!({"id": "1", "chat_id": "g1", "timestamp": 1}),
                json!({"chat_id": "g1", "timestamp": 2}),
                json!("garbage"),
            ],
            Some("acc"),
            "test",
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].account_id.as_deref(), Some("acc"));
    }
}
