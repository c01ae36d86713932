use std::collections::HashSet;

use crate::models::{Message, MessageKey};

/// Ordered, de-duplicated message list backing the feed.
///
/// Invariants:
/// - `messages` is sorted ascending by timestamp; equal timestamps keep insertion order
/// - no two entries share a `(chat_id, id)` key
#[derive(Debug, Clone)]
pub struct FeedBuffer {
    messages: Vec<Message>,
    keys: HashSet<MessageKey>,
    has_more_older: bool,
    oldest_loaded_page: u32,
}

impl FeedBuffer {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            keys: HashSet::new(),
            has_more_older: true,
            oldest_loaded_page: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.keys.contains(key)
    }

    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    pub fn oldest_loaded_page(&self) -> u32 {
        self.oldest_loaded_page
    }

    /// Record that `page` was loaded; a short page means history is exhausted.
    pub(crate) fn record_page(&mut self, page: u32, exhausted: bool) {
        self.oldest_loaded_page = page;
        if exhausted {
            self.has_more_older = false;
        }
    }

    /// Drop entries already present (or repeated within `incoming`).
    fn take_new(&mut self, incoming: Vec<Message>) -> Vec<Message> {
        incoming
            .into_iter()
            .filter(|message| self.keys.insert(message.key()))
            .collect()
    }

    /// Splice an older page (ascending) onto the front. Returns how many were inserted.
    pub(crate) fn prepend(&mut self, older: Vec<Message>) -> usize {
        let mut to_add = self.take_new(older);
        if to_add.is_empty() {
            return 0;
        }
        to_add.sort_by_key(|m| m.timestamp);
        let added = to_add.len();

        let fits_before = match (to_add.last(), self.messages.first()) {
            (Some(last_new), Some(first_old)) => last_new.timestamp <= first_old.timestamp,
            _ => true,
        };

        if fits_before {
            to_add.append(&mut self.messages);
            self.messages = to_add;
        } else {
            // Overlapping window: merge with a stable sort so older-page entries
            // stay ahead of existing entries with the same timestamp.
            to_add.append(&mut self.messages);
            to_add.sort_by_key(|m| m.timestamp);
            self.messages = to_add;
        }
        added
    }

    /// Insert messages in arrival order, each after every entry with an equal or
    /// earlier timestamp. Returns how many were inserted.
    pub(crate) fn insert(&mut self, incoming: Vec<Message>) -> usize {
        let to_add = self.take_new(incoming);
        let added = to_add.len();
        for message in to_add {
            let at_end = self
                .messages
                .last()
                .map_or(true, |last| last.timestamp <= message.timestamp);
            if at_end {
                self.messages.push(message);
            } else {
                let pos = self
                    .messages
                    .partition_point(|m| m.timestamp <= message.timestamp);
                self.messages.insert(pos, message);
            }
        }
        added
    }
}

impl Default for FeedBuffer {
    fn default() -> Self {
        Self::new()
    }
}
