//! Feed synchronization: ordering, pagination, scope and scroll state.

pub mod buffer;
pub mod filter;
pub mod paginator;
pub mod reconciler;
pub mod scroll;

use std::fmt;

use crate::models::Message;

pub use buffer::FeedBuffer;
pub use filter::{FilterController, ScopeChange};
pub use paginator::{HistoryPaginator, PageRequest};
pub use reconciler::{decode_messages, BufferChange, BufferObserver, FeedReconciler, FeedState, Outcome};
pub use scroll::ScrollPreserver;

/// Monotonic scope generation. Bumped on every scope change; responses tagged
/// with an older generation are stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Which history fetch a page belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    First,
    Older,
}

/// One history page, already in ascending order.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub generation: Generation,
    pub page_number: u32,
    pub messages: Vec<Message>,
    /// The server returned fewer rows than requested
    pub exhausted: bool,
}
