use crate::connection::ConnectionState;
use crate::feed::{BufferChange, PageKind};

/// What a step of the feed session produced, for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    BufferChanged(BufferChange),
    ConnectionChanged {
        state: ConnectionState,
        reason: Option<String>,
    },
    /// A history fetch failed; the buffer is untouched and the fetch can be retried
    FetchFailed { kind: PageKind, error: String },
    /// Stale, filtered or duplicate input; nothing to redraw
    Ignored,
}
