use super::{BufferChange, FeedState};

/// Adjustment owed to the next layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAdjustment {
    JumpToBottom,
    Follow,
    /// Older content was added above; shift by however much the content grew.
    Compensate { prior_extent: usize, follow: bool },
}

/// Keeps the viewport stable while the feed grows at both ends.
///
/// Extents are in whatever unit the renderer lays out in (rows, pixels).
/// The renderer reports every buffer change through [`observe`](Self::observe)
/// and then calls [`relayout`](Self::relayout) with the newly measured content
/// extent.
#[derive(Debug, Clone)]
pub struct ScrollPreserver {
    offset: usize,
    content_extent: usize,
    viewport_extent: usize,
    follow_threshold: usize,
    pending: Option<PendingAdjustment>,
}

impl ScrollPreserver {
    pub fn new(follow_threshold: usize) -> Self {
        Self {
            offset: 0,
            content_extent: 0,
            viewport_extent: 0,
            follow_threshold,
            pending: None,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn content_extent(&self) -> usize {
        self.content_extent
    }

    pub fn max_offset(&self) -> usize {
        self.content_extent.saturating_sub(self.viewport_extent)
    }

    pub fn is_at_top(&self) -> bool {
        self.offset == 0
    }

    pub fn is_near_bottom(&self) -> bool {
        self.max_offset().saturating_sub(self.offset) <= self.follow_threshold
    }

    /// Whether the viewport position asks for the next older page.
    pub fn should_load_older(&self, state: FeedState, has_more_older: bool) -> bool {
        self.is_at_top() && has_more_older && state == FeedState::Loaded
    }

    /// Record a buffer change before the renderer lays the new content out.
    pub fn observe(&mut self, change: &BufferChange) {
        use PendingAdjustment::*;

        self.pending = match (*change, self.pending) {
            (BufferChange::Cleared | BufferChange::Reset { .. }, _) => Some(JumpToBottom),
            (_, Some(JumpToBottom)) => Some(JumpToBottom),

            (BufferChange::Prepended { count: 0 }, pending) => pending,
            (BufferChange::Prepended { .. }, Some(Compensate { prior_extent, follow })) => {
                Some(Compensate { prior_extent, follow })
            }
            (BufferChange::Prepended { .. }, pending) => Some(Compensate {
                prior_extent: self.content_extent,
                follow: pending == Some(Follow),
            }),

            (BufferChange::Appended { count: 0 }, pending) => pending,
            (BufferChange::Appended { .. }, Some(Compensate { prior_extent, follow })) => {
                Some(Compensate {
                    prior_extent,
                    follow: follow || self.is_near_bottom(),
                })
            }
            (BufferChange::Appended { .. }, pending) => {
                if self.is_near_bottom() {
                    Some(Follow)
                } else {
                    pending
                }
            }
        };
    }

    /// Apply the pending adjustment against freshly measured extents.
    /// Returns the new offset.
    pub fn relayout(&mut self, content_extent: usize, viewport_extent: usize) -> usize {
        self.content_extent = content_extent;
        self.viewport_extent = viewport_extent;

        self.offset = match self.pending.take() {
            Some(PendingAdjustment::JumpToBottom | PendingAdjustment::Follow) => self.max_offset(),
            Some(PendingAdjustment::Compensate { follow: true, .. }) => self.max_offset(),
            Some(PendingAdjustment::Compensate { prior_extent, .. }) => {
                let grown = content_extent.saturating_sub(prior_extent);
                self.offset.saturating_add(grown).min(self.max_offset())
            }
            None => self.offset.min(self.max_offset()),
        };
        self.offset
    }

    /// Scroll up by the given amount, clamping to valid range
    pub fn scroll_up(&mut self, amount: usize) {
        self.offset = self.offset.min(self.max_offset()).saturating_sub(amount);
    }

    /// Scroll down by the given amount, clamping to valid range
    pub fn scroll_down(&mut self, amount: usize) {
        self.offset = self
            .offset
            .saturating_add(amount)
            .min(self.max_offset());
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset = self.max_offset();
    }
}
