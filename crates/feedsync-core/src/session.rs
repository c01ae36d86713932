use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::api::{ApiError, HttpMessageSource, MessageSource};
use crate::config::FeedConfig;
use crate::connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, PushConnector, TaggedEvent, WsConnector,
};
use crate::constants::LIVE_BATCH_MAX;
use crate::events::FeedEvent;
use crate::feed::{
    decode_messages, BufferObserver, FeedReconciler, FeedState, FilterController,
    Generation, HistoryPage, HistoryPaginator, Outcome, PageKind, PageRequest, ScopeChange,
    ScrollPreserver,
};
use crate::models::{GroupOption, Message, ScopeFilter};

/// A finished history fetch, delivered back to the session.
struct PageOutcome {
    generation: Generation,
    kind: PageKind,
    result: Result<HistoryPage, ApiError>,
}

enum Inbound {
    Page(PageOutcome),
    Push(TaggedEvent),
}

/// Drives one live feed: scope changes, history pagination and the push
/// channel all funnel through here into the reconciler.
///
/// Meant to be polled from a single task; `next_event` applies one unit of
/// inbound work and reports what changed.
pub struct FeedSession {
    filter: FilterController,
    reconciler: FeedReconciler,
    paginator: Arc<HistoryPaginator>,
    source: Arc<dyn MessageSource>,
    connection: ConnectionManager,
    scroll: ScrollPreserver,
    pages_tx: mpsc::UnboundedSender<PageOutcome>,
    pages_rx: mpsc::UnboundedReceiver<PageOutcome>,
    push_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    /// Push event read ahead while batching live messages
    deferred_push: Option<TaggedEvent>,
}

impl FeedSession {
    pub fn new(
        source: Arc<dyn MessageSource>,
        connector: Arc<dyn PushConnector>,
        config: &FeedConfig,
    ) -> Self {
        let (pages_tx, pages_rx) = mpsc::unbounded_channel();
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        Self {
            filter: FilterController::new(),
            reconciler: FeedReconciler::new(),
            paginator: Arc::new(HistoryPaginator::new(source.clone(), config.page_size)),
            source,
            connection: ConnectionManager::new(connector, config.reconnect.clone(), push_tx),
            scroll: ScrollPreserver::new(config.follow_threshold),
            pages_tx,
            pages_rx,
            push_rx,
            deferred_push: None,
        }
    }

    /// Session against the backend's REST API and websocket push channel.
    pub fn connect(config: &FeedConfig) -> Result<Self, ApiError> {
        let source = Arc::new(HttpMessageSource::new(config)?);
        let connector = Arc::new(WsConnector::new(config));
        Ok(Self::new(source, connector, config))
    }

    // ===== Read side =====

    pub fn buffer(&self) -> &[Message] {
        self.reconciler.messages()
    }

    pub fn on_buffer_changed(&mut self, observer: BufferObserver) {
        self.reconciler.on_buffer_changed(observer);
    }

    pub fn scope(&self) -> Option<&ScopeFilter> {
        self.filter.scope()
    }

    pub fn state(&self) -> FeedState {
        self.reconciler.state()
    }

    pub fn has_more_older(&self) -> bool {
        self.reconciler.buffer().has_more_older()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn scroll(&self) -> &ScrollPreserver {
        &self.scroll
    }

    /// For user scrolling between layouts.
    pub fn scroll_mut(&mut self) -> &mut ScrollPreserver {
        &mut self.scroll
    }

    /// Lay out against the renderer's measured extents after buffer changes.
    /// Returns the offset to scroll to.
    pub fn relayout(&mut self, content_extent: usize, viewport_extent: usize) -> usize {
        self.scroll.relayout(content_extent, viewport_extent)
    }

    /// True when the viewport sits at the top and an older page can be
    /// requested right now.
    pub fn should_load_older(&self) -> bool {
        self.scroll.should_load_older(self.state(), self.has_more_older())
    }

    /// Chat filter options for the current account scope
    pub async fn groups(&self) -> Result<Vec<GroupOption>, ApiError> {
        let account = self
            .filter
            .scope()
            .map(|scope| scope.account.clone())
            .unwrap_or_default();
        self.source.list_groups(&account).await
    }

    // ===== Commands =====

    /// Replace the scope. Returns false when it equals the current one.
    pub fn set_scope(&mut self, scope: ScopeFilter) -> bool {
        match self.filter.set_scope(scope) {
            Some(change) => {
                self.restart(change);
                true
            }
            None => false,
        }
    }

    /// Reload the current scope from scratch, e.g. after page 1 failed.
    pub fn refresh(&mut self) -> bool {
        match self.filter.refresh() {
            Some(change) => {
                self.restart(change);
                true
            }
            None => false,
        }
    }

    fn restart(&mut self, change: ScopeChange) {
        let ScopeChange { generation, scope } = change;
        self.deferred_push = None;
        let cleared = self.reconciler.reset(generation, scope.clone());
        self.track(cleared);
        self.connection.open(scope.account.clone(), generation);
        self.spawn_fetch(
            PageKind::First,
            PageRequest {
                generation,
                scope,
                page: 1,
            },
        );
    }

    /// Request the next older page. No-op while one is in flight, before the
    /// first page has landed, or once history is exhausted.
    pub fn load_older(&mut self) -> bool {
        let Some(scope) = self.filter.scope().cloned() else {
            return false;
        };
        let Some(page) = self.reconciler.begin_load_older() else {
            return false;
        };
        self.spawn_fetch(
            PageKind::Older,
            PageRequest {
                generation: self.filter.generation(),
                scope,
                page,
            },
        );
        true
    }

    /// Reopen the push channel for the current scope.
    pub fn reconnect(&mut self) -> bool {
        self.connection.reconnect()
    }

    pub fn close(&mut self) {
        self.connection.close();
    }

    fn spawn_fetch(&self, kind: PageKind, request: PageRequest) {
        debug!(generation = %request.generation, page = request.page, ?kind, "fetching history page");
        let paginator = self.paginator.clone();
        let pages_tx = self.pages_tx.clone();
        tokio::spawn(async move {
            let generation = request.generation;
            let result = paginator.fetch(request).await;
            let _ = pages_tx.send(PageOutcome {
                generation,
                kind,
                result,
            });
        });
    }

    // ===== Event loop =====

    /// Wait for the next inbound item and apply it.
    pub async fn next_event(&mut self) -> FeedEvent {
        if let Some(tagged) = self.deferred_push.take() {
            return self.apply_push(tagged);
        }

        let inbound = tokio::select! {
            Some(outcome) = self.pages_rx.recv() => Inbound::Page(outcome),
            Some(tagged) = self.push_rx.recv() => Inbound::Push(tagged),
            else => return FeedEvent::Ignored,
        };
        match inbound {
            Inbound::Page(outcome) => self.apply_page(outcome),
            Inbound::Push(tagged) => self.apply_push(tagged),
        }
    }

    fn apply_page(&mut self, outcome: PageOutcome) -> FeedEvent {
        let PageOutcome {
            generation,
            kind,
            result,
        } = outcome;

        match (kind, result) {
            (_, Err(e)) => {
                if generation != self.filter.generation() {
                    debug!(%generation, "ignoring failure of stale fetch");
                    return FeedEvent::Ignored;
                }
                warn!(?kind, error = %e, "history fetch failed");
                if kind == PageKind::Older {
                    self.reconciler.older_page_failed(generation);
                }
                FeedEvent::FetchFailed {
                    kind,
                    error: e.to_string(),
                }
            }
            (PageKind::First, Ok(page)) => {
                let outcome = self.reconciler.apply_first_page(page);
                self.track(outcome)
            }
            (PageKind::Older, Ok(page)) => {
                let outcome = self.reconciler.apply_older_page(page);
                self.track(outcome)
            }
        }
    }

    fn apply_push(&mut self, tagged: TaggedEvent) -> FeedEvent {
        let generation = tagged.generation;
        if generation != self.filter.generation() {
            debug!(%generation, "ignoring push event from previous scope");
            return FeedEvent::Ignored;
        }

        match tagged.event {
            ConnectionEvent::Opened => FeedEvent::ConnectionChanged {
                state: ConnectionState::Connected,
                reason: None,
            },
            ConnectionEvent::Closed { reason } => FeedEvent::ConnectionChanged {
                state: ConnectionState::Disconnected,
                reason,
            },
            ConnectionEvent::Message(frame) => {
                // Fold whatever else is already queued into one batch.
                let mut frames = vec![frame];
                while frames.len() < LIVE_BATCH_MAX {
                    match self.push_rx.try_recv() {
                        Ok(TaggedEvent {
                            generation: next_generation,
                            event: ConnectionEvent::Message(frame),
                        }) if next_generation == generation => frames.push(frame),
                        Ok(other) => {
                            self.deferred_push = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                let messages: Vec<Message> = frames
                    .into_iter()
                    .flat_map(|frame| {
                        decode_messages(
                            std::iter::once(frame.payload),
                            frame.account_id.as_deref(),
                            "live",
                        )
                    })
                    .collect();
                let outcome = self.reconciler.apply_live(generation, messages);
                self.track(outcome)
            }
        }
    }

    /// Feed applied buffer changes to the scroll state.
    fn track(&mut self, outcome: Outcome) -> FeedEvent {
        if let Outcome::Applied(change) = &outcome {
            self.scroll.observe(change);
        }
        outcome_event(outcome)
    }
}

fn outcome_event(outcome: Outcome) -> FeedEvent {
    match outcome {
        Outcome::Applied(change) => FeedEvent::BufferChanged(change),
        Outcome::Unchanged | Outcome::Stale => FeedEvent::Ignored,
    }
}
