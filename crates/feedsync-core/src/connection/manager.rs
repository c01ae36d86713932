use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ConnectionEvent, ConnectionState, PushConnector, ReconnectPolicy, TaggedEvent};
use crate::config::ReconnectConfig;
use crate::feed::Generation;
use crate::models::AccountScope;

/// Handle a running stream task uses to report back. Goes quiet once the
/// owning `ActiveStream` is dropped.
struct StreamLink {
    generation: Generation,
    live: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TaggedEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl StreamLink {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// The liveness check runs under the watch lock, so a link whose stream
    /// was closed concurrently can never overwrite the manager's state.
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if !self.is_live() || *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    /// False when nobody is listening any more and the task should stop.
    fn emit(&self, event: ConnectionEvent) -> bool {
        self.is_live()
            && self
                .events
                .send(TaggedEvent {
                    generation: self.generation,
                    event,
                })
                .is_ok()
    }
}

/// The one open stream. Dropping it stops the task.
struct ActiveStream {
    account: AccountScope,
    generation: Generation,
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.live.store(false, Ordering::Release);
        self.task.abort();
    }
}

/// Owns the live push channel for the current account scope.
///
/// At most one stream exists at a time; opening a new one closes the old one
/// first so messages are never delivered twice.
pub struct ConnectionManager {
    connector: Arc<dyn PushConnector>,
    reconnect: ReconnectConfig,
    events: mpsc::UnboundedSender<TaggedEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    active: Option<ActiveStream>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn PushConnector>,
        reconnect: ReconnectConfig,
        events: mpsc::UnboundedSender<TaggedEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            reconnect,
            events,
            state: Arc::new(state),
            active: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn account(&self) -> Option<&AccountScope> {
        self.active.as_ref().map(|active| &active.account)
    }

    /// Open a stream for `account`, replacing any existing one.
    pub fn open(&mut self, account: AccountScope, generation: Generation) {
        self.close();

        let live = Arc::new(AtomicBool::new(true));
        let link = StreamLink {
            generation,
            live: live.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
        };
        let task = tokio::spawn(run_stream(
            self.connector.clone(),
            account.clone(),
            self.reconnect.build_policy(),
            link,
        ));
        debug!(%account, %generation, "push stream task started");

        self.active = Some(ActiveStream {
            account,
            generation,
            live,
            task,
        });
    }

    /// Reopen the current stream, e.g. after the reconnect policy gave up.
    /// Returns false when nothing was open.
    pub fn reconnect(&mut self) -> bool {
        let Some((account, generation)) = self
            .active
            .as_ref()
            .map(|active| (active.account.clone(), active.generation))
        else {
            return false;
        };
        self.open(account, generation);
        true
    }

    /// Close the stream. Safe to call when nothing is open.
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            info!(account = %active.account, generation = %active.generation, "closing push stream");
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

async fn run_stream(
    connector: Arc<dyn PushConnector>,
    account: AccountScope,
    mut policy: Box<dyn ReconnectPolicy>,
    link: StreamLink,
) {
    let mut attempt = 0u32;
    loop {
        link.set_state(ConnectionState::Connecting);

        let reason = match connector.connect(&account).await {
            Ok(mut stream) => {
                attempt = 0;
                link.set_state(ConnectionState::Connected);
                info!(%account, generation = %link.generation, "push stream open");
                if !link.emit(ConnectionEvent::Opened) {
                    return;
                }
                loop {
                    match stream.next().await {
                        Some(Ok(frame)) => {
                            if !link.emit(ConnectionEvent::Message(frame)) {
                                return;
                            }
                        }
                        Some(Err(e)) => break Some(e.to_string()),
                        None => break None,
                    }
                }
            }
            Err(e) => Some(e.to_string()),
        };

        warn!(%account, reason = ?reason, "push stream closed");
        link.set_state(ConnectionState::Disconnected);
        if !link.emit(ConnectionEvent::Closed { reason }) {
            return;
        }

        attempt += 1;
        let Some(delay) = policy.next_delay(attempt) else {
            info!(%account, attempt, "not reconnecting push stream");
            return;
        };
        debug!(%account, attempt, ?delay, "reconnecting push stream");
        tokio::time::sleep(delay).await;
    }
}
