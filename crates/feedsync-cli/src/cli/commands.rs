use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use feedsync_core::feed::{FeedReconciler, Generation, HistoryPaginator, PageRequest};
use feedsync_core::{
    AccountScope, Archive, BufferChange, FeedConfig, FeedEvent, FeedSession, HttpMessageSource, Message,
    MessageSource, ScopeFilter,
};
use tracing::{info, warn};

use super::output::{describe_connection, FeedPrinter, Printer, Record};

/// Follow the live feed until Ctrl-C.
pub async fn run_watch(config: &FeedConfig, scope: ScopeFilter, older: u32, pretty: bool) -> Result<()> {
    let session = FeedSession::connect(config).context("Failed to set up feed session")?;
    let printer = FeedPrinter::new(Printer::stdout(pretty));
    watch_feed(session, scope, older, printer, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        futures::future::pending::<()>().await;
    }
}

/// Drive `session` for `scope` until `shutdown` resolves, printing as the
/// buffer grows. `older` extra history pages are requested once page 1 lands.
pub async fn watch_feed<W: Write>(
    mut session: FeedSession,
    scope: ScopeFilter,
    older: u32,
    mut printer: FeedPrinter<W>,
    shutdown: impl Future<Output = ()>,
) -> Result<FeedPrinter<W>> {
    tokio::pin!(shutdown);
    session.set_scope(scope);
    let mut remaining = older;

    loop {
        let event = tokio::select! {
            _ = &mut shutdown => break,
            event = session.next_event() => event,
        };
        printer.on_event(&event, session.buffer())?;

        match &event {
            FeedEvent::BufferChanged(BufferChange::Reset { .. } | BufferChange::Prepended { .. })
                if remaining > 0 =>
            {
                if session.load_older() {
                    remaining -= 1;
                }
            }
            FeedEvent::ConnectionChanged { state, reason } => {
                info!(status = %describe_connection(*state, reason.as_deref()), "push channel");
            }
            _ => {}
        }
    }

    session.close();
    info!(printed = printer.printed(), "watch stopped");
    Ok(printer)
}

/// Print up to `pages` pages of history, oldest first.
pub async fn run_history(
    config: &FeedConfig,
    scope: ScopeFilter,
    pages: u32,
    archive: Archive,
    pretty: bool,
) -> Result<()> {
    let source: Arc<dyn MessageSource> =
        Arc::new(HttpMessageSource::new(config)?.with_archive(archive));
    let messages = collect_history(source, scope, config.page_size, pages).await?;
    let mut printer = Printer::stdout(pretty);
    for message in &messages {
        printer.emit(&Record::Message(message))?;
    }
    Ok(())
}

/// Fetch page 1 and then older pages until `pages` are loaded or history
/// runs out, merged the same way the live feed merges them.
pub async fn collect_history(
    source: Arc<dyn MessageSource>,
    scope: ScopeFilter,
    page_size: u32,
    pages: u32,
) -> Result<Vec<Message>> {
    let paginator = HistoryPaginator::new(source, page_size);
    let mut reconciler = FeedReconciler::new();
    let generation = Generation::default().next();
    reconciler.reset(generation, scope.clone());

    let first = paginator
        .fetch(PageRequest {
            generation,
            scope: scope.clone(),
            page: 1,
        })
        .await
        .context("Failed to fetch first page")?;
    reconciler.apply_first_page(first);

    for _ in 1..pages {
        let Some(page) = reconciler.begin_load_older() else {
            break;
        };
        let older = paginator
            .fetch(PageRequest {
                generation,
                scope: scope.clone(),
                page,
            })
            .await
            .with_context(|| format!("Failed to fetch page {}", page))?;
        reconciler.apply_older_page(older);
    }
    Ok(reconciler.messages().to_vec())
}

/// Print the chat filter options for `account`.
pub async fn run_groups(
    config: &FeedConfig,
    account: AccountScope,
    archive: Archive,
    pretty: bool,
) -> Result<()> {
    let source = HttpMessageSource::new(config)?.with_archive(archive);
    let groups = source
        .list_groups(&account)
        .await
        .context("Failed to list groups")?;
    let mut printer = Printer::stdout(pretty);
    for group in &groups {
        printer.emit(&Record::Group(group))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_core::api::ApiError;
    use feedsync_core::config::{ReconnectConfig, ReconnectMode};
    use feedsync_core::connection::{ConnectionError, PushFrame, PushStream};
    use feedsync_core::models::GroupOption;
    use feedsync_core::PushConnector;
    use futures::future::BoxFuture;
    use futures::{FutureExt, StreamExt};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// History pages by page number, newest first as the server sends them.
    #[derive(Default)]
    struct PagedSource {
        pages: HashMap<u32, Vec<Value>>,
        requests: Mutex<Vec<u32>>,
    }

    impl PagedSource {
        fn with_page(mut self, page: u32, timestamps: &[i64]) -> Self {
            let rows = timestamps
                .iter()
                .map(|ts| json!({"id": ts.to_string(), "chat_id": "g1", "timestamp": ts}))
                .collect();
            self.pages.insert(page, rows);
            self
        }
    }

    impl MessageSource for PagedSource {
        fn fetch_page<'a>(
            &'a self,
            _scope: &'a ScopeFilter,
            page: u32,
            _page_size: u32,
        ) -> BoxFuture<'a, Result<Vec<Value>, ApiError>> {
            self.requests.lock().unwrap().push(page);
            let rows = self.pages.get(&page).cloned().unwrap_or_default();
            async move { Ok(rows) }.boxed()
        }

        fn list_groups<'a>(
            &'a self,
            _account: &'a AccountScope,
        ) -> BoxFuture<'a, Result<Vec<GroupOption>, ApiError>> {
            async move { Ok(Vec::new()) }.boxed()
        }
    }

    /// Delivers `frames` once, then stays open.
    struct OneShotConnector {
        frames: Mutex<Option<Vec<PushFrame>>>,
    }

    impl PushConnector for OneShotConnector {
        fn connect(
            &self,
            _account: &AccountScope,
        ) -> BoxFuture<'static, Result<PushStream, ConnectionError>> {
            let frames = self.frames.lock().unwrap().take().unwrap_or_default();
            async move {
                let stream = futures::stream::iter(frames.into_iter().map(Ok::<_, ConnectionError>))
                    .chain(futures::stream::pending());
                Ok(stream.boxed())
            }
            .boxed()
        }
    }

    fn timestamps(messages: &[Message]) -> Vec<i64> {
        messages.iter().map(|m| m.timestamp.timestamp()).collect()
    }

    #[tokio::test]
    async fn test_collect_history_stops_at_short_page() {
        let source = Arc::new(
            PagedSource::default()
                .with_page(1, &[6, 5])
                .with_page(2, &[4, 3])
                .with_page(3, &[2]),
        );
        let messages = collect_history(source.clone(), ScopeFilter::default(), 2, 10)
            .await
            .unwrap();
        assert_eq!(timestamps(&messages), vec![2, 3, 4, 5, 6]);
        assert_eq!(*source.requests.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_collect_history_respects_page_limit() {
        let source = Arc::new(
            PagedSource::default()
                .with_page(1, &[6, 5])
                .with_page(2, &[4, 3]),
        );
        let messages = collect_history(source, ScopeFilter::default(), 2, 1).await.unwrap();
        assert_eq!(timestamps(&messages), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_watch_prints_history_older_pages_and_live() {
        let source = Arc::new(
            PagedSource::default()
                .with_page(1, &[6, 5])
                .with_page(2, &[4, 3]),
        );
        let connector = Arc::new(OneShotConnector {
            frames: Mutex::new(Some(vec![
                PushFrame {
                    payload: json!({"id": "7", "chat_id": "g1", "timestamp": 7}),
                    account_id: Some("acc".to_string()),
                },
                PushFrame {
                    payload: json!({"id": "6", "chat_id": "g1", "timestamp": 6}),
                    account_id: Some("acc".to_string()),
                },
            ])),
        });
        let config = FeedConfig {
            page_size: 2,
            reconnect: ReconnectConfig {
                mode: ReconnectMode::Manual,
                ..ReconnectConfig::default()
            },
            ..FeedConfig::default()
        };
        let session = FeedSession::new(source.clone(), connector, &config);
        let printer = FeedPrinter::new(Printer::new(Vec::new(), false));

        let printer = watch_feed(
            session,
            ScopeFilter::default(),
            1,
            printer,
            tokio::time::sleep(Duration::from_millis(300)),
        )
        .await
        .unwrap();

        assert_eq!(*source.requests.lock().unwrap(), vec![1, 2]);
        let out = String::from_utf8(printer.into_printer().into_inner()).unwrap();
        let records: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        let mut ids: Vec<_> = records
            .iter()
            .filter(|r| r["type"] == "message")
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 5);
        ids.sort();
        assert_eq!(ids, vec!["3", "4", "5", "6", "7"]);
        assert!(records
            .iter()
            .any(|r| r["type"] == "connection" && r["state"] == "connected"));
    }
}
