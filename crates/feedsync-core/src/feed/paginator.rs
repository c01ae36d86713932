use std::sync::Arc;

use tracing::debug;

use super::{decode_messages, Generation, HistoryPage};
use crate::api::{ApiError, MessageSource};
use crate::models::{AccountScope, ScopeFilter};

/// Everything needed to fetch one page, captured at request time so that a
/// later scope change cannot leak into it.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub generation: Generation,
    pub scope: ScopeFilter,
    pub page: u32,
}

/// Stateless producer of history pages. Pagination bookkeeping lives in the
/// feed buffer; this only turns a request into an ascending page.
pub struct HistoryPaginator {
    source: Arc<dyn MessageSource>,
    page_size: u32,
}

impl HistoryPaginator {
    pub fn new(source: Arc<dyn MessageSource>, page_size: u32) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub async fn fetch(&self, request: PageRequest) -> Result<HistoryPage, ApiError> {
        let rows = self
            .source
            .fetch_page(&request.scope, request.page, self.page_size)
            .await?;

        // Short-page detection counts rows as served, before malformed ones are dropped.
        let exhausted = rows.len() < self.page_size as usize;
        let source_account = match &request.scope.account {
            AccountScope::Account(id) => Some(id.as_str()),
            AccountScope::All => None,
        };
        let mut messages = decode_messages(rows, source_account, "history");
        // The server cannot express every scope (multi-chat, dump date range).
        messages.retain(|message| request.scope.matches(message));
        messages.reverse();

        debug!(
            generation = %request.generation,
            page = request.page,
            count = messages.len(),
            exhausted,
            "history page ready"
        );
        Ok(HistoryPage {
            generation: request.generation,
            page_number: request.page,
            messages,
            exhausted,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::GroupOption;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory history keyed by (chat filter, page). Records every request.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub pages: Mutex<HashMap<(Option<String>, u32), Vec<Value>>>,
        pub requests: Mutex<Vec<(Option<String>, u32)>>,
        pub fail: Mutex<bool>,
        /// Artificial latency per chat filter
        pub delays: Mutex<HashMap<Option<String>, Duration>>,
    }

    impl FakeSource {
        pub fn with_page(self, chat: Option<&str>, page: u32, timestamps: &[i64]) -> Self {
            let rows = timestamps
                .iter()
                .map(|ts| {
                    json!({
                        "id": ts.to_string(),
                        "chat_id": chat.unwrap_or("g1"),
                        "chat_name": "Group",
                        "timestamp": ts,
                    })
                })
                .collect();
            self.pages
                .lock()
                .unwrap()
                .insert((chat.map(str::to_string), page), rows);
            self
        }
    }

    fn chat_key(scope: &ScopeFilter) -> Option<String> {
        scope.chat.as_ref().and_then(|c| c.ids().first().cloned())
    }

    impl MessageSource for FakeSource {
        fn fetch_page<'a>(
            &'a self,
            scope: &'a ScopeFilter,
            page: u32,
            _page_size: u32,
        ) -> BoxFuture<'a, Result<Vec<Value>, ApiError>> {
            let key = (chat_key(scope), page);
            self.requests.lock().unwrap().push(key.clone());
            let result = if *self.fail.lock().unwrap() {
                Err(ApiError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            } else {
                Ok(self.pages.lock().unwrap().get(&key).cloned().unwrap_or_default())
            };
            let delay = self.delays.lock().unwrap().get(&key.0).copied();
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            .boxed()
        }

        fn list_groups<'a>(
            &'a self,
            _account: &'a AccountScope,
        ) -> BoxFuture<'a, Result<Vec<GroupOption>, ApiError>> {
            async move {
                Ok(vec![GroupOption {
                    id: "g1".to_string(),
                    name: "Group".to_string(),
                }])
            }
            .boxed()
        }
    }

    fn request(chat: &str, page: u32) -> PageRequest {
        PageRequest {
            generation: Generation::default().next(),
            scope: ScopeFilter::default().with_chat(chat),
            page,
        }
    }

    #[tokio::test]
    async fn test_page_is_reversed_to_ascending() {
        let source = FakeSource::default().with_page(Some("g1"), 1, &[10, 9, 8]);
        let paginator = HistoryPaginator::new(Arc::new(source), 3);
        let page = paginator.fetch(request("g1", 1)).await.unwrap();

        let timestamps: Vec<_> = page.messages.iter().map(|m| m.timestamp.timestamp()).collect();
        assert_eq!(timestamps, vec![8, 9, 10]);
        assert!(!page.exhausted);
    }

    #[tokio::test]
    async fn test_short_page_marks_history_exhausted() {
        let source = FakeSource::default().with_page(Some("g1"), 2, &[7, 6]);
        let paginator = HistoryPaginator::new(Arc::new(source), 20);
        let page = paginator.fetch(request("g1", 2)).await.unwrap();
        assert_eq!(page.page_number, 2);
        assert!(page.exhausted);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_dropped_but_counted() {
        let source = FakeSource::default();
        source.pages.lock().unwrap().insert(
            (Some("g1".to_string()), 1),
            vec![
                json!({"id": "2", "chat_id": "g1", "timestamp": 2}),
                json!({"chat_id": "g1", "timestamp": 1}),
            ],
        );
        let paginator = HistoryPaginator::new(Arc::new(source), 2);
        let page = paginator.fetch(request("g1", 1)).await.unwrap();
        assert_eq!(page.messages.len(), 1);
        assert!(!page.exhausted);
    }

    #[tokio::test]
    async fn test_rows_outside_scope_are_dropped_but_counted() {
        let source = FakeSource::default();
        source.pages.lock().unwrap().insert(
            (Some("g1".to_string()), 1),
            vec![
                json!({"id": "3", "chat_id": "g3", "timestamp": 3}),
                json!({"id": "2", "chat_id": "g2", "timestamp": 2}),
                json!({"id": "1", "chat_id": "g1", "timestamp": 1}),
            ],
        );
        let paginator = HistoryPaginator::new(Arc::new(source), 3);
        let page = paginator
            .fetch(PageRequest {
                generation: Generation::default().next(),
                scope: ScopeFilter::default().with_chats(vec!["g1".into(), "g3".into()]),
                page: 1,
            })
            .await
            .unwrap();

        let chats: Vec<_> = page.messages.iter().map(|m| m.chat_id.as_str()).collect();
        assert_eq!(chats, vec!["g1", "g3"]);
        assert!(!page.exhausted);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let source = FakeSource::default();
        *source.fail.lock().unwrap() = true;
        let paginator = HistoryPaginator::new(Arc::new(source), 20);
        assert!(matches!(
            paginator.fetch(request("g1", 1)).await,
            Err(ApiError::Status { status: 503, .. })
        ));
    }
}
