use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::{ApiError, Archive, MessageSource};
use crate::config::FeedConfig;
use crate::models::{AccountScope, GroupOption, ScopeFilter};

/// `MessageSource` backed by the automation backend's REST API.
pub struct HttpMessageSource {
    base_url: String,
    auth_token: Option<String>,
    archive: Archive,
    client: reqwest::Client,
}

impl HttpMessageSource {
    pub fn new(config: &FeedConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            archive: Archive::Live,
            client,
        })
    }

    /// Read history and groups from `archive` instead of the live log.
    pub fn with_archive(mut self, archive: Archive) -> Self {
        self.archive = archive;
        self
    }

    pub fn archive(&self) -> Archive {
        self.archive
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut request = self.client.get(self.url(path)).query(query);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

/// `page`/`limit` on top of the scope's filters.
fn message_query(scope: &ScopeFilter, page: u32, page_size: u32) -> Vec<(&'static str, String)> {
    let mut query = scope.query_pairs();
    query.push(("page", page.to_string()));
    query.push(("limit", page_size.to_string()));
    query
}

/// Pages are either a bare array or wrapped as `{"messages": [...]}`.
fn page_rows(body: Value) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("messages") {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(ApiError::Decode(
                "expected an array or an object with a `messages` array".to_string(),
            )),
        },
        other => Err(ApiError::Decode(format!("expected an array, got {}", other))),
    }
}

impl MessageSource for HttpMessageSource {
    fn fetch_page<'a>(
        &'a self,
        scope: &'a ScopeFilter,
        page: u32,
        page_size: u32,
    ) -> BoxFuture<'a, Result<Vec<Value>, ApiError>> {
        async move {
            let query = message_query(scope, page, page_size);
            let body: Value = self.get(self.archive.messages_path(), &query).await?;
            let rows = page_rows(body)?;
            debug!(page, rows = rows.len(), "fetched history page");
            Ok(rows)
        }
        .boxed()
    }

    fn list_groups<'a>(
        &'a self,
        account: &'a AccountScope,
    ) -> BoxFuture<'a, Result<Vec<GroupOption>, ApiError>> {
        async move {
            let query: Vec<(&str, String)> = match (self.archive, account.session_param()) {
                (Archive::Live, Some(session_id)) => vec![("session_id", session_id.to_string())],
                _ => Vec::new(),
            };
            self.get(self.archive.groups_path(), &query).await
        }
        .boxed()
    }
}
