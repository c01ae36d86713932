//! REST collaborator: history pages and group filter options.

pub mod http;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::paths;
use crate::models::{AccountScope, GroupOption, ScopeFilter};

pub use http::HttpMessageSource;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Which message store history is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archive {
    /// Messages logged by the live listeners
    #[default]
    Live,
    /// Messages collected by dump jobs. No date filter server-side and no
    /// per-account group listing.
    Dump,
}

impl Archive {
    pub fn messages_path(self) -> &'static str {
        match self {
            Self::Live => paths::MESSAGES,
            Self::Dump => paths::DUMP_MESSAGES,
        }
    }

    pub fn groups_path(self) -> &'static str {
        match self {
            Self::Live => paths::GROUPS,
            Self::Dump => paths::DUMP_GROUPS,
        }
    }
}

/// Query side of the backend.
///
/// Rows come back as raw JSON so a malformed row can be dropped on its own
/// instead of failing the whole page.
pub trait MessageSource: Send + Sync {
    /// Messages for `scope`, newest first. Page 1 is the most recent.
    fn fetch_page<'a>(
        &'a self,
        scope: &'a ScopeFilter,
        page: u32,
        page_size: u32,
    ) -> BoxFuture<'a, Result<Vec<Value>, ApiError>>;

    /// Groups available as chat filter options for `account`.
    fn list_groups<'a>(
        &'a self,
        account: &'a AccountScope,
    ) -> BoxFuture<'a, Result<Vec<GroupOption>, ApiError>>;
}
