use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{ALL_ACCOUNTS, ALL_ACCOUNTS_SESSION};
use crate::models::Message;
use crate::search::SearchQuery;

/// Which accounts the feed covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountScope {
    #[default]
    All,
    Account(String),
}

impl AccountScope {
    /// Parse a CLI/user value; `"all"`, `"0"` or an empty string selects every account.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty()
            || value == ALL_ACCOUNTS_SESSION
            || value.eq_ignore_ascii_case(ALL_ACCOUNTS)
        {
            Self::All
        } else {
            Self::Account(value.to_string())
        }
    }

    /// Session id for the push path; session 0 is the all-accounts channel
    pub fn as_wire(&self) -> &str {
        match self {
            Self::All => ALL_ACCOUNTS_SESSION,
            Self::Account(id) => id,
        }
    }

    /// `session_id` query value. REST calls omit it to cover every account.
    pub fn session_param(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Account(id) => Some(id),
        }
    }

    /// Messages with no embedded account are accepted; the transport already scoped them.
    pub fn admits(&self, account_id: Option<&str>) -> bool {
        match (self, account_id) {
            (Self::All, _) | (_, None) => true,
            (Self::Account(expected), Some(actual)) => expected == actual,
        }
    }
}

impl fmt::Display for AccountScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL_ACCOUNTS),
            Self::Account(id) => f.write_str(id),
        }
    }
}

/// Chat filter: one chat or a set of chats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatSelection {
    Single(String),
    Multiple(Vec<String>),
}

impl ChatSelection {
    /// Build a selection from a list of ids. No ids means no chat filter.
    pub fn from_ids(mut ids: Vec<String>) -> Option<Self> {
        ids.retain(|id| !id.trim().is_empty());
        ids.dedup();
        match ids.len() {
            0 => None,
            1 => ids.pop().map(Self::Single),
            _ => Some(Self::Multiple(ids)),
        }
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        match self {
            Self::Single(id) => id == chat_id,
            Self::Multiple(ids) => ids.iter().any(|id| id == chat_id),
        }
    }

    pub fn ids(&self) -> &[String] {
        match self {
            Self::Single(id) => std::slice::from_ref(id),
            Self::Multiple(ids) => ids,
        }
    }
}

/// The feed's current scope. Replaced wholesale on every filter change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilter {
    pub account: AccountScope,
    pub chat: Option<ChatSelection>,
    pub search: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl ScopeFilter {
    pub fn for_account(account: AccountScope) -> Self {
        Self {
            account,
            ..Self::default()
        }
    }

    pub fn with_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat = Some(ChatSelection::Single(chat_id.into()));
        self
    }

    pub fn with_chats(mut self, chat_ids: Vec<String>) -> Self {
        self.chat = ChatSelection::from_ids(chat_ids);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = (!search.trim().is_empty()).then_some(search);
        self
    }

    pub fn with_range(
        mut self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    pub fn search_query(&self) -> SearchQuery {
        self.search
            .as_deref()
            .map(SearchQuery::parse)
            .unwrap_or_default()
    }

    /// Full scope predicate applied to every live arrival.
    pub fn matches(&self, message: &Message) -> bool {
        if !self.account.admits(message.account_id.as_deref()) {
            return false;
        }
        if let Some(chat) = &self.chat {
            if !chat.contains(&message.chat_id) {
                return false;
            }
        }
        if self.start_date.is_some_and(|start| message.timestamp < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| message.timestamp > end) {
            return false;
        }
        self.search_query().matches(message.content.as_deref())
    }

    /// Query parameters for the history endpoint (without paging).
    ///
    /// The backend filters on a single `chat_id`; a multi-chat selection is
    /// fetched unfiltered and narrowed by `matches` on the client.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(session_id) = self.account.session_param() {
            pairs.push(("session_id", session_id.to_string()));
        }
        if let Some(ChatSelection::Single(chat_id)) = &self.chat {
            pairs.push(("chat_id", chat_id.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(start) = self.start_date {
            pairs.push(("start_date", start.to_rfc3339()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("end_date", end.to_rfc3339()));
        }
        pairs
    }
}
