use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::connection::{ExponentialBackoff, ManualReconnect, ReconnectPolicy};
use crate::constants::{
    API_BASE_URL, DEFAULT_FOLLOW_THRESHOLD, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS,
    RECONNECT_INITIAL_DELAY_MS, RECONNECT_MAX_DELAY_MS, RECONNECT_MULTIPLIER, WS_BASE_URL,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectMode {
    #[default]
    Exponential,
    /// Only reconnect when asked to
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectConfig {
    pub mode: ReconnectMode,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Give up after this many consecutive failures; retry forever when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            mode: ReconnectMode::Exponential,
            initial_delay_ms: RECONNECT_INITIAL_DELAY_MS,
            max_delay_ms: RECONNECT_MAX_DELAY_MS,
            multiplier: RECONNECT_MULTIPLIER,
            max_attempts: None,
            jitter: true,
        }
    }
}

impl ReconnectConfig {
    /// A fresh policy for one stream's lifetime
    pub fn build_policy(&self) -> Box<dyn ReconnectPolicy> {
        match self.mode {
            ReconnectMode::Manual => Box::new(ManualReconnect),
            ReconnectMode::Exponential => Box::new(ExponentialBackoff {
                initial: Duration::from_millis(self.initial_delay_ms),
                max: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
                multiplier: self.multiplier.max(1.0),
                max_attempts: self.max_attempts,
                jitter: self.jitter,
            }),
        }
    }
}

/// Feed configuration, loaded from a camelCase JSON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    /// Bearer token for REST calls, sent as `?token=` on the push channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub page_size: u32,
    /// Layout units from the bottom within which live appends auto-follow
    pub follow_threshold: usize,
    pub request_timeout_secs: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base_url: API_BASE_URL.to_string(),
            ws_base_url: WS_BASE_URL.to_string(),
            auth_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            follow_threshold: DEFAULT_FOLLOW_THRESHOLD,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }
}
