//! Application-wide constants
//!
//! Defaults for the feed synchronizer and the backend contract it consumes.

/// Default REST base URL of the automation backend
pub const API_BASE_URL: &str = "http://localhost:8000";

/// Default push-channel base URL
pub const WS_BASE_URL: &str = "ws://localhost:8000";

/// Number of messages requested per history page
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Distance from the bottom (in layout units) within which appends auto-follow
pub const DEFAULT_FOLLOW_THRESHOLD: usize = 100;

/// Timeout for a single REST call
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Maximum number of ready live messages folded into one batch
pub const LIVE_BATCH_MAX: usize = 64;

/// User-facing name of the all-accounts scope
pub const ALL_ACCOUNTS: &str = "all";

/// Session id of the multiplexed all-accounts push channel
pub const ALL_ACCOUNTS_SESSION: &str = "0";

/// Live arrivals held while page 1 is outstanding; the oldest are dropped past this
pub const DEFERRED_LIVE_MAX: usize = 1_000;

// Reconnect defaults
pub const RECONNECT_INITIAL_DELAY_MS: u64 = 500;
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;
pub const RECONNECT_MULTIPLIER: f64 = 2.0;

// REST paths
pub mod paths {
    pub const MESSAGES: &str = "telegram/messages";
    pub const GROUPS: &str = "telegram/groups";
    pub const DUMP_MESSAGES: &str = "dumper/messages";
    pub const DUMP_GROUPS: &str = "dumper/groups";
    /// Push channel path; the session id is appended as the last segment
    pub const PUSH: &str = "telegram/ws/feed";
}
