pub mod api;
pub mod config;
pub mod connection;
pub mod constants;
pub mod events;
pub mod feed;
pub mod models;
pub mod search;
pub mod session;

pub use api::{ApiError, Archive, HttpMessageSource, MessageSource};
pub use config::FeedConfig;
pub use connection::{ConnectionManager, ConnectionState, PushConnector, WsConnector};
pub use events::FeedEvent;
pub use feed::{BufferChange, FeedState};
pub use models::{AccountScope, ChatSelection, Message, ScopeFilter};
pub use session::FeedSession;
