pub mod group;
pub mod message;
pub mod scope;

pub use group::GroupOption;
pub use message::{MediaType, Message, MessageError, MessageKey, RawMessage};
pub use scope::{AccountScope, ChatSelection, ScopeFilter};
