use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use super::{ConnectionError, PushConnector, PushFrame, PushStream};
use crate::config::FeedConfig;
use crate::constants::paths;
use crate::models::AccountScope;

/// WebSocket push channel: `{ws_base}/telegram/ws/feed/{session_id}`, where
/// session 0 carries every account.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
    auth_token: Option<String>,
}

impl WsConnector {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            base_url: config.ws_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        }
    }

    pub fn url_for(&self, account: &AccountScope) -> String {
        let url = format!("{}/{}/{}", self.base_url, paths::PUSH, account.as_wire());
        match &self.auth_token {
            Some(token) => format!("{}?token={}", url, token),
            None => url,
        }
    }
}

/// Map one websocket message to a stream item. Non-text control traffic is
/// skipped; undecodable text frames are dropped with a diagnostic.
fn frame_item(
    message: Result<WsMessage, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<PushFrame, ConnectionError>> {
    match message {
        Ok(WsMessage::Text(text)) => match PushFrame::from_text(text.as_str()) {
            Ok(frame) => Some(Ok(frame)),
            Err(e) => {
                warn!(error = %e, "dropping undecodable push frame");
                None
            }
        },
        Ok(WsMessage::Close(frame)) => Some(Err(ConnectionError::Closed(
            frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty()),
        ))),
        Ok(_) => None,
        Err(e) => Some(Err(e.into())),
    }
}

impl PushConnector for WsConnector {
    fn connect(
        &self,
        account: &AccountScope,
    ) -> BoxFuture<'static, Result<PushStream, ConnectionError>> {
        let url = self.url_for(account);
        async move {
            debug!(url = %url.split('?').next().unwrap_or_default(), "connecting push channel");
            let (socket, _response) = connect_async(url.as_str()).await?;
            let stream = socket.filter_map(|message| futures::future::ready(frame_item(message)));
            Ok(stream.boxed())
        }
        .boxed()
    }
}
