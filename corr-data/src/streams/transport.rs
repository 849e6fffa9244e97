use crate::{error::DataError, streams::timeout::TimeoutStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, future, stream::BoxStream};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

/// Stream of raw upstream frames, or the errors encountered reading them.
pub type FrameStream = BoxStream<'static, Result<Bytes, DataError>>;

/// Opens upstream connections yielding raw frames.
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    async fn dial(&self, url: &Url) -> Result<FrameStream, DataError>;
}

/// WebSocket [`FeedTransport`] with an idle read timeout.
#[derive(Debug, Clone)]
pub struct WsTransport {
    read_timeout: Duration,
}

impl WsTransport {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(crate::streams::timeout::DEFAULT_WS_READ_TIMEOUT)
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn dial(&self, url: &Url) -> Result<FrameStream, DataError> {
        let (websocket, response) =
            connect_async(url.as_str())
                .await
                .map_err(|error| DataError::Dial {
                    url: url.to_string(),
                    reason: error.to_string(),
                })?;

        debug!(%url, status = %response.status(), "upstream WebSocket connected");

        let frames = websocket.filter_map(|message| {
            future::ready(match message {
                Ok(message @ (Message::Text(_) | Message::Binary(_))) => {
                    Some(Ok(message.into_data()))
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "upstream WebSocket sent close frame");
                    Some(Err(DataError::Terminated))
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                Err(error) => Some(Err(DataError::from(error))),
            })
        });

        Ok(TimeoutStream::new(frames.boxed(), self.read_timeout).boxed())
    }
}
