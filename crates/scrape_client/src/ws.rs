use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use scrape_logging::{scrape_debug, scrape_trace};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::ClientSettings;
use crate::progress::{StatusStream, StreamConnector, StreamError};

/// Opens `{stream_base}/{task_id}` WebSocket streams.
#[derive(Debug, Clone)]
pub struct WsConnector {
    settings: ClientSettings,
}

impl WsConnector {
    pub fn new(settings: &ClientSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    fn connect_timeout(&self) -> Duration {
        self.settings.connect_timeout
    }
}

#[async_trait::async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn StatusStream>, StreamError> {
        let url = self
            .settings
            .stream_endpoint(task_id)
            .map_err(|err| StreamError::Connect(format!("{}: {err}", self.settings.stream_base)))?;
        scrape_debug!("Connecting to {}", url);

        let (ws, _response) = tokio::time::timeout(self.connect_timeout(), connect_async(url.as_str()))
            .await
            .map_err(|_| StreamError::Connect(format!("{url}: timed out")))?
            .map_err(|err| StreamError::Connect(format!("{url}: {err}")))?;
        Ok(Box::new(WsStatusStream { ws }))
    }
}

struct WsStatusStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl StatusStream for WsStatusStream {
    async fn next_text(&mut self) -> Option<Result<String, StreamError>> {
        while let Some(message) = self.ws.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(
                        String::from_utf8(bytes)
                            .map_err(|err| StreamError::Transport(err.to_string())),
                    )
                }
                Ok(Message::Close(frame)) => {
                    scrape_debug!("Peer closed status stream: {:?}", frame);
                    return None;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                    scrape_trace!("Control frame on status stream");
                }
                Err(err) => return Some(Err(StreamError::Transport(err.to_string()))),
            }
        }
        None
    }

    async fn send_text(&mut self, text: &str) -> Result<(), StreamError> {
        scrape_debug!("Sending {:?} on status stream", text);
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|err| StreamError::Transport(err.to_string()))
    }

    async fn close(&mut self) {
        if let Err(err) = self.ws.close(None).await {
            scrape_debug!("Closing status stream: {}", err);
        }
    }
}
