//! Websocket push-stream listener feeding the bounded event channel.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, warn};

use hmip_common::error::{Error, Result};
use hmip_common::model::ChangeEvent;

use crate::parse;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Long-lived push-stream listener.
///
/// Owns the websocket connection to the cloud and converts incoming messages
/// into event batches on the channel. Reconnects with a fixed delay whenever
/// the stream ends; stops once the consumer side of the channel is gone.
pub(crate) struct PushListener {
    ws_url: String,
    auth_token: String,
    client_auth: String,
}

impl PushListener {
    pub(crate) fn new(ws_url: String, auth_token: String, client_auth: String) -> Self {
        Self {
            ws_url,
            auth_token,
            client_auth,
        }
    }

    pub(crate) async fn run(self, tx: mpsc::Sender<Vec<ChangeEvent>>) {
        loop {
            match self.listen_once(&tx).await {
                Ok(()) => info!("Push stream closed by upstream"),
                Err(e) => warn!(error = %e, "Push stream failed"),
            }

            if tx.is_closed() {
                debug!("Event consumer gone, stopping push listener");
                return;
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn listen_once(&self, tx: &mpsc::Sender<Vec<ChangeEvent>>) -> Result<()> {
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Transport(format!("Invalid websocket url: {}", e)))?;

        let headers = request.headers_mut();
        headers.insert("AUTHTOKEN", header_value(&self.auth_token)?);
        headers.insert("CLIENTAUTH", header_value(&self.client_auth)?);

        let (mut stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::Transport(format!("Websocket connect failed: {}", e)))?;

        info!(url = %self.ws_url, "Connected to push stream");

        while let Some(message) = stream.next().await {
            let message =
                message.map_err(|e| Error::Transport(format!("Websocket read failed: {}", e)))?;

            match message {
                Message::Text(text) => match parse::events_from_message(text.as_str()) {
                    Ok(events) if !events.is_empty() => match tx.try_send(events) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            // Never block the socket on a slow consumer.
                            warn!("Event channel full, dropping batch");
                        }
                        Err(TrySendError::Closed(_)) => return Ok(()),
                    },
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Ignoring malformed push message"),
                },
                Message::Close(_) => return Ok(()),
                _ => {}
            }
        }

        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Config(format!("Invalid header value: {}", e)))
}
