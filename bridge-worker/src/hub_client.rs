//! Persistent, reconnecting WebSocket connection to the hub.
//!
//! A thin wrapper that errors very conservatively and closes best-effort on
//! anything unexpected. The connection is held open and reconnected for the
//! lifetime of the process, since this worker face's connection outlives
//! any single exchange. The wire encoding is UTF-8 JSON text frames, not a
//! binary format, matching the hub's own frame encoding. The reconnect loop
//! is built on `backon::ExponentialBuilder`.

use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use bridge_types::Message;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::IgorConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors establishing the WebSocket handshake with the hub.
#[derive(Debug, thiserror::Error)]
pub enum HubConnectError {
    /// The handshake itself (URL, headers, TCP/TLS, or the WS upgrade)
    /// failed.
    #[error("hub handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
    /// The configured auth token was not a valid HTTP header value.
    #[error("invalid auth token: {0}")]
    InvalidToken(#[from] http::header::InvalidHeaderValue),
}

/// A handle to the background reconnect loop. Cheap to clone; every clone
/// shares the same outbound queue.
#[derive(Clone)]
pub struct HubClient {
    outbound: mpsc::Sender<Message>,
}

impl HubClient {
    /// Enqueues `message` for delivery to the hub. Returns `false` (without
    /// blocking) if the outbound queue is full or the connection loop has
    /// shut down.
    pub fn send(&self, message: Message) -> bool {
        self.outbound.try_send(message).is_ok()
    }
}

/// Spawns the reconnect loop and returns a handle to its outbound queue
/// along with the inbound queue of frames read from the hub. Inbound frames
/// are queued rather than dispatched via a callback so that the dispatch
/// logic can hold a handle back to the very [`HubClient`] this call returns,
/// the same way [`bridge_hub::connection::ConnectionManager::accept`] hands
/// its caller a receiver instead of a callback. `build_registration` is
/// called once at the start of every session (including after a reconnect,
/// since the hub forgets registration when a connection drops) to produce
/// the `component.register` frame sent before anything else.
pub fn spawn(
    config: Arc<IgorConfig>,
    build_registration: impl Fn() -> Message + Send + Sync + 'static,
    cancellation: CancellationToken,
) -> (HubClient, mpsc::Receiver<Message>) {
    let (outbound_tx, outbound_rx) = mpsc::channel(config.send_queue_size);
    let (inbound_tx, inbound_rx) = mpsc::channel(config.send_queue_size);
    let signing_secret: Option<Arc<[u8]>> = config
        .signing_secret
        .as_ref()
        .map(|secret| Arc::from(secret.as_bytes().to_vec().into_boxed_slice()));
    tokio::spawn(connection_loop(
        config,
        outbound_rx,
        inbound_tx,
        Arc::new(build_registration),
        signing_secret,
        cancellation,
    ));
    (HubClient { outbound: outbound_tx }, inbound_rx)
}

async fn connection_loop(
    config: Arc<IgorConfig>,
    mut outbound_rx: mpsc::Receiver<Message>,
    inbound_tx: mpsc::Sender<Message>,
    build_registration: Arc<dyn Fn() -> Message + Send + Sync>,
    signing_secret: Option<Arc<[u8]>>,
    cancellation: CancellationToken,
) {
    loop {
        if cancellation.is_cancelled() {
            return;
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(config.reconnect_base)
            .with_max_delay(config.reconnect_max)
            .with_jitter();
        let cancelled_ref = &cancellation;
        let config_ref = &config;
        let connected = (|| connect_once(config_ref))
            .retry(backoff)
            .when(|_| !cancelled_ref.is_cancelled())
            .notify(|err, delay| {
                tracing::warn!(error = %err, delay = ?delay, "retrying hub connection");
                metrics::counter!(crate::metrics::METRICS_ID_HUB_RECONNECTS).increment(1);
            })
            .await;

        let Ok(stream) = connected else {
            if cancellation.is_cancelled() {
                return;
            }
            continue;
        };

        tracing::info!(hub_url = %config.hub_url, "connected to hub");
        metrics::gauge!(crate::metrics::METRICS_ID_HUB_CONNECTED).set(1.0);
        run_session(stream, &mut outbound_rx, &inbound_tx, build_registration.as_ref(), signing_secret.as_deref(), &cancellation).await;
        metrics::gauge!(crate::metrics::METRICS_ID_HUB_CONNECTED).set(0.0);
        tracing::warn!("hub connection closed, will reconnect");
    }
}

async fn connect_once(config: &IgorConfig) -> Result<WsStream, HubConnectError> {
    let mut request = config.hub_url.as_str().into_client_request()?;
    if let Some(token) = &config.auth_token {
        request
            .headers_mut()
            .insert(http::header::AUTHORIZATION, http::HeaderValue::from_str(&format!("Bearer {token}"))?);
    }
    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

/// Drives one connected session until it closes, either because the peer
/// closed it, an unexpected frame arrived, or `cancellation` fired. Any exit
/// path attempts a best-effort `Close` frame first.
async fn run_session(
    stream: WsStream,
    outbound_rx: &mut mpsc::Receiver<Message>,
    inbound_tx: &mpsc::Sender<Message>,
    build_registration: &(dyn Fn() -> Message + Send + Sync),
    signing_secret: Option<&[u8]>,
    cancellation: &CancellationToken,
) {
    let (mut write, mut read) = stream.split();

    let mut registration = build_registration();
    if let Some(secret) = signing_secret
        && let Ok(signature) = bridge_types::signing::sign(&registration, secret)
    {
        registration.signature = Some(signature);
    }
    match serde_json::to_string(&registration) {
        Ok(encoded) => {
            if write.send(WsMessage::Text(encoded.into())).await.is_err() {
                return;
            }
        }
        Err(err) => tracing::error!(error = %err, "failed to encode registration frame"),
    }

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                let _ = write.send(WsMessage::Close(None)).await;
                return;
            }
            outbound = outbound_rx.recv() => {
                let Some(mut message) = outbound else {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return;
                };
                if let Some(secret) = signing_secret
                    && let Ok(signature) = bridge_types::signing::sign(&message, secret)
                {
                    message.signature = Some(signature);
                }
                let Ok(encoded) = serde_json::to_string(&message) else {
                    tracing::error!("failed to encode outbound message as JSON");
                    continue;
                };
                if write.send(WsMessage::Text(encoded.into())).await.is_err() {
                    return;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<Message>(&text) {
                        Ok(message) => {
                            if inbound_tx.send(message).await.is_err() {
                                return;
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "hub sent an unparseable frame"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        return;
                    }
                    Some(Ok(_other)) => {
                        tracing::warn!("hub sent a non-text frame, closing the session");
                        let _ = write.send(WsMessage::Close(None)).await;
                        return;
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "hub connection error, closing the session");
                        return;
                    }
                }
            }
        }
    }
}
