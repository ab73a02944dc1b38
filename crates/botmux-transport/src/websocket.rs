//! WebSocket client transport using `tokio-tungstenite`.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Endpoint, ReconnectError, ReconnectPolicy, TransportError};

/// Counter for generating unique link IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A client WebSocket link to the gateway.
///
/// The stream is split so a pending `recv` never blocks a `send`.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    /// Opens one link to `endpoint`. Makes exactly one attempt.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let mut request = endpoint
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        if !endpoint.access_token.is_empty() {
            let value = HeaderValue::from_str(&format!(
                "Bearer {}",
                endpoint.access_token
            ))
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| classify_connect_error(&endpoint.url, e))?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, url = %endpoint.url, "WebSocket link established");

        let (sink, stream) = ws.split();
        Ok(Self {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

fn classify_connect_error(url: &str, err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            TransportError::Unauthorized {
                url: url.to_string(),
                status: response.status().as_u16(),
            }
        }
        tungstenite::Error::Url(e) => TransportError::InvalidEndpoint(e.to_string()),
        other => TransportError::ConnectFailed {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // Gateways speak JSON text frames; anything else goes out as binary.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Re-establishes a lost link according to `policy`.
///
/// Waits `policy.delay()` before each attempt. Gives up early on a
/// permanent failure (rejected token, malformed endpoint). The error
/// carries the error of the last attempt and how many attempts were
/// made; a disabled policy makes none.
pub async fn reconnect(
    endpoint: &Endpoint,
    policy: &ReconnectPolicy,
) -> Result<WebSocketConnection, ReconnectError> {
    let max = policy.max_attempts();
    let mut last_error =
        TransportError::ConnectionClosed("reconnection disabled".into());

    for attempt in 1..=max {
        tokio::time::sleep(policy.delay()).await;
        match WebSocketConnection::connect(endpoint).await {
            Ok(conn) => {
                tracing::info!(attempt, url = %endpoint.url, "reconnected to gateway");
                return Ok(conn);
            }
            Err(e) if e.is_permanent() => {
                return Err(ReconnectError {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = max,
                    error = %e,
                    "reconnect attempt failed"
                );
                last_error = e;
            }
        }
    }

    Err(ReconnectError {
        attempts: max,
        source: last_error,
    })
}
