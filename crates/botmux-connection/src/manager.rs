//! The public handle over the shared gateway link.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use botmux_protocol::{
    ActionRequest, ActionResponse, Codec, GET_STRANGER_INFO, GetStrangerInfo, GroupId, MessageId,
    OutboundMessage, SEND_GROUP_MSG, Segment, SendGroupMessage, SentMessage, StrangerInfo, UserId,
};
use botmux_transport::{Connection, Endpoint, ReconnectPolicy, WebSocketConnection};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::driver::{Core, Driver, Outgoing};
use crate::{ActionError, ConnectionError, Dispatcher, LookupError, SendError};

/// How long a request waits for its response unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound frames that may be queued ahead of the driver.
const WRITE_QUEUE_CAPACITY: usize = 256;

/// Everything needed to open and keep the link.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub endpoint: Endpoint,
    pub reconnect: ReconnectPolicy,
    /// Upper bound on one request/response exchange.
    pub request_timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            reconnect: ReconnectPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Where the link is in its lifecycle.
///
/// ```text
/// Idle ──connect──▶ Connected ◀──▶ Reconnecting ──▶ Failed
///                        │                │
///                        └─────close──────┴──────▶ Closed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Not connected yet.
    Idle,
    /// The link is up; requests are accepted.
    Connected,
    /// The link dropped and the reconnection policy is running.
    Reconnecting,
    /// The link dropped for good. `attempts` is 0 when reconnection was
    /// disabled.
    Failed { attempts: u32, reason: String },
    /// Closed on request.
    Closed,
}

impl LinkState {
    /// `Failed` and `Closed` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Closed)
    }

    fn outcome(&self) -> Result<(), ConnectionError> {
        match self {
            Self::Failed {
                attempts: 0,
                reason,
            } => Err(ConnectionError::Lost {
                reason: reason.clone(),
            }),
            Self::Failed { attempts, reason } => Err(ConnectionError::ReconnectExhausted {
                attempts: *attempts,
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }
}

struct Control {
    queue: Option<mpsc::Receiver<Outgoing>>,
    driver: Option<JoinHandle<()>>,
}

struct Inner {
    core: Arc<Core>,
    writer: mpsc::Sender<Outgoing>,
    next_echo: AtomicU64,
    cancel: CancellationToken,
    control: Mutex<Control>,
}

/// The one link to the gateway, shared by every session.
///
/// Cheap to clone. Requests from any number of tasks are serialized onto
/// the socket by a single driver task and matched to their responses by
/// `echo`.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager in the [`LinkState::Idle`] state. Nothing is
    /// opened until [`connect`](Self::connect).
    pub fn new(settings: ConnectionSettings) -> Self {
        let (writer, queue) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                core: Arc::new(Core::new(settings)),
                writer,
                next_echo: AtomicU64::new(1),
                cancel: CancellationToken::new(),
                control: Mutex::new(Control {
                    queue: Some(queue),
                    driver: None,
                }),
            }),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.core.settings
    }

    /// Sets the callback that receives every inbound group message.
    ///
    /// Replaces any previously registered dispatcher.
    pub fn register_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) {
        if self.inner.core.set_dispatcher(dispatcher) {
            tracing::debug!("dispatcher replaced");
        }
    }

    /// Opens the link. Makes a single attempt.
    ///
    /// # Errors
    /// - [`ConnectionError::NoDispatcher`] if no dispatcher is registered.
    /// - [`ConnectionError::AlreadyConnected`] on a second call.
    /// - [`ConnectionError::Closed`] after [`close`](Self::close).
    /// - [`ConnectionError::Transport`] if the gateway is unreachable or
    ///   rejects the token.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut control = self.inner.control.lock().await;
        if self.inner.cancel.is_cancelled() {
            return Err(ConnectionError::Closed);
        }
        if control.driver.is_some() {
            return Err(ConnectionError::AlreadyConnected);
        }
        if self.inner.core.dispatcher().is_none() {
            return Err(ConnectionError::NoDispatcher);
        }

        let endpoint = &self.inner.core.settings.endpoint;
        let conn = WebSocketConnection::connect(endpoint).await?;
        let Some(queue) = control.queue.take() else {
            return Err(ConnectionError::AlreadyConnected);
        };

        tracing::info!(link = %conn.id(), url = %endpoint.url, "connected to gateway");
        self.inner.core.set_state(LinkState::Connected);

        let driver = Driver::new(
            Arc::clone(&self.inner.core),
            queue,
            self.inner.cancel.clone(),
        );
        control.driver = Some(tokio::spawn(driver.run(conn)));
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.inner.core.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.core.is_connected()
    }

    /// Posts `content` into `group_id`.
    ///
    /// Resolves once the gateway acknowledged the message. The returned id
    /// is `None` when the gateway accepted the action without reporting one.
    pub async fn send_group_message(
        &self,
        group_id: GroupId,
        content: Vec<Segment>,
    ) -> Result<Option<MessageId>, SendError> {
        self.send(OutboundMessage { group_id, content }).await
    }

    /// Posts `message` into its group. See
    /// [`send_group_message`](Self::send_group_message).
    pub async fn send(&self, message: OutboundMessage) -> Result<Option<MessageId>, SendError> {
        let group_id = message.group_id;
        let data = self
            .call(SEND_GROUP_MSG, SendGroupMessage::from(message))
            .await
            .map_err(|source| SendError { group_id, source })?;

        let message_id = serde_json::from_value::<SentMessage>(data)
            .ok()
            .map(|sent| sent.message_id);
        tracing::debug!(%group_id, ?message_id, "group message sent");
        Ok(message_id)
    }

    /// Looks up a user's display name.
    pub async fn fetch_user_display_name(&self, user_id: UserId) -> Result<String, LookupError> {
        let params = GetStrangerInfo {
            user_id,
            no_cache: false,
        };
        let info = self
            .call(GET_STRANGER_INFO, params)
            .await
            .and_then(|data| {
                serde_json::from_value::<StrangerInfo>(data).map_err(ActionError::UnexpectedData)
            })
            .map_err(|source| LookupError::Action { user_id, source })?;

        let name = info.nickname.trim();
        if name.is_empty() {
            return Err(LookupError::NoName { user_id });
        }
        Ok(name.to_string())
    }

    /// Closes the link and fails outstanding requests.
    ///
    /// Idempotent. Once this returns nothing more is written to the
    /// gateway.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        let driver = {
            let mut control = self.inner.control.lock().await;
            control.queue.take();
            control.driver.take()
        };
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::error!(error = %e, "connection driver task failed");
            }
        }
        self.inner.core.fail_pending();
        if self.inner.core.mark_closed() {
            tracing::info!("connection manager closed");
        }
    }

    /// Resolves when the link reaches a terminal state.
    ///
    /// # Errors
    /// [`ConnectionError::Lost`] or [`ConnectionError::ReconnectExhausted`]
    /// if the link was lost for good rather than closed.
    pub async fn closed(&self) -> Result<(), ConnectionError> {
        let mut state = self.inner.core.state.subscribe();
        match state.wait_for(LinkState::is_terminal).await {
            Ok(terminal) => terminal.outcome(),
            Err(_) => Ok(()),
        }
    }

    /// One request/response exchange. Returns the response `data`.
    async fn call<P: Serialize>(&self, action: &'static str, params: P) -> Result<Value, ActionError> {
        let core = &self.inner.core;
        let generation = core.generation();
        if !core.is_connected() {
            return Err(ActionError::NotConnected);
        }

        let echo = self.inner.next_echo.fetch_add(1, Ordering::Relaxed).to_string();
        let frame = core.codec.encode(&ActionRequest::new(action, params, echo.as_str()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        core.pending().insert(echo.clone(), reply_tx);
        tracing::trace!(action, %echo, "request queued");

        let timeout = core.settings.request_timeout;
        let outcome = tokio::time::timeout(timeout, self.exchange(frame, generation, reply_rx))
            .await
            .unwrap_or(Err(ActionError::Timeout(timeout)));
        core.pending().remove(&echo);

        let response = outcome?;
        if !response.is_ok() {
            return Err(ActionError::Rejected {
                retcode: response.retcode,
                reason: response.reason(),
            });
        }
        Ok(response.data)
    }

    async fn exchange(
        &self,
        frame: Vec<u8>,
        generation: u64,
        reply: oneshot::Receiver<ActionResponse>,
    ) -> Result<ActionResponse, ActionError> {
        let (written_tx, written_rx) = oneshot::channel();
        self.inner
            .writer
            .send(Outgoing {
                frame,
                generation,
                written: written_tx,
            })
            .await
            .map_err(|_| ActionError::NotConnected)?;

        written_rx
            .await
            .map_err(|_| ActionError::ConnectionLost)?
            .map_err(ActionError::Write)?;
        reply.await.map_err(|_| ActionError::ConnectionLost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InboundEvent;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(ConnectionSettings::new(Endpoint::new(
            "ws://127.0.0.1:1",
            "",
        )))
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ConnectionSettings::new(Endpoint::new("ws://gw", "t"));
        assert_eq!(settings.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(settings.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn test_link_state_terminal_outcomes() {
        assert!(!LinkState::Connected.is_terminal());
        assert!(LinkState::Closed.outcome().is_ok());
        assert!(matches!(
            LinkState::Failed {
                attempts: 0,
                reason: "gone".into()
            }
            .outcome(),
            Err(ConnectionError::Lost { .. })
        ));
        assert!(matches!(
            LinkState::Failed {
                attempts: 3,
                reason: "gone".into()
            }
            .outcome(),
            Err(ConnectionError::ReconnectExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_without_dispatcher_fails() {
        let manager = manager();
        assert!(matches!(
            manager.connect().await,
            Err(ConnectionError::NoDispatcher)
        ));
        assert_eq!(manager.state(), LinkState::Idle);
    }

    #[tokio::test]
    async fn test_send_before_connect_fails_fast() {
        let manager = manager();
        let err = manager
            .send_group_message(GroupId(1), vec![Segment::text("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.group_id, GroupId(1));
        assert!(matches!(err.source, ActionError::NotConnected));
    }

    #[tokio::test]
    async fn test_close_before_connect_is_terminal_and_idempotent() {
        let manager = manager();
        manager.register_dispatcher(Arc::new(|_: InboundEvent| {}));
        manager.close().await;
        manager.close().await;
        assert_eq!(manager.state(), LinkState::Closed);
        assert!(manager.closed().await.is_ok());
        assert!(matches!(
            manager.connect().await,
            Err(ConnectionError::Closed)
        ));
    }
}
