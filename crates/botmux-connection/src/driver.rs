//! The task that owns the gateway link.
//!
//! Exactly one driver runs per [`ConnectionManager`](crate::ConnectionManager).
//! It is the only writer and the only reader of the socket: outbound frames
//! arrive through a bounded queue, inbound frames are decoded and either
//! complete a pending request or go to the dispatcher.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use botmux_protocol::{ActionResponse, Frame, JsonCodec, decode_frame};
use botmux_transport::{Connection, TransportError, WebSocketConnection, reconnect};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::{ConnectionSettings, Dispatcher, InboundEvent, LinkState};

/// One frame waiting to be written.
pub(crate) struct Outgoing {
    pub frame: Vec<u8>,
    /// Link generation observed by the caller when it checked the state.
    pub generation: u64,
    pub written: oneshot::Sender<Result<(), TransportError>>,
}

/// State shared between the manager handles and the driver.
pub(crate) struct Core {
    pub settings: ConnectionSettings,
    pub codec: JsonCodec,
    dispatcher: RwLock<Option<Arc<dyn Dispatcher>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<ActionResponse>>>,
    generation: AtomicU64,
    pub state: watch::Sender<LinkState>,
}

impl Core {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            codec: JsonCodec,
            dispatcher: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            state: watch::channel(LinkState::Idle).0,
        }
    }

    /// Replaces the dispatcher. Returns `true` if one was already set.
    pub fn set_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) -> bool {
        self.dispatcher
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(dispatcher)
            .is_some()
    }

    pub fn dispatcher(&self) -> Option<Arc<dyn Dispatcher>> {
        self.dispatcher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pending(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<ActionResponse>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.borrow(), LinkState::Connected)
    }

    /// Wakes every outstanding request with "connection lost".
    pub fn fail_pending(&self) {
        let dropped = {
            let mut pending = self.pending();
            let n = pending.len();
            pending.clear();
            n
        };
        if dropped > 0 {
            tracing::debug!(count = dropped, "failed outstanding requests");
        }
    }

    pub fn set_state(&self, next: LinkState) {
        tracing::debug!(state = ?next, "link state changed");
        self.state.send_replace(next);
    }

    /// Moves to `Closed` unless the link already reached a terminal state.
    pub fn mark_closed(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = LinkState::Closed;
                true
            }
        })
    }

    fn complete(&self, response: ActionResponse) {
        let Some(echo) = response.echo.clone() else {
            tracing::debug!(retcode = response.retcode, "response without echo ignored");
            return;
        };
        match self.pending().remove(&echo) {
            Some(waiter) => {
                let _ = waiter.send(response);
            }
            None => tracing::debug!(%echo, "response for unknown or expired request"),
        }
    }

    fn dispatch(&self, event: InboundEvent) {
        let Some(dispatcher) = self.dispatcher() else {
            tracing::warn!(group_id = %event.group_id, "no dispatcher; event dropped");
            return;
        };
        let group_id = event.group_id;
        if std::panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(event))).is_err() {
            tracing::error!(%group_id, "dispatcher panicked; event dropped");
        }
    }
}

/// Why [`Driver::serve`] returned.
enum Exit {
    /// Cancelled, or every manager handle is gone.
    Closed,
    /// The link broke underneath us.
    Lost(String),
}

pub(crate) struct Driver {
    core: Arc<Core>,
    queue: mpsc::Receiver<Outgoing>,
    cancel: CancellationToken,
}

impl Driver {
    pub fn new(core: Arc<Core>, queue: mpsc::Receiver<Outgoing>, cancel: CancellationToken) -> Self {
        Self {
            core,
            queue,
            cancel,
        }
    }

    /// Serves links until closed or until reconnection gives up.
    pub async fn run(mut self, mut conn: WebSocketConnection) {
        loop {
            let reason = match self.serve(&conn).await {
                Exit::Closed => {
                    if let Err(e) = conn.close().await {
                        tracing::debug!(link = %conn.id(), error = %e, "close handshake failed");
                    }
                    self.core.fail_pending();
                    self.core.mark_closed();
                    tracing::info!(link = %conn.id(), "gateway link closed");
                    return;
                }
                Exit::Lost(reason) => reason,
            };

            tracing::warn!(link = %conn.id(), %reason, "gateway link lost");
            self.core.generation.fetch_add(1, Ordering::SeqCst);
            self.core.fail_pending();

            match self.reestablish(reason).await {
                Some(next) => conn = next,
                None => return,
            }
        }
    }

    async fn serve(&mut self, conn: &WebSocketConnection) -> Exit {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Exit::Closed,
                outgoing = self.queue.recv() => {
                    let Some(outgoing) = outgoing else {
                        return Exit::Closed;
                    };
                    if outgoing.generation != self.core.generation() {
                        // Queued for a link that no longer exists.
                        continue;
                    }
                    let result = conn.send(&outgoing.frame).await;
                    let failure = result.as_ref().err().map(ToString::to_string);
                    let _ = outgoing.written.send(result);
                    if let Some(reason) = failure {
                        return Exit::Lost(reason);
                    }
                }
                received = conn.recv() => match received {
                    Ok(Some(data)) => self.on_frame(&data),
                    Ok(None) => return Exit::Lost("closed by gateway".into()),
                    Err(e) => return Exit::Lost(e.to_string()),
                },
            }
        }
    }

    fn on_frame(&self, data: &[u8]) {
        match decode_frame(data) {
            Ok(Frame::Response(response)) => self.core.complete(response),
            Ok(Frame::GroupMessage(event)) => self.core.dispatch(InboundEvent::new(event)),
            Ok(Frame::Meta(meta)) => {
                tracing::trace!(kind = %meta.meta_event_type, "meta event");
            }
            Ok(Frame::Ignored { post_type }) => {
                tracing::trace!(%post_type, "event ignored");
            }
            Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
        }
    }

    /// Drains stale writes and runs the reconnection policy.
    async fn reestablish(&mut self, reason: String) -> Option<WebSocketConnection> {
        let policy = self.core.settings.reconnect;
        if policy.max_attempts() == 0 {
            self.core.set_state(LinkState::Failed {
                attempts: 0,
                reason,
            });
            self.drain_queue();
            return None;
        }

        self.core.set_state(LinkState::Reconnecting);
        self.drain_queue();

        let result = tokio::select! {
            () = self.cancel.cancelled() => {
                self.core.mark_closed();
                return None;
            }
            result = reconnect(&self.core.settings.endpoint, &policy) => result,
        };

        match result {
            Ok(conn) => {
                self.core.set_state(LinkState::Connected);
                Some(conn)
            }
            Err(e) => {
                tracing::error!(
                    attempts = e.attempts,
                    max_attempts = policy.attempts,
                    error = %e.source,
                    "reconnection failed; giving up"
                );
                self.core.set_state(LinkState::Failed {
                    attempts: e.attempts,
                    reason: e.source.to_string(),
                });
                self.drain_queue();
                None
            }
        }
    }

    fn drain_queue(&mut self) {
        while let Ok(stale) = self.queue.try_recv() {
            drop(stale);
        }
    }
}
