//! A scriptable in-process gateway for tests.
//!
//! [`FakeGateway`] speaks just enough of the gateway protocol to exercise a
//! [`ConnectionManager`](crate::ConnectionManager) end to end: it checks
//! the bearer token, records every action it receives, answers
//! `send_group_msg` and `get_stranger_info`, and lets the test push events
//! or cut the link.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use botmux_protocol::{
    ActionRequest, ActionResponse, GET_STRANGER_INFO, GroupId, MessageId, SEND_GROUP_MSG, Segment,
    SendGroupMessage, UserId,
};
use botmux_transport::Endpoint;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

/// One action as the gateway received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAction {
    pub action: String,
    pub params: Value,
    pub echo: String,
}

#[derive(Default)]
struct Script {
    names: HashMap<UserId, String>,
    lookup_delays: HashMap<UserId, Duration>,
    rejected_groups: HashSet<GroupId>,
}

enum ClientCommand {
    Push(String),
    Hangup,
}

struct Shared {
    token: RwLock<String>,
    script: Mutex<Script>,
    actions: Mutex<Vec<RecordedAction>>,
    activity: Notify,
    clients: Mutex<Vec<mpsc::UnboundedSender<ClientCommand>>>,
    accepting: AtomicBool,
    connections: AtomicUsize,
    next_message_id: AtomicU64,
}

/// A gateway listening on `127.0.0.1` with a random port.
pub struct FakeGateway {
    addr: SocketAddr,
    shared: Arc<Shared>,
    acceptor: JoinHandle<()>,
}

impl FakeGateway {
    /// Starts accepting clients that present `token`. An empty token
    /// accepts everyone.
    pub async fn start(token: impl Into<String>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            token: RwLock::new(token.into()),
            script: Mutex::new(Script::default()),
            actions: Mutex::new(Vec::new()),
            activity: Notify::new(),
            clients: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
            connections: AtomicUsize::new(0),
            next_message_id: AtomicU64::new(1),
        });
        let acceptor = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
        Ok(Self {
            addr,
            shared,
            acceptor,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// An endpoint presenting the gateway's own token.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.url(), self.shared.token())
    }

    /// Accepts only `token` from now on. Connected clients stay connected.
    pub fn rotate_token(&self, token: impl Into<String>) {
        *self.shared.token.write().unwrap_or_else(PoisonError::into_inner) = token.into();
    }

    /// Number of clients that completed the upgrade so far.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Answers lookups for `user` with `name`.
    pub async fn set_display_name(&self, user: UserId, name: impl Into<String>) {
        self.shared.script.lock().await.names.insert(user, name.into());
    }

    /// Holds back lookup answers for `user`.
    pub async fn delay_lookup(&self, user: UserId, delay: Duration) {
        self.shared.script.lock().await.lookup_delays.insert(user, delay);
    }

    /// Fails every `send_group_msg` targeting `group`.
    pub async fn reject_group(&self, group: GroupId) {
        self.shared.script.lock().await.rejected_groups.insert(group);
    }

    /// Pushes a group message event to every connected client.
    pub async fn push_group_message(
        &self,
        group: GroupId,
        sender: UserId,
        content: Vec<Segment>,
    ) -> MessageId {
        let id = self.shared.next_message_id.fetch_add(1, Ordering::SeqCst);
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.push_event(json!({
            "time": time,
            "post_type": "message",
            "message_type": "group",
            "sub_type": "normal",
            "message_id": id,
            "group_id": group.0,
            "user_id": sender.0,
            "message": content,
            "sender": { "user_id": sender.0 },
        }))
        .await;
        MessageId::new(id.to_string())
    }

    /// Pushes an arbitrary JSON frame to every connected client.
    pub async fn push_event(&self, event: Value) {
        self.broadcast(|| ClientCommand::Push(event.to_string())).await;
    }

    /// Cuts every open link without a close handshake.
    pub async fn drop_clients(&self) {
        self.broadcast(|| ClientCommand::Hangup).await;
    }

    /// Refuses new clients at the TCP level until [`resume_accepting`](Self::resume_accepting).
    pub fn stop_accepting(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
    }

    pub fn resume_accepting(&self) {
        self.shared.accepting.store(true, Ordering::SeqCst);
    }

    /// Every action received so far, in arrival order.
    pub async fn actions(&self) -> Vec<RecordedAction> {
        self.shared.actions.lock().await.clone()
    }

    /// Every `send_group_msg` received so far, in arrival order.
    pub async fn sent_messages(&self) -> Vec<SendGroupMessage> {
        self.actions()
            .await
            .into_iter()
            .filter(|a| a.action == SEND_GROUP_MSG)
            .filter_map(|a| serde_json::from_value(a.params).ok())
            .collect()
    }

    /// Waits until at least `count` messages were sent, or `within` elapses.
    /// Returns whatever was sent by then.
    pub async fn wait_for_sent(&self, count: usize, within: Duration) -> Vec<SendGroupMessage> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let notified = self.shared.activity.notified();
            let sent = self.sent_messages().await;
            if sent.len() >= count {
                return sent;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sent_messages().await;
            }
        }
    }

    /// Waits until `count` clients have connected in total.
    pub async fn wait_for_connections(&self, count: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let notified = self.shared.activity.notified();
            if self.connection_count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.connection_count() >= count;
            }
        }
    }

    async fn broadcast(&self, command: impl Fn() -> ClientCommand) {
        let mut clients = self.shared.clients.lock().await;
        clients.retain(|client| client.send(command()).is_ok());
    }
}

impl Drop for FakeGateway {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while let Ok((stream, _)) = listener.accept().await {
        if !shared.accepting.load(Ordering::SeqCst) {
            drop(stream);
            continue;
        }
        tokio::spawn(serve_client(stream, Arc::clone(&shared)));
    }
}

async fn serve_client(stream: TcpStream, shared: Arc<Shared>) {
    let token = shared.token();
    let expected = format!("Bearer {token}");
    let open = token.is_empty();
    let check = move |req: &Request, resp: Response| {
        let presented = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok());
        if open || presented == Some(expected.as_str()) {
            Ok(resp)
        } else {
            let mut err = ErrorResponse::new(Some("invalid access token".into()));
            *err.status_mut() = StatusCode::UNAUTHORIZED;
            Err(err)
        }
    };
    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, check).await else {
        return;
    };

    let (tx, mut commands) = mpsc::unbounded_channel();
    shared.clients.lock().await.push(tx.clone());
    shared.connections.fetch_add(1, Ordering::SeqCst);
    shared.activity.notify_waiters();

    let (mut sink, mut frames) = ws.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ClientCommand::Push(text)) => {
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(ClientCommand::Hangup) | None => break,
            },
            frame = frames.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => shared.answer(text.as_str(), &tx).await,
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

impl Shared {
    fn token(&self) -> String {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn answer(&self, text: &str, client: &mpsc::UnboundedSender<ClientCommand>) {
        let Ok(request) = serde_json::from_str::<ActionRequest<Value>>(text) else {
            return;
        };
        self.actions.lock().await.push(RecordedAction {
            action: request.action.clone(),
            params: request.params.clone(),
            echo: request.echo.clone(),
        });
        self.activity.notify_waiters();

        let (response, delay) = self.respond(&request).await;
        let Ok(text) = serde_json::to_string(&response) else {
            return;
        };
        if delay.is_zero() {
            let _ = client.send(ClientCommand::Push(text));
        } else {
            let client = client.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = client.send(ClientCommand::Push(text));
            });
        }
    }

    async fn respond(&self, request: &ActionRequest<Value>) -> (ActionResponse, Duration) {
        let script = self.script.lock().await;
        let echo = request.echo.as_str();
        let id_param = |key: &str| request.params.get(key).and_then(Value::as_u64);

        match request.action.as_str() {
            SEND_GROUP_MSG => {
                let rejected = id_param("group_id")
                    .is_some_and(|group| script.rejected_groups.contains(&GroupId(group)));
                let response = if rejected {
                    ActionResponse::failed(1200, "send rejected by gateway", echo)
                } else {
                    let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
                    ActionResponse::ok(json!({ "message_id": id }), echo)
                };
                (response, Duration::ZERO)
            }
            GET_STRANGER_INFO => {
                let user = id_param("user_id").map(UserId);
                let delay = user
                    .and_then(|u| script.lookup_delays.get(&u).copied())
                    .unwrap_or_default();
                let response = match user.and_then(|u| script.names.get(&u).map(|n| (u, n))) {
                    Some((user, name)) => ActionResponse::ok(
                        json!({ "user_id": user.0, "nickname": name }),
                        echo,
                    ),
                    None => ActionResponse::failed(100, "user not found", echo),
                };
                (response, delay)
            }
            _ => (ActionResponse::ok(Value::Null, echo), Duration::ZERO),
        }
    }
}
