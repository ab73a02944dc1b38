//! Session manager: owns the sessions and the connection they share.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use botmux_connection::{ConnectionError, ConnectionManager, ConnectionSettings};
use botmux_protocol::{GroupId, UserId};
use tokio::task::JoinHandle;

use crate::session::Session;
use crate::{MessageHandler, SessionError, SessionHandle, SessionRouter};

/// How long `shutdown` waits for sessions before aborting them, unless
/// configured otherwise.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Which groups to serve and how.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// The bot's own account, used for mention detection.
    pub bot_id: UserId,
    /// One session is created per key.
    pub routing_keys: Vec<GroupId>,
    /// History entries kept per session. 0 disables history.
    pub history_turns: usize,
    /// Upper bound on waiting for in-flight work during shutdown.
    pub shutdown_grace: Duration,
}

impl SessionSettings {
    pub fn new(bot_id: UserId, routing_keys: Vec<GroupId>) -> Self {
        Self {
            bot_id,
            routing_keys,
            history_turns: 0,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Owns one session per routing key and the connection they share.
pub struct SessionManager {
    settings: SessionSettings,
    connection: ConnectionManager,
    router: Arc<SessionRouter>,
    tasks: Vec<(GroupId, JoinHandle<()>)>,
}

impl SessionManager {
    /// Builds every session, registers the router, and connects.
    ///
    /// `handler_factory` is called once per routing key.
    ///
    /// # Errors
    /// - [`SessionError::NoRoutingKeys`] / [`SessionError::DuplicateRoutingKey`]
    ///   before anything is spawned.
    /// - [`SessionError::Connection`] if the link cannot be opened; the
    ///   sessions are torn down first.
    pub async fn initialize<H, F>(
        settings: SessionSettings,
        connection_settings: ConnectionSettings,
        handler_factory: F,
    ) -> Result<Self, SessionError>
    where
        H: MessageHandler,
        F: FnMut(GroupId) -> H,
    {
        validate_routing_keys(&settings.routing_keys)?;

        let connection = ConnectionManager::new(connection_settings);
        let (handles, tasks) = spawn_sessions(&settings, &connection, handler_factory);

        let router = Arc::new(SessionRouter::new(handles));
        connection.register_dispatcher(router.clone());

        let manager = Self {
            settings,
            connection,
            router,
            tasks,
        };

        if let Err(e) = manager.connection.connect().await {
            tracing::error!(error = %e, "could not connect to gateway");
            manager.shutdown().await;
            return Err(e.into());
        }

        tracing::info!(
            sessions = manager.router.len(),
            bot_id = %manager.settings.bot_id,
            "session manager ready"
        );
        Ok(manager)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn session_count(&self) -> usize {
        self.router.len()
    }

    pub fn session(&self, group_id: GroupId) -> Option<&SessionHandle> {
        self.router.get(group_id)
    }

    /// Resolves when the link terminates.
    ///
    /// # Errors
    /// The fatal [`ConnectionError`] if the link was lost for good.
    pub async fn closed(&self) -> Result<(), ConnectionError> {
        self.connection.closed().await
    }

    /// Stops every session, then closes the connection.
    ///
    /// Each session first drains the events queued before the shutdown
    /// request. Sessions still running after the grace period are aborted.
    pub async fn shutdown(self) {
        tracing::info!(sessions = self.tasks.len(), "shutting down sessions");
        for handle in self.router.handles() {
            handle.shutdown();
        }

        let grace = self.settings.shutdown_grace;
        let deadline = tokio::time::Instant::now() + grace;
        for (group_id, mut task) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(%group_id, error = %e, "session task failed"),
                Err(_) => {
                    tracing::warn!(%group_id, ?grace, "session still busy after grace period; aborting");
                    task.abort();
                }
            }
        }

        self.connection.close().await;
        tracing::info!("session manager stopped");
    }
}

/// Spawns one session per routing key.
fn spawn_sessions<H, F>(
    settings: &SessionSettings,
    connection: &ConnectionManager,
    mut handler_factory: F,
) -> (HashMap<GroupId, SessionHandle>, Vec<(GroupId, JoinHandle<()>)>)
where
    H: MessageHandler,
    F: FnMut(GroupId) -> H,
{
    let mut handles = HashMap::with_capacity(settings.routing_keys.len());
    let mut tasks = Vec::with_capacity(settings.routing_keys.len());
    for &group_id in &settings.routing_keys {
        let (handle, task) = Session::spawn(
            group_id,
            settings.bot_id,
            settings.history_turns,
            handler_factory(group_id),
            connection.clone(),
        );
        handles.insert(group_id, handle);
        tasks.push((group_id, task));
    }
    (handles, tasks)
}

fn validate_routing_keys(keys: &[GroupId]) -> Result<(), SessionError> {
    if keys.is_empty() {
        return Err(SessionError::NoRoutingKeys);
    }
    let mut seen = HashSet::with_capacity(keys.len());
    for &key in keys {
        if !seen.insert(key) {
            return Err(SessionError::DuplicateRoutingKey(key));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_routing_keys() {
        assert!(validate_routing_keys(&[GroupId(1), GroupId(2)]).is_ok());
        assert!(matches!(
            validate_routing_keys(&[]),
            Err(SessionError::NoRoutingKeys)
        ));
        assert!(matches!(
            validate_routing_keys(&[GroupId(1), GroupId(2), GroupId(1)]),
            Err(SessionError::DuplicateRoutingKey(GroupId(1)))
        ));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = SessionSettings::new(UserId(1), vec![GroupId(2)]);
        assert_eq!(settings.history_turns, 0);
        assert_eq!(settings.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
    }
}
