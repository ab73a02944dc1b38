//! `Bot` builder and run loop.
//!
//! This ties the layers together: config → sessions → connection.

use std::future::Future;

use botmux_protocol::GroupId;
use botmux_session::{MessageHandler, SessionManager};

use crate::{BotConfig, BotmuxError, ConfigError};

/// Builder for a [`Bot`].
///
/// # Example
///
/// ```rust,ignore
/// use botmux::prelude::*;
///
/// let bot = Bot::builder()
///     .config(BotConfig::load("bot.toml")?)
///     .build(|_group| MyHandler::default())
///     .await?;
/// bot.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
/// ```
#[derive(Default)]
pub struct BotBuilder {
    config: Option<BotConfig>,
}

impl BotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: BotConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validates the config, starts one session per routing key, and
    /// connects to the gateway.
    ///
    /// `handler_factory` is called once per group.
    pub async fn build<H, F>(self, handler_factory: F) -> Result<Bot, BotmuxError>
    where
        H: MessageHandler,
        F: FnMut(GroupId) -> H,
    {
        let config = self.config.ok_or(ConfigError::Invalid {
            field: "config",
            reason: "no configuration supplied to the builder".into(),
        })?;
        config.validate()?;

        tracing::info!(
            url = %config.base_url,
            bot_id = %config.bot_id,
            groups = config.routing_keys.len(),
            "starting bot"
        );
        let sessions = SessionManager::initialize(
            config.session_settings(),
            config.connection_settings(),
            handler_factory,
        )
        .await?;

        Ok(Bot { config, sessions })
    }
}

/// A connected bot serving its configured groups.
pub struct Bot {
    config: BotConfig,
    sessions: SessionManager,
}

impl Bot {
    pub fn builder() -> BotBuilder {
        BotBuilder::new()
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Runs until `signal` completes or the gateway link is lost for good,
    /// then shuts down exactly once.
    ///
    /// # Errors
    /// [`BotmuxError::Connection`] if the link was lost and reconnection
    /// gave up.
    pub async fn run_until<S>(self, signal: S) -> Result<(), BotmuxError>
    where
        S: Future<Output = ()>,
    {
        tracing::info!("bot running");
        let outcome = tokio::select! {
            () = signal => {
                tracing::info!("shutdown requested");
                Ok(())
            }
            closed = self.sessions.closed() => {
                if let Err(e) = &closed {
                    tracing::error!(error = %e, "gateway link lost for good");
                }
                closed
            }
        };

        self.sessions.shutdown().await;
        outcome.map_err(BotmuxError::from)
    }

    /// Shuts down without waiting for a signal.
    pub async fn shutdown(self) {
        self.sessions.shutdown().await;
    }
}
