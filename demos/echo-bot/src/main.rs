use std::process::ExitCode;
use std::sync::Arc;

use botmux::prelude::*;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
#[error("canned backend cannot fail")]
struct Infallible;

/// Stands in for a language model: greets whoever mentioned the bot.
struct CannedBackend;

impl CompletionBackend for CannedBackend {
    type Error = Infallible;

    async fn complete(
        &self,
        _history: &[HistoryEntry],
        message: &Message,
        _turns: usize,
    ) -> Result<Vec<Segment>, Infallible> {
        Ok(vec![Segment::mention(message.sender_id), Segment::text(" hi")])
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: echo-bot <config.toml>");
        return ExitCode::from(2);
    };

    match run(&path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "echo-bot stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &str) -> Result<(), BotmuxError> {
    let config = BotConfig::load(path)?;
    let turns = config.history_turns.unwrap_or(0);
    let backend = Arc::new(CannedBackend);

    let bot = Bot::builder()
        .config(config)
        .build(move |_group| CompletionHandler::new(Arc::clone(&backend), turns))
        .await?;

    bot.run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use botmux_connection::testing::FakeGateway;

    const BOT: UserId = UserId(10001);

    fn write_config(gateway: &FakeGateway) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("echo-bot-{}.toml", std::process::id()));
        let text = format!(
            "baseUrl = \"{}\"\naccessToken = \"secret\"\nbotId = {}\nroutingKeys = [123456]\n\
             [reconnection]\nenable = false\nattempts = 0\ndelay = 0\n",
            gateway.url(),
            BOT.0
        );
        std::fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn test_canned_backend_greets_sender() {
        let gateway = FakeGateway::start("secret").await.unwrap();
        let path = write_config(&gateway);

        let running = tokio::spawn({
            let path = path.to_string_lossy().into_owned();
            async move { run(&path).await }
        });
        assert!(gateway.wait_for_connections(1, Duration::from_secs(2)).await);

        gateway
            .push_group_message(
                GroupId(123456),
                UserId(42),
                vec![Segment::mention(BOT), Segment::text("hello")],
            )
            .await;

        let sent = gateway.wait_for_sent(1, Duration::from_secs(2)).await;
        assert_eq!(sent[0].group_id, GroupId(123456));
        assert_eq!(
            sent[0].message,
            vec![Segment::mention(UserId(42)), Segment::text(" hi")]
        );

        running.abort();
        let _ = std::fs::remove_file(path);
    }
}
