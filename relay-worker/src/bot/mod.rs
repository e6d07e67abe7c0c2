//! Telegram command listener.
//!
//! The relay is one-directional; the only inbound interaction is a user
//! sending a start command, answered with a static menu. Everything else is
//! ignored.

use teloxide::prelude::*;
use teloxide::types::BotCommand;
use teloxide::RequestError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MENU_TEXT: &str = r"Notification relay bot

/start - Show this menu
/help - Show this menu

This bot delivers queued notifications automatically. There is nothing to
configure here: once your chat is registered as a recipient, messages will
arrive as they are queued.
";

/// Runs the command listener until the shutdown token fires
///
/// On shutdown the listener simply stops accepting new input; replies in
/// flight finish on their own.
pub async fn run_command_listener(bot: Bot, shutdown_token: CancellationToken) {
    if let Err(e) = bot
        .set_my_commands(vec![
            BotCommand::new("start", "Show the command menu"),
            BotCommand::new("help", "Show the command menu"),
        ])
        .await
    {
        warn!("Failed to set bot commands: {}", e);
    }

    info!("Telegram command listener started");

    tokio::select! {
        () = shutdown_token.cancelled() => {
            info!("Telegram command listener stopped");
        }
        () = teloxide::repl(bot, |bot, msg| async move {
            handle_message(bot, msg).await
        }) => {}
    }
}

/// Handle incoming messages.
async fn handle_message(bot: Bot, msg: Message) -> Result<(), RequestError> {
    if let Some(text) = msg.text() {
        let cmd = text.split_whitespace().next().unwrap_or("");
        if matches!(cmd, "/start" | "/help") {
            bot.send_message(msg.chat.id, MENU_TEXT).await?;
        }
    }
    Ok(())
}
