//! CLI subcommands for the Telegram bot.

use std::sync::Arc;

use {
    anyhow::Result,
    clap::Subcommand,
    pagewatch_config::PagewatchConfig,
    pagewatch_telegram::{TelegramNotifier, notifier::bot_from_config},
    pagewatch_tracker::artifacts::LocalArtifactStore,
};

#[derive(Subcommand)]
pub enum TelegramAction {
    /// Send a test message to verify the bot can reach a chat.
    Check {
        /// Chat id to test (defaults to telegram.chat_id).
        chat_id: Option<i64>,
    },
    /// Print the t.me link users open to start the bot.
    Link,
}

pub async fn handle_telegram(config: &PagewatchConfig, action: TelegramAction) -> Result<()> {
    let artifacts = Arc::new(LocalArtifactStore::new(config.screenshots_folder()));
    match action {
        TelegramAction::Check { chat_id } => {
            let chat_id = chat_id.or(config.telegram.chat_id).ok_or_else(|| {
                anyhow::anyhow!("no chat id given and telegram.chat_id is not set")
            })?;
            let bot = bot_from_config(&config.telegram)?;
            let notifier = TelegramNotifier::new(bot, chat_id, artifacts);
            match notifier
                .check_recipient(chat_id, "pagewatch can reach this chat.")
                .await
            {
                Ok(()) => println!("Chat {chat_id} is reachable."),
                Err(e) => {
                    eprintln!("Chat {chat_id} is not reachable: {e}");
                    if let Ok(link) = notifier.bot_link().await {
                        eprintln!("Open {link} and press Start, then try again.");
                    }
                    std::process::exit(1);
                },
            }
        },
        TelegramAction::Link => {
            let bot = bot_from_config(&config.telegram)?;
            let notifier = TelegramNotifier::new(bot, 0, artifacts);
            println!("{}", notifier.bot_link().await?);
        },
    }
    Ok(())
}
