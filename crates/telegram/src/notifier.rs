use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    pagewatch_config::TelegramConfig,
    pagewatch_tracker::{artifacts::ArtifactStore, notify::Notifier, types::ArtifactRef},
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        payloads::{SendDocumentSetters, SendPhotoSetters},
        prelude::*,
        types::{ChatId, InputFile},
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use pagewatch_metrics::{counter, labels, telegram as telegram_metrics};

use crate::error::{Error, Result};

/// HTTP timeout for Bot API calls; photo uploads of tall pages are slow.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends change alerts to one Telegram chat.
///
/// Attached screenshots are loaded through the [`ArtifactStore`] that
/// produced them.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
    artifacts: Arc<dyn ArtifactStore>,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_id: i64, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
            artifacts,
        }
    }

    /// Build from config. Fails with [`Error::NotConfigured`] when the token
    /// or chat id is missing.
    pub fn from_config(
        config: &TelegramConfig,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Result<Self> {
        let bot = bot_from_config(config)?;
        let chat_id = config.chat_id.ok_or(Error::NotConfigured)?;
        Ok(Self::new(bot, chat_id, artifacts))
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id.0
    }

    /// Send `text` to `chat_id` to verify the bot may message it.
    pub async fn check_recipient(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(|e| classify(chat_id, e))?;
        info!(chat_id, "recipient reachable");
        Ok(())
    }

    /// `https://t.me/<username>` link users open to start the bot.
    pub async fn bot_link(&self) -> Result<String> {
        let me = self.bot.get_me().await?;
        let username = me
            .username
            .clone()
            .ok_or_else(|| Error::message("bot has no username"))?;
        Ok(bot_link_for(&username))
    }

    async fn send(&self, message: &str, artifact: Option<&ArtifactRef>) -> Result<()> {
        let Some(artifact) = artifact else {
            self.bot
                .send_message(self.chat_id, message)
                .await
                .map_err(|e| classify(self.chat_id.0, e))?;
            debug!(chat_id = self.chat_id.0, "alert sent as text");
            return Ok(());
        };

        let bytes = self
            .artifacts
            .read(artifact)
            .await
            .map_err(|source| Error::Attachment {
                path: artifact.to_string(),
                source,
            })?;
        let filename = artifact.as_path().file_name().map_or_else(
            || "screenshot.png".to_string(),
            |n| n.to_string_lossy().into_owned(),
        );

        let photo = InputFile::memory(bytes.clone()).file_name(filename.clone());
        match self
            .bot
            .send_photo(self.chat_id, photo)
            .caption(message)
            .await
        {
            Ok(_) => {
                debug!(chat_id = self.chat_id.0, artifact = %artifact, "alert sent as photo");
                Ok(())
            },
            // Full-page captures often exceed photo limits; send the file instead.
            Err(e) if is_photo_rejected(&e) => {
                debug!(error = %e, "photo rejected, sending as document");
                let document = InputFile::memory(bytes).file_name(filename);
                self.bot
                    .send_document(self.chat_id, document)
                    .caption(message)
                    .await
                    .map_err(|e| classify(self.chat_id.0, e))?;
                debug!(chat_id = self.chat_id.0, artifact = %artifact, "alert sent as document");
                Ok(())
            },
            Err(e) => Err(classify(self.chat_id.0, e)),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(
        &self,
        message: &str,
        artifact: Option<&ArtifactRef>,
    ) -> pagewatch_tracker::Result<()> {
        match self.send(message, artifact).await {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!(telegram_metrics::MESSAGES_SENT_TOTAL).increment(1);
                Ok(())
            },
            Err(e) => {
                warn!(chat_id = self.chat_id.0, error = %e, "telegram alert failed");
                #[cfg(feature = "metrics")]
                counter!(telegram_metrics::ERRORS_TOTAL, labels::KIND => error_kind(&e))
                    .increment(1);
                Err(e.into())
            },
        }
    }
}

/// Build a bot client from the configured token.
pub fn bot_from_config(config: &TelegramConfig) -> Result<Bot> {
    let token = config
        .token
        .as_ref()
        .map(|t| t.expose_secret().trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(Error::NotConfigured)?;
    let client = teloxide::net::default_reqwest_settings()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::HttpClient(e.to_string()))?;
    Ok(Bot::with_client(token, client))
}

pub fn bot_link_for(username: &str) -> String {
    format!("https://t.me/{}", username.trim_start_matches('@'))
}

/// Map API refusals that mean "this chat cannot be messaged" to
/// [`Error::RecipientUnreachable`]; everything else stays a transport error.
fn classify(chat_id: i64, err: RequestError) -> Error {
    let refused = matches!(
        err,
        RequestError::Api(
            ApiError::BotBlocked
                | ApiError::ChatNotFound
                | ApiError::UserDeactivated
                | ApiError::BotKicked
                | ApiError::BotKickedFromSupergroup
                | ApiError::CantInitiateConversation
                | ApiError::CantTalkWithBots
                | ApiError::GroupDeactivated
        )
    );
    if refused {
        return Error::RecipientUnreachable {
            chat_id,
            reason: err.to_string(),
        };
    }
    Error::Telegram(err)
}

fn is_photo_rejected(err: &RequestError) -> bool {
    let text = err.to_string();
    text.contains("PHOTO_INVALID_DIMENSIONS") || text.contains("PHOTO_SAVE_FILE_INVALID")
}

#[cfg(feature = "metrics")]
fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::RecipientUnreachable { .. } => "recipient_unreachable",
        Error::Telegram(_) | Error::HttpClient(_) => "transport",
        Error::Attachment { .. } => "attachment",
        Error::NotConfigured | Error::Message { .. } => "other",
    }
}
