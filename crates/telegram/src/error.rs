use {teloxide::RequestError, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] RequestError),

    /// The Bot API HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    /// The bot may not message this chat (blocked, kicked, never started).
    #[error("recipient {chat_id} unreachable: {reason}")]
    RecipientUnreachable { chat_id: i64, reason: String },

    #[error("telegram is not configured: set telegram.token and telegram.chat_id")]
    NotConfigured,

    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: pagewatch_tracker::Error,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl From<Error> for pagewatch_tracker::Error {
    fn from(err: Error) -> Self {
        pagewatch_tracker::Error::notification(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
