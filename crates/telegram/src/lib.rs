//! Telegram delivery of change alerts.
//!
//! Alerts go out as a photo with the message as caption, or as plain text
//! when there is nothing to attach. Sends are not retried; a failed send
//! fails the run that triggered it.

pub mod error;
pub mod notifier;

pub use {
    error::{Error, Result},
    notifier::TelegramNotifier,
};
