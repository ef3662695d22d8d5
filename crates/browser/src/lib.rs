//! Headless Chromium capture for tracked pages.
//!
//! [`BrowserCapture`] implements the tracker's capture seam: it opens the
//! page in a fresh tab, grows the viewport to the document's scroll size and
//! stores a PNG through the configured artifact store.

pub mod capture;
pub mod detect;
pub mod error;

pub use {capture::BrowserCapture, error::BrowserError};
