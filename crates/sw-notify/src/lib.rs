//! Alert delivery for shelfwatch.
//!
//! Delivery goes through the narrow [`Notifier`] capability. The
//! [`AlertDispatcher`] composes alert text, retries transient failures with
//! bounded backoff, and never returns an error to the monitor.

mod dispatch;
pub mod slack;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sw_core::Destination;
use thiserror::Error;

pub use dispatch::{AlertDispatcher, MissingFootage};
pub use slack::SlackNotifier;

/// Delivery errors.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The provided token was invalid.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// The service asked us to slow down.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The service answered with an unexpected HTTP status.
    #[error("HTTP status {status}")]
    Http { status: u16 },
    /// API returned an error response.
    #[error("API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The attachment could not be read.
    #[error("failed to read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeliveryError {
    /// Whether the same request could succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Request(err) => err.is_timeout() || err.is_connect(),
            Self::Http { status } => *status >= 500,
            Self::InvalidToken { .. }
            | Self::ClientBuild(_)
            | Self::Api { .. }
            | Self::InvalidResponse(_)
            | Self::File { .. } => false,
        }
    }

    /// Server-supplied hint for when to try again.
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Sends notifications to a destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a text message.
    async fn send_text(&self, destination: &Destination, text: &str) -> Result<(), DeliveryError>;

    /// Sends a file with `caption` as its accompanying message.
    async fn send_file(
        &self,
        destination: &Destination,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError>;
}
