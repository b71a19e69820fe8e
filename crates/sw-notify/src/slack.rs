//! Slack Web API notifier.
//!
//! Text goes through `chat.postMessage`. Files use the external upload flow:
//! `files.getUploadURLExternal` reserves a slot, the bytes are posted to the
//! returned URL, and `files.completeUploadExternal` shares the file to the
//! channel with the caption as its initial comment. File sharing needs a
//! channel ID (e.g. `C0123456789`) rather than a channel name.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use sw_core::Destination;

use crate::{DeliveryError, Notifier};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SLACK_API_URL: &str = "https://slack.com/api";
const BOT_TOKEN_PREFIX: &str = "xoxb-";

/// Slack bot client.
///
/// Clones share the underlying HTTP connection pool.
#[derive(Clone)]
pub struct SlackNotifier {
    http: reqwest::Client,
    token: String,
    api_url: String,
}

impl fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl SlackNotifier {
    /// Creates a client for a bot token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or not a bot (`xoxb-`) token,
    /// or if the HTTP client fails to build.
    pub fn new(token: impl Into<String>) -> Result<Self, DeliveryError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(DeliveryError::InvalidToken {
                reason: "token cannot be empty",
            });
        }
        if !token.starts_with(BOT_TOKEN_PREFIX) {
            return Err(DeliveryError::InvalidToken {
                reason: "expected a bot token starting with xoxb-",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(DeliveryError::ClientBuild)?;

        Ok(Self {
            http,
            token,
            api_url: SLACK_API_URL.to_string(),
        })
    }

    /// Points the client at a different API root.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, DeliveryError> {
        let response = request
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response.text().await?;
        parse_reply(status, retry_after, &body)
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send_text(&self, destination: &Destination, text: &str) -> Result<(), DeliveryError> {
        let request = self
            .http
            .post(self.method_url("chat.postMessage"))
            .json(&PostMessage {
                channel: destination.as_str(),
                text,
            });
        let _: IgnoredAny = self.call(request).await?;
        tracing::debug!(%destination, "message posted");
        Ok(())
    }

    async fn send_file(
        &self,
        destination: &Destination,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DeliveryError::File {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .map_or_else(|| "evidence".to_string(), |name| name.to_string_lossy().into_owned());

        let reserve = self
            .http
            .post(self.method_url("files.getUploadURLExternal"))
            .form(&[
                ("filename", filename.clone()),
                ("length", bytes.len().to_string()),
            ]);
        let slot: UploadSlot = self.call(reserve).await?;

        let upload = self
            .http
            .post(&slot.upload_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        let status = upload.status();
        if !status.is_success() {
            return Err(status_error(status, retry_after(upload.headers())));
        }

        let complete = self
            .http
            .post(self.method_url("files.completeUploadExternal"))
            .json(&CompleteUpload {
                files: [UploadedFile {
                    id: &slot.file_id,
                    title: &filename,
                }],
                channel_id: destination.as_str(),
                initial_comment: caption,
            });
        let _: IgnoredAny = self.call(complete).await?;
        tracing::debug!(%destination, file_id = %slot.file_id, "file shared");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadSlot {
    upload_url: String,
    file_id: String,
}

#[derive(Debug, Serialize)]
struct CompleteUpload<'a> {
    files: [UploadedFile<'a>; 1],
    channel_id: &'a str,
    initial_comment: &'a str,
}

#[derive(Debug, Serialize)]
struct UploadedFile<'a> {
    id: &'a str,
    title: &'a str,
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn status_error(status: StatusCode, retry_after: Option<Duration>) -> DeliveryError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        DeliveryError::RateLimited { retry_after }
    } else {
        DeliveryError::Http {
            status: status.as_u16(),
        }
    }
}

/// Interprets a Web API reply.
///
/// Slack reports most failures as HTTP 200 with `"ok": false`.
fn parse_reply<T: DeserializeOwned>(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> Result<T, DeliveryError> {
    #[derive(Deserialize)]
    struct Envelope {
        ok: bool,
        error: Option<String>,
    }

    if !status.is_success() {
        return Err(status_error(status, retry_after));
    }

    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|err| DeliveryError::InvalidResponse(err.to_string()))?;
    if !envelope.ok {
        let message = envelope.error.unwrap_or_else(|| "unknown error".to_string());
        return Err(if message == "ratelimited" {
            DeliveryError::RateLimited { retry_after }
        } else {
            DeliveryError::Api { message }
        });
    }

    serde_json::from_str(body).map_err(|err| DeliveryError::InvalidResponse(err.to_string()))
}
