//! Alert composition and resilient delivery.

use std::future::Future;
use std::sync::Arc;

use sw_core::{BackoffPolicy, Destination, EvidenceArtifact, RemovalEvent};

use crate::{DeliveryError, Notifier};

const DEFAULT_ITEM_NAME: &str = "items";

/// Why an alert goes out without a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingFootage {
    /// Capture failed, recovery included.
    CameraUnreachable,
    /// The clip was recorded but could not be delivered.
    UploadFailed,
    /// Shutdown cut the recording short.
    Interrupted,
}

/// Turns removal events into notifications.
///
/// Delivery failures end here: retryable errors are retried within the
/// backoff budget, everything else is logged and dropped.
#[derive(Debug)]
pub struct AlertDispatcher<N: ?Sized> {
    notifier: Arc<N>,
    destination: Destination,
    backoff: BackoffPolicy,
    item_name: String,
}

impl<N: Notifier + ?Sized> AlertDispatcher<N> {
    pub fn new(notifier: Arc<N>, destination: Destination, backoff: BackoffPolicy) -> Self {
        Self {
            notifier,
            destination,
            backoff,
            item_name: DEFAULT_ITEM_NAME.to_string(),
        }
    }

    /// Name of the counted items, plural (e.g. "biscuits").
    #[must_use]
    pub fn with_item_name(mut self, item_name: impl Into<String>) -> Self {
        self.item_name = item_name.into();
        self
    }

    pub const fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Alert text for an event, noting why there is no clip when there is
    /// none.
    pub fn compose_message(&self, event: &RemovalEvent, missing: Option<MissingFootage>) -> String {
        let headline = format!(
            "Tampering detected! Someone took {} {}!",
            event.whole_units(),
            self.item_name
        );
        match missing {
            None => headline,
            Some(MissingFootage::CameraUnreachable) => {
                format!("{headline} But the camera is unreachable, so there is no footage.")
            }
            Some(MissingFootage::UploadFailed) => {
                format!("{headline} The footage could not be uploaded.")
            }
            Some(MissingFootage::Interrupted) => {
                format!("{headline} Recording was interrupted by shutdown, so there is no footage.")
            }
        }
    }

    /// Sends an alert, with the evidence clip attached when there is one.
    ///
    /// Without evidence the camera is reported unreachable. If the clip
    /// cannot be delivered the alert is still sent as text.
    pub async fn dispatch(&self, event: &RemovalEvent, evidence: Option<&EvidenceArtifact>) {
        let Some(evidence) = evidence else {
            self.dispatch_text(event, MissingFootage::CameraUnreachable)
                .await;
            return;
        };

        let units = event.whole_units();
        let caption = self.compose_message(event, None);
        let sent = self
            .deliver("evidence", || {
                self.notifier
                    .send_file(&self.destination, &evidence.file_path, &caption)
            })
            .await;
        match sent {
            Ok(()) => {
                tracing::info!(units, frames = evidence.frame_count, "alert sent with evidence");
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to send evidence, falling back to text");
                self.dispatch_text(event, MissingFootage::UploadFailed).await;
            }
        }
    }

    /// Sends a text-only alert explaining why the clip is missing.
    pub async fn dispatch_text(&self, event: &RemovalEvent, missing: MissingFootage) {
        let units = event.whole_units();
        let text = self.compose_message(event, Some(missing));
        match self
            .deliver("alert", || self.notifier.send_text(&self.destination, &text))
            .await
        {
            Ok(()) => tracing::info!(units, ?missing, "alert sent as text"),
            Err(err) => tracing::error!(error = %err, units, "failed to send alert"),
        }
    }

    /// Sends a plain status message. Returns whether it was delivered.
    pub async fn announce(&self, text: &str) -> bool {
        match self
            .deliver("announcement", || self.notifier.send_text(&self.destination, text))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "failed to send announcement");
                false
            }
        }
    }

    async fn deliver<F, Fut>(&self, what: &'static str, mut send: F) -> Result<(), DeliveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), DeliveryError>>,
    {
        let mut delays = self.backoff.delays();
        let mut attempt: u32 = 1;
        loop {
            let err = match send().await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            let Some(delay) = delays.next_with_hint(err.retry_after()) else {
                tracing::warn!(what, attempt, "retry budget exhausted");
                return Err(err);
            };
            tracing::warn!(what, attempt, ?delay, error = %err, "delivery failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
