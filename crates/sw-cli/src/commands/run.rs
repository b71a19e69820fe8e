//! `shelfwatch run`: arm the scale and monitor until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use sw_core::{Destination, EventDetector};
use sw_notify::{AlertDispatcher, SlackNotifier};
use tokio::sync::watch;

use crate::Config;
use crate::monitor::{MonitorLoop, MonitorSettings};

pub fn run(config: &Config) -> Result<()> {
    let detector_config = config
        .detector_config()
        .context("invalid detector settings")?;
    let detector = EventDetector::new(detector_config, config.active_hours.clone());

    let token = config
        .slack
        .token
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing Slack token (set SW_SLACK__TOKEN or config.toml)"))?;
    let channel = config
        .slack
        .channel
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("missing Slack channel (set slack.channel)"))?;
    let notifier = SlackNotifier::new(token).context("failed to create Slack client")?;
    let destination = Destination::new(channel).context("invalid Slack channel")?;
    let dispatcher = Arc::new(
        AlertDispatcher::new(Arc::new(notifier), destination, config.backoff())
            .with_item_name(config.slack.item_name.clone()),
    );

    let scale = super::open_scale(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let camera = super::camera(config, Some(shutdown_rx.clone()))?;
    let settings = MonitorSettings {
        poll_interval: config.poll_interval(),
        sample_window: config.sample_window,
        confirm_tolerance: config.confirm_tolerance(),
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime.block_on(async {
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("shutdown requested");
            shutdown_tx.send_replace(true);
        });

        if config.slack.announce_startup {
            let host = hostname::get().map_or_else(
                |_| "unknown host".to_string(),
                |name| name.to_string_lossy().into_owned(),
            );
            dispatcher
                .announce(&format!("shelfwatch coming online on {host}!"))
                .await;
        }

        let monitor = MonitorLoop::new(scale, detector, camera, dispatcher, settings);
        let stats = monitor.run(shutdown_rx).await;
        tracing::info!(?stats, "monitor stopped");
    });

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(err) => tracing::warn!(%err, "failed to install SIGTERM handler"),
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
