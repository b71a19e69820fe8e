//! CLI subcommand implementations.

pub mod capture;
pub mod run;
pub mod weigh;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Local};
use sw_capture::{
    ArpTableLocator, CameraLocator, EvidenceRecorder, FfmpegOpener, Overlay, SeasonalOverlay,
    StaticLocator,
};
use sw_core::{IioScale, StreamAddress};
use tokio::sync::watch;

use crate::Config;
use crate::monitor::Camera;

/// Opens the load cell, taring it when configured.
pub(crate) fn open_scale(config: &Config) -> Result<IioScale> {
    let mut scale = IioScale::new(&config.scale.device, config.scale.reference_unit)
        .context("invalid scale settings")?;
    if config.scale.tare_on_start {
        scale
            .tare(config.sample_window)
            .with_context(|| format!("failed to tare {}", scale.raw_path().display()))?;
    }
    Ok(scale)
}

/// Builds the configured camera locator.
pub(crate) fn camera_locator(config: &Config) -> Result<Box<dyn CameraLocator + Send + Sync>> {
    match (&config.camera.url, &config.camera.arp) {
        (Some(url), None) => {
            let address = StreamAddress::new(url.as_str()).context("invalid camera url")?;
            Ok(Box::new(StaticLocator::new(address)))
        }
        (None, Some(arp)) => {
            let mut locator = ArpTableLocator::new(&arp.mac, arp.url_template.as_str());
            if let Some(table) = &arp.table {
                locator = locator.with_table(table.clone());
            }
            Ok(Box::new(locator))
        }
        (Some(_), Some(_)) => bail!("configure either camera.url or camera.arp, not both"),
        (None, None) => bail!("no camera configured (set camera.url or camera.arp)"),
    }
}

/// Loads this month's overlay, if one is configured.
///
/// A broken overlay is logged and skipped; alerts without decoration beat no
/// alerts.
pub(crate) fn seasonal_overlay(config: &Config, month: u32) -> Option<Overlay> {
    let seasonal = SeasonalOverlay::for_month(&config.overlays, month)?;
    match seasonal.load() {
        Ok(overlay) => {
            tracing::info!(month, mask = %seasonal.mask.display(), "overlay loaded");
            Some(overlay)
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to load overlay, recording without it");
            None
        }
    }
}

/// Builds the evidence camera, optionally cancellable.
pub(crate) fn camera(
    config: &Config,
    cancel: Option<watch::Receiver<bool>>,
) -> Result<Camera<FfmpegOpener>> {
    let locator = camera_locator(config)?;
    let mut recorder = EvidenceRecorder::new(config.ffmpeg_opener(), config.capture_settings())
        .with_overlay(seasonal_overlay(config, Local::now().month()));
    if let Some(cancel) = cancel {
        recorder = recorder.with_cancel(cancel);
    }
    Ok(Camera::new(recorder, locator))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::config::{ArpConfig, CameraConfig};

    #[test]
    fn static_camera_resolves_configured_url() {
        let config = Config {
            camera: CameraConfig {
                url: Some("rtsp://10.0.0.7/stream1".to_string()),
                arp: None,
            },
            ..Config::default()
        };
        let locator = camera_locator(&config).unwrap();
        assert_eq!(locator.resolve().unwrap().as_str(), "rtsp://10.0.0.7/stream1");
    }

    #[test]
    fn arp_camera_uses_configured_table() {
        let temp = tempfile::tempdir().unwrap();
        let table = temp.path().join("arp");
        fs::write(
            &table,
            "IP address HW type Flags HW address Mask Device\n\
             10.0.0.9 0x1 0x2 b0:a7:b9:12:34:56 * eth0\n",
        )
        .unwrap();
        let config = Config {
            camera: CameraConfig {
                url: None,
                arp: Some(ArpConfig {
                    mac: "B0:A7:B9:12:34:56".to_string(),
                    url_template: "rtsp://{ip}/stream1".to_string(),
                    table: Some(table),
                }),
            },
            ..Config::default()
        };
        let locator = camera_locator(&config).unwrap();
        assert_eq!(locator.resolve().unwrap().as_str(), "rtsp://10.0.0.9/stream1");
    }

    #[test]
    fn camera_must_be_configured_once() {
        assert!(camera_locator(&Config::default()).is_err());

        let both = Config {
            camera: CameraConfig {
                url: Some("rtsp://10.0.0.7/stream1".to_string()),
                arp: Some(ArpConfig {
                    mac: "b0:a7:b9:12:34:56".to_string(),
                    url_template: "rtsp://{ip}/stream1".to_string(),
                    table: None,
                }),
            },
            ..Config::default()
        };
        assert!(camera_locator(&both).is_err());
    }

    #[test]
    fn overlay_follows_calendar_month() {
        let temp = tempfile::tempdir().unwrap();
        let mask = temp.path().join("mask.png");
        let border = temp.path().join("border.png");
        RgbImage::from_pixel(2, 2, Rgb([1, 1, 1])).save(&mask).unwrap();
        RgbImage::from_pixel(2, 2, Rgb([2, 2, 2])).save(&border).unwrap();
        let config = Config {
            overlays: vec![SeasonalOverlay {
                month: 12,
                mask,
                border,
            }],
            ..Config::default()
        };

        assert!(seasonal_overlay(&config, 12).is_some());
        assert!(seasonal_overlay(&config, 6).is_none());
    }

    #[test]
    fn broken_overlay_is_skipped() {
        let config = Config {
            overlays: vec![SeasonalOverlay {
                month: 10,
                mask: "/nonexistent/mask.png".into(),
                border: "/nonexistent/border.png".into(),
            }],
            ..Config::default()
        };
        assert!(seasonal_overlay(&config, 10).is_none());
    }

    #[test]
    fn tare_failure_is_reported() {
        let mut config = Config::default();
        config.scale.device = "/nonexistent/in_voltage0_raw".into();
        assert!(open_scale(&config).is_err());

        config.scale.tare_on_start = false;
        assert!(open_scale(&config).is_ok());
    }
}
