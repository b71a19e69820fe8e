//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use sw_capture::{CaptureSettings, FfmpegOpener, SeasonalOverlay};
use sw_core::{ActiveWindow, BackoffPolicy, CalibrationProfile, DetectorConfig, ValidationError};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Time between scale reads.
    pub poll_interval_ms: u64,
    /// Raw readings averaged into one sample.
    pub sample_window: u32,
    pub scale: ScaleConfig,
    pub detector: DetectorSettings,
    /// When detections are live; every other moment is quiet.
    pub active_hours: ActiveWindow,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    /// Decorations keyed by calendar month.
    pub overlays: Vec<SeasonalOverlay>,
    pub slack: SlackConfig,
    pub log: LogConfig,
}

/// Load cell access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// IIO raw channel file of the load cell amplifier.
    pub device: PathBuf,
    /// Raw counts per gram.
    pub reference_unit: f64,
    /// Zero the scale at startup.
    pub tare_on_start: bool,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/sys/bus/iio/devices/iio:device0/in_voltage0_raw"),
            reference_unit: 446.0,
            tare_on_start: true,
        }
    }
}

/// Detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub unit_weight_grams: f64,
    pub noise_floor_grams: f64,
    pub debounce_fraction: f64,
    pub cooldown_secs: u32,
    /// Re-weigh after recording and drop the alert if the items came back.
    pub confirm_removal: bool,
    /// How close to the old weight counts as "came back".
    pub confirm_tolerance_grams: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            unit_weight_grams: 18.3,
            noise_floor_grams: 5.0,
            debounce_fraction: 0.85,
            cooldown_secs: 0,
            confirm_removal: true,
            confirm_tolerance_grams: 10.0,
        }
    }
}

/// Where to find the camera. Exactly one of `url` and `arp` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arp: Option<ArpConfig>,
}

/// Camera lookup by hardware address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArpConfig {
    pub mac: String,
    /// Stream URL with `{ip}` in place of the address.
    pub url_template: String,
    /// Neighbour table to scan instead of `/proc/net/arp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<PathBuf>,
}

/// Evidence recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub duration_secs: u32,
    pub frames_per_second: u32,
    /// Display time of each animation frame.
    pub frame_delay_ms: u64,
    pub scratch_path: PathBuf,
    /// Run `gifsicle` over every clip.
    pub optimize: bool,
    pub gifsicle: PathBuf,
    /// Longest `gifsicle` may run on one clip.
    pub optimize_timeout_secs: u64,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Socket timeout for network streams.
    pub read_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let defaults = CaptureSettings::default();
        let opener = FfmpegOpener::default();
        Self {
            duration_secs: defaults.duration_secs,
            frames_per_second: defaults.frames_per_second,
            frame_delay_ms: 200,
            scratch_path: defaults.scratch_path,
            optimize: false,
            gifsicle: PathBuf::from("gifsicle"),
            optimize_timeout_secs: defaults.optimize_timeout.as_secs(),
            ffmpeg: opener.ffmpeg,
            ffprobe: opener.ffprobe,
            read_timeout_secs: opener.timeout.as_secs(),
        }
    }
}

/// Slack delivery.
#[derive(Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Channel ID to alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Plural name of the watched items.
    pub item_name: String,
    /// Total time spent retrying one delivery.
    pub max_retry_secs: u64,
    pub announce_startup: bool,
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("channel", &self.channel)
            .field("item_name", &self.item_name)
            .field("max_retry_secs", &self.max_retry_secs)
            .field("announce_startup", &self.announce_startup)
            .finish()
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel: None,
            item_name: "items".to_string(),
            max_retry_secs: 60,
            announce_startup: true,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Also write a daily-rolling log file with this name prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("sample_window", &self.sample_window)
            .field("scale", &self.scale)
            .field("detector", &self.detector)
            .field("active_hours", &self.active_hours)
            .field("camera", &self.camera.redacted())
            .field("capture", &self.capture)
            .field("overlays", &self.overlays)
            .field("slack", &self.slack)
            .field("log", &self.log)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            sample_window: 15,
            scale: ScaleConfig::default(),
            detector: DetectorSettings::default(),
            active_hours: ActiveWindow::default(),
            camera: CameraConfig::default(),
            capture: CaptureConfig::default(),
            overlays: Vec::new(),
            slack: SlackConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (SW_*, nested keys split on __)
        figment = figment.merge(Env::prefixed("SW_").split("__"));

        figment.extract()
    }

    /// Rejects settings the monitor cannot run with.
    pub const fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::NotPositive {
                field: "poll_interval_ms",
                value: 0.0,
            });
        }
        if self.sample_window == 0 {
            return Err(ValidationError::NotPositive {
                field: "sample_window",
                value: 0.0,
            });
        }
        Ok(())
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn detector_config(&self) -> Result<DetectorConfig, ValidationError> {
        let settings = &self.detector;
        let calibration =
            CalibrationProfile::new(settings.unit_weight_grams, settings.noise_floor_grams)?;
        DetectorConfig::new(
            calibration,
            settings.debounce_fraction,
            chrono::Duration::seconds(i64::from(settings.cooldown_secs)),
        )
    }

    /// Tolerance for the post-capture re-weigh, if enabled.
    pub fn confirm_tolerance(&self) -> Option<f64> {
        self.detector
            .confirm_removal
            .then_some(self.detector.confirm_tolerance_grams)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        let capture = &self.capture;
        CaptureSettings {
            duration_secs: capture.duration_secs,
            frames_per_second: capture.frames_per_second,
            frame_delay: Duration::from_millis(capture.frame_delay_ms),
            scratch_path: capture.scratch_path.clone(),
            optimize: capture.optimize.then(|| capture.gifsicle.clone()),
            optimize_timeout: Duration::from_secs(capture.optimize_timeout_secs),
        }
    }

    pub fn ffmpeg_opener(&self) -> FfmpegOpener {
        FfmpegOpener {
            ffmpeg: self.capture.ffmpeg.clone(),
            ffprobe: self.capture.ffprobe.clone(),
            timeout: Duration::from_secs(self.capture.read_timeout_secs),
        }
    }

    /// Delivery retry budget.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_elapsed: Duration::from_secs(self.slack.max_retry_secs),
            ..BackoffPolicy::default()
        }
    }
}

impl CameraConfig {
    /// Copy safe to log: stream credentials are masked.
    fn redacted(&self) -> Self {
        let mask = |url: &str| {
            sw_core::StreamAddress::new(url).map_or_else(|_| url.to_string(), |a| a.redacted())
        };
        Self {
            url: self.url.as_deref().map(mask),
            arp: self.arp.clone().map(|arp| ArpConfig {
                url_template: mask(&arp.url_template),
                ..arp
            }),
        }
    }
}

/// Returns the platform-specific config directory for shelfwatch.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("shelfwatch"))
}
