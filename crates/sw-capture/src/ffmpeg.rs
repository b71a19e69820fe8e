//! `ffmpeg`-backed video streams.
//!
//! `ffprobe` reports the geometry and frame rate of the first video stream;
//! `ffmpeg` then decodes the source to raw RGB24 on its stdout, one
//! `width * height * 3` byte record per frame. Network inputs get a socket
//! timeout so a stalled camera ends the read instead of blocking it.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

use image::RgbImage;
use serde::Deserialize;
use sw_core::StreamAddress;

use crate::error::CaptureError;
use crate::stream::{StreamOpener, VideoStream};

/// Default socket timeout for network sources.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Geometry and rate of a video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Opens streams by spawning `ffprobe` and `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Socket timeout for network sources.
    pub timeout: Duration,
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl FfmpegOpener {
    /// Input options placed before `-i`.
    fn input_args(&self, address: &StreamAddress) -> Vec<String> {
        let micros = self.timeout.as_micros().to_string();
        let url = address.as_str();
        if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
            vec![
                "-rtsp_transport".to_string(),
                "tcp".to_string(),
                "-timeout".to_string(),
                micros,
            ]
        } else if url.contains("://") {
            vec!["-rw_timeout".to_string(), micros]
        } else {
            Vec::new()
        }
    }

    fn probe(&self, address: &StreamAddress) -> Result<StreamInfo, CaptureError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error"])
            .args(self.input_args(address))
            .args([
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,avg_frame_rate,r_frame_rate",
                "-of",
                "json",
            ])
            .arg(address.as_str())
            .stdin(Stdio::null())
            .output()
            .map_err(|err| CaptureError::Open {
                address: address.redacted(),
                reason: format!("failed to run {}: {err}", self.ffprobe.display()),
            })?;

        if !output.status.success() {
            // ffprobe echoes the input URL, credentials included.
            let stderr = String::from_utf8_lossy(&output.stderr)
                .trim()
                .replace(address.as_str(), &address.redacted());
            return Err(CaptureError::Open {
                address: address.redacted(),
                reason: format!("ffprobe exited with {}: {stderr}", output.status),
            });
        }

        parse_probe(&output.stdout).map_err(|reason| CaptureError::Open {
            address: address.redacted(),
            reason,
        })
    }
}

impl StreamOpener for FfmpegOpener {
    type Stream = FfmpegStream;

    fn open(&self, address: &StreamAddress) -> Result<FfmpegStream, CaptureError> {
        let info = self.probe(address)?;
        tracing::debug!(%address, ?info, "probed stream");

        let mut child = Command::new(&self.ffmpeg)
            .args(["-nostdin", "-loglevel", "error"])
            .args(self.input_args(address))
            .arg("-i")
            .arg(address.as_str())
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| CaptureError::Open {
                address: address.redacted(),
                reason: format!("failed to run {}: {err}", self.ffmpeg.display()),
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::Open {
                address: address.redacted(),
                reason: "failed to capture ffmpeg stdout".to_string(),
            });
        };

        Ok(FfmpegStream {
            child,
            stdout,
            info,
        })
    }
}

/// A running `ffmpeg` decoder. Dropping it kills and reaps the process.
#[derive(Debug)]
pub struct FfmpegStream {
    child: Child,
    stdout: ChildStdout,
    info: StreamInfo,
}

impl FfmpegStream {
    pub const fn info(&self) -> StreamInfo {
        self.info
    }

    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }
}

impl VideoStream for FfmpegStream {
    fn is_ready(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn native_fps(&self) -> f64 {
        self.info.fps
    }

    fn read_frame(&mut self) -> io::Result<Option<RgbImage>> {
        let mut buf = vec![0_u8; self.frame_len()];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => RgbImage::from_raw(self.info.width, self.info.height, buf)
                .map(Some)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "short frame")),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        match self.child.wait() {
            Ok(status) => tracing::debug!(%status, "released stream"),
            Err(err) => tracing::warn!(%err, "failed to reap ffmpeg"),
        }
    }
}

fn parse_probe(stdout: &[u8]) -> Result<StreamInfo, String> {
    #[derive(Deserialize)]
    struct Probe {
        #[serde(default)]
        streams: Vec<ProbeStream>,
    }

    #[derive(Deserialize)]
    struct ProbeStream {
        width: Option<u32>,
        height: Option<u32>,
        avg_frame_rate: Option<String>,
        r_frame_rate: Option<String>,
    }

    let probe: Probe =
        serde_json::from_slice(stdout).map_err(|err| format!("invalid ffprobe output: {err}"))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;
    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err("video stream has no dimensions".to_string());
    };
    if width == 0 || height == 0 {
        return Err(format!("video stream has empty dimensions {width}x{height}"));
    }
    let fps = [stream.avg_frame_rate, stream.r_frame_rate]
        .iter()
        .flatten()
        .filter_map(|rate| parse_rate(rate))
        .next()
        .unwrap_or(0.0);
    Ok(StreamInfo { width, height, fps })
}

/// Parses an ffmpeg rational such as `"30000/1001"`.
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/').unwrap_or((rate, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
