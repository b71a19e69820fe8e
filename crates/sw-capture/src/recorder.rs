//! Evidence recording.
//!
//! One capture resolves the camera, opens a stream, samples frames at the
//! requested rate and encodes them into an animated GIF at the single-slot
//! scratch path. A stream that closes or hands back a bad frame mid-capture
//! fails the attempt; it is never silently truncated.
//!
//! [`EvidenceRecorder::capture_with_recovery`] wraps a capture in the
//! one-shot recovery policy: on failure the camera is re-resolved and exactly
//! one more attempt is made.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, RgbImage};
use sw_core::{EvidenceArtifact, StreamAddress};
use tempfile::NamedTempFile;
use tokio::sync::watch;

use crate::error::{CaptureError, CaptureFailed};
use crate::locate::CameraLocator;
use crate::overlay::{Overlay, OverlayFitter};
use crate::stream::{StreamOpener, VideoStream};

/// GIF encoder speed, 1 (best quality) to 30 (fastest).
const GIF_SPEED: i32 = 10;

/// How often a running optimiser is checked for exit.
const OPTIMIZE_POLL: Duration = Duration::from_millis(50);

/// What to record and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub duration_secs: u32,
    pub frames_per_second: u32,
    /// Display time of each frame in the animation.
    pub frame_delay: Duration,
    /// Single-slot output path, overwritten by every capture.
    pub scratch_path: PathBuf,
    /// `gifsicle` program to optimise the output with, if any.
    pub optimize: Option<PathBuf>,
    /// Longest the optimiser may run before it is killed.
    pub optimize_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            duration_secs: 4,
            frames_per_second: 3,
            frame_delay: Duration::from_millis(200),
            scratch_path: std::env::temp_dir().join("shelfwatch-evidence.gif"),
            optimize: None,
            optimize_timeout: Duration::from_secs(30),
        }
    }
}

impl CaptureSettings {
    /// Number of frames a complete capture accepts. Always at least one.
    pub fn target_frames(&self) -> usize {
        let frames = u64::from(self.duration_secs) * u64::from(self.frames_per_second);
        usize::try_from(frames).unwrap_or(usize::MAX).max(1)
    }

    fn lock_path(&self) -> PathBuf {
        let mut lock = self.scratch_path.clone().into_os_string();
        lock.push(".lock");
        PathBuf::from(lock)
    }
}

/// Number of source frames per accepted frame.
///
/// A source with an unknown (zero) rate, or one slower than requested, has
/// every frame accepted.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "ratio is finite, positive and floored before the cast"
)]
pub fn decimation_stride(native_fps: f64, requested_fps: u32) -> u64 {
    if requested_fps == 0 || !native_fps.is_finite() || native_fps <= 0.0 {
        return 1;
    }
    ((native_fps / f64::from(requested_fps)).floor() as u64).max(1)
}

/// Records evidence clips from a camera.
#[derive(Debug)]
pub struct EvidenceRecorder<O> {
    opener: O,
    settings: CaptureSettings,
    overlay: Option<Overlay>,
    cancel: Option<watch::Receiver<bool>>,
}

impl<O: StreamOpener> EvidenceRecorder<O> {
    pub const fn new(opener: O, settings: CaptureSettings) -> Self {
        Self {
            opener,
            settings,
            overlay: None,
            cancel: None,
        }
    }

    /// Composites `overlay` onto every accepted frame.
    #[must_use]
    pub fn with_overlay(mut self, overlay: Option<Overlay>) -> Self {
        self.overlay = overlay;
        self
    }

    /// Aborts captures once `cancel` reads `true`.
    #[must_use]
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub const fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| *cancel.borrow())
    }

    /// Performs one capture attempt.
    pub fn capture<L>(&self, locator: &L) -> Result<EvidenceArtifact, CaptureError>
    where
        L: CameraLocator + ?Sized,
    {
        let address = locator.resolve()?;
        let frames = self.record(&address)?;
        self.encode(frames)
    }

    /// Captures with one recovery attempt.
    ///
    /// The second attempt re-resolves the camera from scratch. Cancellation
    /// is never retried.
    pub fn capture_with_recovery<L>(&self, locator: &L) -> Result<EvidenceArtifact, CaptureFailed>
    where
        L: CameraLocator + ?Sized,
    {
        let first = match self.capture(locator) {
            Ok(artifact) => return Ok(artifact),
            Err(err) => err,
        };
        if !first.is_recoverable() {
            return Err(CaptureFailed {
                first,
                recovery: None,
            });
        }

        tracing::warn!(error = %first, "capture failed, re-resolving camera for one more attempt");
        match self.capture(locator) {
            Ok(artifact) => {
                tracing::info!("capture recovered");
                Ok(artifact)
            }
            Err(recovery) => Err(CaptureFailed {
                first,
                recovery: Some(recovery),
            }),
        }
    }

    /// Reads the accepted frames. The stream is released when this returns.
    fn record(&self, address: &StreamAddress) -> Result<Vec<RgbImage>, CaptureError> {
        let mut stream = self.opener.open(address)?;
        if !stream.is_ready() {
            return Err(CaptureError::NotReady {
                address: address.redacted(),
            });
        }

        let stride = decimation_stride(stream.native_fps(), self.settings.frames_per_second);
        let target = self.settings.target_frames();
        tracing::debug!(
            %address,
            native_fps = stream.native_fps(),
            stride,
            target,
            "recording"
        );

        let mut frames = Vec::with_capacity(target);
        let mut fitter = self.overlay.as_ref().map(OverlayFitter::new);
        let mut read: u64 = 0;
        while frames.len() < target {
            if self.is_cancelled() {
                return Err(CaptureError::Cancelled);
            }

            let broken = |reason: String| CaptureError::Broken {
                accepted: frames.len(),
                reason,
            };
            let mut frame = match stream.read_frame() {
                Ok(Some(frame)) if frame.width() > 0 && frame.height() > 0 => frame,
                Ok(Some(_)) => return Err(broken("empty frame".to_string())),
                Ok(None) => return Err(broken("stream closed".to_string())),
                Err(err) => return Err(broken(err.to_string())),
            };

            let accept = read % stride == 0;
            read += 1;
            if !accept {
                continue;
            }
            if let Some(fitter) = &mut fitter {
                fitter.apply(&mut frame);
            }
            frames.push(frame);
        }

        tracing::debug!(frames = frames.len(), read, "recorded");
        Ok(frames)
    }

    /// Encodes frames and replaces the scratch file.
    fn encode(&self, frames: Vec<RgbImage>) -> Result<EvidenceArtifact, CaptureError> {
        let frame_count = frames.len();
        let delay = Delay::from_saturating_duration(self.settings.frame_delay);

        let mut gif = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut gif, GIF_SPEED);
            encoder.set_repeat(Repeat::Infinite)?;
            encoder.encode_frames(frames.into_iter().map(|frame| {
                Frame::from_parts(DynamicImage::ImageRgb8(frame).into_rgba8(), 0, 0, delay)
            }))?;
        }

        let path = &self.settings.scratch_path;
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| CaptureError::Io { path, source }
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_error(dir))?;

        let lock_path = self.settings.lock_path();
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_error(&lock_path))?;
        lock.lock_exclusive().map_err(io_error(&lock_path))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_error(dir))?;
        tmp.write_all(&gif).map_err(io_error(tmp.path()))?;
        tmp.as_file().sync_all().map_err(io_error(tmp.path()))?;
        tmp.persist(path)
            .map_err(|err| io_error(path)(err.error))?;

        if let Some(gifsicle) = &self.settings.optimize {
            optimize(gifsicle, path, self.settings.optimize_timeout);
        }
        drop(lock);

        tracing::info!(path = %path.display(), frame_count, "evidence written");
        Ok(EvidenceArtifact {
            file_path: path.clone(),
            frame_count,
        })
    }
}

/// Optimises a GIF in place. Failures and timeouts keep the unoptimised file.
fn optimize(gifsicle: &Path, path: &Path, timeout: Duration) {
    let mut output = path.as_os_str().to_owned();
    output.push(".opt");
    let output = PathBuf::from(output);

    let optimised = run_bounded(
        Command::new(gifsicle)
            .arg("-O3")
            .arg(path)
            .arg("-o")
            .arg(&output),
        timeout,
    );
    if optimised {
        match fs::rename(&output, path) {
            Ok(()) => tracing::debug!(path = %path.display(), "optimised"),
            Err(err) => tracing::warn!(%err, "failed to replace evidence with optimised copy"),
        }
    }
    let _ = fs::remove_file(&output);
}

/// Runs `command` to completion, killing it after `timeout`. Returns whether
/// it exited successfully.
fn run_bounded(command: &mut Command, timeout: Duration) -> bool {
    let mut child = match command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(%err, "failed to run gifsicle, keeping unoptimised evidence");
            return false;
        }
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return true,
            Ok(Some(status)) => {
                tracing::warn!(%status, "gifsicle failed, keeping unoptimised evidence");
                return false;
            }
            Ok(None) if started.elapsed() < timeout => thread::sleep(OPTIMIZE_POLL),
            Ok(None) => {
                tracing::warn!(?timeout, "gifsicle timed out, keeping unoptimised evidence");
                break;
            }
            Err(err) => {
                tracing::warn!(%err, "failed to wait for gifsicle");
                break;
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
    false
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::fs::File;
    use std::io::{self, BufReader};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgb};

    use super::*;
    use crate::error::CameraNotFound;

    enum Step {
        Frame(RgbImage),
        Empty,
        Corrupt,
        Closed,
    }

    enum Attempt {
        OpenFails,
        Stream {
            ready: bool,
            fps: f64,
            steps: Vec<Step>,
        },
    }

    struct ScriptedStream {
        ready: bool,
        fps: f64,
        steps: VecDeque<Step>,
        released: Arc<AtomicUsize>,
    }

    impl VideoStream for ScriptedStream {
        fn is_ready(&mut self) -> bool {
            self.ready
        }

        fn native_fps(&self) -> f64 {
            self.fps
        }

        fn read_frame(&mut self) -> io::Result<Option<RgbImage>> {
            match self.steps.pop_front() {
                Some(Step::Frame(frame)) => Ok(Some(frame)),
                Some(Step::Empty) => Ok(Some(RgbImage::new(0, 0))),
                Some(Step::Corrupt) => Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt")),
                Some(Step::Closed) | None => Ok(None),
            }
        }
    }

    impl Drop for ScriptedStream {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedOpener {
        attempts: Mutex<VecDeque<Attempt>>,
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl ScriptedOpener {
        fn new(attempts: Vec<Attempt>) -> Self {
            Self {
                attempts: Mutex::new(attempts.into()),
                opened: Arc::new(AtomicUsize::new(0)),
                released: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl StreamOpener for ScriptedOpener {
        type Stream = ScriptedStream;

        fn open(&self, address: &StreamAddress) -> Result<ScriptedStream, CaptureError> {
            let attempt = self.attempts.lock().unwrap().pop_front();
            match attempt {
                Some(Attempt::Stream { ready, fps, steps }) => {
                    self.opened.fetch_add(1, Ordering::SeqCst);
                    Ok(ScriptedStream {
                        ready,
                        fps,
                        steps: steps.into(),
                        released: Arc::clone(&self.released),
                    })
                }
                Some(Attempt::OpenFails) | None => Err(CaptureError::Open {
                    address: address.redacted(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    fn frame(value: u8) -> Step {
        Step::Frame(RgbImage::from_pixel(4, 4, Rgb([value, value, value])))
    }

    fn frames(count: u8) -> Vec<Step> {
        (0..count).map(|i| frame(i * 10)).collect()
    }

    fn settings(dir: &Path) -> CaptureSettings {
        CaptureSettings {
            duration_secs: 1,
            frames_per_second: 3,
            frame_delay: Duration::from_millis(200),
            scratch_path: dir.join("evidence.gif"),
            optimize: None,
            optimize_timeout: Duration::from_secs(5),
        }
    }

    fn camera() -> impl Fn() -> Result<StreamAddress, CameraNotFound> {
        || Ok(StreamAddress::new("rtsp://cam:pw@10.0.0.7/stream1")?)
    }

    fn decoded_frames(path: &Path) -> Vec<image::Frame> {
        let decoder = GifDecoder::new(BufReader::new(File::open(path).unwrap())).unwrap();
        decoder.into_frames().collect_frames().unwrap()
    }

    #[test]
    fn target_frames_is_at_least_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        assert_eq!(settings.target_frames(), 3);
        settings.duration_secs = 0;
        assert_eq!(settings.target_frames(), 1);
    }

    #[test]
    fn stride_follows_native_rate() {
        assert_eq!(decimation_stride(15.0, 3), 5);
        assert_eq!(decimation_stride(29.97, 3), 9);
        assert_eq!(decimation_stride(2.0, 3), 1);
        assert_eq!(decimation_stride(0.0, 3), 1);
        assert_eq!(decimation_stride(f64::NAN, 3), 1);
        assert_eq!(decimation_stride(30.0, 0), 1);
    }

    #[test]
    fn decimates_and_encodes() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![Attempt::Stream {
            ready: true,
            fps: 15.0,
            steps: frames(15),
        }]);
        let released = Arc::clone(&opener.released);
        let recorder = EvidenceRecorder::new(opener, settings(dir.path()));

        let artifact = recorder.capture(&camera()).unwrap();

        assert_eq!(artifact.frame_count, 3);
        assert_eq!(artifact.file_path, dir.path().join("evidence.gif"));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let decoded = decoded_frames(&artifact.file_path);
        assert_eq!(decoded.len(), 3);
        assert_eq!(
            Duration::from(decoded[0].delay()),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn accepts_every_stride_th_frame() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![Attempt::Stream {
            ready: true,
            fps: 6.0,
            steps: frames(6),
        }]);
        let recorder = EvidenceRecorder::new(opener, settings(dir.path()));
        let address = camera()().unwrap();

        let recorded = recorder.record(&address).unwrap();

        let firsts: Vec<u8> = recorded.iter().map(|f| f.get_pixel(0, 0)[0]).collect();
        assert_eq!(firsts, vec![0, 20, 40]);
    }

    #[test]
    fn applies_overlay_to_accepted_frames() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![Attempt::Stream {
            ready: true,
            fps: 3.0,
            steps: vec![frame(100), frame(100), frame(100)],
        }]);
        let overlay = Overlay::new(
            RgbImage::from_pixel(2, 2, Rgb([50, 0, 0])),
            RgbImage::from_pixel(2, 2, Rgb([0, 5, 0])),
        );
        let recorder =
            EvidenceRecorder::new(opener, settings(dir.path())).with_overlay(Some(overlay));
        let address = camera()().unwrap();

        let recorded = recorder.record(&address).unwrap();

        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[2].get_pixel(3, 3), &Rgb([50, 105, 100]));
    }

    #[test]
    fn corrupt_frame_fails_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![Attempt::Stream {
            ready: true,
            fps: 3.0,
            steps: vec![frame(1), Step::Corrupt, frame(2), frame(3)],
        }]);
        let released = Arc::clone(&opener.released);
        let recorder = EvidenceRecorder::new(opener, settings(dir.path()));

        let err = recorder.capture(&camera()).unwrap_err();

        assert!(matches!(err, CaptureError::Broken { accepted: 1, .. }));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(!dir.path().join("evidence.gif").exists());
    }

    #[test]
    fn empty_frame_and_closed_stream_fail() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![
            Attempt::Stream {
                ready: true,
                fps: 3.0,
                steps: vec![Step::Empty],
            },
            Attempt::Stream {
                ready: true,
                fps: 3.0,
                steps: vec![frame(1), frame(2), Step::Closed],
            },
        ]);
        let released = Arc::clone(&opener.released);
        let recorder = EvidenceRecorder::new(opener, settings(dir.path()));

        assert!(matches!(
            recorder.capture(&camera()),
            Err(CaptureError::Broken { accepted: 0, .. })
        ));
        assert!(matches!(
            recorder.capture(&camera()),
            Err(CaptureError::Broken { accepted: 2, .. })
        ));
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn not_ready_stream_fails_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![Attempt::Stream {
            ready: false,
            fps: 3.0,
            steps: frames(3),
        }]);
        let released = Arc::clone(&opener.released);
        let recorder = EvidenceRecorder::new(opener, settings(dir.path()));

        let err = recorder.capture(&camera()).unwrap_err();

        assert!(matches!(err, CaptureError::NotReady { .. }));
        assert!(!err.to_string().contains("pw"));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recovery_re_resolves_and_retries_once() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![
            Attempt::Stream {
                ready: true,
                fps: 3.0,
                steps: vec![frame(1), Step::Corrupt],
            },
            Attempt::Stream {
                ready: true,
                fps: 3.0,
                steps: frames(3),
            },
        ]);
        let released = Arc::clone(&opener.released);
        let recorder = EvidenceRecorder::new(opener, settings(dir.path()));
        let resolved = AtomicUsize::new(0);
        let locator = || -> Result<StreamAddress, CameraNotFound> {
            resolved.fetch_add(1, Ordering::SeqCst);
            Ok(StreamAddress::new("rtsp://10.0.0.8/stream1")?)
        };

        let artifact = recorder.capture_with_recovery(&locator).unwrap();

        assert_eq!(artifact.frame_count, 3);
        assert_eq!(resolved.load(Ordering::SeqCst), 2);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn recovery_gives_up_after_second_failure() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![
            Attempt::OpenFails,
            Attempt::OpenFails,
            Attempt::Stream {
                ready: true,
                fps: 3.0,
                steps: frames(3),
            },
        ]);
        let opened = Arc::clone(&opener.opened);
        let recorder = EvidenceRecorder::new(opener, settings(dir.path()));

        let failed = recorder.capture_with_recovery(&camera()).unwrap_err();

        assert!(matches!(failed.first, CaptureError::Open { .. }));
        assert!(matches!(failed.recovery, Some(CaptureError::Open { .. })));
        assert!(failed.to_string().contains("recovery failed"));
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn camera_not_found_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![]);
        let recorder = EvidenceRecorder::new(opener, settings(dir.path()));
        let resolved = AtomicUsize::new(0);
        let locator = || -> Result<StreamAddress, CameraNotFound> {
            resolved.fetch_add(1, Ordering::SeqCst);
            Err(CameraNotFound::NoMatch {
                mac: "b0:a7:b9:12:34:56".to_string(),
                table: PathBuf::from("/proc/net/arp"),
            })
        };

        let failed = recorder.capture_with_recovery(&locator).unwrap_err();

        assert!(matches!(failed.last(), CaptureError::CameraNotFound(_)));
        assert_eq!(resolved.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancellation_releases_and_skips_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![
            Attempt::Stream {
                ready: true,
                fps: 3.0,
                steps: frames(3),
            },
            Attempt::Stream {
                ready: true,
                fps: 3.0,
                steps: frames(3),
            },
        ]);
        let released = Arc::clone(&opener.released);
        let (tx, rx) = watch::channel(false);
        let recorder = EvidenceRecorder::new(opener, settings(dir.path())).with_cancel(rx);
        tx.send(true).unwrap();

        let failed = recorder.capture_with_recovery(&camera()).unwrap_err();

        assert!(matches!(failed.first, CaptureError::Cancelled));
        assert!(failed.recovery.is_none());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scratch_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let short = EvidenceRecorder::new(
            ScriptedOpener::new(vec![Attempt::Stream {
                ready: true,
                fps: 3.0,
                steps: frames(3),
            }]),
            settings(dir.path()),
        );
        let long = EvidenceRecorder::new(
            ScriptedOpener::new(vec![Attempt::Stream {
                ready: true,
                fps: 3.0,
                steps: frames(6),
            }]),
            CaptureSettings {
                duration_secs: 2,
                ..settings(dir.path())
            },
        );

        let first = short.capture(&camera()).unwrap();
        assert_eq!(decoded_frames(&first.file_path).len(), 3);
        let second = long.capture(&camera()).unwrap();

        assert_eq!(second.file_path, first.file_path);
        assert_eq!(second.frame_count, 6);
        assert_eq!(decoded_frames(&second.file_path).len(), 6);
        assert!(dir.path().join("evidence.gif.lock").exists());
    }

    #[test]
    fn failed_optimisation_keeps_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ScriptedOpener::new(vec![Attempt::Stream {
            ready: true,
            fps: 3.0,
            steps: frames(3),
        }]);
        let settings = CaptureSettings {
            optimize: Some(PathBuf::from("/nonexistent/gifsicle")),
            ..settings(dir.path())
        };
        let recorder = EvidenceRecorder::new(opener, settings);

        let artifact = recorder.capture(&camera()).unwrap();

        assert_eq!(decoded_frames(&artifact.file_path).len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn hung_optimiser_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let gifsicle = dir.path().join("gifsicle");
        fs::write(&gifsicle, "#!/bin/sh\nexec sleep 30\n").unwrap();
        fs::set_permissions(&gifsicle, fs::Permissions::from_mode(0o755)).unwrap();
        let opener = ScriptedOpener::new(vec![Attempt::Stream {
            ready: true,
            fps: 3.0,
            steps: frames(3),
        }]);
        let settings = CaptureSettings {
            optimize: Some(gifsicle),
            optimize_timeout: Duration::from_millis(200),
            ..settings(dir.path())
        };
        let recorder = EvidenceRecorder::new(opener, settings);

        let started = Instant::now();
        let artifact = recorder.capture(&camera()).unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(decoded_frames(&artifact.file_path).len(), 3);
    }
}
