//! V4L2 camera access through an `ffmpeg` rawvideo pipe

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::device::{CameraBackend, CameraDevice, CameraInfo, CameraRequest};
use crate::frame::CHANNELS;
use crate::{CaptureError, Frame};

/// How long `open` waits for the first frame before giving up on the device
pub const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

type FrameBytes = std::io::Result<Vec<u8>>;
type LastError = Arc<Mutex<Option<String>>>;

/// Opens `/dev/video{N}` with `ffmpeg` and reads packed RGB24 frames from stdout
///
/// A device only counts as open once ffmpeg has delivered a first frame.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    program: PathBuf,
    device_dir: PathBuf,
    first_frame_timeout: Duration,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            device_dir: PathBuf::from("/dev"),
            first_frame_timeout: FIRST_FRAME_TIMEOUT,
        }
    }
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific ffmpeg binary
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Directory holding the `video{N}` device nodes
    pub fn with_device_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.device_dir = dir.into();
        self
    }

    pub fn with_first_frame_timeout(mut self, timeout: Duration) -> Self {
        self.first_frame_timeout = timeout;
        self
    }

    fn device_path(&self, device_id: u32) -> PathBuf {
        self.device_dir.join(format!("video{}", device_id))
    }

    fn command(&self, device: &Path, request: &CameraRequest) -> Command {
        let fps = if request.fps_limit.is_finite() && request.fps_limit > 0.0 {
            request.fps_limit
        } else {
            30.0
        };

        let mut cmd = Command::new(&self.program);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg("video4linux2")
            .arg("-framerate")
            .arg(format!("{}", fps.round() as u32))
            .arg("-video_size")
            .arg(format!("{}x{}", request.width, request.height))
            .arg("-i")
            .arg(device)
            .arg("-vf")
            .arg(format!("scale={}:{}", request.width, request.height))
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl CameraBackend for FfmpegBackend {
    fn open(&self, request: &CameraRequest) -> Result<Box<dyn CameraDevice>, CaptureError> {
        let unavailable = |reason: String| CaptureError::DeviceUnavailable {
            device_id: request.device_id,
            reason,
        };

        if request.width == 0 || request.height == 0 {
            return Err(unavailable(format!(
                "invalid resolution {}x{}",
                request.width, request.height
            )));
        }

        let device = self.device_path(request.device_id);
        if !device.exists() {
            return Err(unavailable(format!("{} not found", device.display())));
        }

        let mut child = self
            .command(&device, request)
            .spawn()
            .map_err(|e| unavailable(format!("failed to spawn {}: {}", self.program.display(), e)))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            release(&mut child);
            return Err(unavailable("ffmpeg pipes not captured".to_string()));
        };

        let frame_len = request.width as usize * request.height as usize * CHANNELS;
        let last_error = drain_stderr(stderr, request.device_id);
        let frames = match spawn_reader(stdout, frame_len, request.device_id) {
            Ok(frames) => frames,
            Err(e) => {
                release(&mut child);
                return Err(unavailable(format!("failed to start frame reader: {}", e)));
            }
        };

        let first = match frames.recv_timeout(self.first_frame_timeout) {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                let reason = failure_reason(&mut child, &last_error, &e.to_string());
                release(&mut child);
                return Err(unavailable(reason));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let reason = failure_reason(&mut child, &last_error, "stream closed");
                release(&mut child);
                return Err(unavailable(reason));
            }
            Err(RecvTimeoutError::Timeout) => {
                release(&mut child);
                return Err(unavailable(format!(
                    "no frame within {:?}",
                    self.first_frame_timeout
                )));
            }
        };

        info!(
            "Opened {} at {}x{} via ffmpeg",
            device.display(),
            request.width,
            request.height
        );

        Ok(Box::new(FfmpegDevice {
            child,
            frames,
            pending: Some(first),
            last_error,
            info: CameraInfo {
                device_id: request.device_id,
                width: request.width,
                height: request.height,
                fps: request.fps_limit,
            },
            sequence: 0,
        }))
    }

    fn name(&self) -> &'static str {
        "v4l2"
    }
}

fn release(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Forward ffmpeg diagnostics to the log, keeping the latest line
fn drain_stderr(stderr: ChildStderr, device_id: u32) -> LastError {
    let last: LastError = Arc::new(Mutex::new(None));
    let sink = last.clone();
    let spawned = thread::Builder::new()
        .name(format!("ffmpeg-stderr-{}", device_id))
        .spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                warn!("ffmpeg /dev/video{}: {}", device_id, line);
                *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(line);
            }
        });
    if let Err(e) = spawned {
        warn!("ffmpeg diagnostics for /dev/video{} not captured: {}", device_id, e);
    }
    last
}

/// Read whole frames off the pipe until it fails or the device is dropped
fn spawn_reader(mut stdout: ChildStdout, frame_len: usize, device_id: u32) -> std::io::Result<Receiver<FrameBytes>> {
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name(format!("ffmpeg-reader-{}", device_id))
        .spawn(move || loop {
            let mut buffer = vec![0u8; frame_len];
            let result = stdout.read_exact(&mut buffer).map(|()| buffer);
            let failed = result.is_err();
            if tx.send(result).is_err() || failed {
                break;
            }
        })?;
    Ok(rx)
}

fn last_line(last_error: &LastError) -> Option<String> {
    last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Describe why the stream ended, preferring ffmpeg's own message
fn failure_reason(child: &mut Child, last_error: &LastError, read_error: &str) -> String {
    // Give the stderr thread a moment to pick up the final message
    let exited = (0..10).find_map(|_| match child.try_wait() {
        Ok(Some(status)) => Some(status),
        _ => {
            thread::sleep(Duration::from_millis(20));
            None
        }
    });

    let mut reason = match exited {
        Some(status) => format!("ffmpeg exited with {}", status),
        None => format!("ffmpeg stream failed: {}", read_error),
    };
    if let Some(line) = last_line(last_error) {
        reason.push_str(": ");
        reason.push_str(&line);
    }
    reason
}

struct FfmpegDevice {
    child: Child,
    frames: Receiver<FrameBytes>,
    pending: Option<Vec<u8>>,
    last_error: LastError,
    info: CameraInfo,
    sequence: u64,
}

impl CameraDevice for FfmpegDevice {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let buffer = match self.pending.take() {
            Some(buffer) => buffer,
            None => {
                let read = self
                    .frames
                    .recv()
                    .map_err(|_| "stream closed".to_string())
                    .and_then(|r| r.map_err(|e| e.to_string()));
                match read {
                    Ok(buffer) => buffer,
                    Err(e) => {
                        let reason = match last_line(&self.last_error) {
                            Some(line) => format!("{} ({})", e, line),
                            None => e,
                        };
                        return Err(CaptureError::FrameRead(reason));
                    }
                }
            }
        };

        let frame = Frame::new(
            buffer,
            self.info.width,
            self.info.height,
            Utc::now().timestamp_millis(),
            self.sequence,
        );
        self.sequence += 1;
        Ok(frame)
    }

    fn info(&self) -> CameraInfo {
        self.info
    }
}

impl Drop for FfmpegDevice {
    fn drop(&mut self) {
        release(&mut self.child);
        debug!("Released /dev/video{}", self.info.device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_node() {
        let dir = std::env::temp_dir().join("studio-ffmpeg-no-devices");
        let backend = FfmpegBackend::new().with_device_dir(&dir);
        let err = backend.open(&CameraRequest::default()).err().unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable { device_id: 0, .. }));
    }

    fn device_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("studio-ffmpeg-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("video0"), b"").unwrap();
        dir
    }

    #[test]
    fn test_exiting_ffmpeg_is_unavailable() {
        let dir = device_dir("exits");
        let backend = FfmpegBackend::new()
            .with_program("false")
            .with_device_dir(&dir)
            .with_first_frame_timeout(Duration::from_secs(2));
        let err = backend.open(&CameraRequest::default()).err().unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable { device_id: 0, .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_open_waits_for_first_frame() {
        // `yes` echoes its arguments forever, standing in for a live stream
        let dir = device_dir("streams");
        let backend = FfmpegBackend::new().with_program("yes").with_device_dir(&dir);
        let request = CameraRequest {
            width: 4,
            height: 2,
            ..CameraRequest::default()
        };
        let mut device = backend.open(&request).unwrap();
        let first = device.read_frame().unwrap();
        let second = device.read_frame().unwrap();
        assert_eq!(first.data.len(), 4 * 2 * CHANNELS);
        assert_eq!((first.sequence, second.sequence), (0, 1));
        drop(device);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let backend = FfmpegBackend::new();
        let request = CameraRequest {
            width: 0,
            ..CameraRequest::default()
        };
        assert!(backend.open(&request).is_err());
    }

    #[test]
    fn test_command_arguments() {
        let backend = FfmpegBackend::new();
        let request = CameraRequest {
            device_id: 2,
            width: 1280,
            height: 720,
            fps_limit: 0.0,
        };
        let device = backend.device_path(2);
        let cmd = backend.command(&device, &request);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.windows(2).any(|w| w == ["-video_size", "1280x720"]));
        assert!(args.windows(2).any(|w| w == ["-framerate", "30"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "rgb24"]));
        assert!(args.iter().any(|a| a.ends_with("video2")));
    }
}
