use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::image_data::{ImageBlob, ImageDataError};
use crate::state::AppView;
use crate::storage::StorageService;
use thiserror::Error;

const DEVICE_PLACEHOLDER: &str = "{device}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera permission denied for {device}")]
    PermissionDenied { device: String },
    #[error("camera {device} is unavailable: {message}")]
    DeviceUnavailable { device: String, message: String },
    #[error("no camera session is active")]
    NoActiveSession,
    #[error("command failed: {command}: {message}")]
    CommandFailed { command: String, message: String },
    #[error("command io error: {command}")]
    CommandIo {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid capture artifact: {message}")]
    InvalidCaptureArtifact { message: String },
    #[error("failed to read captured image: {0}")]
    ImageReadFailed(#[from] ImageDataError),
    #[error("frame grab stopped before producing an image")]
    Interrupted,
}

/// An acquired camera device. Dropping it releases the device.
#[derive(Debug)]
pub struct CameraSession {
    device: PathBuf,
    handle: Option<File>,
    opened_at: Instant,
}

impl CameraSession {
    pub fn new(device: PathBuf, handle: Option<File>) -> Self {
        Self {
            device,
            handle,
            opened_at: Instant::now(),
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.handle.take();
        tracing::debug!(
            device = %self.device.display(),
            held_ms = self.opened_at.elapsed().as_millis() as u64,
            "camera session released"
        );
    }
}

pub trait CameraBackend {
    fn open(&self) -> Result<CameraSession, CaptureError>;
    fn capture_frame(&self, device: &Path, output: &Path) -> Result<(), CaptureError>;
    fn release(&self, session: CameraSession) {
        drop(session);
    }
}

/// Opens a V4L2 device node and grabs frames with an external command.
#[derive(Debug, Clone)]
pub struct SystemCameraBackend {
    device: PathBuf,
    command: Vec<String>,
}

impl SystemCameraBackend {
    pub fn new(device: PathBuf, command: Option<Vec<String>>) -> Self {
        Self {
            device,
            command: command.unwrap_or_else(default_grab_command),
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

impl CameraBackend for SystemCameraBackend {
    fn open(&self) -> Result<CameraSession, CaptureError> {
        let handle = OpenOptions::new()
            .read(true)
            .open(&self.device)
            .map_err(|err| device_error(&self.device, err))?;
        tracing::info!(device = %self.device.display(), "camera session acquired");
        Ok(CameraSession::new(self.device.clone(), Some(handle)))
    }

    fn capture_frame(&self, device: &Path, output: &Path) -> Result<(), CaptureError> {
        let argv = expand_command(&self.command, device, output);
        let Some((program, args)) = argv.split_first() else {
            return Err(CaptureError::CommandFailed {
                command: String::new(),
                message: "capture command is empty".to_string(),
            });
        };
        run_command_status(program, args)
    }
}

fn default_grab_command() -> Vec<String> {
    [
        "ffmpeg",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "v4l2",
        "-i",
        DEVICE_PLACEHOLDER,
        "-frames:v",
        "1",
        "-y",
        OUTPUT_PLACEHOLDER,
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

fn expand_command(template: &[String], device: &Path, output: &Path) -> Vec<String> {
    let device = device.display().to_string();
    let output = output.display().to_string();
    template
        .iter()
        .map(|arg| {
            arg.replace(DEVICE_PLACEHOLDER, &device)
                .replace(OUTPUT_PLACEHOLDER, &output)
        })
        .collect()
}

fn device_error(device: &Path, err: io::Error) -> CaptureError {
    let device = device.display().to_string();
    match err.kind() {
        io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied { device },
        _ => CaptureError::DeviceUnavailable {
            device,
            message: err.to_string(),
        },
    }
}

/// Holds a camera session exactly while the Camera view is active.
#[derive(Debug)]
pub struct CameraLifecycle<B: CameraBackend> {
    backend: B,
    session: Option<CameraSession>,
}

impl<B: CameraBackend> CameraLifecycle<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            session: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn active_device(&self) -> Option<&Path> {
        self.session.as_ref().map(CameraSession::device)
    }

    /// Acquires on entering Camera, releases on any other view.
    pub fn sync(&mut self, view: AppView) -> Result<(), CaptureError> {
        match (view, self.session.is_some()) {
            (AppView::Camera, false) => {
                self.session = Some(self.backend.open()?);
                Ok(())
            }
            (AppView::Camera, true) => Ok(()),
            (_, true) => {
                self.release();
                Ok(())
            }
            (_, false) => Ok(()),
        }
    }

    pub fn release(&mut self) {
        if let Some(session) = self.session.take() {
            self.backend.release(session);
        }
    }
}

impl<B: CameraBackend> Drop for CameraLifecycle<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Grabs one frame into a temp file and returns it as an image blob.
///
/// The temp file is removed whether or not the grab succeeds.
pub fn capture_photo_with<B: CameraBackend>(
    backend: &B,
    device: &Path,
    storage: &StorageService,
    max_bytes: usize,
) -> Result<ImageBlob, CaptureError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| CaptureError::InvalidCaptureArtifact {
            message: format!("system time before unix epoch: {err}"),
        })?;
    let capture_id = now.as_nanos().to_string();
    let temp_path = storage.temp_path_for_capture(&capture_id).map_err(|err| {
        CaptureError::InvalidCaptureArtifact {
            message: err.to_string(),
        }
    })?;
    if let Err(err) = std::fs::create_dir_all(storage.temp_dir()) {
        return Err(CaptureError::InvalidCaptureArtifact {
            message: format!("failed to prepare temp directory: {err}"),
        });
    }

    if let Err(err) = backend.capture_frame(device, &temp_path) {
        cleanup_temp_capture_file(&temp_path, "frame grab failure");
        return Err(err);
    }

    let image = ImageBlob::from_file(&temp_path, max_bytes);
    cleanup_temp_capture_file(&temp_path, "captured frame consumed");
    let image = image?;
    tracing::info!(
        capture_id = %capture_id,
        mime_type = image.mime_type(),
        bytes = image.approx_decoded_len(),
        "captured photo"
    );
    Ok(image)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TempCaptureCleanupOutcome {
    Removed,
    NotFound,
    Failed,
}

fn cleanup_temp_capture_file(temp_path: &Path, stage: &str) -> TempCaptureCleanupOutcome {
    cleanup_temp_capture_file_with(temp_path, stage, |path| std::fs::remove_file(path))
}

fn cleanup_temp_capture_file_with<F>(
    temp_path: &Path,
    stage: &str,
    remove_file: F,
) -> TempCaptureCleanupOutcome
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    match remove_file(temp_path) {
        Ok(()) => TempCaptureCleanupOutcome::Removed,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(
                stage = stage,
                path = %temp_path.display(),
                "temporary capture file was already missing during cleanup"
            );
            TempCaptureCleanupOutcome::NotFound
        }
        Err(err) => {
            tracing::warn!(
                stage = stage,
                path = %temp_path.display(),
                ?err,
                "failed to cleanup temporary capture file"
            );
            TempCaptureCleanupOutcome::Failed
        }
    }
}

fn run_command_status(command: &str, args: &[String]) -> Result<(), CaptureError> {
    let output = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|err| CaptureError::CommandIo {
            command: command.to_string(),
            source: err,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("command exited with status: {}", output.status),
            detail => detail.lines().last().unwrap_or(detail).to_string(),
        };
        Err(CaptureError::CommandFailed {
            command: command.to_string(),
            message,
        })
    }
}
