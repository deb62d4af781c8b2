use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use gtk4::prelude::*;
use gtk4::{ApplicationWindow, FileChooserAction, FileChooserNative, FileFilter, ResponseType};

use crate::capture::{capture_photo_with, CameraLifecycle, CaptureError, SystemCameraBackend};
use crate::controller::{Controller, ControllerError, ControllerResult};
use crate::image_data::ImageBlob;
use crate::service::{EditService, ServiceError};
use crate::settings::ModeSettingsPatch;
use crate::state::AppView;
use crate::storage::StorageService;

use super::pages::{AppPages, CameraPage};
use super::toast::ToastRuntime;
use super::worker::{spawn_worker_action, WorkerGate};

pub(super) type SharedController = Rc<RefCell<Controller>>;
pub(super) type SharedCamera = Rc<RefCell<CameraLifecycle<SystemCameraBackend>>>;

const CAMERA_ACCESS_MESSAGE: &str = "Unable to access the camera. Check permissions.";

#[derive(Clone)]
pub(super) struct ActionExecutor {
    controller: SharedController,
    camera: SharedCamera,
    storage: Rc<StorageService>,
    edit_service: Arc<dyn EditService>,
    toast: ToastRuntime,
    camera_page: CameraPage,
    grab_gate: WorkerGate,
    max_image_bytes: usize,
}

impl ActionExecutor {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        controller: SharedController,
        camera: SharedCamera,
        storage: Rc<StorageService>,
        edit_service: Arc<dyn EditService>,
        toast: ToastRuntime,
        camera_page: CameraPage,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            controller,
            camera,
            storage,
            edit_service,
            toast,
            camera_page,
            grab_gate: WorkerGate::default(),
            max_image_bytes,
        }
    }

    pub(super) fn select_mode(&self, mode_id: &str) {
        let result = self.controller.borrow_mut().select_mode(mode_id);
        log_rejected("select mode", result);
    }

    pub(super) fn open_settings(&self) {
        let result = self.controller.borrow_mut().open_settings();
        log_rejected("open settings", result);
    }

    pub(super) fn close_settings(&self, edits: Vec<(String, ModeSettingsPatch)>) {
        let saved = edits.len();
        let result = self.controller.borrow_mut().close_settings(edits);
        if result.is_ok() && saved > 0 {
            self.toast.show("Settings saved");
        }
        log_rejected("close settings", result);
    }

    /// Grabs a frame off the main loop, then hands it to the controller.
    pub(super) fn capture(&self) {
        if self.controller.borrow().view() != AppView::Camera {
            tracing::debug!("capture requested outside camera view");
            return;
        }
        let device = self
            .camera
            .borrow()
            .active_device()
            .map(Path::to_path_buf);
        let Some(device) = device else {
            self.fail_capture(&CaptureError::NoActiveSession);
            return;
        };
        if !self.grab_gate.try_begin() {
            tracing::debug!("capture already in progress");
            return;
        }

        self.camera_page.set_busy(true);
        let backend = self.camera.borrow().backend().clone();
        let storage = self.storage.as_ref().clone();
        let max_image_bytes = self.max_image_bytes;
        let executor = self.clone();
        let lost_executor = self.clone();
        spawn_worker_action(
            "capture",
            move || capture_photo_with(&backend, &device, &storage, max_image_bytes),
            move |result| {
                executor.end_grab();
                match result {
                    Ok(image) => executor.start_edit(image),
                    Err(err) => executor.fail_capture(&err),
                }
            },
            move || {
                lost_executor.end_grab();
                lost_executor.fail_capture(&CaptureError::Interrupted);
            },
        );
    }

    fn end_grab(&self) {
        self.grab_gate.finish();
        self.camera_page.set_busy(false);
    }

    fn start_edit(&self, image: ImageBlob) {
        let pending = self.controller.borrow_mut().capture(image);
        let pending = match pending {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!(%err, "captured frame was not submitted");
                return;
            }
        };

        let mode = pending.mode().to_string();
        let service = Arc::clone(&self.edit_service);
        let controller = self.controller.clone();
        let lost_controller = self.controller.clone();
        spawn_worker_action(
            "edit",
            move || pending.run(service.as_ref()),
            move |outcome| {
                tracing::info!(mode = %mode, succeeded = outcome.is_ok(), "image edit finished");
                let result = controller.borrow_mut().complete(outcome);
                log_rejected("complete edit", result);
            },
            move || {
                let result = lost_controller.borrow_mut().complete(Err(lost_edit_error()));
                log_rejected("complete edit", result);
            },
        );
    }

    fn fail_capture(&self, err: &CaptureError) {
        tracing::warn!(%err, "camera capture failed");
        let result = self
            .controller
            .borrow_mut()
            .capture_failed(capture_failure_message(err));
        log_rejected("capture failed", result);
    }

    pub(super) fn cancel_capture(&self) {
        if self.grab_gate.is_busy() {
            tracing::debug!("cancel ignored while a frame is being grabbed");
            return;
        }
        let result = self.controller.borrow_mut().cancel_capture();
        log_rejected("cancel capture", result);
    }

    pub(super) fn reset(&self) {
        let result = self.controller.borrow_mut().reset();
        log_rejected("reset", result);
    }

    pub(super) fn save_result(&self) {
        let image = self.controller.borrow().session().generated_image.clone();
        let Some(image) = image else {
            self.toast.show("Nothing to save yet");
            return;
        };
        match self.storage.save_generated(&image) {
            Ok(path) => self.toast.show(format!("Saved to {}", path.display())),
            Err(err) => {
                tracing::error!(%err, "failed to save generated image");
                self.toast.show_error(format!("Could not save image: {err}"));
            }
        }
    }

    pub(super) fn load_reference_image(&self, path: &Path) -> Option<ImageBlob> {
        match ImageBlob::from_file(path, self.max_image_bytes) {
            Ok(image) => {
                tracing::info!(
                    path = %path.display(),
                    mime_type = image.mime_type(),
                    "loaded reference image"
                );
                Some(image)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "reference image rejected");
                self.toast.show_error(format!("Cannot use that image: {err}"));
                None
            }
        }
    }

    /// Releases the camera when the window goes away.
    pub(super) fn shutdown(&self) {
        self.camera.borrow_mut().release();
    }
}

fn log_rejected(action: &str, result: ControllerResult<impl std::fmt::Debug>) {
    match result {
        Ok(view) => tracing::debug!(action, ?view, "action applied"),
        Err(ControllerError::ModeNotConfigured { mode }) => {
            tracing::info!(action, mode = %mode, "mode needs configuration");
        }
        Err(err) => tracing::warn!(action, %err, "action rejected"),
    }
}

fn lost_edit_error() -> ServiceError {
    ServiceError::Transport("edit worker exited without a result".to_string())
}

pub(super) fn capture_failure_message(err: &CaptureError) -> String {
    match err {
        CaptureError::PermissionDenied { .. }
        | CaptureError::DeviceUnavailable { .. }
        | CaptureError::NoActiveSession => CAMERA_ACCESS_MESSAGE.to_string(),
        other => format!("Capture failed: {other}"),
    }
}

fn choose_reference_image(
    window: &ApplicationWindow,
    on_chosen: impl Fn(PathBuf) + 'static,
) {
    let filter = FileFilter::new();
    filter.set_name(Some("Images"));
    filter.add_mime_type("image/*");

    let dialog = FileChooserNative::new(
        Some("Choose reference image"),
        Some(window),
        FileChooserAction::Open,
        Some("Use image"),
        Some("Cancel"),
    );
    dialog.add_filter(&filter);
    dialog.set_modal(true);

    // Held until the dialog responds.
    let keep_alive = Rc::new(RefCell::new(Some(dialog.clone())));
    dialog.connect_response(move |dialog, response| {
        if response == ResponseType::Accept {
            match dialog.file().and_then(|file| file.path()) {
                Some(path) => on_chosen(path),
                None => tracing::warn!("chosen reference image has no local path"),
            }
        }
        keep_alive.borrow_mut().take();
    });
    dialog.show();
}

pub(super) fn connect_page_actions(
    window: &ApplicationWindow,
    pages: &AppPages,
    executor: &ActionExecutor,
) {
    {
        let executor = executor.clone();
        pages
            .home
            .set_select_handler(move |mode_id| executor.select_mode(&mode_id));
    }
    {
        let executor = executor.clone();
        pages
            .home
            .settings_button
            .connect_clicked(move |_| executor.open_settings());
    }
    {
        let executor = executor.clone();
        let settings_page = pages.settings.clone();
        pages.settings.save_button.connect_clicked(move |_| {
            executor.close_settings(settings_page.take_edits());
        });
    }
    {
        let executor = executor.clone();
        let settings_page = pages.settings.clone();
        pages.settings.back_button.connect_clicked(move |_| {
            settings_page.discard_draft();
            executor.close_settings(Vec::new());
        });
    }
    {
        let executor = executor.clone();
        let settings_page = pages.settings.clone();
        let window = window.clone();
        pages.settings.choose_image_button.connect_clicked(move |_| {
            let executor = executor.clone();
            let settings_page = settings_page.clone();
            choose_reference_image(&window, move |path| {
                if let Some(image) = executor.load_reference_image(&path) {
                    settings_page.set_reference_image(image);
                }
            });
        });
    }
    {
        let executor = executor.clone();
        pages
            .camera
            .capture_button
            .connect_clicked(move |_| executor.capture());
    }
    {
        let executor = executor.clone();
        pages
            .camera
            .cancel_button
            .connect_clicked(move |_| executor.cancel_capture());
    }
    {
        let executor = executor.clone();
        pages
            .result
            .try_again_button
            .connect_clicked(move |_| executor.reset());
    }
    {
        let executor = executor.clone();
        pages
            .result
            .save_button
            .connect_clicked(move |_| executor.save_result());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_problems_share_the_camera_access_message() {
        let denied = CaptureError::PermissionDenied {
            device: "/dev/video0".to_string(),
        };
        let missing = CaptureError::DeviceUnavailable {
            device: "/dev/video0".to_string(),
            message: "No such file or directory".to_string(),
        };
        assert_eq!(capture_failure_message(&denied), CAMERA_ACCESS_MESSAGE);
        assert_eq!(capture_failure_message(&missing), CAMERA_ACCESS_MESSAGE);
        assert_eq!(
            capture_failure_message(&CaptureError::NoActiveSession),
            CAMERA_ACCESS_MESSAGE
        );
    }

    #[test]
    fn interrupted_grab_is_reported_as_capture_failure() {
        let message = capture_failure_message(&CaptureError::Interrupted);
        assert_eq!(
            message,
            "Capture failed: frame grab stopped before producing an image"
        );
    }

    #[test]
    fn lost_edit_is_a_transport_failure() {
        let err = lost_edit_error();
        assert!(matches!(err, ServiceError::Transport(_)));
        assert_eq!(
            err.to_string(),
            "transport error: edit worker exited without a result"
        );
    }

    #[test]
    fn grab_failures_keep_their_detail() {
        let err = CaptureError::CommandFailed {
            command: "ffmpeg".to_string(),
            message: "Device or resource busy".to_string(),
        };
        let message = capture_failure_message(&err);
        assert!(message.starts_with("Capture failed:"));
        assert!(message.contains("Device or resource busy"));
    }
}
