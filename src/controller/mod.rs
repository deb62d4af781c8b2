use thiserror::Error;

use crate::image_data::ImageBlob;
use crate::service::{EditService, EditedImage, ServiceResult};
use crate::settings::{AllSettings, ModeSettingsPatch, SettingsStore};
use crate::state::{AppEvent, AppView, StateError, StateMachine};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("'{mode}' mode is not configured. Set a prompt and a reference image in Settings.")]
    ModeNotConfigured { mode: String },
    #[error(transparent)]
    State(#[from] StateError),
}

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;

/// Per-capture data carried between views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    pub captured_image: Option<ImageBlob>,
    pub generated_image: Option<ImageBlob>,
    pub generated_text: Option<String>,
    pub error: Option<String>,
}

impl SessionData {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Everything the presentation layer needs to render one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub view: AppView,
    pub session: SessionData,
    pub settings: AllSettings,
    pub active_mode: Option<String>,
}

pub type EditOutcome = ServiceResult<EditedImage>;

/// An edit request detached from the controller so it can run on a worker.
#[derive(Debug, Clone)]
pub struct PendingEdit {
    mode: String,
    user_image: ImageBlob,
    reference_image: ImageBlob,
    prompt: String,
}

impl PendingEdit {
    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn run(&self, service: &dyn EditService) -> EditOutcome {
        tracing::info!(mode = %self.mode, "running image edit");
        service.edit_image(&self.user_image, &self.reference_image, &self.prompt)
    }
}

type Listener = Box<dyn Fn(&Snapshot)>;

pub struct Controller {
    machine: StateMachine,
    settings: SettingsStore,
    session: SessionData,
    active_mode: Option<String>,
    listeners: Vec<Listener>,
}

impl Controller {
    pub fn new(settings: SettingsStore) -> Self {
        Self {
            machine: StateMachine::new(),
            settings,
            session: SessionData::default(),
            active_mode: None,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> &StateMachine {
        &self.machine
    }

    pub fn view(&self) -> AppView {
        self.machine.state()
    }

    pub fn session(&self) -> &SessionData {
        &self.session
    }

    pub fn settings(&self) -> &AllSettings {
        self.settings.current()
    }

    pub fn active_mode(&self) -> Option<&str> {
        self.active_mode.as_deref()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            view: self.machine.state(),
            session: self.session.clone(),
            settings: self.settings.current().clone(),
            active_mode: self.active_mode.clone(),
        }
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&Snapshot) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn select_mode(&mut self, mode: &str) -> ControllerResult<AppView> {
        self.ensure_can(AppEvent::SelectMode)?;

        if !self.mode_is_configured(mode) {
            let err = ControllerError::ModeNotConfigured {
                mode: mode.to_string(),
            };
            tracing::warn!(mode, "mode selected without prompt or reference image");
            self.session.error = Some(err.to_string());
            self.notify();
            return Err(err);
        }

        self.machine.transition(AppEvent::SelectMode)?;
        self.active_mode = Some(mode.to_string());
        self.session.clear();
        self.notify();
        Ok(self.view())
    }

    pub fn open_settings(&mut self) -> ControllerResult<AppView> {
        self.machine.transition(AppEvent::OpenSettings)?;
        self.session.clear();
        self.notify();
        Ok(self.view())
    }

    /// Leaves Settings, applying `edits` in order. No edits means nothing is
    /// persisted.
    pub fn close_settings(
        &mut self,
        edits: Vec<(String, ModeSettingsPatch)>,
    ) -> ControllerResult<AppView> {
        self.ensure_can(AppEvent::CloseSettings)?;
        for (mode, patch) in edits {
            if patch.is_empty() {
                continue;
            }
            self.settings.update(&mode, patch);
        }
        self.machine.transition(AppEvent::CloseSettings)?;
        self.enter_home();
        self.notify();
        Ok(self.view())
    }

    /// Stores the captured frame and hands back the edit to run off-thread.
    pub fn capture(&mut self, image: ImageBlob) -> ControllerResult<PendingEdit> {
        self.ensure_can(AppEvent::Capture)?;

        let mode = self.active_mode.clone().unwrap_or_default();
        let configured = self
            .settings
            .mode(&mode)
            .filter(|settings| settings.is_configured())
            .and_then(|settings| {
                settings
                    .reference_image
                    .clone()
                    .map(|reference| (reference, settings.prompt.clone()))
            });
        let Some((reference_image, prompt)) = configured else {
            let err = ControllerError::ModeNotConfigured { mode };
            self.machine.transition(AppEvent::CaptureFailed)?;
            self.enter_home();
            self.session.error = Some(err.to_string());
            self.notify();
            return Err(err);
        };

        self.machine.transition(AppEvent::Capture)?;
        self.session.captured_image = Some(image.clone());
        self.session.generated_image = None;
        self.session.generated_text = None;
        self.session.error = None;
        self.notify();

        Ok(PendingEdit {
            mode,
            user_image: image,
            reference_image,
            prompt,
        })
    }

    pub fn cancel_capture(&mut self) -> ControllerResult<AppView> {
        self.machine.transition(AppEvent::CancelCapture)?;
        self.enter_home();
        self.notify();
        Ok(self.view())
    }

    /// Camera could not produce a frame; back to Home with `message`.
    pub fn capture_failed(&mut self, message: impl Into<String>) -> ControllerResult<AppView> {
        self.machine.transition(AppEvent::CaptureFailed)?;
        self.enter_home();
        let message = message.into();
        tracing::warn!(%message, "capture failed");
        self.session.error = Some(message);
        self.notify();
        Ok(self.view())
    }

    pub fn complete(&mut self, outcome: EditOutcome) -> ControllerResult<AppView> {
        match outcome {
            Ok(edited) => {
                self.machine.transition(AppEvent::EditSucceeded)?;
                self.session.generated_image = Some(edited.image);
                self.session.generated_text = edited.text;
                self.session.error = None;
            }
            Err(err) => {
                self.machine.transition(AppEvent::EditFailed)?;
                self.enter_home();
                self.session.error = Some(err.to_string());
                tracing::error!(%err, "image edit failed");
            }
        }
        self.notify();
        Ok(self.view())
    }

    pub fn reset(&mut self) -> ControllerResult<AppView> {
        self.machine.transition(AppEvent::Reset)?;
        self.enter_home();
        self.notify();
        Ok(self.view())
    }

    fn mode_is_configured(&self, mode: &str) -> bool {
        self.settings
            .mode(mode)
            .is_some_and(|settings| settings.is_configured())
    }

    fn ensure_can(&self, event: AppEvent) -> Result<(), StateError> {
        if self.machine.can_transition(event) {
            Ok(())
        } else {
            tracing::warn!(from = ?self.view(), ?event, "operation not allowed in current view");
            Err(StateError::InvalidStateTransition {
                from: self.view(),
                event,
            })
        }
    }

    fn enter_home(&mut self) {
        self.session.clear();
        self.active_mode = None;
    }

    fn notify(&self) {
        if self.listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for listener in &self.listeners {
            listener(&snapshot);
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("machine", &self.machine)
            .field("session", &self.session)
            .field("active_mode", &self.active_mode)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceError;
    use crate::settings::{ModeSettings, RAINBOW_MODE};
    use crate::storage::MemorySettingsBackend;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Mutex;

    struct FixedEditService {
        outcome: Mutex<Option<EditOutcome>>,
        calls: Mutex<Vec<String>>,
    }

    impl FixedEditService {
        fn new(outcome: EditOutcome) -> Self {
            Self {
                outcome: Mutex::new(Some(outcome)),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl EditService for FixedEditService {
        fn edit_image(
            &self,
            user_image: &ImageBlob,
            reference_image: &ImageBlob,
            prompt: &str,
        ) -> ServiceResult<EditedImage> {
            self.calls.lock().unwrap().push(format!(
                "{} {} {prompt}",
                user_image.to_data_uri(),
                reference_image.to_data_uri()
            ));
            self.outcome
                .lock()
                .unwrap()
                .take()
                .expect("edit called once")
        }
    }

    fn blob(uri: &str) -> ImageBlob {
        ImageBlob::parse(uri).unwrap()
    }

    fn img1() -> ImageBlob {
        blob("data:image/jpeg;base64,aW1nMQ==")
    }

    fn ref1() -> ImageBlob {
        blob("data:image/png;base64,cmVmMQ==")
    }

    fn gen1() -> ImageBlob {
        blob("data:image/png;base64,Z2VuMQ==")
    }

    fn controller_with(
        settings: &[(&str, &str, Option<ImageBlob>)],
    ) -> (Controller, MemorySettingsBackend) {
        let map: AllSettings = settings
            .iter()
            .map(|(mode, prompt, image)| {
                (
                    mode.to_string(),
                    ModeSettings {
                        prompt: prompt.to_string(),
                        reference_image: image.clone(),
                    },
                )
            })
            .collect();
        let backend =
            MemorySettingsBackend::with_contents(serde_json::to_string(&map).unwrap());
        let controller = Controller::new(SettingsStore::open(backend.clone()));
        (controller, backend)
    }

    fn rainbow_controller() -> Controller {
        controller_with(&[(RAINBOW_MODE, "p", Some(ref1()))]).0
    }

    fn generating(controller: &mut Controller) -> PendingEdit {
        controller.select_mode(RAINBOW_MODE).unwrap();
        controller.capture(img1()).unwrap()
    }

    #[test]
    fn successful_edit_ends_in_result_with_generated_image() {
        let mut controller = rainbow_controller();
        let pending = generating(&mut controller);
        let service = FixedEditService::new(Ok(EditedImage {
            image: gen1(),
            text: Some("hello".to_string()),
        }));

        let outcome = pending.run(&service);
        let view = controller.complete(outcome).unwrap();

        assert_eq!(view, AppView::Result);
        assert_eq!(controller.session().generated_image, Some(gen1()));
        assert_eq!(controller.session().generated_text.as_deref(), Some("hello"));
        assert_eq!(controller.session().captured_image, Some(img1()));
        assert_eq!(
            service.calls.lock().unwrap().as_slice(),
            [format!("{} {} p", img1().to_data_uri(), ref1().to_data_uri())]
        );
    }

    #[test]
    fn edit_without_image_returns_home_with_error() {
        let mut controller = rainbow_controller();
        let pending = generating(&mut controller);
        let service = FixedEditService::new(Err(ServiceError::NoImage { text: None }));

        let view = controller.complete(pending.run(&service)).unwrap();

        assert_eq!(view, AppView::Home);
        assert_eq!(
            controller.session().error.as_deref(),
            Some("model returned no image")
        );
        assert_eq!(controller.session().generated_image, None);
        assert_eq!(controller.session().captured_image, None);
    }

    #[test]
    fn edit_that_never_reports_back_still_leaves_generating() {
        let mut controller = rainbow_controller();
        generating(&mut controller);

        let view = controller
            .complete(Err(ServiceError::Transport(
                "edit worker exited without a result".to_string(),
            )))
            .unwrap();

        assert_eq!(view, AppView::Home);
        assert_eq!(
            controller.session().error.as_deref(),
            Some("transport error: edit worker exited without a result")
        );
        assert_eq!(controller.session().captured_image, None);
    }

    #[test]
    fn unconfigured_mode_never_leaves_home() {
        let cases = [
            ("empty-prompt", "", Some(ref1())),
            ("blank-prompt", "   ", Some(ref1())),
            ("no-image", "p", None),
        ];
        for (mode, prompt, image) in cases {
            let (mut controller, _) = controller_with(&[(mode, prompt, image)]);

            let err = controller.select_mode(mode).unwrap_err();

            assert!(matches!(err, ControllerError::ModeNotConfigured { .. }));
            assert_eq!(controller.view(), AppView::Home);
            assert_eq!(controller.active_mode(), None);
            assert!(controller.session().error.is_some());
        }

        let (mut controller, _) = controller_with(&[]);
        assert!(controller.select_mode("unknown").is_err());
        assert_eq!(controller.view(), AppView::Home);
    }

    #[test]
    fn generating_only_reaches_result_or_home() {
        let mut controller = rainbow_controller();
        generating(&mut controller);

        assert!(matches!(
            controller.select_mode(RAINBOW_MODE),
            Err(ControllerError::State(_))
        ));
        assert!(matches!(
            controller.capture(img1()),
            Err(ControllerError::State(_))
        ));
        assert!(controller.cancel_capture().is_err());
        assert!(controller.capture_failed("x").is_err());
        assert!(controller.open_settings().is_err());
        assert!(controller.reset().is_err());
        assert_eq!(controller.view(), AppView::Generating);
        assert_eq!(controller.session().captured_image, Some(img1()));
    }

    #[test]
    fn entering_home_clears_session_data() {
        let mut controller = rainbow_controller();
        generating(&mut controller);
        controller
            .complete(Ok(EditedImage {
                image: gen1(),
                text: Some("t".to_string()),
            }))
            .unwrap();

        controller.reset().unwrap();
        assert_eq!(controller.view(), AppView::Home);
        assert_eq!(*controller.session(), SessionData::default());
        assert_eq!(controller.active_mode(), None);

        controller.select_mode(RAINBOW_MODE).unwrap();
        controller.cancel_capture().unwrap();
        assert_eq!(*controller.session(), SessionData::default());

        controller.select_mode("missing").unwrap_err();
        controller.open_settings().unwrap();
        controller.close_settings(Vec::new()).unwrap();
        assert_eq!(*controller.session(), SessionData::default());
    }

    #[test]
    fn capture_failure_returns_home_with_message() {
        let mut controller = rainbow_controller();
        controller.select_mode(RAINBOW_MODE).unwrap();

        controller
            .capture_failed("Unable to access the camera")
            .unwrap();

        assert_eq!(controller.view(), AppView::Home);
        assert_eq!(
            controller.session().error.as_deref(),
            Some("Unable to access the camera")
        );
        assert_eq!(controller.session().captured_image, None);
    }

    #[test]
    fn closing_settings_without_edits_persists_nothing() {
        let backend = MemorySettingsBackend::new();
        let mut controller = Controller::new(SettingsStore::open(backend.clone()));

        controller.open_settings().unwrap();
        controller.close_settings(Vec::new()).unwrap();

        assert_eq!(controller.view(), AppView::Home);
        assert_eq!(backend.contents(), None);
    }

    #[test]
    fn closing_settings_applies_edits_through_store() {
        let (mut controller, backend) = controller_with(&[(RAINBOW_MODE, "p", Some(ref1()))]);

        controller.open_settings().unwrap();
        controller
            .close_settings(vec![
                (
                    "sketch".to_string(),
                    ModeSettingsPatch::default()
                        .with_prompt("draw me")
                        .with_reference_image(Some(ref1())),
                ),
                (RAINBOW_MODE.to_string(), ModeSettingsPatch::default()),
            ])
            .unwrap();

        let sketch = controller.settings().get("sketch").unwrap();
        assert_eq!(sketch.prompt, "draw me");
        assert!(backend.contents().unwrap().contains("\"sketch\""));
        assert!(controller.select_mode("sketch").is_ok());
    }

    #[test]
    fn capture_revalidates_active_mode() {
        let (mut controller, _) = controller_with(&[(RAINBOW_MODE, "p", Some(ref1()))]);
        controller.select_mode(RAINBOW_MODE).unwrap();
        controller
            .settings
            .update(RAINBOW_MODE, ModeSettingsPatch::default().with_prompt(""));

        let err = controller.capture(img1()).unwrap_err();

        assert!(matches!(err, ControllerError::ModeNotConfigured { .. }));
        assert_eq!(controller.view(), AppView::Home);
        assert!(controller.session().error.is_some());
    }

    #[test]
    fn subscribers_see_every_transition_and_guard_rejection() {
        let seen: Rc<RefCell<Vec<(AppView, Option<String>)>>> = Rc::default();
        let mut controller = rainbow_controller();
        let sink = Rc::clone(&seen);
        controller.subscribe(move |snapshot| {
            sink.borrow_mut()
                .push((snapshot.view, snapshot.session.error.clone()));
        });

        controller.select_mode("missing").unwrap_err();
        controller.select_mode(RAINBOW_MODE).unwrap();
        controller.capture(img1()).unwrap();
        assert!(controller.reset().is_err());

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, AppView::Home);
        assert!(seen[0].1.is_some());
        assert_eq!(seen[1], (AppView::Camera, None));
        assert_eq!(seen[2], (AppView::Generating, None));
    }
}
