use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::capture::CameraLifecycle;
use crate::controller::{Controller, Snapshot};
use crate::error::AppResult;
use crate::state::AppView;
use crate::ui::{DEFAULT_COLORS, LAYOUT_TOKENS};
use gtk4::prelude::*;
use gtk4::{Application, ApplicationWindow};

mod actions;
mod bootstrap;
mod pages;
mod runtime_css;
mod settings_draft;
mod toast;
mod view_model;
mod worker;

use self::actions::*;
use self::bootstrap::*;
use self::pages::AppPages;
use self::runtime_css::install_runtime_css;
use self::toast::ToastRuntime;
use self::view_model::ScreenModel;

const APPLICATION_ID: &str = "io.github.nano_imager.NanoImager";

pub struct App {
    last_view: AppView,
}

impl App {
    pub fn new() -> Self {
        Self {
            last_view: AppView::default(),
        }
    }

    pub fn start(&mut self) -> AppResult<()> {
        let runtime = bootstrap_app_runtime()?;
        let runtime_slot = Rc::new(RefCell::new(Some(runtime)));
        let last_view = Rc::new(Cell::new(self.last_view));
        let last_view_for_activate = last_view.clone();

        tracing::info!("starting gtk runtime");
        let application = Application::new(
            Some(APPLICATION_ID),
            gtk4::gio::ApplicationFlags::NON_UNIQUE,
        );
        let activate_once = Rc::new(Cell::new(false));

        application.connect_activate(move |app| {
            if activate_once.replace(true) {
                tracing::debug!("ignoring duplicate gtk activate signal");
                return;
            }
            let Some(runtime) = runtime_slot.borrow_mut().take() else {
                tracing::error!("runtime already consumed before activation");
                return;
            };
            activate(app, runtime, last_view_for_activate.clone());
        });

        let gtk_args = gtk_launch_args();
        application.run_with_args(&gtk_args);

        self.last_view = last_view.get();
        Ok(())
    }

    /// The view shown when the window closed.
    pub fn last_view(&self) -> AppView {
        self.last_view
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

fn activate(app: &Application, runtime: AppRuntime, last_view: Rc<Cell<AppView>>) {
    let style_tokens = LAYOUT_TOKENS;
    let motion_enabled = gtk4::Settings::default()
        .map(|settings| settings.is_gtk_enable_animations())
        .unwrap_or(true);
    install_runtime_css(style_tokens, &DEFAULT_COLORS, motion_enabled);

    let window = ApplicationWindow::new(app);
    window.add_css_class("nano-imager-root");
    window.set_title(Some("Nano Imager"));
    window.set_default_size(
        style_tokens.window_default_width,
        style_tokens.window_default_height,
    );

    let pages = AppPages::build(style_tokens);
    window.set_child(Some(&pages.root));
    pages
        .camera
        .set_device(&runtime.camera_device.display().to_string());

    let toast = ToastRuntime::new(&pages.toast_label, style_tokens.toast_duration_ms);
    let controller: SharedController = Rc::new(RefCell::new(runtime.controller));
    let camera: SharedCamera = Rc::new(RefCell::new(CameraLifecycle::new(runtime.camera)));

    let render = snapshot_renderer(
        pages.clone(),
        toast.clone(),
        camera.clone(),
        Rc::downgrade(&controller),
        last_view,
    );
    {
        let render = render.clone();
        controller
            .borrow_mut()
            .subscribe(move |snapshot| render(snapshot));
    }

    let executor = ActionExecutor::new(
        controller.clone(),
        camera,
        Rc::new(runtime.storage),
        runtime.edit_service,
        toast,
        pages.camera.clone(),
        runtime.max_image_bytes,
    );
    connect_page_actions(&window, &pages, &executor);

    {
        let executor = executor.clone();
        let controller = controller.clone();
        window.connect_close_request(move |_| {
            tracing::info!(
                recent_transitions = controller.borrow().state().history().len(),
                "closing main window"
            );
            executor.shutdown();
            gtk4::glib::Propagation::Proceed
        });
    }

    let initial = controller.borrow().snapshot();
    render(&initial);

    tracing::info!("presenting main window");
    window.present();
}

/// Builds the subscriber that redraws the window and keeps the camera
/// session in step with the current view.
///
/// It never borrows the controller directly: snapshots arrive while the
/// controller is mutably borrowed. Follow-up transitions are deferred to an
/// idle callback.
fn snapshot_renderer(
    pages: AppPages,
    toast: ToastRuntime,
    camera: SharedCamera,
    controller: Weak<RefCell<Controller>>,
    last_view: Rc<Cell<AppView>>,
) -> Rc<dyn Fn(&Snapshot)> {
    Rc::new(move |snapshot: &Snapshot| {
        last_view.set(snapshot.view);
        let model = ScreenModel::from_snapshot(snapshot);
        pages.render(&model, &snapshot.settings);
        if let Some(error) = &model.error {
            toast.show_error(error.clone());
        }

        let synced = camera.borrow_mut().sync(snapshot.view);
        if let Err(err) = synced {
            tracing::warn!(%err, "camera session unavailable");
            let controller = controller.clone();
            let message = capture_failure_message(&err);
            gtk4::glib::idle_add_local_once(move || {
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                let result = controller.borrow_mut().capture_failed(message);
                if let Err(err) = result {
                    tracing::debug!(%err, "camera failure arrived after leaving camera view");
                }
            });
        }
    })
}
