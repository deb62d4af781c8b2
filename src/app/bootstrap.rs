use std::path::PathBuf;
use std::sync::Arc;

use crate::capture::SystemCameraBackend;
use crate::config::{load_app_config, AppConfig};
use crate::controller::Controller;
use crate::error::AppResult;
use crate::service::{EditPipeline, EditService, GeminiBackend, GeminiOptions};
use crate::settings::SettingsStore;
use crate::storage::{FileSettingsBackend, MemorySettingsBackend, StorageService};

const STALE_TEMP_MAX_AGE_HOURS: u64 = 24;

pub(super) struct AppRuntime {
    pub(super) controller: Controller,
    pub(super) storage: StorageService,
    pub(super) edit_service: Arc<dyn EditService>,
    pub(super) camera: SystemCameraBackend,
    pub(super) camera_device: PathBuf,
    pub(super) max_image_bytes: usize,
}

pub(super) fn bootstrap_app_runtime() -> AppResult<AppRuntime> {
    let config = load_app_config();
    let storage = StorageService::with_default_paths()?;
    prune_stale_capture_temp_files(&storage);

    let controller = Controller::new(open_settings_store());
    let edit_service = build_edit_service(&config)?;
    let camera_device = config.camera_device();
    let camera = SystemCameraBackend::new(
        camera_device.clone(),
        config.camera_command().map(<[String]>::to_vec),
    );

    tracing::info!(
        device = %camera_device.display(),
        pictures = %storage.pictures_dir().display(),
        translate_prompts = config.translate_prompts(),
        "runtime bootstrapped"
    );
    Ok(AppRuntime {
        controller,
        storage,
        edit_service,
        camera,
        camera_device,
        max_image_bytes: config.max_image_bytes(),
    })
}

fn open_settings_store() -> SettingsStore {
    match FileSettingsBackend::with_default_path() {
        Ok(backend) => {
            tracing::debug!(path = %backend.path().display(), "using settings file");
            SettingsStore::open(backend)
        }
        Err(err) => {
            tracing::warn!(?err, "settings file unavailable; settings will not persist");
            SettingsStore::open(MemorySettingsBackend::new())
        }
    }
}

fn build_edit_service(config: &AppConfig) -> AppResult<Arc<dyn EditService>> {
    let backend = GeminiBackend::new(GeminiOptions::from_config(config))?;
    let pipeline = EditPipeline::new(backend).with_translation(config.translate_prompts());
    Ok(Arc::new(pipeline))
}

fn prune_stale_capture_temp_files(storage: &StorageService) {
    match storage.prune_stale_temp_files(STALE_TEMP_MAX_AGE_HOURS) {
        Ok(report) if report.removed_files > 0 => {
            tracing::info!(
                removed_files = report.removed_files,
                "pruned stale capture temp files"
            );
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(
                max_age_hours = STALE_TEMP_MAX_AGE_HOURS,
                ?err,
                "failed to prune stale capture temp files"
            );
        }
    }
}

/// Only argv[0] goes to GTK; the app takes no flags of its own.
pub(super) fn gtk_launch_args() -> Vec<String> {
    std::env::args().take(1).collect()
}
