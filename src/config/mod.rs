use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::image_data::DEFAULT_MAX_IMAGE_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPathError {
    MissingHomeDirectory,
}

pub(crate) const APP_DIR: &str = "nano-imager";
const APP_CONFIG_FILE: &str = "config.json";
const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub(crate) const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub(crate) const DEFAULT_TRANSLATE_MODEL: &str = "gemini-2.5-flash";
pub(crate) const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

/// Application-level settings from `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AppConfig {
    #[serde(default)]
    pub(crate) api_key: Option<String>,
    #[serde(default)]
    pub(crate) api_base_url: Option<String>,
    #[serde(default)]
    pub(crate) translate_model: Option<String>,
    #[serde(default)]
    pub(crate) edit_model: Option<String>,
    #[serde(default)]
    pub(crate) translate_prompts: Option<bool>,
    #[serde(default)]
    pub(crate) request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub(crate) camera_device: Option<String>,
    /// Grabber argv; `{device}` and `{output}` are substituted.
    #[serde(default)]
    pub(crate) camera_command: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) max_image_bytes: Option<usize>,
}

impl AppConfig {
    pub(crate) fn resolved_api_key(&self) -> Option<String> {
        resolve_api_key(std::env::var(API_KEY_ENV).ok(), self.api_key.as_deref())
    }

    pub(crate) fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub(crate) fn translate_model(&self) -> &str {
        self.translate_model
            .as_deref()
            .unwrap_or(DEFAULT_TRANSLATE_MODEL)
    }

    pub(crate) fn edit_model(&self) -> &str {
        self.edit_model.as_deref().unwrap_or(DEFAULT_EDIT_MODEL)
    }

    pub(crate) fn translate_prompts(&self) -> bool {
        self.translate_prompts.unwrap_or(true)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        let secs = self
            .request_timeout_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub(crate) fn camera_device(&self) -> PathBuf {
        PathBuf::from(
            self.camera_device
                .as_deref()
                .unwrap_or(DEFAULT_CAMERA_DEVICE),
        )
    }

    pub(crate) fn camera_command(&self) -> Option<&[String]> {
        self.camera_command
            .as_deref()
            .filter(|argv| !argv.is_empty())
    }

    pub(crate) fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_MAX_IMAGE_BYTES)
    }
}

fn resolve_api_key(env_value: Option<String>, configured: Option<&str>) -> Option<String> {
    env_value
        .filter(|key| !key.trim().is_empty())
        .or_else(|| {
            configured
                .filter(|key| !key.trim().is_empty())
                .map(str::to_string)
        })
}

pub(crate) fn load_app_config() -> AppConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_app_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_app_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> AppConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return AppConfig::default(),
    };
    if !path.exists() {
        return AppConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            AppConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn data_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_DATA_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = xdg_root(xdg_config_home, home, ".config")?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

pub(crate) fn app_data_path(
    app_dir: &str,
    file_name: &str,
    xdg_data_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = xdg_root(xdg_data_home, home, ".local/share")?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn xdg_root(
    xdg_home: Option<&Path>,
    home: Option<&Path>,
    home_fallback: &str,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(home_fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_config_path_prefers_xdg_config_home() {
        let path = app_config_path(
            "nano-imager",
            "config.json",
            Some(Path::new("/tmp/config-root")),
            Some(Path::new("/tmp/home")),
        )
        .expect("path should resolve");

        assert_eq!(
            path,
            PathBuf::from("/tmp/config-root/nano-imager/config.json")
        );
    }

    #[test]
    fn app_config_path_falls_back_to_home_dot_config() {
        let path = app_config_path(
            "nano-imager",
            "config.json",
            None,
            Some(Path::new("/tmp/home")),
        )
        .expect("path should resolve");

        assert_eq!(
            path,
            PathBuf::from("/tmp/home/.config/nano-imager/config.json")
        );
    }

    #[test]
    fn app_data_path_falls_back_to_local_share() {
        let path = app_data_path(
            "nano-imager",
            "nano-banana-settings.json",
            Some(Path::new("")),
            Some(Path::new("/tmp/home")),
        )
        .expect("path should resolve");

        assert_eq!(
            path,
            PathBuf::from("/tmp/home/.local/share/nano-imager/nano-banana-settings.json")
        );
    }

    #[test]
    fn app_config_path_errors_when_home_missing_and_xdg_unset() {
        let error = app_config_path("nano-imager", "config.json", None, None).unwrap_err();
        assert_eq!(error, ConfigPathError::MissingHomeDirectory);
    }

    #[test]
    fn load_app_config_reads_partial_json_and_defaults_the_rest() {
        let root = std::env::temp_dir().join(format!(
            "nano-imager-config-test-{}",
            std::process::id()
        ));
        let dir = root.join(APP_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(APP_CONFIG_FILE),
            r#"{"edit_model":"custom-edit","request_timeout_secs":15,"translate_prompts":false}"#,
        )
        .unwrap();

        let config = load_app_config_with(Some(&root), None);
        assert_eq!(config.edit_model(), "custom-edit");
        assert_eq!(config.translate_model(), DEFAULT_TRANSLATE_MODEL);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert!(!config.translate_prompts());
        assert_eq!(config.max_image_bytes(), DEFAULT_MAX_IMAGE_BYTES);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn load_app_config_uses_defaults_for_malformed_json() {
        let root = std::env::temp_dir().join(format!(
            "nano-imager-config-bad-{}",
            std::process::id()
        ));
        let dir = root.join(APP_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(APP_CONFIG_FILE), "{not json").unwrap();

        let config = load_app_config_with(Some(&root), None);
        assert_eq!(config.api_base_url(), DEFAULT_API_BASE_URL);
        assert_eq!(
            config.request_timeout(),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn api_key_prefers_environment_over_config() {
        assert_eq!(
            resolve_api_key(Some("env-key".to_string()), Some("file-key")),
            Some("env-key".to_string())
        );
        assert_eq!(
            resolve_api_key(Some("  ".to_string()), Some("file-key")),
            Some("file-key".to_string())
        );
        assert_eq!(resolve_api_key(None, Some("")), None);
    }
}
