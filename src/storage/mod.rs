use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{app_data_path, data_env_dirs, ConfigPathError, APP_DIR};
use crate::image_data::{ImageBlob, ImageDataError};
use thiserror::Error;

pub const SETTINGS_NAMESPACE: &str = "nano-banana-settings";

const DEFAULT_TEMP_PREFIX: &str = "capture_";
const PICTURES_SUBDIR: &str = "Pictures";
const RESULT_FILE_PREFIX: &str = "nano-imager-";
const DEFAULT_FALLBACK_TEMP_DIR: &str = "/tmp/nano-imager";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("missing HOME environment variable")]
    MissingHomeDirectory,
    #[error("capture id is empty")]
    MissingCaptureId,
    #[error("image data error: {0}")]
    ImageData(#[from] ImageDataError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl From<ConfigPathError> for StorageError {
    fn from(err: ConfigPathError) -> Self {
        match err {
            ConfigPathError::MissingHomeDirectory => Self::MissingHomeDirectory,
        }
    }
}

/// Where the serialized settings map lives.
pub trait SettingsBackend {
    /// `Ok(None)` when nothing has been persisted yet.
    fn read(&self) -> StorageResult<Option<String>>;
    fn write(&self, contents: &str) -> StorageResult<()>;
}

#[derive(Debug, Clone)]
pub struct FileSettingsBackend {
    path: PathBuf,
}

impl FileSettingsBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn with_default_path() -> StorageResult<Self> {
        let (xdg_data_home, home) = data_env_dirs();
        let path = app_data_path(
            APP_DIR,
            &format!("{SETTINGS_NAMESPACE}.json"),
            xdg_data_home.as_deref(),
            home.as_deref(),
        )?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsBackend for FileSettingsBackend {
    fn read(&self) -> StorageResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn write(&self, contents: &str) -> StorageResult<()> {
        write_atomically(&self.path, contents.as_bytes())
    }
}

/// Process-local backend; clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsBackend {
    contents: Rc<RefCell<Option<String>>>,
}

impl MemorySettingsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        let backend = Self::default();
        backend.contents.replace(Some(contents.into()));
        backend
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.borrow().clone()
    }
}

impl SettingsBackend for MemorySettingsBackend {
    fn read(&self) -> StorageResult<Option<String>> {
        Ok(self.contents.borrow().clone())
    }

    fn write(&self, contents: &str) -> StorageResult<()> {
        self.contents.replace(Some(contents.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PruneReport {
    pub removed_files: usize,
}

#[derive(Debug, Clone)]
pub struct StorageService {
    temp_dir: PathBuf,
    pictures_dir: PathBuf,
}

impl StorageService {
    pub const fn with_paths(temp_dir: PathBuf, pictures_dir: PathBuf) -> Self {
        Self {
            temp_dir,
            pictures_dir,
        }
    }

    pub fn with_default_paths() -> StorageResult<Self> {
        let home = std::env::var("HOME").map_err(|_| StorageError::MissingHomeDirectory)?;
        let temp_dir = default_runtime_temp_dir();

        let mut pictures_dir = PathBuf::from(home);
        pictures_dir.push(PICTURES_SUBDIR);

        fs::create_dir_all(&temp_dir)?;
        fs::create_dir_all(&pictures_dir)?;

        Ok(Self::with_paths(temp_dir, pictures_dir))
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn pictures_dir(&self) -> &Path {
        &self.pictures_dir
    }

    pub fn temp_path_for_capture(&self, capture_id: &str) -> StorageResult<PathBuf> {
        if capture_id.is_empty() {
            return Err(StorageError::MissingCaptureId);
        }
        let mut path = self.temp_dir.clone();
        path.push(format!("{DEFAULT_TEMP_PREFIX}{capture_id}.jpg"));
        Ok(path)
    }

    /// Writes a generated image into the pictures directory and returns its path.
    pub fn save_generated(&self, image: &ImageBlob) -> StorageResult<PathBuf> {
        let bytes = image.decode()?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis();
        let mut target = self.pictures_dir.clone();
        target.push(format!(
            "{RESULT_FILE_PREFIX}{millis}.{}",
            image.file_extension()
        ));
        write_atomically(&target, &bytes)?;
        tracing::info!(path = %target.display(), bytes = bytes.len(), "saved generated image");
        Ok(target)
    }

    pub fn prune_stale_temp_files(&self, max_age_hours: u64) -> StorageResult<PruneReport> {
        let now = SystemTime::now();
        let mut report = PruneReport::default();
        let max_age = Duration::from_secs(max_age_hours.saturating_mul(60 * 60));

        if !self.temp_dir.exists() {
            return Ok(report);
        }

        for entry in fs::read_dir(&self.temp_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_none_or(|name| !name.starts_with(DEFAULT_TEMP_PREFIX))
            {
                continue;
            }

            let modified = fs::metadata(&path)?.modified()?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);

            if age > max_age {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        report.removed_files += 1;
                    }
                    Err(err) => {
                        tracing::warn!(
                            path = %path.display(),
                            ?err,
                            "failed to remove stale temp capture file"
                        );
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Writes to a sibling temp file and renames it over `destination`.
fn write_atomically(destination: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut staging = destination.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    if let Err(err) = fs::write(&staging, bytes) {
        let _ = fs::remove_file(&staging);
        return Err(StorageError::Io(err));
    }
    if let Err(err) = fs::rename(&staging, destination) {
        let _ = fs::remove_file(&staging);
        return Err(StorageError::Io(err));
    }
    Ok(())
}

fn default_runtime_temp_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(|dir| PathBuf::from(dir).join(APP_DIR))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_FALLBACK_TEMP_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "nano-imager-storage-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn temp_path_for_capture_uses_prefix_and_rejects_empty_id() {
        let service =
            StorageService::with_paths(PathBuf::from("/tmp"), PathBuf::from("/home/test/Pictures"));
        let path = service.temp_path_for_capture("abc").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/capture_abc.jpg"));
        assert!(matches!(
            service.temp_path_for_capture(""),
            Err(StorageError::MissingCaptureId)
        ));
    }

    #[test]
    fn file_backend_reports_missing_file_as_none() {
        let dir = scratch_dir("missing");
        let backend = FileSettingsBackend::new(dir.join("settings.json"));
        assert!(backend.read().unwrap().is_none());
    }

    #[test]
    fn file_backend_write_creates_parent_and_replaces_contents() {
        let dir = scratch_dir("atomic");
        let backend = FileSettingsBackend::new(dir.join("nested").join("settings.json"));

        backend.write("{\"a\":1}").unwrap();
        backend.write("{\"b\":2}").unwrap();

        assert_eq!(backend.read().unwrap().as_deref(), Some("{\"b\":2}"));
        let leftovers = fs::read_dir(dir.join("nested"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn memory_backend_shares_state_between_clones() {
        let backend = MemorySettingsBackend::new();
        let observer = backend.clone();
        assert_eq!(observer.read().unwrap(), None);

        backend.write("one").unwrap();
        assert_eq!(observer.contents().as_deref(), Some("one"));
        backend.write("two").unwrap();
        assert_eq!(observer.read().unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn save_generated_writes_decoded_bytes_with_mime_extension() {
        let dir = scratch_dir("results");
        let service = StorageService::with_paths(dir.join("tmp"), dir.join("Pictures"));
        let image = ImageBlob::parse("data:image/png;base64,aGVsbG8=").unwrap();

        let path = service.save_generated(&image).unwrap();
        assert!(path.starts_with(dir.join("Pictures")));
        assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("png"));
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn prune_stale_temp_files_only_touches_capture_prefix() {
        let dir = scratch_dir("prune");
        fs::create_dir_all(&dir).unwrap();
        let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 60 * 60);
        for name in ["capture_old.jpg", "keep.txt"] {
            fs::write(dir.join(name), b"x").unwrap();
            fs::File::options()
                .write(true)
                .open(dir.join(name))
                .unwrap()
                .set_modified(two_hours_ago)
                .unwrap();
        }
        fs::write(dir.join("capture_fresh.jpg"), b"x").unwrap();
        let service = StorageService::with_paths(dir.clone(), dir.join("Pictures"));

        let report = service.prune_stale_temp_files(1).unwrap();
        assert_eq!(report.removed_files, 1);
        assert!(!dir.join("capture_old.jpg").exists());
        assert!(dir.join("capture_fresh.jpg").exists());
        assert!(dir.join("keep.txt").exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
