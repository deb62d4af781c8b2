use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::image_data::ImageBlob;
use crate::storage::{SettingsBackend, StorageError};

mod defaults;

pub use defaults::{default_settings, RAINBOW_MODE};

/// Mode id to its configuration. Ordered so modes list deterministically.
pub type AllSettings = BTreeMap<String, ModeSettings>;

#[derive(Debug, Error)]
enum SettingsError {
    #[error("failed to read persisted settings: {0}")]
    Read(#[source] StorageError),
    #[error("persisted settings are not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to persist settings: {0}")]
    Write(#[source] StorageError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeSettings {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, deserialize_with = "lenient_reference_image")]
    pub reference_image: Option<ImageBlob>,
}

impl ModeSettings {
    /// A mode can start a capture only with a prompt and a reference image.
    pub fn is_configured(&self) -> bool {
        !self.prompt.trim().is_empty() && self.reference_image.is_some()
    }
}

/// Partial update for [`ModeSettings`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeSettingsPatch {
    pub prompt: Option<String>,
    /// `Some(None)` clears the stored image.
    pub reference_image: Option<Option<ImageBlob>>,
}

impl ModeSettingsPatch {
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_reference_image(mut self, image: Option<ImageBlob>) -> Self {
        self.reference_image = Some(image);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.prompt.is_none() && self.reference_image.is_none()
    }

    fn apply_to(self, target: &mut ModeSettings) {
        if let Some(prompt) = self.prompt {
            target.prompt = prompt;
        }
        if let Some(reference_image) = self.reference_image {
            target.reference_image = reference_image;
        }
    }
}

impl From<ModeSettings> for ModeSettingsPatch {
    fn from(settings: ModeSettings) -> Self {
        Self {
            prompt: Some(settings.prompt),
            reference_image: Some(settings.reference_image),
        }
    }
}

/// Persisted per-mode configuration.
///
/// Reads never fail: missing or corrupt data falls back to
/// [`default_settings`]. Writes are best effort; the in-memory map is updated
/// even when persisting it fails.
pub struct SettingsStore {
    backend: Box<dyn SettingsBackend>,
    settings: AllSettings,
}

impl SettingsStore {
    pub fn open<B: SettingsBackend + 'static>(backend: B) -> Self {
        let settings = load_from(&backend);
        tracing::info!(modes = settings.len(), "loaded mode settings");
        Self {
            backend: Box::new(backend),
            settings,
        }
    }

    /// Re-reads persisted state.
    pub fn load(&self) -> AllSettings {
        load_from(self.backend.as_ref())
    }

    pub fn current(&self) -> &AllSettings {
        &self.settings
    }

    pub fn mode(&self, mode_id: &str) -> Option<&ModeSettings> {
        self.settings.get(mode_id)
    }

    pub fn update(&mut self, mode_id: &str, patch: ModeSettingsPatch) -> AllSettings {
        let entry = self.settings.entry(mode_id.to_string()).or_default();
        patch.apply_to(entry);
        tracing::debug!(
            mode = mode_id,
            configured = entry.is_configured(),
            "updated mode settings"
        );

        if let Err(err) = persist(self.backend.as_ref(), &self.settings) {
            tracing::error!(mode = mode_id, %err, "settings update kept in memory only");
        }
        self.settings.clone()
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn load_from(backend: &dyn SettingsBackend) -> AllSettings {
    match read_persisted(backend) {
        Ok(Some(settings)) => settings,
        Ok(None) => {
            tracing::info!("no persisted settings; using defaults");
            default_settings()
        }
        Err(err) => {
            tracing::warn!(%err, "discarding unreadable settings; using defaults");
            default_settings()
        }
    }
}

fn read_persisted(backend: &dyn SettingsBackend) -> Result<Option<AllSettings>, SettingsError> {
    let Some(raw) = backend.read().map_err(SettingsError::Read)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(SettingsError::Parse)
}

fn persist(backend: &dyn SettingsBackend, settings: &AllSettings) -> Result<(), SettingsError> {
    let json = serde_json::to_string(settings).map_err(SettingsError::Serialize)?;
    backend.write(&json).map_err(SettingsError::Write)
}

fn lenient_reference_image<'de, D>(deserializer: D) -> Result<Option<ImageBlob>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|data_uri| match ImageBlob::parse(&data_uri) {
        Ok(image) => Some(image),
        Err(err) => {
            tracing::warn!(%err, "dropping invalid persisted reference image");
            None
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io;
    use std::rc::Rc;

    use super::*;
    use crate::storage::MemorySettingsBackend;

    fn blob(data_uri: &str) -> ImageBlob {
        ImageBlob::parse(data_uri).expect("test data uri")
    }

    #[test]
    fn open_without_persisted_data_uses_configured_rainbow_default() {
        let store = SettingsStore::open(MemorySettingsBackend::new());
        let settings = store.load();

        let rainbow = settings.get(RAINBOW_MODE).expect("rainbow default");
        assert!(!rainbow.prompt.is_empty());
        assert!(rainbow.reference_image.is_some());
        assert!(rainbow.is_configured());
        assert_eq!(store.current(), &settings);
    }

    #[test]
    fn corrupt_persisted_data_falls_back_to_defaults() {
        let store = SettingsStore::open(MemorySettingsBackend::with_contents("{oops"));
        assert_eq!(store.current(), &default_settings());
    }

    #[test]
    fn update_of_unknown_mode_merges_patch_into_empty_baseline() {
        let backend = MemorySettingsBackend::new();
        let mut store = SettingsStore::open(backend.clone());

        store.update("sketch", ModeSettingsPatch::default().with_prompt("draw it"));
        let loaded = store.load();

        assert_eq!(
            loaded.get("sketch"),
            Some(&ModeSettings {
                prompt: "draw it".to_string(),
                reference_image: None,
            })
        );
        assert!(loaded.contains_key(RAINBOW_MODE));
    }

    #[test]
    fn update_with_empty_patch_creates_empty_entry() {
        let mut store = SettingsStore::open(MemorySettingsBackend::new());
        let settings = store.update("blank", ModeSettingsPatch::default());
        assert_eq!(settings.get("blank"), Some(&ModeSettings::default()));
        assert_eq!(store.load().get("blank"), Some(&ModeSettings::default()));
    }

    #[test]
    fn update_then_load_round_trips_prompt_and_exact_image_uri() {
        let mut store = SettingsStore::open(MemorySettingsBackend::new());
        store.update(
            "rainbow",
            ModeSettingsPatch::default()
                .with_prompt("X")
                .with_reference_image(Some(blob("data:image/png;base64,Y"))),
        );

        let loaded = store.load();
        let rainbow = loaded.get("rainbow").unwrap();
        assert_eq!(rainbow.prompt, "X");
        assert_eq!(
            rainbow.reference_image.as_ref().map(ImageBlob::to_data_uri),
            Some("data:image/png;base64,Y".to_string())
        );
    }

    #[test]
    fn partial_patch_keeps_untouched_fields() {
        let mut store = SettingsStore::open(MemorySettingsBackend::new());
        let before = store.mode(RAINBOW_MODE).cloned().unwrap();

        store.update(RAINBOW_MODE, ModeSettingsPatch::default().with_prompt("new"));

        let after = store.mode(RAINBOW_MODE).unwrap();
        assert_eq!(after.prompt, "new");
        assert_eq!(after.reference_image, before.reference_image);
    }

    #[test]
    fn patch_can_clear_reference_image() {
        let mut store = SettingsStore::open(MemorySettingsBackend::new());
        store.update(
            RAINBOW_MODE,
            ModeSettingsPatch::default().with_reference_image(None),
        );
        assert!(store.mode(RAINBOW_MODE).unwrap().reference_image.is_none());
        assert!(!store.mode(RAINBOW_MODE).unwrap().is_configured());
    }

    #[derive(Clone, Default)]
    struct ReadOnlyBackend {
        write_attempts: Rc<Cell<usize>>,
    }

    impl SettingsBackend for ReadOnlyBackend {
        fn read(&self) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn write(&self, _contents: &str) -> Result<(), StorageError> {
            self.write_attempts.set(self.write_attempts.get() + 1);
            Err(StorageError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only settings file",
            )))
        }
    }

    #[test]
    fn failed_write_still_updates_memory() {
        let backend = ReadOnlyBackend::default();
        let mut store = SettingsStore::open(backend.clone());

        let returned = store.update("offline", ModeSettingsPatch::default().with_prompt("p"));

        assert_eq!(returned.get("offline").unwrap().prompt, "p");
        assert_eq!(store.mode("offline").unwrap().prompt, "p");
        assert_eq!(backend.write_attempts.get(), 1);
        assert!(!store.load().contains_key("offline"));
    }

    #[test]
    fn every_update_persists_the_full_map() {
        let backend = MemorySettingsBackend::new();
        let mut store = SettingsStore::open(backend.clone());
        store.update("a", ModeSettingsPatch::default().with_prompt("1"));
        store.update("b", ModeSettingsPatch::default().with_prompt("2"));

        let persisted: serde_json::Value =
            serde_json::from_str(&backend.contents().unwrap()).unwrap();
        let keys: Vec<&str> = persisted
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["a", "b", RAINBOW_MODE]);
        assert_eq!(persisted["a"]["referenceImage"], serde_json::Value::Null);
        assert_eq!(persisted["b"]["prompt"], "2");
    }

    #[test]
    fn invalid_persisted_image_is_dropped_without_losing_other_modes() {
        let backend = MemorySettingsBackend::with_contents(
            r#"{
                "rainbow": {"prompt": "p", "referenceImage": "not-a-data-uri"},
                "neon": {"prompt": "q", "referenceImage": "data:image/jpeg;base64,AAAA"}
            }"#,
        );
        let store = SettingsStore::open(backend);

        let rainbow = store.mode("rainbow").unwrap();
        assert_eq!(rainbow.prompt, "p");
        assert!(rainbow.reference_image.is_none());
        assert!(store.mode("neon").unwrap().is_configured());
    }

    #[test]
    fn whitespace_prompt_is_not_configured() {
        let settings = ModeSettings {
            prompt: "   ".to_string(),
            reference_image: Some(blob("data:image/png;base64,AAAA")),
        };
        assert!(!settings.is_configured());
    }
}
