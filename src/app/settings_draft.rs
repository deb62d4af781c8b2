use std::collections::BTreeSet;

use crate::image_data::ImageBlob;
use crate::settings::{AllSettings, ModeSettings, ModeSettingsPatch, RAINBOW_MODE};

static EMPTY_MODE: ModeSettings = ModeSettings {
    prompt: String::new(),
    reference_image: None,
};

/// Unsaved edits made on the Settings page.
///
/// Nothing here touches the settings store; [`SettingsDraft::into_edits`]
/// produces the patches handed to the controller on save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SettingsDraft {
    modes: AllSettings,
    dirty: BTreeSet<String>,
    selected: String,
}

impl SettingsDraft {
    pub(super) fn new(settings: &AllSettings) -> Self {
        let mut modes = settings.clone();
        let selected = if modes.contains_key(RAINBOW_MODE) || modes.is_empty() {
            RAINBOW_MODE.to_string()
        } else {
            modes.keys().next().cloned().unwrap_or_default()
        };
        modes.entry(selected.clone()).or_default();
        Self {
            modes,
            dirty: BTreeSet::new(),
            selected,
        }
    }

    pub(super) fn mode_ids(&self) -> Vec<String> {
        self.modes.keys().cloned().collect()
    }

    pub(super) fn selected(&self) -> &str {
        &self.selected
    }

    pub(super) fn selected_index(&self) -> usize {
        self.modes
            .keys()
            .position(|id| *id == self.selected)
            .unwrap_or(0)
    }

    pub(super) fn selected_settings(&self) -> &ModeSettings {
        self.modes.get(&self.selected).unwrap_or(&EMPTY_MODE)
    }

    pub(super) fn select(&mut self, mode_id: &str) {
        self.modes.entry(mode_id.to_string()).or_default();
        self.selected = mode_id.to_string();
    }

    /// Adds and selects a new mode. Returns false for blank or duplicate ids.
    pub(super) fn add_mode(&mut self, mode_id: &str) -> bool {
        let mode_id = mode_id.trim();
        if mode_id.is_empty() || self.modes.contains_key(mode_id) {
            return false;
        }
        self.select(mode_id);
        self.dirty.insert(mode_id.to_string());
        true
    }

    pub(super) fn set_prompt(&mut self, prompt: &str) {
        let entry = self.modes.entry(self.selected.clone()).or_default();
        if entry.prompt != prompt {
            entry.prompt = prompt.to_string();
            self.dirty.insert(self.selected.clone());
        }
    }

    pub(super) fn set_reference_image(&mut self, image: Option<ImageBlob>) {
        let entry = self.modes.entry(self.selected.clone()).or_default();
        if entry.reference_image != image {
            entry.reference_image = image;
            self.dirty.insert(self.selected.clone());
        }
    }

    pub(super) fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub(super) fn into_edits(self) -> Vec<(String, ModeSettingsPatch)> {
        let Self {
            mut modes, dirty, ..
        } = self;
        dirty
            .into_iter()
            .filter_map(|id| {
                let settings = modes.remove(&id)?;
                Some((id, ModeSettingsPatch::from(settings)))
            })
            .collect()
    }
}
