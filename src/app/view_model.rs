use crate::controller::Snapshot;
use crate::image_data::ImageBlob;
use crate::settings::RAINBOW_MODE;
use crate::state::AppView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ModeTile {
    pub(super) id: String,
    pub(super) label: String,
    pub(super) configured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ResultModel {
    pub(super) image: ImageBlob,
    pub(super) caption: Option<String>,
}

/// What the window shows for one controller snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ScreenModel {
    pub(super) view: AppView,
    pub(super) modes: Vec<ModeTile>,
    pub(super) error: Option<String>,
    pub(super) camera_title: String,
    pub(super) generating_caption: String,
    pub(super) result: Option<ResultModel>,
}

impl ScreenModel {
    pub(super) fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut modes: Vec<ModeTile> = snapshot
            .settings
            .iter()
            .map(|(id, settings)| ModeTile {
                id: id.clone(),
                label: mode_label(id),
                configured: settings.is_configured(),
            })
            .collect();
        if !snapshot.settings.contains_key(RAINBOW_MODE) {
            modes.insert(
                0,
                ModeTile {
                    id: RAINBOW_MODE.to_string(),
                    label: mode_label(RAINBOW_MODE),
                    configured: false,
                },
            );
        }

        let active_label = snapshot
            .active_mode
            .as_deref()
            .map(mode_label)
            .unwrap_or_default();
        let camera_title = if active_label.is_empty() {
            "Take a photo".to_string()
        } else {
            format!("{active_label}: take a photo")
        };

        let result = match snapshot.view {
            AppView::Result => snapshot
                .session
                .generated_image
                .clone()
                .map(|image| ResultModel {
                    image,
                    caption: snapshot
                        .session
                        .generated_text
                        .as_deref()
                        .map(str::trim)
                        .filter(|text| !text.is_empty())
                        .map(str::to_string),
                }),
            _ => None,
        };

        Self {
            view: snapshot.view,
            modes,
            error: match snapshot.view {
                AppView::Home => snapshot.session.error.clone(),
                _ => None,
            },
            camera_title,
            generating_caption: "Generating your image...".to_string(),
            result,
        }
    }

    pub(super) fn page_name(&self) -> &'static str {
        self.view.as_str()
    }
}

/// `rainbow` becomes `Rainbow`, `neon-sign` becomes `Neon Sign`.
pub(super) fn mode_label(mode_id: &str) -> String {
    mode_id
        .split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
