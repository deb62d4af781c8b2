use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gtk4::prelude::*;
use gtk4::{
    Align, Box as GtkBox, Button, DropDown, Entry, Label, Orientation, Overlay, Picture,
    ScrolledWindow, Spinner, Stack, StackTransitionType, StringList, TextView, WrapMode,
};

use crate::image_data::ImageBlob;
use crate::settings::{AllSettings, ModeSettingsPatch};
use crate::state::AppView;
use crate::ui::StyleTokens;

use super::settings_draft::SettingsDraft;
use super::view_model::ScreenModel;

type ModeSelectHandler = Rc<dyn Fn(String)>;

fn page_box(tokens: StyleTokens, css_class: &str) -> GtkBox {
    let root = GtkBox::new(Orientation::Vertical, tokens.spacing_12);
    root.set_margin_top(tokens.spacing_16);
    root.set_margin_bottom(tokens.spacing_16);
    root.set_margin_start(tokens.spacing_16);
    root.set_margin_end(tokens.spacing_16);
    root.add_css_class("page");
    root.add_css_class(css_class);
    root
}

fn page_title(text: &str) -> Label {
    let label = Label::new(Some(text));
    label.add_css_class("page-title");
    label.set_halign(Align::Start);
    label.set_xalign(0.0);
    label
}

fn section_label(text: &str) -> Label {
    let label = Label::new(Some(text));
    label.add_css_class("section-title");
    label.set_halign(Align::Start);
    label.set_xalign(0.0);
    label
}

fn primary_button(label: &str) -> Button {
    let button = Button::with_label(label);
    button.add_css_class("primary-button");
    button.set_hexpand(true);
    button
}

fn secondary_button(label: &str) -> Button {
    let button = Button::with_label(label);
    button.add_css_class("secondary-button");
    button.set_hexpand(true);
    button
}

fn button_row(tokens: StyleTokens, buttons: &[&Button]) -> GtkBox {
    let row = GtkBox::new(Orientation::Horizontal, tokens.spacing_8);
    for button in buttons {
        row.append(*button);
    }
    row
}

fn clear_children(container: &GtkBox) {
    while let Some(child) = container.first_child() {
        container.remove(&child);
    }
}

/// Decodes an image blob into a texture. SVG support depends on the
/// installed gdk-pixbuf loaders.
pub(super) fn texture_for(image: &ImageBlob) -> Option<gtk4::gdk::Texture> {
    let bytes = match image.decode() {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(%err, "image payload is not decodable");
            return None;
        }
    };
    let loader = gtk4::gdk_pixbuf::PixbufLoader::new();
    let written = loader.write(&bytes);
    let closed = loader.close();
    if let Err(err) = written.and(closed) {
        tracing::warn!(
            mime_type = image.mime_type(),
            ?err,
            "failed to load image for display"
        );
        return None;
    }
    loader
        .pixbuf()
        .map(|pixbuf| gtk4::gdk::Texture::for_pixbuf(&pixbuf))
}

fn show_image(picture: &Picture, image: Option<&ImageBlob>) -> bool {
    match image.and_then(texture_for) {
        Some(texture) => {
            picture.set_paintable(Some(&texture));
            true
        }
        None => {
            picture.set_paintable(None::<&gtk4::gdk::Paintable>);
            false
        }
    }
}

#[derive(Clone)]
pub(super) struct HomePage {
    pub(super) root: GtkBox,
    modes_box: GtkBox,
    error_label: Label,
    pub(super) settings_button: Button,
    on_select: Rc<RefCell<Option<ModeSelectHandler>>>,
}

impl HomePage {
    fn build(tokens: StyleTokens) -> Self {
        let root = page_box(tokens, "home-page");

        let title = page_title("Nano Imager");
        let subtitle = Label::new(Some("Pick a mode, take a photo, get an edited image."));
        subtitle.add_css_class("page-subtitle");
        subtitle.set_halign(Align::Start);
        subtitle.set_wrap(true);

        let modes_box = GtkBox::new(Orientation::Vertical, tokens.spacing_8);
        modes_box.add_css_class("mode-list");
        let scroller = ScrolledWindow::new();
        scroller.set_vexpand(true);
        scroller.set_child(Some(&modes_box));

        let error_label = Label::new(None);
        error_label.add_css_class("error-banner");
        error_label.set_wrap(true);
        error_label.set_xalign(0.0);
        error_label.set_visible(false);

        let settings_button = secondary_button("Settings");

        root.append(&title);
        root.append(&subtitle);
        root.append(&section_label("Modes"));
        root.append(&scroller);
        root.append(&error_label);
        root.append(&settings_button);

        Self {
            root,
            modes_box,
            error_label,
            settings_button,
            on_select: Rc::new(RefCell::new(None)),
        }
    }

    pub(super) fn set_select_handler(&self, handler: impl Fn(String) + 'static) {
        self.on_select.replace(Some(Rc::new(handler)));
    }

    fn render(&self, model: &ScreenModel) {
        clear_children(&self.modes_box);
        for tile in &model.modes {
            let button = Button::with_label(&tile.label);
            button.add_css_class("mode-button");
            if !tile.configured {
                button.add_css_class("mode-unconfigured");
                button.set_tooltip_text(Some("Needs a prompt and a reference image"));
            }
            let on_select = self.on_select.clone();
            let mode_id = tile.id.clone();
            button.connect_clicked(move |_| {
                let handler = on_select.borrow().clone();
                if let Some(handler) = handler {
                    handler(mode_id.clone());
                }
            });
            self.modes_box.append(&button);
        }

        match &model.error {
            Some(error) => {
                self.error_label.set_text(error);
                self.error_label.set_visible(true);
            }
            None => self.error_label.set_visible(false),
        }
    }
}

#[derive(Clone)]
pub(super) struct SettingsPage {
    pub(super) root: GtkBox,
    mode_dropdown: DropDown,
    new_mode_entry: Entry,
    add_mode_button: Button,
    prompt_view: TextView,
    reference_picture: Picture,
    reference_status: Label,
    pub(super) choose_image_button: Button,
    clear_image_button: Button,
    pub(super) save_button: Button,
    pub(super) back_button: Button,
    draft: Rc<RefCell<Option<SettingsDraft>>>,
    syncing: Rc<Cell<bool>>,
}

impl SettingsPage {
    fn build(tokens: StyleTokens) -> Self {
        let root = page_box(tokens, "settings-page");

        let mode_dropdown = DropDown::from_strings(&[]);
        mode_dropdown.set_hexpand(true);
        let new_mode_entry = Entry::new();
        new_mode_entry.set_placeholder_text(Some("new-mode"));
        new_mode_entry.set_hexpand(true);
        let add_mode_button = secondary_button("Add mode");
        add_mode_button.set_hexpand(false);
        let add_row = GtkBox::new(Orientation::Horizontal, tokens.spacing_8);
        add_row.append(&new_mode_entry);
        add_row.append(&add_mode_button);

        let prompt_view = TextView::new();
        prompt_view.set_wrap_mode(WrapMode::WordChar);
        prompt_view.add_css_class("prompt-editor");
        let prompt_scroller = ScrolledWindow::new();
        prompt_scroller.set_min_content_height(tokens.reference_preview_size);
        prompt_scroller.set_vexpand(true);
        prompt_scroller.set_child(Some(&prompt_view));

        let reference_picture = Picture::new();
        reference_picture.set_can_shrink(true);
        reference_picture.set_size_request(
            tokens.reference_preview_size,
            tokens.reference_preview_size,
        );
        reference_picture.add_css_class("reference-preview");
        let reference_status = Label::new(None);
        reference_status.add_css_class("muted-label");
        reference_status.set_halign(Align::Start);
        let choose_image_button = secondary_button("Choose image...");
        let clear_image_button = secondary_button("Remove");

        let save_button = primary_button("Save");
        let back_button = secondary_button("Back");

        root.append(&page_title("Settings"));
        root.append(&section_label("Mode"));
        root.append(&mode_dropdown);
        root.append(&add_row);
        root.append(&section_label("Prompt"));
        root.append(&prompt_scroller);
        root.append(&section_label("Reference image"));
        root.append(&reference_picture);
        root.append(&reference_status);
        root.append(&button_row(
            tokens,
            &[&choose_image_button, &clear_image_button],
        ));
        root.append(&button_row(tokens, &[&back_button, &save_button]));

        let page = Self {
            root,
            mode_dropdown,
            new_mode_entry,
            add_mode_button,
            prompt_view,
            reference_picture,
            reference_status,
            choose_image_button,
            clear_image_button,
            save_button,
            back_button,
            draft: Rc::new(RefCell::new(None)),
            syncing: Rc::new(Cell::new(false)),
        };
        page.connect_draft_editing();
        page
    }

    fn connect_draft_editing(&self) {
        {
            let page = self.clone();
            self.mode_dropdown.connect_selected_notify(move |dropdown| {
                if page.syncing.get() {
                    return;
                }
                let index = dropdown.selected() as usize;
                let changed = page.with_draft(|draft| {
                    let Some(mode_id) = draft.mode_ids().get(index).cloned() else {
                        return false;
                    };
                    draft.select(&mode_id);
                    true
                });
                if changed == Some(true) {
                    page.sync_widgets();
                }
            });
        }
        {
            let page = self.clone();
            self.prompt_view.buffer().connect_changed(move |buffer| {
                if page.syncing.get() {
                    return;
                }
                let text = buffer.text(&buffer.start_iter(), &buffer.end_iter(), false);
                page.with_draft(|draft| draft.set_prompt(text.as_str()));
            });
        }
        {
            let page = self.clone();
            self.add_mode_button.connect_clicked(move |_| {
                let mode_id = page.new_mode_entry.text().to_string();
                let added = page.with_draft(|draft| {
                    draft
                        .add_mode(&mode_id)
                        .then(|| draft.selected().to_string())
                });
                if let Some(Some(added)) = added {
                    tracing::debug!(mode = %added, "added mode to settings draft");
                    page.new_mode_entry.set_text("");
                    page.sync_widgets();
                }
            });
        }
        {
            let page = self.clone();
            self.clear_image_button.connect_clicked(move |_| {
                page.with_draft(|draft| draft.set_reference_image(None));
                page.sync_reference();
            });
        }
    }

    fn with_draft<T>(&self, update: impl FnOnce(&mut SettingsDraft) -> T) -> Option<T> {
        let mut draft = self.draft.borrow_mut();
        draft.as_mut().map(update)
    }

    fn open_draft(&self, settings: &AllSettings) {
        self.draft.replace(Some(SettingsDraft::new(settings)));
        self.new_mode_entry.set_text("");
        self.sync_widgets();
    }

    /// Patches for every mode touched since the page opened.
    pub(super) fn take_edits(&self) -> Vec<(String, ModeSettingsPatch)> {
        self.draft
            .take()
            .map(SettingsDraft::into_edits)
            .unwrap_or_default()
    }

    pub(super) fn discard_draft(&self) {
        self.draft.take();
    }

    pub(super) fn set_reference_image(&self, image: ImageBlob) {
        self.with_draft(|draft| draft.set_reference_image(Some(image)));
        self.sync_reference();
    }

    fn sync_widgets(&self) {
        let Some((ids, selected_index, prompt)) = self.draft.borrow().as_ref().map(|draft| {
            (
                draft.mode_ids(),
                draft.selected_index(),
                draft.selected_settings().prompt.clone(),
            )
        }) else {
            return;
        };

        self.syncing.set(true);
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.mode_dropdown
            .set_model(Some(&StringList::new(&id_refs)));
        self.mode_dropdown
            .set_selected(u32::try_from(selected_index).unwrap_or(0));
        self.prompt_view.buffer().set_text(&prompt);
        self.syncing.set(false);

        self.sync_reference();
    }

    fn sync_reference(&self) {
        let image = self
            .draft
            .borrow()
            .as_ref()
            .and_then(|draft| draft.selected_settings().reference_image.clone());
        let shown = show_image(&self.reference_picture, image.as_ref());
        let status = match (&image, shown) {
            (None, _) => "No reference image".to_string(),
            (Some(image), true) => image.mime_type().to_string(),
            (Some(image), false) => format!("{} (preview unavailable)", image.mime_type()),
        };
        self.reference_status.set_text(&status);
        self.clear_image_button.set_sensitive(image.is_some());
    }
}

#[derive(Clone)]
pub(super) struct CameraPage {
    pub(super) root: GtkBox,
    title_label: Label,
    device_label: Label,
    status_label: Label,
    spinner: Spinner,
    pub(super) capture_button: Button,
    pub(super) cancel_button: Button,
}

impl CameraPage {
    fn build(tokens: StyleTokens) -> Self {
        let root = page_box(tokens, "camera-page");
        let title_label = page_title("Take a photo");

        let viewfinder = GtkBox::new(Orientation::Vertical, tokens.spacing_8);
        viewfinder.add_css_class("viewfinder");
        viewfinder.set_vexpand(true);
        viewfinder.set_valign(Align::Fill);
        let device_label = Label::new(None);
        device_label.add_css_class("muted-label");
        device_label.set_vexpand(true);
        let spinner = Spinner::new();
        spinner.set_visible(false);
        let status_label = Label::new(Some("Ready"));
        viewfinder.append(&device_label);
        viewfinder.append(&spinner);
        viewfinder.append(&status_label);

        let capture_button = primary_button("Capture");
        let cancel_button = secondary_button("Cancel");

        root.append(&title_label);
        root.append(&viewfinder);
        root.append(&button_row(tokens, &[&cancel_button, &capture_button]));

        Self {
            root,
            title_label,
            device_label,
            status_label,
            spinner,
            capture_button,
            cancel_button,
        }
    }

    pub(super) fn set_device(&self, device: &str) {
        self.device_label.set_text(&format!("Camera: {device}"));
    }

    pub(super) fn set_busy(&self, busy: bool) {
        self.capture_button.set_sensitive(!busy);
        self.spinner.set_visible(busy);
        self.spinner.set_spinning(busy);
        self.status_label
            .set_text(if busy { "Capturing..." } else { "Ready" });
    }

    fn render(&self, model: &ScreenModel) {
        self.title_label.set_text(&model.camera_title);
    }
}

#[derive(Clone)]
pub(super) struct GeneratingPage {
    pub(super) root: GtkBox,
    spinner: Spinner,
    caption: Label,
}

impl GeneratingPage {
    fn build(tokens: StyleTokens) -> Self {
        let root = page_box(tokens, "generating-page");
        root.set_valign(Align::Center);
        let spinner = Spinner::new();
        spinner.set_size_request(
            i32::from(tokens.control_size),
            i32::from(tokens.control_size),
        );
        let caption = Label::new(None);
        caption.add_css_class("page-subtitle");
        root.append(&spinner);
        root.append(&caption);
        Self {
            root,
            spinner,
            caption,
        }
    }

    fn render(&self, model: &ScreenModel) {
        self.caption.set_text(&model.generating_caption);
        self.spinner
            .set_spinning(model.view == AppView::Generating);
    }
}

#[derive(Clone)]
pub(super) struct ResultPage {
    pub(super) root: GtkBox,
    picture: Picture,
    caption_label: Label,
    pub(super) try_again_button: Button,
    pub(super) save_button: Button,
}

impl ResultPage {
    fn build(tokens: StyleTokens) -> Self {
        let root = page_box(tokens, "result-page");
        let picture = Picture::new();
        picture.set_can_shrink(true);
        picture.set_vexpand(true);
        picture.set_size_request(tokens.picture_min_width, tokens.picture_min_height);
        picture.add_css_class("result-picture");
        let caption_label = Label::new(None);
        caption_label.set_wrap(true);
        caption_label.add_css_class("muted-label");
        caption_label.set_visible(false);
        let try_again_button = secondary_button("Try again");
        let save_button = primary_button("Save image");

        root.append(&page_title("Result"));
        root.append(&picture);
        root.append(&caption_label);
        root.append(&button_row(tokens, &[&try_again_button, &save_button]));

        Self {
            root,
            picture,
            caption_label,
            try_again_button,
            save_button,
        }
    }

    fn render(&self, model: &ScreenModel) {
        let Some(result) = &model.result else {
            show_image(&self.picture, None);
            self.caption_label.set_visible(false);
            return;
        };
        if !show_image(&self.picture, Some(&result.image)) {
            tracing::warn!("generated image could not be displayed");
        }
        match &result.caption {
            Some(caption) => {
                self.caption_label.set_text(caption);
                self.caption_label.set_visible(true);
            }
            None => self.caption_label.set_visible(false),
        }
    }
}

/// The window content: one stack page per [`AppView`] plus a toast overlay.
#[derive(Clone)]
pub(super) struct AppPages {
    pub(super) root: Overlay,
    pub(super) toast_label: Label,
    stack: Stack,
    pub(super) home: HomePage,
    pub(super) settings: SettingsPage,
    pub(super) camera: CameraPage,
    pub(super) generating: GeneratingPage,
    pub(super) result: ResultPage,
    rendered_view: Rc<Cell<Option<AppView>>>,
}

impl AppPages {
    pub(super) fn build(tokens: StyleTokens) -> Self {
        let home = HomePage::build(tokens);
        let settings = SettingsPage::build(tokens);
        let camera = CameraPage::build(tokens);
        let generating = GeneratingPage::build(tokens);
        let result = ResultPage::build(tokens);

        let stack = Stack::new();
        stack.set_transition_type(StackTransitionType::Crossfade);
        stack.set_transition_duration(tokens.motion_standard_ms);
        for (view, page) in [
            (AppView::Home, &home.root),
            (AppView::Settings, &settings.root),
            (AppView::Camera, &camera.root),
            (AppView::Generating, &generating.root),
            (AppView::Result, &result.root),
        ] {
            stack.add_named(page, Some(view.as_str()));
        }

        let toast_label = Label::new(Some(""));
        toast_label.add_css_class("toast-badge");
        toast_label.set_halign(Align::Center);
        toast_label.set_valign(Align::End);
        toast_label.set_margin_bottom(tokens.spacing_24);
        toast_label.set_wrap(true);
        toast_label.set_visible(false);

        let root = Overlay::new();
        root.set_child(Some(&stack));
        root.add_overlay(&toast_label);

        Self {
            root,
            toast_label,
            stack,
            home,
            settings,
            camera,
            generating,
            result,
            rendered_view: Rc::new(Cell::new(None)),
        }
    }

    pub(super) fn render(&self, model: &ScreenModel, settings: &AllSettings) {
        let previous = self.rendered_view.replace(Some(model.view));
        match model.view {
            AppView::Settings if previous != Some(AppView::Settings) => {
                self.settings.open_draft(settings);
            }
            AppView::Settings => {}
            _ => self.settings.discard_draft(),
        }

        self.home.render(model);
        self.camera.render(model);
        self.generating.render(model);
        self.result.render(model);
        self.stack.set_visible_child_name(model.page_name());
        tracing::debug!(page = model.page_name(), "rendered view");
    }
}
