use crate::ui::{ColorTokens, StyleTokens};
use gtk4::CssProvider;

fn runtime_css(tokens: StyleTokens, colors: &ColorTokens, motion_enabled: bool) -> String {
    let motion_hover_ms = if motion_enabled {
        tokens.motion_hover_ms
    } else {
        0
    };
    format!(
        "
window.nano-imager-root {{
  background: {background};
  color: {text_color};
}}
.page-title {{
  font-size: 22px;
  font-weight: 700;
}}
.page-subtitle,
.muted-label {{
  color: {muted_text_color};
}}
.section-title {{
  font-size: 12px;
  font-weight: 600;
  letter-spacing: 0.04em;
  color: {muted_text_color};
}}
button.primary-button {{
  background-image: {accent_gradient};
  color: {accent_text_color};
  border-color: transparent;
  border-radius: {control_radius}px;
  min-height: {control_size}px;
  font-weight: 600;
  transition: box-shadow {motion_hover_ms}ms cubic-bezier(0.4, 0, 0.2, 1);
}}
button.primary-button:hover {{
  box-shadow: 0 0 0 2px {focus_ring_glow};
}}
button.secondary-button {{
  border-radius: {control_radius}px;
  min-height: {control_size}px;
  border: {border_width}px solid {border_color};
  background: {panel_background};
}}
button.mode-button {{
  border-radius: {card_radius}px;
  border: {border_width}px solid {border_color};
  background: {panel_background};
  padding: {spacing_12}px {spacing_16}px;
  font-size: 16px;
  font-weight: 600;
}}
button.mode-button.mode-unconfigured {{
  opacity: 0.6;
}}
.viewfinder,
.reference-preview,
.result-picture {{
  border-radius: {panel_radius}px;
  border: {border_width}px solid {border_color};
  background: {panel_background};
}}
.prompt-editor {{
  padding: {spacing_8}px;
}}
.error-banner {{
  color: {error_color};
  padding: {spacing_8}px 0;
}}
.toast-badge {{
  border-radius: {control_radius}px;
  border: {border_width}px solid {border_color};
  background: {panel_background};
  color: {text_color};
  padding: {spacing_8}px {spacing_16}px;
  font-size: 13px;
  font-weight: 500;
}}
.toast-badge.toast-error {{
  color: {error_color};
}}
",
        background = colors.background,
        panel_background = colors.panel_background,
        border_color = colors.border_color,
        text_color = colors.text_color,
        muted_text_color = colors.muted_text_color,
        accent_gradient = colors.accent_gradient,
        accent_text_color = colors.accent_text_color,
        error_color = colors.error_color,
        focus_ring_glow = colors.focus_ring_glow,
        card_radius = tokens.card_radius,
        panel_radius = tokens.panel_radius,
        control_radius = tokens.control_radius,
        control_size = tokens.control_size,
        border_width = tokens.border_width,
        spacing_8 = tokens.spacing_8,
        spacing_12 = tokens.spacing_12,
        spacing_16 = tokens.spacing_16,
        motion_hover_ms = motion_hover_ms,
    )
}

pub(super) fn install_runtime_css(tokens: StyleTokens, colors: &ColorTokens, motion_enabled: bool) {
    let provider = CssProvider::new();
    provider.load_from_data(&runtime_css(tokens, colors, motion_enabled));
    if let Some(display) = gtk4::gdk::Display::default() {
        gtk4::style_context_add_provider_for_display(
            &display,
            &provider,
            gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION,
        );
    } else {
        tracing::warn!("no display available; runtime css not installed");
    }
}
