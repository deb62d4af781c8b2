/// Compile-time layout tokens; not user-overridable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleTokens {
    pub spacing_4: i32,
    pub spacing_8: i32,
    pub spacing_12: i32,
    pub spacing_16: i32,
    pub spacing_24: i32,
    pub card_radius: u16,
    pub panel_radius: u16,
    pub control_radius: u16,
    pub control_size: u16,
    pub border_width: u16,
    pub window_default_width: i32,
    pub window_default_height: i32,
    pub picture_min_width: i32,
    pub picture_min_height: i32,
    pub reference_preview_size: i32,
    pub motion_standard_ms: u32,
    pub motion_hover_ms: u32,
    pub toast_duration_ms: u32,
}

pub const LAYOUT_TOKENS: StyleTokens = StyleTokens {
    spacing_4: 4,
    spacing_8: 8,
    spacing_12: 12,
    spacing_16: 16,
    spacing_24: 24,
    card_radius: 14,
    panel_radius: 18,
    control_radius: 12,
    control_size: 40,
    border_width: 1,
    window_default_width: 480,
    window_default_height: 760,
    picture_min_width: 320,
    picture_min_height: 320,
    reference_preview_size: 160,
    motion_standard_ms: 220,
    motion_hover_ms: 160,
    toast_duration_ms: 2_400,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTokens {
    pub background: &'static str,
    pub panel_background: &'static str,
    pub border_color: &'static str,
    pub text_color: &'static str,
    pub muted_text_color: &'static str,
    pub accent_gradient: &'static str,
    pub accent_text_color: &'static str,
    pub error_color: &'static str,
    pub focus_ring_glow: &'static str,
}

pub const DEFAULT_COLORS: ColorTokens = ColorTokens {
    background: "#0f0f12",
    panel_background: "rgba(255, 255, 255, 0.05)",
    border_color: "rgba(255, 255, 255, 0.12)",
    text_color: "#f4f4f5",
    muted_text_color: "rgba(244, 244, 245, 0.64)",
    accent_gradient: "linear-gradient(135deg, #facc15, #f97316)",
    accent_text_color: "#18181b",
    error_color: "#f87171",
    focus_ring_glow: "rgba(250, 204, 21, 0.36)",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_tokens_keep_required_control_size() {
        assert_eq!(LAYOUT_TOKENS.control_size, 40);
    }

    #[test]
    fn reference_preview_fits_inside_picture_area() {
        let tokens = LAYOUT_TOKENS;
        assert!(tokens.reference_preview_size < tokens.picture_min_width);
        assert!(tokens.picture_min_width < tokens.window_default_width);
    }

    #[test]
    fn toast_outlives_standard_motion() {
        assert!(LAYOUT_TOKENS.toast_duration_ms > LAYOUT_TOKENS.motion_standard_ms * 4);
    }
}
