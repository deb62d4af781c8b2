/// Which screen is active. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppView {
    #[default]
    Home,
    Settings,
    Camera,
    Generating,
    Result,
}

impl AppView {
    pub const ALL: [AppView; 5] = [
        AppView::Home,
        AppView::Settings,
        AppView::Camera,
        AppView::Generating,
        AppView::Result,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AppView::Home => "home",
            AppView::Settings => "settings",
            AppView::Camera => "camera",
            AppView::Generating => "generating",
            AppView::Result => "result",
        }
    }
}
