use super::model::AppView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    SelectMode,
    OpenSettings,
    CloseSettings,
    Capture,
    CancelCapture,
    CaptureFailed,
    EditSucceeded,
    EditFailed,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: AppView,
    pub event: AppEvent,
    pub to: AppView,
}

impl StateTransition {
    pub const fn new(from: AppView, event: AppEvent, to: AppView) -> Self {
        Self { from, event, to }
    }
}
