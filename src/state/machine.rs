use super::error::{StateError, StateResult};
use super::{AppEvent, AppView, StateTransition};

const HISTORY_LIMIT: usize = 64;

#[derive(Debug)]
pub struct StateMachine {
    state: AppView,
    transition_history: Vec<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: AppView::default(),
            transition_history: Vec::new(),
        }
    }

    pub fn state(&self) -> AppView {
        self.state
    }

    pub fn can_transition(&self, event: AppEvent) -> bool {
        self.next_state(event).is_some()
    }

    pub fn next_state(&self, event: AppEvent) -> Option<AppView> {
        next_view(self.state, event)
    }

    pub fn transition(&mut self, event: AppEvent) -> StateResult<AppView> {
        tracing::debug!(from = ?self.state, event = ?event, "request state transition");
        let next = self.next_state(event).ok_or_else(|| {
            let from = self.state;
            tracing::warn!(from = ?from, event = ?event, "invalid state transition requested");
            StateError::InvalidStateTransition { from, event }
        })?;

        let record = StateTransition::new(self.state, event, next);
        self.state = next;
        if self.transition_history.len() == HISTORY_LIMIT {
            self.transition_history.remove(0);
        }
        self.transition_history.push(record);

        Ok(self.state)
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.transition_history
    }
}

/// The full transition table. Anything not listed is rejected.
pub(crate) fn next_view(from: AppView, event: AppEvent) -> Option<AppView> {
    use AppEvent::*;
    match (from, event) {
        (AppView::Home, SelectMode) => Some(AppView::Camera),
        (AppView::Home, OpenSettings) => Some(AppView::Settings),
        (AppView::Settings, CloseSettings) => Some(AppView::Home),
        (AppView::Camera, Capture) => Some(AppView::Generating),
        (AppView::Camera, CancelCapture) => Some(AppView::Home),
        (AppView::Camera, CaptureFailed) => Some(AppView::Home),
        (AppView::Generating, EditSucceeded) => Some(AppView::Result),
        (AppView::Generating, EditFailed) => Some(AppView::Home),
        (AppView::Result, Reset) => Some(AppView::Home),
        _ => None,
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AppView::{:?}", self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_EVENTS: [AppEvent; 9] = [
        AppEvent::SelectMode,
        AppEvent::OpenSettings,
        AppEvent::CloseSettings,
        AppEvent::Capture,
        AppEvent::CancelCapture,
        AppEvent::CaptureFailed,
        AppEvent::EditSucceeded,
        AppEvent::EditFailed,
        AppEvent::Reset,
    ];

    fn reachable_from(view: AppView) -> Vec<AppView> {
        ALL_EVENTS
            .iter()
            .filter_map(|event| next_view(view, *event))
            .collect()
    }

    #[test]
    fn can_transition_tracks_valid_and_invalid_events() {
        let mut machine = StateMachine::new();
        assert!(machine.can_transition(AppEvent::SelectMode));
        assert!(machine.can_transition(AppEvent::OpenSettings));
        assert!(!machine.can_transition(AppEvent::Capture));

        let _ = machine
            .transition(AppEvent::SelectMode)
            .expect("home -> camera should transition");

        assert!(machine.can_transition(AppEvent::Capture));
        assert!(machine.can_transition(AppEvent::CancelCapture));
        assert!(!machine.can_transition(AppEvent::OpenSettings));
    }

    #[test]
    fn generating_only_reaches_result_or_home() {
        let mut targets = reachable_from(AppView::Generating);
        targets.sort_by_key(|view| view.as_str());
        assert_eq!(targets, vec![AppView::Home, AppView::Result]);
    }

    #[test]
    fn camera_is_only_entered_from_home() {
        for view in AppView::ALL {
            let enters_camera = reachable_from(view).contains(&AppView::Camera);
            assert_eq!(enters_camera, view == AppView::Home, "from {view:?}");
        }
    }

    #[test]
    fn transition_records_history_with_ordered_entries() {
        let mut machine = StateMachine::new();
        for event in [
            AppEvent::SelectMode,
            AppEvent::Capture,
            AppEvent::EditSucceeded,
            AppEvent::Reset,
        ] {
            machine.transition(event).expect("happy path transition");
        }

        assert_eq!(machine.state(), AppView::Home);
        assert_eq!(
            machine.history(),
            &[
                StateTransition::new(AppView::Home, AppEvent::SelectMode, AppView::Camera),
                StateTransition::new(AppView::Camera, AppEvent::Capture, AppView::Generating),
                StateTransition::new(
                    AppView::Generating,
                    AppEvent::EditSucceeded,
                    AppView::Result
                ),
                StateTransition::new(AppView::Result, AppEvent::Reset, AppView::Home),
            ]
        );
    }

    #[test]
    fn invalid_transition_returns_error_without_mutating_history() {
        let mut machine = StateMachine::new();

        let err = machine
            .transition(AppEvent::Reset)
            .expect_err("home -> reset should fail");
        assert_eq!(
            err,
            StateError::InvalidStateTransition {
                from: AppView::Home,
                event: AppEvent::Reset
            }
        );
        assert_eq!(machine.state(), AppView::Home);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn history_is_bounded() {
        let mut machine = StateMachine::new();
        for _ in 0..HISTORY_LIMIT {
            machine.transition(AppEvent::OpenSettings).unwrap();
            machine.transition(AppEvent::CloseSettings).unwrap();
        }
        assert_eq!(machine.history().len(), HISTORY_LIMIT);
        assert_eq!(
            machine.history().last(),
            Some(&StateTransition::new(
                AppView::Settings,
                AppEvent::CloseSettings,
                AppView::Home
            ))
        );
    }
}
