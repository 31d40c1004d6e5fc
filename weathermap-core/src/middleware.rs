//! Dispatch middleware for the map runtime

use crate::action::{Action, ActionCategory};

/// Hooks around every reducer call.
pub trait Middleware<A: Action> {
    /// Called before the action reaches the reducer
    fn before(&mut self, action: &A);

    /// Called after the reducer ran
    fn after(&mut self, action: &A, state_changed: bool);
}

/// A no-op middleware
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl<A: Action> Middleware<A> for NoopMiddleware {
    fn before(&mut self, _action: &A) {}
    fn after(&mut self, _action: &A, _state_changed: bool) {}
}

/// Middleware that traces actions with their category
///
/// Actions in an excluded category (by default `"view"`, one per store
/// change) are not logged.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    /// Whether to log before dispatch
    pub log_before: bool,
    /// Whether to log after dispatch
    pub log_after: bool,
    /// Categories never logged
    pub exclude_categories: Vec<&'static str>,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingMiddleware {
    /// Log after dispatch only
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
            exclude_categories: vec!["view"],
        }
    }

    /// Log both before and after dispatch, every category included
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
            exclude_categories: Vec::new(),
        }
    }

    pub fn exclude_category(mut self, category: &'static str) -> Self {
        self.exclude_categories.push(category);
        self
    }

    /// Whether `action` passes the category filter
    pub fn should_log<A: ActionCategory>(&self, action: &A) -> bool {
        action
            .category()
            .is_none_or(|category| !self.exclude_categories.contains(&category))
    }
}

impl<A: ActionCategory> Middleware<A> for LoggingMiddleware {
    fn before(&mut self, action: &A) {
        if self.log_before && self.should_log(action) {
            tracing::debug!(
                action = %action.name(),
                category = action.category().unwrap_or("-"),
                "Dispatching map action"
            );
        }
    }

    fn after(&mut self, action: &A, state_changed: bool) {
        if self.log_after && self.should_log(action) {
            tracing::debug!(
                action = %action.name(),
                category = action.category().unwrap_or("-"),
                state_changed,
                "Map action processed"
            );
        }
    }
}

/// Records action names, for asserting on dispatch order in tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingMiddleware {
    dispatched: Vec<(&'static str, bool)>,
}

impl RecordingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(action name, state changed)` in dispatch order
    pub fn dispatched(&self) -> &[(&'static str, bool)] {
        &self.dispatched
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.dispatched.iter().map(|(name, _)| *name).collect()
    }
}

impl<A: Action> Middleware<A> for RecordingMiddleware {
    fn before(&mut self, _action: &A) {}

    fn after(&mut self, action: &A, state_changed: bool) {
        self.dispatched.push((action.name(), state_changed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    enum Ping {
        Ping,
        Pong,
    }

    impl Action for Ping {
        fn name(&self) -> &'static str {
            match self {
                Ping::Ping => "Ping",
                Ping::Pong => "Pong",
            }
        }
    }

    #[test]
    fn test_recording_middleware_keeps_order() {
        let mut middleware = RecordingMiddleware::new();
        for (action, changed) in [(Ping::Ping, true), (Ping::Pong, false)] {
            middleware.before(&action);
            middleware.after(&action, changed);
        }

        assert_eq!(middleware.dispatched(), &[("Ping", true), ("Pong", false)]);
        assert_eq!(middleware.names(), vec!["Ping", "Pong"]);
    }

    #[test]
    fn test_logging_filters_by_category() {
        use crate::action::MapAction;
        use crate::store::ViewChange;
        use crate::view::{Coordinates, Origin, OverlayKind, ViewState};

        let quiet = LoggingMiddleware::new().exclude_category("notice");
        assert!(quiet.should_log(&MapAction::WidgetLoad));
        assert!(quiet.should_log(&MapAction::OverlayChange(OverlayKind::Clouds)));
        assert!(!quiet.should_log(&MapAction::NoticeDismiss));

        let change = ViewChange {
            state: ViewState::new(Coordinates::new(1.0, 2.0), 5, OverlayKind::Wind),
            origin: Origin::Widget,
            revision: 1,
        };
        assert!(!quiet.should_log(&MapAction::ViewDidChange(change)));

        let verbose = LoggingMiddleware::verbose();
        assert!(verbose.should_log(&MapAction::NoticeDismiss));
        assert!(verbose.should_log(&MapAction::ViewDidChange(change)));
    }
}
