//! Lifecycle of an asynchronously acquired resource

/// `NotStarted → Loading → Ready(T) | Failed(E)`
///
/// Used once per script URL (process-wide) and once per mounted widget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadState<T, E> {
    NotStarted,
    Loading,
    Ready(T),
    Failed(E),
}

impl<T, E> Default for LoadState<T, E> {
    fn default() -> Self {
        LoadState::NotStarted
    }
}

impl<T, E> LoadState<T, E> {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&E> {
        match self {
            LoadState::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Short label for logs and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            LoadState::NotStarted => "not_started",
            LoadState::Loading => "loading",
            LoadState::Ready(_) => "ready",
            LoadState::Failed(_) => "failed",
        }
    }
}
