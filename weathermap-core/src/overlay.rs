//! Overlay selection, buffered until the widget is ready

use tracing::debug;

use crate::store::{MutateOutcome, ViewStateStore};
use crate::view::{OverlayKind, Origin, ViewPatch};

/// What [`OverlayController::change_overlay`] decided
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayDecision {
    /// Widget is ready and the view changed: push `kind` to the widget.
    Apply(OverlayKind),
    /// Widget not ready yet; kept as the latest request.
    Buffered,
    /// Already showing `kind` (or outranked this tick).
    Unchanged,
}

#[derive(Debug, Default)]
pub struct OverlayController {
    buffered: Option<OverlayKind>,
}

impl OverlayController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `kind` on behalf of an explicit UI action.
    pub fn change_overlay(
        &mut self,
        kind: OverlayKind,
        ready: bool,
        view: &mut ViewStateStore,
    ) -> OverlayDecision {
        if !ready {
            if let Some(previous) = self.buffered.replace(kind) {
                debug!(%previous, %kind, "Replacing buffered overlay");
            }
            return OverlayDecision::Buffered;
        }

        match view.mutate(ViewPatch::overlay(kind), Origin::User) {
            MutateOutcome::Applied(_) => OverlayDecision::Apply(kind),
            _ => OverlayDecision::Unchanged,
        }
    }

    /// Take the buffered request once the widget is ready.
    ///
    /// The returned kind has already been folded into `patch` so the caller
    /// sets the widget's overlay once for seed and buffer together.
    pub fn flush_into(&mut self, patch: &mut ViewPatch) -> Option<OverlayKind> {
        let kind = self.buffered.take()?;
        patch.overlay = Some(kind);
        Some(kind)
    }

    pub fn buffered(&self) -> Option<OverlayKind> {
        self.buffered
    }

    /// Drop any buffered request (unmount).
    pub fn clear(&mut self) {
        self.buffered = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{Coordinates, ViewState};

    fn seeded_store() -> ViewStateStore {
        let mut store = ViewStateStore::new(ViewState::new(
            Coordinates::new(0.0, 0.0),
            5,
            OverlayKind::Wind,
        ));
        store.seed(ViewPatch::default(), Origin::Default);
        store
    }

    #[test]
    fn test_only_latest_buffered_request_is_kept() {
        let mut store = seeded_store();
        let mut overlay = OverlayController::new();

        assert_eq!(
            overlay.change_overlay(OverlayKind::Temperature, false, &mut store),
            OverlayDecision::Buffered
        );
        overlay.change_overlay(OverlayKind::Clouds, false, &mut store);
        assert_eq!(store.state().overlay, OverlayKind::Wind);

        let mut patch = ViewPatch::default();
        assert_eq!(overlay.flush_into(&mut patch), Some(OverlayKind::Clouds));
        assert_eq!(patch.overlay, Some(OverlayKind::Clouds));
        assert_eq!(overlay.flush_into(&mut patch), None, "flushed once");
    }

    #[test]
    fn test_buffer_overrides_seeded_overlay() {
        let mut overlay = OverlayController::new();
        let mut store = seeded_store();
        overlay.change_overlay(OverlayKind::Pressure, false, &mut store);

        let mut seed = ViewPatch::overlay(OverlayKind::Clouds);
        overlay.flush_into(&mut seed);

        assert_eq!(seed.overlay, Some(OverlayKind::Pressure));
    }

    #[test]
    fn test_ready_change_applies_with_user_origin() {
        let mut store = seeded_store();
        let mut overlay = OverlayController::new();
        store.begin_tick();

        assert_eq!(
            overlay.change_overlay(OverlayKind::Precipitation, true, &mut store),
            OverlayDecision::Apply(OverlayKind::Precipitation)
        );
        assert_eq!(store.state().origin, Origin::User);
        assert_eq!(
            overlay.change_overlay(OverlayKind::Precipitation, true, &mut store),
            OverlayDecision::Unchanged
        );
        assert_eq!(overlay.buffered(), None);
    }
}
