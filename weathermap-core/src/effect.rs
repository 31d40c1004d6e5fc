//! Reducer output: state change flag plus declarative side effects
//!
//! The reducer never performs I/O. It returns what should happen and the
//! runtime does it:
//!
//! ```ignore
//! fn reducer(state: &mut MapState, action: MapAction) -> DispatchResult<MapEffect> {
//!     match action {
//!         MapAction::SearchSubmit(query) => match state.geocode.search(&query) {
//!             Ok(request) => DispatchResult::changed_with(MapEffect::Geocode(request)),
//!             Err(e) => { state.notice = Some(e.to_string()); DispatchResult::changed() }
//!         },
//!         // ...
//!     }
//! }
//! ```

use crate::geocode::GeocodeRequest;
use crate::url_sync::UrlWrite;
use crate::view::{Coordinates, OverlayKind};
use crate::widget::BootstrapConfig;

/// Result of dispatching one action.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult<E> {
    /// Whether the state was modified by this action.
    pub changed: bool,
    /// Effects for the runtime, in order.
    pub effects: Vec<E>,
}

impl<E> Default for DispatchResult<E> {
    fn default() -> Self {
        Self::unchanged()
    }
}

impl<E> DispatchResult<E> {
    #[inline]
    pub fn unchanged() -> Self {
        Self {
            changed: false,
            effects: vec![],
        }
    }

    #[inline]
    pub fn changed() -> Self {
        Self {
            changed: true,
            effects: vec![],
        }
    }

    /// A single effect, no state change.
    #[inline]
    pub fn effect(effect: E) -> Self {
        Self {
            changed: false,
            effects: vec![effect],
        }
    }

    #[inline]
    pub fn changed_with(effect: E) -> Self {
        Self {
            changed: true,
            effects: vec![effect],
        }
    }

    #[inline]
    pub fn changed_with_many(effects: Vec<E>) -> Self {
        Self {
            changed: true,
            effects,
        }
    }

    #[inline]
    pub fn with(mut self, effect: E) -> Self {
        self.effects.push(effect);
        self
    }

    #[inline]
    pub fn mark_changed(mut self) -> Self {
        self.changed = true;
        self
    }

    #[inline]
    pub fn has_effects(&self) -> bool {
        !self.effects.is_empty()
    }
}

/// A reducer that can emit effects.
pub type EffectReducer<S, A, E> = fn(&mut S, A) -> DispatchResult<E>;

/// Side effects requested by the map reducer
#[derive(Clone, Debug, PartialEq)]
pub enum MapEffect {
    /// Load scripts and bootstrap the widget for `attempt`.
    LoadWidget {
        attempt: u32,
        config: BootstrapConfig,
    },
    /// `map.setView` on the ready widget.
    SetView { center: Coordinates, zoom: u8 },
    /// `store.set("overlay", ..)` on the ready widget.
    SetOverlay(OverlayKind),
    /// Subscribe to the ready widget's move events.
    ListenWidget,
    Geocode(GeocodeRequest),
    /// Debounce a URL write.
    ScheduleUrlWrite(UrlWrite),
    /// Replace the page query now.
    ReplaceUrl(String),
    /// Fetch the static image for an overlay.
    FetchFallback(OverlayKind),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_result_builders() {
        let r: DispatchResult<MapEffect> = DispatchResult::unchanged();
        assert!(!r.changed);
        assert!(!r.has_effects());

        let r = DispatchResult::effect(MapEffect::ListenWidget);
        assert!(!r.changed);
        assert_eq!(r.effects, vec![MapEffect::ListenWidget]);

        let r = DispatchResult::changed_with(MapEffect::SetOverlay(OverlayKind::Clouds))
            .with(MapEffect::ListenWidget);
        assert!(r.changed);
        assert_eq!(r.effects.len(), 2);
    }

    #[test]
    fn test_mark_changed() {
        let r = DispatchResult::<MapEffect>::default().mark_changed();
        assert!(r.changed);
        assert_eq!(DispatchResult::<MapEffect>::changed_with_many(vec![]).effects, vec![]);
    }
}
