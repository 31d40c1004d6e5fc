//! Actions driving the map

use std::fmt::Debug;

use crate::fallback::FallbackError;
use crate::geocode::GeocodeError;
use crate::store::ViewChange;
use crate::view::{Coordinates, OverlayKind};
use crate::widget::{InitError, WidgetDelivery};

/// Anything that can be dispatched to the map reducer
///
/// - Clone: logged by middleware and recorded by tests
/// - Send + 'static: produced by tokio tasks
///
/// Use `#[derive(Action)]` from `weathermap-macros` to implement it.
pub trait Action: Clone + Debug + Send + 'static {
    /// Variant name, for logs
    fn name(&self) -> &'static str;
}

/// Implemented by `#[derive(Action)]` with `#[action(infer_categories)]`.
pub trait ActionCategory: Action {
    type Category: Copy + Eq + std::hash::Hash + Debug;

    fn category(&self) -> Option<&'static str>;

    fn category_enum(&self) -> Self::Category;
}

/// Every input to the map: user intents, async completions and host events.
///
/// Completions carry the mount `generation` they were started under.
#[derive(Clone, Debug, weathermap_macros::Action)]
#[action(infer_categories)]
pub enum MapAction {
    /// Start the first bootstrap attempt of this mount.
    WidgetLoad,
    /// Start a new attempt after `Failed`.
    WidgetRetry,
    WidgetDidInit {
        generation: u64,
        attempt: u32,
        delivery: WidgetDelivery,
    },
    WidgetDidFail {
        generation: u64,
        attempt: u32,
        error: InitError,
    },
    /// The widget reported a pan or zoom.
    WidgetDidMove {
        generation: u64,
        center: Coordinates,
        zoom: u8,
    },

    OverlayChange(OverlayKind),

    SearchSubmit(String),
    SearchDidResolve {
        generation: u64,
        sequence: u64,
        result: Result<Coordinates, GeocodeError>,
    },

    /// Forwarded from the view store subscription.
    ViewDidChange(ViewChange),

    /// Debounce timer for the URL write `write_generation` fired.
    UrlWriteDue { generation: u64, write_generation: u64 },
    /// The page URL changed outside the map (back/forward).
    UrlDidChange(String),

    FallbackDidLoad { generation: u64, url: String },
    FallbackDidFail { generation: u64, error: FallbackError },

    NoticeDismiss,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inferred_categories() {
        assert_eq!(MapAction::WidgetLoad.category(), Some("widget"));
        assert_eq!(MapAction::SearchSubmit("Oslo".into()).category(), Some("search"));
        assert_eq!(
            MapAction::UrlWriteDue {
                generation: 1,
                write_generation: 1
            }
            .category(),
            Some("url")
        );
        assert!(MapAction::UrlDidChange("?zoom=4".into()).is_url());
        assert!(MapAction::OverlayChange(OverlayKind::Clouds).is_overlay());
        assert_eq!(MapAction::NoticeDismiss.category_enum(), MapActionCategory::Notice);
    }

    #[test]
    fn test_names() {
        assert_eq!(MapAction::WidgetRetry.name(), "WidgetRetry");
        assert_eq!(
            MapAction::FallbackDidLoad {
                generation: 1,
                url: "x".into()
            }
            .name(),
            "FallbackDidLoad"
        );
    }
}
