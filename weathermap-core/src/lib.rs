//! Core types for the weathermap controller
//!
//! Drives an embedded, externally loaded weather map widget from a page:
//! loads its scripts once, bootstraps it, keeps one authoritative view
//! state, and mirrors that state into the page URL.
//!
//! # Core Concepts
//!
//! - **ScriptLoader**: URL-keyed, idempotent script loading shared by mounts
//! - **WidgetBootstrapper**: one-shot widget init with timeout and disposal
//! - **ViewStateStore**: the view (`center`, `zoom`, `overlay`) with per-tick
//!   origin arbitration
//! - **GeocodeClient**: city search where only the latest query may apply
//! - **OverlayController**: overlay changes, buffered until the widget is ready
//! - **UrlSync**: URL seeding and debounced, loop-free write-back
//!
//! All of it is reduced by one pure function, [`reducer`], and driven by
//! [`MapRuntime`] on tokio.
//!
//! # Async Handler Pattern
//!
//! Intent actions trigger async work, result actions carry the outcome back:
//!
//! ```ignore
//! #[derive(Action, Clone, Debug)]
//! #[action(infer_categories)]
//! enum MapAction {
//!     // Intent: reducer emits MapEffect::Geocode
//!     SearchSubmit(String),
//!     // Result: the runtime's geocode task completed
//!     SearchDidResolve { generation: u64, sequence: u64, result: Result<Coordinates, GeocodeError> },
//! }
//! ```
//!
//! The `Did*` naming convention identifies result actions. With
//! `#[action(infer_categories)]`, `SearchSubmit` and `SearchDidResolve` both
//! get category `"search"`.

extern crate self as weathermap;

use std::future::Future;
use std::pin::Pin;

pub mod action;
pub mod config;
pub mod effect;
pub mod fallback;
pub mod geocode;
pub mod load_state;
pub mod middleware;
pub mod overlay;
pub mod reducer;
pub mod runtime;
pub mod script;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod tasks;
pub mod testing;
pub mod url_sync;
pub mod view;
pub mod widget;

/// Boxed future returned by the object-safe service traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Core trait exports
pub use action::{Action, ActionCategory, MapAction, MapActionCategory};
pub use middleware::{LoggingMiddleware, Middleware, NoopMiddleware, RecordingMiddleware};

// View model exports
pub use load_state::LoadState;
pub use store::{MutateOutcome, Unsubscribe, ViewChange, ViewStateStore};
pub use view::{Coordinates, OverlayKind, Origin, UnknownOverlay, ViewPatch, ViewState};

// Service exports
pub use fallback::{FallbackError, StaticOverlaySource};
pub use geocode::{GeocodeClient, GeocodeError, GeocodeRequest, Geocoder};
pub use overlay::{OverlayController, OverlayDecision};
pub use script::{ScriptHost, ScriptLoadError, ScriptLoader};
pub use url_sync::{Navigator, Seed, UrlQuery, UrlSync, UrlWrite};
pub use widget::{
    BootstrapConfig, Bootstrapped, DisposalToken, InitCallback, InitError, MapWidget, WidgetApi,
    WidgetBootstrapper, WidgetDelivery, WidgetHandle, WidgetListener, WidgetSlot,
};

// Reducer and runtime exports
pub use config::{ConfigError, MapConfig};
pub use effect::{DispatchResult, EffectReducer, MapEffect};
pub use reducer::reducer;
pub use runtime::{MapRuntime, MapServices};
pub use state::{MapState, MapStatus};
pub use subscriptions::{SubKey, Subscriptions};
pub use tasks::{TaskKey, TaskManager};

pub use testing::{
    test_config, FixedOverlaySource, ManualWidgetApi, MapHarness, MemoryNavigator,
    MemoryScriptHost, RecordingWidget, ScriptedGeocoder, TestServices, WidgetCall,
};

pub mod prelude {
    pub use crate::action::{Action, ActionCategory, MapAction};
    pub use crate::config::MapConfig;
    pub use crate::effect::{DispatchResult, MapEffect};
    pub use crate::middleware::{LoggingMiddleware, Middleware, NoopMiddleware};
    pub use crate::runtime::{MapRuntime, MapServices};
    pub use crate::state::{MapState, MapStatus};
    pub use crate::view::{Coordinates, OverlayKind, Origin, ViewPatch, ViewState};
    pub use crate::{
        Geocoder, MapWidget, Navigator, ScriptHost, ScriptLoader, StaticOverlaySource, WidgetApi,
    };
}
