//! weathermap: an interactive weather map controller
//!
//! Loads an external map widget once, keeps its view in one store with
//! clear write precedence, and mirrors that view into the page URL.
//!
//! # Example
//! ```ignore
//! use weathermap::prelude::*;
//!
//! let config = MapConfig::from_path("weathermap.json")?;
//! let mut runtime = MapRuntime::mount(config, services);
//! runtime.enqueue(MapAction::OverlayChange(OverlayKind::Clouds));
//! runtime.run(shutdown).await;
//! ```

// Re-export everything from core
pub use weathermap_core::*;

// Re-export derive macros
pub use weathermap_macros::Action;

/// Prelude for convenient imports
pub mod prelude {
    // Traits
    pub use weathermap_core::{Action, ActionCategory, Middleware};

    // Seams
    pub use weathermap_core::{
        Geocoder, MapWidget, Navigator, ScriptHost, StaticOverlaySource, WidgetApi,
    };

    // Map
    pub use weathermap_core::{
        Coordinates, MapAction, MapConfig, MapEffect, MapRuntime, MapServices, MapStatus,
        OverlayKind, Origin, ScriptLoader, ViewState,
    };

    // Middleware
    pub use weathermap_core::{LoggingMiddleware, NoopMiddleware};

    // Derive macros
    pub use weathermap_macros::Action;
}
