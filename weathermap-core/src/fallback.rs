//! Static overlay image shown when the interactive widget is unavailable

use std::fmt;

use crate::view::OverlayKind;
use crate::BoxFuture;

/// Error obtaining a static overlay image URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackError {
    pub overlay: OverlayKind,
    pub message: String,
}

impl fmt::Display for FallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No static image for overlay {}: {}",
            self.overlay, self.message
        )
    }
}

impl std::error::Error for FallbackError {}

/// Weather-data service handing out static overlay image URLs.
pub trait StaticOverlaySource: Send + Sync {
    fn static_overlay_url<'a>(
        &'a self,
        kind: OverlayKind,
    ) -> BoxFuture<'a, Result<String, FallbackError>>;
}
