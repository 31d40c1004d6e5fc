//! Map view data model: center, zoom, overlay and who wrote them

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A geographic position in decimal degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build coordinates only if both values are finite and on the globe.
    pub fn checked(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}

/// Weather layer rendered by the widget. Closed set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    #[default]
    Wind,
    Temperature,
    Pressure,
    Precipitation,
    Clouds,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 5] = [
        OverlayKind::Wind,
        OverlayKind::Temperature,
        OverlayKind::Pressure,
        OverlayKind::Precipitation,
        OverlayKind::Clouds,
    ];

    /// Name used in the `overlay` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            OverlayKind::Wind => "wind",
            OverlayKind::Temperature => "temperature",
            OverlayKind::Pressure => "pressure",
            OverlayKind::Precipitation => "precipitation",
            OverlayKind::Clouds => "clouds",
        }
    }

    /// Value the widget's `overlay` store key expects.
    pub fn widget_value(self) -> &'static str {
        match self {
            OverlayKind::Wind => "wind",
            OverlayKind::Temperature => "temp",
            OverlayKind::Pressure => "pressure",
            OverlayKind::Precipitation => "rain",
            OverlayKind::Clouds => "clouds",
        }
    }
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overlay name outside the closed set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownOverlay(pub String);

impl fmt::Display for UnknownOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown overlay: {:?}", self.0)
    }
}

impl std::error::Error for UnknownOverlay {}

impl FromStr for OverlayKind {
    type Err = UnknownOverlay;

    /// Accepts both the URL names and the widget's short names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wind" => Ok(OverlayKind::Wind),
            "temperature" | "temp" => Ok(OverlayKind::Temperature),
            "pressure" => Ok(OverlayKind::Pressure),
            "precipitation" | "rain" => Ok(OverlayKind::Precipitation),
            "clouds" => Ok(OverlayKind::Clouds),
            _ => Err(UnknownOverlay(s.to_string())),
        }
    }
}

/// Logical writer of a view mutation.
///
/// Precedence (highest first): `Search`/`User`, `Widget`, `Url`, `Default`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Fixed fallback values
    Default,
    /// One-time seed from the page query (or external navigation)
    Url,
    /// Pan/zoom reported by the widget's own event stream
    Widget,
    /// Geocoded search result
    Search,
    /// Explicit UI action such as the overlay picker
    User,
}

impl Origin {
    pub fn rank(self) -> u8 {
        match self {
            Origin::Default => 0,
            Origin::Url => 1,
            Origin::Widget => 2,
            Origin::Search | Origin::User => 3,
        }
    }

    /// Strictly higher precedence. Equal ranks never outrank each other.
    pub fn outranks(self, other: Origin) -> bool {
        self.rank() > other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Default => "default",
            Origin::Url => "url",
            Origin::Widget => "widget",
            Origin::Search => "search",
            Origin::User => "user",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical map view
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    pub center: Coordinates,
    pub zoom: u8,
    pub overlay: OverlayKind,
    pub origin: Origin,
}

impl ViewState {
    pub fn new(center: Coordinates, zoom: u8, overlay: OverlayKind) -> Self {
        Self {
            center,
            zoom,
            overlay,
            origin: Origin::Default,
        }
    }

    /// Apply a patch. Returns false (and leaves `origin` alone) when nothing differs.
    pub fn apply(&mut self, patch: &ViewPatch, origin: Origin) -> bool {
        let mut changed = false;
        if let Some(center) = patch.center {
            if center != self.center {
                self.center = center;
                changed = true;
            }
        }
        if let Some(zoom) = patch.zoom {
            if zoom != self.zoom {
                self.zoom = zoom;
                changed = true;
            }
        }
        if let Some(overlay) = patch.overlay {
            if overlay != self.overlay {
                self.overlay = overlay;
                changed = true;
            }
        }
        if changed {
            self.origin = origin;
        }
        changed
    }

    /// Same center, zoom and overlay, whoever wrote them.
    pub fn same_view(&self, other: &ViewState) -> bool {
        self.center == other.center && self.zoom == other.zoom && self.overlay == other.overlay
    }
}

/// Partial view state accepted by `ViewStateStore::mutate`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewPatch {
    pub center: Option<Coordinates>,
    pub zoom: Option<u8>,
    pub overlay: Option<OverlayKind>,
}

impl ViewPatch {
    pub fn center(center: Coordinates) -> Self {
        Self {
            center: Some(center),
            ..Self::default()
        }
    }

    pub fn overlay(kind: OverlayKind) -> Self {
        Self {
            overlay: Some(kind),
            ..Self::default()
        }
    }

    /// Center and zoom, as reported by a widget move.
    pub fn camera(center: Coordinates, zoom: u8) -> Self {
        Self {
            center: Some(center),
            zoom: Some(zoom),
            overlay: None,
        }
    }

    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn with_overlay(mut self, kind: OverlayKind) -> Self {
        self.overlay = Some(kind);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.center.is_none() && self.zoom.is_none() && self.overlay.is_none()
    }
}
