//! Map configuration
//!
//! Loaded from JSON with every field optional:
//!
//! ```json
//! {
//!   "api_key": "...",
//!   "script_timeout_ms": 20000,
//!   "default_center": { "lat": 50.4501, "lon": 30.5234 },
//!   "default_overlay": "wind",
//!   "search_zoom": 8
//! }
//! ```

use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::view::{Coordinates, OverlayKind, ViewState};
use crate::widget::BootstrapConfig;

pub const LEAFLET_SCRIPT: &str = "https://unpkg.com/leaflet@1.4.0/dist/leaflet.js";
pub const WINDY_BOOT_SCRIPT: &str = "https://api.windy.com/assets/map-forecast/libBoot.js";

/// Kyiv
pub const DEFAULT_CENTER: Coordinates = Coordinates::new(50.4501, 30.5234);

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub api_key: String,
    pub container_id: String,
    /// Loaded in order before the widget is initialized.
    pub script_urls: Vec<String>,
    #[serde(rename = "script_timeout_ms", deserialize_with = "millis")]
    pub script_timeout: Duration,
    #[serde(rename = "init_timeout_ms", deserialize_with = "millis")]
    pub init_timeout: Duration,
    #[serde(rename = "url_debounce_ms", deserialize_with = "millis")]
    pub url_debounce: Duration,
    pub default_center: Coordinates,
    pub default_zoom: u8,
    pub default_overlay: OverlayKind,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Zoom applied with a search result; `None` keeps the current zoom.
    pub search_zoom: Option<u8>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            container_id: "windy".to_string(),
            script_urls: vec![LEAFLET_SCRIPT.to_string(), WINDY_BOOT_SCRIPT.to_string()],
            script_timeout: Duration::from_secs(20),
            init_timeout: Duration::from_secs(15),
            url_debounce: Duration::from_millis(400),
            default_center: DEFAULT_CENTER,
            default_zoom: 5,
            default_overlay: OverlayKind::Wind,
            min_zoom: 3,
            max_zoom: 11,
            search_zoom: None,
        }
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Error loading or validating a [`MapConfig`]
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl MapConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: MapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "min_zoom {} is above max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        let zooms = self.zoom_range();
        if !zooms.contains(&self.default_zoom) {
            return Err(ConfigError::Invalid(format!(
                "default_zoom {} outside {}..={}",
                self.default_zoom, self.min_zoom, self.max_zoom
            )));
        }
        if let Some(zoom) = self.search_zoom.filter(|zoom| !zooms.contains(zoom)) {
            return Err(ConfigError::Invalid(format!(
                "search_zoom {} outside {}..={}",
                zoom, self.min_zoom, self.max_zoom
            )));
        }
        let center = self.default_center;
        if Coordinates::checked(center.lat, center.lon).is_none() {
            return Err(ConfigError::Invalid(format!(
                "default_center {} is not on the globe",
                center
            )));
        }
        if self.container_id.trim().is_empty() {
            return Err(ConfigError::Invalid("container_id is empty".to_string()));
        }
        if [self.script_timeout, self.init_timeout]
            .iter()
            .any(Duration::is_zero)
        {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn zoom_range(&self) -> RangeInclusive<u8> {
        self.min_zoom..=self.max_zoom
    }

    /// View used when the URL supplies nothing.
    pub fn default_view(&self) -> ViewState {
        ViewState::new(self.default_center, self.default_zoom, self.default_overlay)
    }

    /// Widget init options for the initial `view`.
    pub fn bootstrap_config(&self, view: &ViewState) -> BootstrapConfig {
        BootstrapConfig {
            api_key: self.api_key.clone(),
            lat: view.center.lat,
            lon: view.center.lon,
            zoom: view.zoom,
            container_id: self.container_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.script_urls.len(), 2);
        assert_eq!(config.default_view().origin, crate::Origin::Default);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = MapConfig::from_json_str(
            r#"{ "api_key": "abc", "url_debounce_ms": 250, "default_overlay": "clouds", "search_zoom": 8 }"#,
        )
        .expect("valid config");

        assert_eq!(config.api_key, "abc");
        assert_eq!(config.url_debounce, Duration::from_millis(250));
        assert_eq!(config.default_overlay, OverlayKind::Clouds);
        assert_eq!(config.search_zoom, Some(8));
        assert_eq!(config.init_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_invalid_zoom_is_rejected() {
        let err = MapConfig::from_json_str(r#"{ "default_zoom": 15 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = MapConfig::from_json_str(r#"{ "min_zoom": 9, "max_zoom": 4 }"#).unwrap_err();
        assert!(err.to_string().contains("min_zoom"));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = MapConfig::from_json_str("{ api_key: }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MapConfig::from_path("/nonexistent/weathermap.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_bootstrap_config_uses_view() {
        let config = MapConfig {
            api_key: "key".into(),
            ..MapConfig::default()
        };
        let view = ViewState::new(Coordinates::new(51.5, -0.12), 6, OverlayKind::Wind);

        let boot = config.bootstrap_config(&view);
        assert_eq!((boot.lat, boot.lon, boot.zoom), (51.5, -0.12, 6));
        assert_eq!(boot.container_id, "windy");
    }
}
