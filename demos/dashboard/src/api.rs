//! HTTP services behind the map: Open-Meteo geocoding and static tiles
//!
//! Both implement the map's service traits, so the runtime spawns them as
//! tasks and gets a result action back. Nothing here touches map state.

use serde::Deserialize;
use weathermap::{
    BoxFuture, Coordinates, FallbackError, GeocodeError, Geocoder, OverlayKind,
    StaticOverlaySource,
};

// ============================================================================
// Geocoding API
// ============================================================================

const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

/// Geocoding API response from Open-Meteo
#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    latitude: f64,
    longitude: f64,
}

/// City search through the Open-Meteo geocoding API
#[derive(Debug, Clone)]
pub struct OpenMeteoGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl Default for OpenMeteoGeocoder {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl OpenMeteoGeocoder {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: GEOCODING_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn search_url(&self, city: &str) -> String {
        format!(
            "{}?name={}&count=1&language=en",
            self.base_url,
            urlencoding::encode(city)
        )
    }

    async fn geocode_city(&self, city: &str) -> Result<Coordinates, GeocodeError> {
        let request = |e: reqwest::Error| GeocodeError::Network(e.to_string());

        let response = self
            .client
            .get(self.search_url(city))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(request)?;
        let data: GeocodingResponse = response.json().await.map_err(request)?;

        data.results
            .and_then(|results| results.into_iter().next())
            .map(|r| Coordinates::new(r.latitude, r.longitude))
            .ok_or_else(|| GeocodeError::NotFound(city.to_string()))
    }
}

impl Geocoder for OpenMeteoGeocoder {
    fn resolve_coordinates<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Coordinates, GeocodeError>> {
        Box::pin(self.geocode_city(name))
    }
}

// ============================================================================
// Static overlay tiles
// ============================================================================

const TILE_URL: &str = "https://tile.openweathermap.org/map";

/// World tile for an overlay, used while the widget is unavailable.
#[derive(Debug, Clone)]
pub struct OpenWeatherTiles {
    client: reqwest::Client,
    app_id: String,
}

impl OpenWeatherTiles {
    pub fn new(client: reqwest::Client, app_id: impl Into<String>) -> Self {
        Self {
            client,
            app_id: app_id.into(),
        }
    }

    /// Tile layer name for an overlay.
    fn layer(kind: OverlayKind) -> &'static str {
        match kind {
            OverlayKind::Wind => "wind_new",
            OverlayKind::Temperature => "temp_new",
            OverlayKind::Pressure => "pressure_new",
            OverlayKind::Precipitation => "precipitation_new",
            OverlayKind::Clouds => "clouds_new",
        }
    }

    pub fn tile_url(&self, kind: OverlayKind) -> String {
        format!(
            "{}/{}/0/0/0.png?appid={}",
            TILE_URL,
            Self::layer(kind),
            urlencoding::encode(&self.app_id)
        )
    }

    /// Check the tile is served before handing out its URL.
    async fn fetch(&self, kind: OverlayKind) -> Result<String, FallbackError> {
        let url = self.tile_url(kind);
        self.client
            .head(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| FallbackError {
                overlay: kind,
                message: e.to_string(),
            })?;
        Ok(url)
    }
}

impl StaticOverlaySource for OpenWeatherTiles {
    fn static_overlay_url<'a>(
        &'a self,
        kind: OverlayKind,
    ) -> BoxFuture<'a, Result<String, FallbackError>> {
        Box::pin(self.fetch(kind))
    }
}
