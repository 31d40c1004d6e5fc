//! Two-way binding between the view and the page's query string
//!
//! ```text
//! mount:  ?overlay=wind&lat=51.5&lon=-0.12&zoom=6  ──parse──▶  Seed (held)
//! ready:  Seed ──take_seed──▶ ViewStateStore (origin = url), listening on
//! change: ViewChange (widget/search/user) ──observe──▶ debounced UrlWrite
//! timer:  flush_due(generation) ──▶ Navigator::replace_query
//! ```
//!
//! Loop guard: every scheduled write carries a generation, only the latest
//! generation is flushed, and a change (or navigation event) equal to the
//! last written query is recognised as an echo and ignored.

use std::ops::RangeInclusive;
use std::time::Duration;

use tracing::{debug, warn};

use crate::store::ViewChange;
use crate::view::{Coordinates, OverlayKind, Origin, ViewPatch, ViewState};

pub const OVERLAY_PARAM: &str = "overlay";
pub const LAT_PARAM: &str = "lat";
pub const LON_PARAM: &str = "lon";
pub const ZOOM_PARAM: &str = "zoom";

/// The page's navigation entry.
pub trait Navigator: Send + Sync {
    /// Current query string, with or without the leading `?`.
    fn query(&self) -> String;
    /// Replace the current entry's query without adding history.
    fn replace_query(&self, query: &str);
}

/// Map parameters read from a query string
///
/// Every parameter is optional and parsed independently. Parameters the map
/// does not own are kept in `extra` so writes preserve them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UrlQuery {
    pub overlay: Option<OverlayKind>,
    pub center: Option<Coordinates>,
    pub zoom: Option<u8>,
    pub extra: Vec<(String, String)>,
}

impl UrlQuery {
    /// Parse a query string. Never fails: malformed values are logged and
    /// treated as absent.
    pub fn parse(query: &str, zoom_range: RangeInclusive<u8>) -> Self {
        let mut parsed = UrlQuery::default();
        let mut lat = None;
        let mut lon = None;

        for pair in query.trim_start_matches('?').split('&') {
            if pair.is_empty() {
                continue;
            }
            let mut kv = pair.splitn(2, '=');
            let raw_key = kv.next().unwrap_or("");
            let raw_value = kv.next().unwrap_or("");
            let key = decode(raw_key);
            let value = decode(raw_value);

            match key.as_str() {
                OVERLAY_PARAM => match value.parse::<OverlayKind>() {
                    Ok(kind) => parsed.overlay = Some(kind),
                    Err(error) => warn!(param = OVERLAY_PARAM, %error, "Ignoring query parameter"),
                },
                LAT_PARAM => lat = parse_degrees(LAT_PARAM, &value),
                LON_PARAM => lon = parse_degrees(LON_PARAM, &value),
                ZOOM_PARAM => match value.parse::<u8>() {
                    Ok(zoom) if zoom_range.contains(&zoom) => parsed.zoom = Some(zoom),
                    _ => warn!(
                        param = ZOOM_PARAM,
                        value = %value,
                        min = zoom_range.start(),
                        max = zoom_range.end(),
                        "Ignoring query parameter"
                    ),
                },
                _ => parsed.extra.push((key, value)),
            }
        }

        match (lat, lon) {
            (Some(lat), Some(lon)) => match Coordinates::checked(lat, lon) {
                Some(center) => parsed.center = Some(center),
                None => warn!(lat, lon, "Ignoring out-of-range coordinates"),
            },
            (None, None) => {}
            _ => warn!("Ignoring coordinates: lat and lon must be given together"),
        }
        parsed
    }

    /// The seed this query produces: `url` origin if any parameter was
    /// accepted, `default` otherwise.
    pub fn seed(&self) -> Seed {
        let patch = ViewPatch {
            center: self.center,
            zoom: self.zoom,
            overlay: self.overlay,
        };
        let origin = if patch.is_empty() {
            Origin::Default
        } else {
            Origin::Url
        };
        Seed { patch, origin }
    }

    /// Render `view` plus preserved `extra` parameters.
    ///
    /// Order is `overlay, lat, lon, zoom`, then extras as they were read.
    pub fn render(view: &ViewState, extra: &[(String, String)]) -> String {
        let mut query = format!(
            "?{}={}&{}={:.4}&{}={:.4}&{}={}",
            OVERLAY_PARAM,
            view.overlay.as_str(),
            LAT_PARAM,
            view.center.lat,
            LON_PARAM,
            view.center.lon,
            ZOOM_PARAM,
            view.zoom,
        );
        for (key, value) in extra {
            query.push('&');
            query.push_str(&urlencoding::encode(key));
            query.push('=');
            query.push_str(&urlencoding::encode(value));
        }
        query
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn parse_degrees(param: &'static str, value: &str) -> Option<f64> {
    match value.parse::<f64>() {
        Ok(degrees) if degrees.is_finite() => Some(degrees),
        _ => {
            warn!(param, value, "Ignoring query parameter");
            None
        }
    }
}

/// Initial view held until the widget is ready
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Seed {
    pub patch: ViewPatch,
    pub origin: Origin,
}

/// A scheduled URL write; flush it after `delay` with its generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UrlWrite {
    pub generation: u64,
    pub delay: Duration,
}

#[derive(Debug)]
pub struct UrlSync {
    zoom_range: RangeInclusive<u8>,
    debounce: Duration,
    extra: Vec<(String, String)>,
    seed: Option<Seed>,
    listening: bool,
    generation: u64,
    pending: Option<(u64, String)>,
    last_written: Option<String>,
}

impl UrlSync {
    /// Parse the page query and hold the seed.
    pub fn mount(query: &str, zoom_range: RangeInclusive<u8>, debounce: Duration) -> Self {
        let parsed = UrlQuery::parse(query, zoom_range.clone());
        let seed = parsed.seed();
        debug!(origin = %seed.origin, patch = ?seed.patch, "Parsed URL seed");
        Self {
            zoom_range,
            debounce,
            extra: parsed.extra,
            seed: Some(seed),
            listening: false,
            generation: 0,
            pending: None,
            last_written: None,
        }
    }

    /// The held seed, if not yet applied.
    pub fn seed(&self) -> Option<&Seed> {
        self.seed.as_ref()
    }

    /// `defaults` with the held seed applied, for the widget's bootstrap config.
    pub fn initial_view(&self, defaults: ViewState) -> ViewState {
        let mut view = defaults;
        if let Some(seed) = &self.seed {
            view.apply(&seed.patch, seed.origin);
        }
        view
    }

    /// Hand out the seed exactly once and start listening for changes.
    pub fn take_seed(&mut self) -> Option<Seed> {
        self.listening = true;
        self.seed.take()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// React to a store change. Returns a write to schedule, if any.
    pub fn observe(&mut self, change: &ViewChange) -> Option<UrlWrite> {
        if !self.listening || matches!(change.origin, Origin::Url | Origin::Default) {
            return None;
        }

        let query = UrlQuery::render(&change.state, &self.extra);
        if self.last_written.as_deref() == Some(query.as_str()) {
            debug!(revision = change.revision, "View change echoes last URL write");
            self.pending = None;
            return None;
        }
        if matches!(&self.pending, Some((_, pending)) if *pending == query) {
            return None;
        }

        self.generation += 1;
        self.pending = Some((self.generation, query));
        Some(UrlWrite {
            generation: self.generation,
            delay: self.debounce,
        })
    }

    /// Debounce timer fired for `generation`. Returns the query to write.
    pub fn flush_due(&mut self, generation: u64) -> Option<String> {
        match self.pending.take() {
            Some((pending, query)) if pending == generation => {
                self.last_written = Some(query.clone());
                Some(query)
            }
            other => {
                debug!(generation, "Superseded URL write skipped");
                self.pending = other;
                None
            }
        }
    }

    /// The page's URL changed outside our control (back/forward).
    ///
    /// Returns a seed to apply now, or `None` for an echo of our own write.
    /// Before the initial seed was applied, the held seed is replaced.
    pub fn external_change(&mut self, query: &str) -> Option<Seed> {
        let normalized = format!("?{}", query.trim_start_matches('?'));
        if self.last_written.as_deref() == Some(normalized.as_str()) {
            debug!("Ignoring echo of our own URL write");
            return None;
        }

        let parsed = UrlQuery::parse(&normalized, self.zoom_range.clone());
        let seed = parsed.seed();
        self.extra = parsed.extra;
        self.pending = None;
        // The page now shows the navigated entry, not our last write.
        self.last_written = Some(normalized);

        if !self.listening {
            self.seed = Some(seed);
            return None;
        }
        (seed.origin == Origin::Url).then_some(seed)
    }

    pub fn last_written(&self) -> Option<&str> {
        self.last_written.as_deref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZOOM: RangeInclusive<u8> = 3..=11;

    fn change(state: ViewState, origin: Origin, revision: u64) -> ViewChange {
        ViewChange {
            state: ViewState { origin, ..state },
            origin,
            revision,
        }
    }

    fn view(lat: f64, lon: f64, zoom: u8, overlay: OverlayKind) -> ViewState {
        ViewState::new(Coordinates::new(lat, lon), zoom, overlay)
    }

    fn listening() -> UrlSync {
        let mut sync = UrlSync::mount("", ZOOM, Duration::from_millis(400));
        sync.take_seed();
        sync
    }

    #[test]
    fn test_parse_full_query() {
        let query = UrlQuery::parse("?overlay=wind&lat=51.5&lon=-0.12&zoom=6", ZOOM);
        assert_eq!(query.overlay, Some(OverlayKind::Wind));
        assert_eq!(query.center, Some(Coordinates::new(51.5, -0.12)));
        assert_eq!(query.zoom, Some(6));
        assert_eq!(query.seed().origin, Origin::Url);
    }

    #[test]
    fn test_parse_falls_back_per_parameter() {
        let query = UrlQuery::parse("overlay=snow&lat=51.5&lon=-0.12&zoom=40", ZOOM);
        assert_eq!(query.overlay, None);
        assert_eq!(query.zoom, None);
        assert_eq!(query.center, Some(Coordinates::new(51.5, -0.12)));
        assert_eq!(query.seed().origin, Origin::Url);
    }

    #[test]
    fn test_parse_requires_lat_lon_pair() {
        let query = UrlQuery::parse("?lat=51.5&zoom=abc", ZOOM);
        assert_eq!(query.center, None);
        let seed = query.seed();
        assert_eq!(seed.origin, Origin::Default);
        assert!(seed.patch.is_empty());

        assert_eq!(UrlQuery::parse("?lat=95&lon=0", ZOOM).center, None);
        assert_eq!(UrlQuery::parse("?lat=NaN&lon=0", ZOOM).center, None);
    }

    #[test]
    fn test_render_keeps_unrelated_params() {
        let query = UrlQuery::parse("?lang=uk&overlay=clouds&units=metric%20c", ZOOM);
        let rendered = UrlQuery::render(&view(10.0, 20.0, 5, OverlayKind::Clouds), &query.extra);

        assert_eq!(
            rendered,
            "?overlay=clouds&lat=10.0000&lon=20.0000&zoom=5&lang=uk&units=metric%20c"
        );
    }

    #[test]
    fn test_seed_is_taken_once() {
        let mut sync = UrlSync::mount("?zoom=7", ZOOM, Duration::from_millis(400));
        assert!(!sync.is_listening());

        let seed = sync.take_seed().expect("seed");
        assert_eq!(seed.patch, ViewPatch::default().with_zoom(7));
        assert!(sync.take_seed().is_none());
        assert!(sync.is_listening());
    }

    #[test]
    fn test_observe_ignores_url_and_default_origins() {
        let mut sync = listening();
        let state = view(10.0, 20.0, 5, OverlayKind::Wind);
        assert!(sync.observe(&change(state, Origin::Url, 1)).is_none());
        assert!(sync.observe(&change(state, Origin::Default, 2)).is_none());
    }

    #[test]
    fn test_nothing_is_written_before_seed() {
        let mut sync = UrlSync::mount("", ZOOM, Duration::from_millis(400));
        let state = view(10.0, 20.0, 5, OverlayKind::Wind);
        assert!(sync.observe(&change(state, Origin::Widget, 1)).is_none());
    }

    #[test]
    fn test_write_then_echo_is_not_rewritten() {
        let mut sync = listening();
        let state = view(10.0, 20.0, 5, OverlayKind::Wind);

        let write = sync.observe(&change(state, Origin::Widget, 1)).expect("scheduled");
        let query = sync.flush_due(write.generation).expect("written");
        assert_eq!(query, "?overlay=wind&lat=10.0000&lon=20.0000&zoom=5");

        assert!(sync.observe(&change(state, Origin::Widget, 2)).is_none());
        assert!(sync.external_change(&query).is_none());
        assert!(!sync.has_pending());
    }

    #[test]
    fn test_change_back_to_old_write_after_navigation_is_written() {
        let mut sync = listening();
        let windy = view(10.0, 20.0, 5, OverlayKind::Wind);
        let write = sync.observe(&change(windy, Origin::Widget, 1)).expect("scheduled");
        sync.flush_due(write.generation).expect("written");

        let seed = sync
            .external_change("?overlay=clouds&lat=10&lon=20&zoom=5")
            .expect("applied");
        assert_eq!(seed.patch.overlay, Some(OverlayKind::Clouds));
        assert_eq!(sync.last_written(), Some("?overlay=clouds&lat=10&lon=20&zoom=5"));

        let write = sync.observe(&change(windy, Origin::User, 3)).expect("scheduled");
        assert_eq!(
            sync.flush_due(write.generation).as_deref(),
            Some("?overlay=wind&lat=10.0000&lon=20.0000&zoom=5")
        );
    }

    #[test]
    fn test_newer_change_supersedes_pending_write() {
        let mut sync = listening();
        let first = sync
            .observe(&change(view(1.0, 1.0, 5, OverlayKind::Wind), Origin::Widget, 1))
            .expect("scheduled");
        let second = sync
            .observe(&change(view(2.0, 2.0, 6, OverlayKind::Wind), Origin::Search, 2))
            .expect("scheduled");
        assert!(second.generation > first.generation);

        assert!(sync.flush_due(first.generation).is_none());
        assert_eq!(
            sync.flush_due(second.generation).as_deref(),
            Some("?overlay=wind&lat=2.0000&lon=2.0000&zoom=6")
        );
    }

    #[test]
    fn test_returning_to_written_value_cancels_pending() {
        let mut sync = listening();
        let home = view(1.0, 1.0, 5, OverlayKind::Wind);
        let write = sync.observe(&change(home, Origin::Widget, 1)).expect("scheduled");
        sync.flush_due(write.generation);

        let away = sync
            .observe(&change(view(2.0, 2.0, 5, OverlayKind::Wind), Origin::Widget, 2))
            .expect("scheduled");
        assert!(sync.observe(&change(home, Origin::Widget, 3)).is_none());
        assert!(sync.flush_due(away.generation).is_none());
    }

    #[test]
    fn test_external_change_before_seed_replaces_seed() {
        let mut sync = UrlSync::mount("?zoom=4", ZOOM, Duration::from_millis(400));
        assert!(sync.external_change("?zoom=9&overlay=rain").is_none());

        let seed = sync.take_seed().expect("seed");
        assert_eq!(seed.patch.zoom, Some(9));
        assert_eq!(seed.patch.overlay, Some(OverlayKind::Precipitation));
    }

    #[test]
    fn test_external_change_after_seed_is_reapplied() {
        let mut sync = listening();
        let seed = sync
            .external_change("overlay=pressure&lat=48.85&lon=2.35")
            .expect("navigation seed");
        assert_eq!(seed.origin, Origin::Url);
        assert_eq!(seed.patch.center, Some(Coordinates::new(48.85, 2.35)));

        assert!(sync.external_change("?unrelated=1").is_none());
    }

    #[test]
    fn test_initial_view_applies_seed_to_defaults() {
        let sync = UrlSync::mount("?lat=51.5&lon=-0.12", ZOOM, Duration::from_millis(400));
        let initial = sync.initial_view(view(50.45, 30.52, 5, OverlayKind::Wind));
        assert_eq!(initial.center, Coordinates::new(51.5, -0.12));
        assert_eq!(initial.zoom, 5);
    }
}
