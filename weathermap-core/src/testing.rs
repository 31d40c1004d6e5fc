//! Test doubles and harnesses for the map
//!
//! - In-memory implementations of every seam: [`MemoryScriptHost`],
//!   [`ManualWidgetApi`], [`RecordingWidget`], [`MemoryNavigator`],
//!   [`ScriptedGeocoder`], [`FixedOverlaySource`]
//! - [`TestServices`] bundles them into [`MapServices`] for a runtime
//! - [`MapHarness`] drives the reducer directly, without tasks or timers
//! - Assertion macros for actions and effects
//!
//! ```ignore
//! let mut harness = MapHarness::mount(test_config(), "?zoom=6");
//! let effects = harness.ready(Arc::new(RecordingWidget::new()));
//! assert_emitted!(effects, MapEffect::SetView { zoom: 6, .. });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use crate::action::MapAction;
use crate::config::MapConfig;
use crate::effect::{DispatchResult, MapEffect};
use crate::fallback::{FallbackError, StaticOverlaySource};
use crate::geocode::{GeocodeError, Geocoder};
use crate::reducer::reducer;
use crate::runtime::MapServices;
use crate::script::{ScriptHost, ScriptLoadError, ScriptLoader};
use crate::state::MapState;
use crate::url_sync::Navigator;
use crate::view::{Coordinates, OverlayKind};
use crate::widget::{
    BootstrapConfig, DisposalToken, InitCallback, MapWidget, WidgetApi, WidgetDelivery,
    WidgetListener, MOVE_EVENT, OVERLAY_KEY,
};
use crate::BoxFuture;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Config with test script URLs and short timeouts.
pub fn test_config() -> MapConfig {
    MapConfig {
        api_key: "test-key".to_string(),
        script_urls: vec![
            "https://cdn.example/leaflet.js".to_string(),
            "https://cdn.example/boot.js".to_string(),
        ],
        script_timeout: Duration::from_secs(5),
        init_timeout: Duration::from_secs(10),
        url_debounce: Duration::from_millis(400),
        ..MapConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Scripts

#[derive(Debug, Default)]
struct HostLog {
    fetches: HashMap<String, usize>,
    failures: HashMap<String, usize>,
    inserted: Vec<String>,
}

/// Script host that records insertions and can fail or stall on demand.
#[derive(Debug, Default)]
pub struct MemoryScriptHost {
    delay: Duration,
    log: Mutex<HostLog>,
}

impl MemoryScriptHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insertion takes `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The next `times` insertions of `url` fail with a network error.
    pub fn fail_times(&self, url: &str, times: usize) {
        lock(&self.log).failures.insert(url.to_string(), times);
    }

    /// Insertion attempts for `url`, failed ones included.
    pub fn fetches(&self, url: &str) -> usize {
        lock(&self.log).fetches.get(url).copied().unwrap_or(0)
    }

    /// Successfully inserted URLs in order.
    pub fn inserted(&self) -> Vec<String> {
        lock(&self.log).inserted.clone()
    }
}

impl ScriptHost for MemoryScriptHost {
    fn insert_script<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<(), ScriptLoadError>> {
        Box::pin(async move {
            *lock(&self.log).fetches.entry(url.to_string()).or_default() += 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let mut log = lock(&self.log);
            if let Some(remaining) = log.failures.get_mut(url).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(ScriptLoadError::Network {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            log.inserted.push(url.to_string());
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Widget

/// A call made on a [`RecordingWidget`]
#[derive(Clone, Debug, PartialEq)]
pub enum WidgetCall {
    StoreSet { key: String, value: String },
    SetView { center: Coordinates, zoom: u8 },
    Center,
    Zoom,
    On(String),
}

type SharedListener = Arc<dyn Fn() + Send + Sync>;

struct RecordingInner {
    center: Coordinates,
    zoom: u8,
    calls: Vec<WidgetCall>,
    listeners: Vec<(String, SharedListener)>,
}

/// Map widget that records every call.
///
/// `pan_to` simulates a user drag: the position changes and `moveend`
/// listeners fire. With [`echo_moves`](Self::echo_moves), `set_view` fires
/// them too, like the real widget.
pub struct RecordingWidget {
    echo_moves: bool,
    inner: Mutex<RecordingInner>,
}

impl std::fmt::Debug for RecordingWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("RecordingWidget")
            .field("center", &inner.center)
            .field("zoom", &inner.zoom)
            .field("calls", &inner.calls.len())
            .finish()
    }
}

impl Default for RecordingWidget {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingWidget {
    pub fn new() -> Self {
        Self {
            echo_moves: false,
            inner: Mutex::new(RecordingInner {
                center: Coordinates::new(0.0, 0.0),
                zoom: 3,
                calls: Vec::new(),
                listeners: Vec::new(),
            }),
        }
    }

    pub fn echo_moves(mut self) -> Self {
        self.echo_moves = true;
        self
    }

    pub fn calls(&self) -> Vec<WidgetCall> {
        lock(&self.inner).calls.clone()
    }

    /// Values written to the `overlay` store key, in order.
    pub fn overlay_sets(&self) -> Vec<String> {
        lock(&self.inner)
            .calls
            .iter()
            .filter_map(|call| match call {
                WidgetCall::StoreSet { key, value } if key == OVERLAY_KEY => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn set_view_calls(&self) -> Vec<(Coordinates, u8)> {
        lock(&self.inner)
            .calls
            .iter()
            .filter_map(|call| match call {
                WidgetCall::SetView { center, zoom } => Some((*center, *zoom)),
                _ => None,
            })
            .collect()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.inner)
            .listeners
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    /// User drag or zoom: move without a recorded call, then fire `moveend`.
    pub fn pan_to(&self, center: Coordinates, zoom: u8) {
        {
            let mut inner = lock(&self.inner);
            inner.center = center;
            inner.zoom = zoom;
        }
        self.emit(MOVE_EVENT);
    }

    /// Fire every listener registered for `event`.
    pub fn emit(&self, event: &str) {
        let listeners: Vec<SharedListener> = lock(&self.inner)
            .listeners
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl MapWidget for RecordingWidget {
    fn store_set(&self, key: &str, value: &str) {
        lock(&self.inner).calls.push(WidgetCall::StoreSet {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    fn set_view(&self, center: Coordinates, zoom: u8) {
        {
            let mut inner = lock(&self.inner);
            inner.calls.push(WidgetCall::SetView { center, zoom });
            inner.center = center;
            inner.zoom = zoom;
        }
        if self.echo_moves {
            self.emit(MOVE_EVENT);
        }
    }

    fn center(&self) -> Coordinates {
        let mut inner = lock(&self.inner);
        inner.calls.push(WidgetCall::Center);
        inner.center
    }

    fn zoom(&self) -> u8 {
        let mut inner = lock(&self.inner);
        inner.calls.push(WidgetCall::Zoom);
        inner.zoom
    }

    fn on(&self, event: &str, listener: WidgetListener) {
        let mut inner = lock(&self.inner);
        inner.calls.push(WidgetCall::On(event.to_string()));
        inner.listeners.push((event.to_string(), Arc::from(listener)));
    }
}

#[derive(Default)]
struct ManualInner {
    pending: Vec<InitCallback>,
    configs: Vec<BootstrapConfig>,
}

/// Widget init entry point whose callbacks the test fires by hand, or
/// immediately with [`auto_ready`](Self::auto_ready).
#[derive(Default)]
pub struct ManualWidgetApi {
    auto: Option<Arc<dyn MapWidget>>,
    inner: Mutex<ManualInner>,
    init_seen: Notify,
}

impl std::fmt::Debug for ManualWidgetApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualWidgetApi")
            .field("auto", &self.auto.is_some())
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualWidgetApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every init with `widget` right away.
    pub fn auto_ready<W: MapWidget + 'static>(widget: Arc<W>) -> Self {
        let widget: Arc<dyn MapWidget> = widget;
        Self {
            auto: Some(widget),
            ..Self::default()
        }
    }

    /// Configs passed to `init`, in order.
    pub fn configs(&self) -> Vec<BootstrapConfig> {
        lock(&self.inner).configs.clone()
    }

    /// Callbacks not yet fired.
    pub fn pending(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    /// Wait until an `init` call is pending.
    pub async fn wait_for_init(&self) {
        loop {
            if self.pending() > 0 {
                return;
            }
            self.init_seen.notified().await;
        }
    }

    fn take_oldest(&self) -> Option<InitCallback> {
        let mut inner = lock(&self.inner);
        (!inner.pending.is_empty()).then(|| inner.pending.remove(0))
    }

    /// Fire the oldest pending callback with `widget`.
    pub fn complete<W: MapWidget + 'static>(&self, widget: Arc<W>) -> bool {
        let Some(callback) = self.take_oldest() else {
            return false;
        };
        let widget: Arc<dyn MapWidget> = widget;
        callback(Ok(widget));
        true
    }

    /// Fire the oldest pending callback with an init failure.
    pub fn fail(&self, message: &str) -> bool {
        let Some(callback) = self.take_oldest() else {
            return false;
        };
        callback(Err(message.to_string()));
        true
    }

    /// Drop every pending callback without calling it.
    pub fn drop_pending(&self) {
        lock(&self.inner).pending.clear();
    }
}

impl WidgetApi for ManualWidgetApi {
    fn init(&self, config: &BootstrapConfig, callback: InitCallback) {
        lock(&self.inner).configs.push(config.clone());
        match &self.auto {
            Some(widget) => callback(Ok(widget.clone())),
            None => {
                lock(&self.inner).pending.push(callback);
                self.init_seen.notify_one();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Navigation, geocoding, fallback

/// Navigation entry kept in memory.
#[derive(Debug, Default)]
pub struct MemoryNavigator {
    query: Mutex<String>,
    writes: Mutex<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(query: &str) -> Self {
        Self {
            query: Mutex::new(query.to_string()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Every `replace_query` call, in order.
    pub fn writes(&self) -> Vec<String> {
        lock(&self.writes).clone()
    }

    /// Simulate back/forward: the entry changes without a write.
    pub fn navigate(&self, query: &str) -> String {
        *lock(&self.query) = query.to_string();
        query.to_string()
    }
}

impl Navigator for MemoryNavigator {
    fn query(&self) -> String {
        lock(&self.query).clone()
    }

    fn replace_query(&self, query: &str) {
        *lock(&self.query) = query.to_string();
        lock(&self.writes).push(query.to_string());
    }
}

/// Geocoder answering from a fixed table, with optional per-city latency.
#[derive(Debug, Default)]
pub struct ScriptedGeocoder {
    cities: HashMap<String, Result<Coordinates, GeocodeError>>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_city(mut self, name: &str, coords: Coordinates) -> Self {
        self.cities.insert(name.to_lowercase(), Ok(coords));
        self
    }

    pub fn with_error(mut self, name: &str, error: GeocodeError) -> Self {
        self.cities.insert(name.to_lowercase(), Err(error));
        self
    }

    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_lowercase(), delay);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

impl Geocoder for ScriptedGeocoder {
    fn resolve_coordinates<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Coordinates, GeocodeError>> {
        Box::pin(async move {
            lock(&self.requests).push(name.to_string());
            let key = name.to_lowercase();
            if let Some(delay) = self.delays.get(&key) {
                tokio::time::sleep(*delay).await;
            }
            self.cities
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Err(GeocodeError::NotFound(name.to_string())))
        })
    }
}

/// Static overlay source returning `{base}/{overlay}.png`.
#[derive(Debug)]
pub struct FixedOverlaySource {
    base: Option<String>,
    requested: Mutex<Vec<OverlayKind>>,
}

impl FixedOverlaySource {
    pub fn new(base: &str) -> Self {
        Self {
            base: Some(base.trim_end_matches('/').to_string()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            base: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<OverlayKind> {
        lock(&self.requested).clone()
    }
}

impl StaticOverlaySource for FixedOverlaySource {
    fn static_overlay_url<'a>(
        &'a self,
        kind: OverlayKind,
    ) -> BoxFuture<'a, Result<String, FallbackError>> {
        Box::pin(async move {
            lock(&self.requested).push(kind);
            match &self.base {
                Some(base) => Ok(format!("{}/{}.png", base, kind)),
                None => Err(FallbackError {
                    overlay: kind,
                    message: "service unavailable".to_string(),
                }),
            }
        })
    }
}

/// The in-memory doubles behind one [`MapServices`].
///
/// The script loader is created once, so remounts share its cache.
pub struct TestServices {
    pub scripts: Arc<MemoryScriptHost>,
    pub widget_api: Arc<ManualWidgetApi>,
    pub geocoder: Arc<ScriptedGeocoder>,
    pub navigator: Arc<MemoryNavigator>,
    pub fallback: Arc<FixedOverlaySource>,
    loader: ScriptLoader,
}

impl TestServices {
    pub fn new(query: &str) -> Self {
        let scripts = Arc::new(MemoryScriptHost::new());
        let loader = ScriptLoader::new(scripts.clone(), test_config().script_timeout);
        Self {
            scripts,
            widget_api: Arc::new(ManualWidgetApi::new()),
            geocoder: Arc::new(ScriptedGeocoder::new()),
            navigator: Arc::new(MemoryNavigator::new(query)),
            fallback: Arc::new(FixedOverlaySource::new("https://tiles.example")),
            loader,
        }
    }

    pub fn with_widget_api(mut self, api: ManualWidgetApi) -> Self {
        self.widget_api = Arc::new(api);
        self
    }

    pub fn with_geocoder(mut self, geocoder: ScriptedGeocoder) -> Self {
        self.geocoder = Arc::new(geocoder);
        self
    }

    pub fn with_script_host(mut self, host: MemoryScriptHost) -> Self {
        self.scripts = Arc::new(host);
        self.loader = ScriptLoader::new(self.scripts.clone(), test_config().script_timeout);
        self
    }

    pub fn services(&self) -> MapServices {
        MapServices {
            scripts: self.loader.clone(),
            widget_api: self.widget_api.clone(),
            geocoder: self.geocoder.clone(),
            navigator: self.navigator.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness

/// Drives the reducer synchronously: no tasks, no timers.
///
/// View store notifications are captured as `ViewDidChange` actions and
/// only dispatched by [`settle`](Self::settle).
pub struct MapHarness {
    pub state: MapState,
    tx: mpsc::UnboundedSender<MapAction>,
    rx: mpsc::UnboundedReceiver<MapAction>,
}

impl MapHarness {
    pub fn mount(config: MapConfig, query: &str) -> Self {
        let mut state = MapState::mount(config, query, DisposalToken::next());
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = tx.clone();
        let _subscription = state.view.subscribe(move |change| {
            let _ = sink.send(MapAction::ViewDidChange(*change));
        });
        Self { state, tx, rx }
    }

    /// Open a new tick on the view store.
    pub fn tick(&mut self) {
        self.state.view.begin_tick();
    }

    pub fn dispatch(&mut self, action: MapAction) -> DispatchResult<MapEffect> {
        reducer(&mut self.state, action)
    }

    /// Dispatch `actions` within one tick; returns all their effects.
    pub fn dispatch_tick(&mut self, actions: Vec<MapAction>) -> Vec<MapEffect> {
        self.tick();
        actions
            .into_iter()
            .flat_map(|action| self.dispatch(action).effects)
            .collect()
    }

    /// Queue an action as if a task had produced it.
    pub fn emit(&self, action: MapAction) {
        let _ = self.tx.send(action);
    }

    pub fn drain_emitted(&mut self) -> Vec<MapAction> {
        let mut actions = Vec::new();
        while let Ok(action) = self.rx.try_recv() {
            actions.push(action);
        }
        actions
    }

    /// Dispatch queued actions until none are left; returns their effects.
    pub fn settle(&mut self) -> Vec<MapEffect> {
        let mut effects = Vec::new();
        loop {
            let queued = self.drain_emitted();
            if queued.is_empty() {
                return effects;
            }
            for action in queued {
                effects.extend(self.dispatch(action).effects);
            }
        }
    }

    /// Deliver `widget` for `attempt` of this mount; returns the effects.
    pub fn complete<W: MapWidget + 'static>(&mut self, attempt: u32, widget: Arc<W>) -> Vec<MapEffect> {
        let widget: Arc<dyn MapWidget> = widget;
        let generation = self.state.generation();
        self.dispatch(MapAction::WidgetDidInit {
            generation,
            attempt,
            delivery: WidgetDelivery::new(widget),
        })
        .effects
    }

    /// Start the first attempt and deliver `widget` for it.
    pub fn ready<W: MapWidget + 'static>(&mut self, widget: Arc<W>) -> Vec<MapEffect> {
        self.tick();
        self.dispatch(MapAction::WidgetLoad);
        let attempt = self.state.widget.attempt();
        self.complete(attempt, widget)
    }
}

/// Assert that an action (or effect) matching a pattern is present.
#[macro_export]
macro_rules! assert_emitted {
    ($items:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            $items.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected an item matching `{}`, but got: {:?}",
            stringify!($pattern),
            $items
        );
    };
}

/// Assert that no action (or effect) matches a pattern.
#[macro_export]
macro_rules! assert_not_emitted {
    ($items:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            !$items.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected NO item matching `{}`, but got: {:?}",
            stringify!($pattern),
            $items
        );
    };
}

/// Count actions (or effects) matching a pattern.
#[macro_export]
macro_rules! count_emitted {
    ($items:expr, $pattern:pat $(if $guard:expr)?) => {
        $items.iter().filter(|a| matches!(a, $pattern $(if $guard)?)).count()
    };
}

/// Assert that an action of a category is present.
#[macro_export]
macro_rules! assert_category_emitted {
    ($actions:expr, $category:expr) => {
        assert!(
            $actions.iter().any(|a| {
                use $crate::ActionCategory;
                a.category() == Some($category)
            }),
            "Expected action with category `{}`, but got: {:?}",
            $category,
            $actions
        );
    };
}
