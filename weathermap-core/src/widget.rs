//! Third-party map widget: handle, bootstrap and per-mount lifecycle
//!
//! The widget is created by an external, callback-driven entry point:
//! `init(config, callback)` returns immediately and later invokes `callback`
//! at most once. [`WidgetBootstrapper`] turns that into an awaitable result
//! guarded by the mount's [`DisposalToken`]:
//!
//! - callback fires while mounted: `Ok(Bootstrapped::Ready(widget))`
//! - view unmounted first: `Ok(Bootstrapped::Disposed)`, the late callback is a no-op
//! - callback never fires: `Err(InitError::Timeout)`

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::load_state::LoadState;
use crate::script::{ScriptLoadError, ScriptLoader};
use crate::view::{Coordinates, OverlayKind};

/// Widget store key holding the active overlay.
pub const OVERLAY_KEY: &str = "overlay";

/// Widget event fired after every pan or zoom.
pub const MOVE_EVENT: &str = "moveend";

/// Listener registered through [`MapWidget::on`].
pub type WidgetListener = Box<dyn Fn() + Send + Sync>;

/// The capability handed out by the widget's init callback.
pub trait MapWidget: Send + Sync {
    /// `store.set(key, value)`
    fn store_set(&self, key: &str, value: &str);
    /// `map.setView([lat, lon], zoom)`
    fn set_view(&self, center: Coordinates, zoom: u8);
    /// `map.getCenter()`
    fn center(&self) -> Coordinates;
    /// `map.getZoom()`
    fn zoom(&self) -> u8;
    /// `map.on(event, listener)`
    fn on(&self, event: &str, listener: WidgetListener);
}

/// One-shot completion passed to [`WidgetApi::init`].
///
/// `Err` carries the message of an initialization failure inside the widget.
pub type InitCallback = Box<dyn FnOnce(Result<Arc<dyn MapWidget>, String>) + Send>;

/// External initialization entry point, available once its scripts loaded.
pub trait WidgetApi: Send + Sync {
    fn init(&self, config: &BootstrapConfig, callback: InitCallback);
}

/// Options sent to the widget's init entry point
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    pub api_key: String,
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
    pub container_id: String,
}

/// Error bringing up the widget
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitError {
    /// A required script failed to load
    Script(ScriptLoadError),
    /// The init callback did not fire in time
    Timeout(Duration),
    /// The widget reported an initialization failure
    Callback(String),
    /// The widget dropped the callback without calling it
    Abandoned,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Script(e) => write!(f, "{}", e),
            InitError::Timeout(after) => {
                write!(f, "Map widget did not initialize within {:?}", after)
            }
            InitError::Callback(msg) => write!(f, "Map widget failed to initialize: {}", msg),
            InitError::Abandoned => write!(f, "Map widget never completed initialization"),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::Script(e) => Some(e),
            _ => None,
        }
    }
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Per-mount marker, invalidated on unmount.
///
/// Async completions carry the generation they were started under and must
/// check [`DisposalToken::is_current`] before touching the handle or view.
#[derive(Clone, Debug)]
pub struct DisposalToken {
    generation: u64,
    cancel: CancellationToken,
}

impl DisposalToken {
    /// Token for a new mount with a process-unique generation.
    pub fn next() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            cancel: CancellationToken::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the mount is disposed.
    pub async fn disposed(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && !self.is_disposed()
    }
}

/// Widget delivered by a successful bootstrap, in transit to the map loop.
///
/// Cloning shares the slot; the widget can be taken out exactly once.
#[derive(Clone)]
pub struct WidgetDelivery(Arc<Mutex<Option<Arc<dyn MapWidget>>>>);

impl WidgetDelivery {
    pub fn new(widget: Arc<dyn MapWidget>) -> Self {
        Self(Arc::new(Mutex::new(Some(widget))))
    }

    pub fn take(&self) -> Option<Arc<dyn MapWidget>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl fmt::Debug for WidgetDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("WidgetDelivery")
            .field("pending", &pending)
            .finish()
    }
}

/// Owning handle to a ready widget. Not `Clone`: the mount's [`WidgetSlot`]
/// is its only owner, everyone else borrows it while the slot is `Ready`.
pub struct WidgetHandle {
    widget: Arc<dyn MapWidget>,
}

impl WidgetHandle {
    pub fn new(widget: Arc<dyn MapWidget>) -> Self {
        Self { widget }
    }

    pub fn set_view(&self, center: Coordinates, zoom: u8) {
        self.widget.set_view(center, zoom);
    }

    pub fn set_overlay(&self, kind: OverlayKind) {
        self.widget.store_set(OVERLAY_KEY, kind.widget_value());
    }

    pub fn center(&self) -> Coordinates {
        self.widget.center()
    }

    pub fn zoom(&self) -> u8 {
        self.widget.zoom()
    }

    pub fn on(&self, event: &str, listener: WidgetListener) {
        self.widget.on(event, listener);
    }

    /// Non-owning reference for event listeners living inside the widget.
    pub fn downgrade(&self) -> Weak<dyn MapWidget> {
        Arc::downgrade(&self.widget)
    }
}

impl fmt::Debug for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetHandle").finish_non_exhaustive()
    }
}

/// Outcome of a bootstrap that did not fail
pub enum Bootstrapped {
    Ready(Arc<dyn MapWidget>),
    /// The mount went away first; nothing was published.
    Disposed,
}

impl fmt::Debug for Bootstrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bootstrapped::Ready(_) => f.write_str("Ready"),
            Bootstrapped::Disposed => f.write_str("Disposed"),
        }
    }
}

/// Loads the widget's scripts and runs its one-shot init entry point.
#[derive(Clone)]
pub struct WidgetBootstrapper {
    api: Arc<dyn WidgetApi>,
    scripts: ScriptLoader,
    timeout: Duration,
}

impl fmt::Debug for WidgetBootstrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetBootstrapper")
            .field("scripts", &self.scripts)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl WidgetBootstrapper {
    pub fn new(api: Arc<dyn WidgetApi>, scripts: ScriptLoader, timeout: Duration) -> Self {
        Self {
            api,
            scripts,
            timeout,
        }
    }

    pub fn scripts(&self) -> &ScriptLoader {
        &self.scripts
    }

    /// Load every script in `script_urls`, then bootstrap.
    pub async fn load_and_bootstrap(
        &self,
        script_urls: &[String],
        config: &BootstrapConfig,
        token: &DisposalToken,
    ) -> Result<Bootstrapped, InitError> {
        self.scripts
            .load_all(script_urls)
            .await
            .map_err(InitError::Script)?;

        if token.is_disposed() {
            debug!(generation = token.generation(), "Unmounted while loading scripts");
            return Ok(Bootstrapped::Disposed);
        }
        self.bootstrap(config, token).await
    }

    /// Invoke the widget's init entry point and wait for its callback.
    ///
    /// Precondition: the widget's scripts are loaded.
    pub async fn bootstrap(
        &self,
        config: &BootstrapConfig,
        token: &DisposalToken,
    ) -> Result<Bootstrapped, InitError> {
        let (tx, rx) = oneshot::channel();
        let guard = token.clone();
        let callback: InitCallback = Box::new(move |result| {
            if guard.is_disposed() {
                debug!(
                    generation = guard.generation(),
                    "Widget init callback after unmount ignored"
                );
                return;
            }
            let _ = tx.send(result);
        });

        info!(container = %config.container_id, "Bootstrapping map widget");
        self.api.init(config, callback);

        tokio::select! {
            biased;
            _ = token.disposed() => Ok(Bootstrapped::Disposed),
            outcome = tokio::time::timeout(self.timeout, rx) => match outcome {
                Err(_) => Err(InitError::Timeout(self.timeout)),
                Ok(Err(_)) if token.is_disposed() => Ok(Bootstrapped::Disposed),
                Ok(Err(_)) => Err(InitError::Abandoned),
                Ok(Ok(Ok(widget))) => Ok(Bootstrapped::Ready(widget)),
                Ok(Ok(Err(message))) => Err(InitError::Callback(message)),
            },
        }
    }
}

/// Per-mount widget state machine.
///
/// Each `begin` starts a numbered attempt; completions for any other attempt
/// are rejected. `Ready` is terminal for the mount.
#[derive(Debug, Default)]
pub struct WidgetSlot {
    state: LoadState<WidgetHandle, InitError>,
    attempt: u32,
}

impl WidgetSlot {
    pub fn state(&self) -> &LoadState<WidgetHandle, InitError> {
        &self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start an attempt from `NotStarted` or `Failed`.
    pub fn begin(&mut self) -> Option<u32> {
        match self.state {
            LoadState::NotStarted | LoadState::Failed(_) => {
                self.attempt += 1;
                self.state = LoadState::Loading;
                Some(self.attempt)
            }
            LoadState::Loading | LoadState::Ready(_) => None,
        }
    }

    fn accepts(&self, attempt: u32) -> bool {
        attempt == self.attempt && self.state.is_loading()
    }

    pub fn complete_ready(&mut self, attempt: u32, handle: WidgetHandle) -> bool {
        if !self.accepts(attempt) {
            debug!(attempt, current = self.attempt, "Dropping widget from superseded attempt");
            return false;
        }
        self.state = LoadState::Ready(handle);
        true
    }

    pub fn complete_failed(&mut self, attempt: u32, error: InitError) -> bool {
        if !self.accepts(attempt) {
            return false;
        }
        self.state = LoadState::Failed(error);
        true
    }

    /// Borrow the handle while `Ready`.
    pub fn handle(&self) -> Option<&WidgetHandle> {
        self.state.ready()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Drop the handle on unmount.
    pub fn release(&mut self) {
        self.state = LoadState::NotStarted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualWidgetApi, MemoryScriptHost, RecordingWidget};

    fn config() -> BootstrapConfig {
        BootstrapConfig {
            api_key: "test-key".into(),
            lat: 51.5,
            lon: -0.12,
            zoom: 6,
            container_id: "windy".into(),
        }
    }

    fn bootstrapper(api: &Arc<ManualWidgetApi>) -> WidgetBootstrapper {
        let scripts = ScriptLoader::new(
            Arc::new(MemoryScriptHost::new()),
            Duration::from_secs(5),
        );
        WidgetBootstrapper::new(api.clone(), scripts, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_bootstrap_resolves_with_widget() {
        let api = Arc::new(ManualWidgetApi::new());
        let boot = bootstrapper(&api);
        let token = DisposalToken::next();

        let task = tokio::spawn({
            let boot = boot.clone();
            let token = token.clone();
            async move { boot.bootstrap(&config(), &token).await }
        });
        api.wait_for_init().await;
        assert_eq!(api.configs(), vec![config()]);
        assert!(api.complete(Arc::new(RecordingWidget::new())));

        let outcome = task.await.expect("join");
        assert!(matches!(outcome, Ok(Bootstrapped::Ready(_))));
    }

    #[tokio::test]
    async fn test_callback_error_is_init_error() {
        let api = Arc::new(ManualWidgetApi::new());
        let boot = bootstrapper(&api);
        let token = DisposalToken::next();

        let task = tokio::spawn({
            let boot = boot.clone();
            let token = token.clone();
            async move { boot.bootstrap(&config(), &token).await }
        });
        api.wait_for_init().await;
        api.fail("invalid api key");

        let outcome = task.await.expect("join");
        assert_eq!(outcome.unwrap_err(), InitError::Callback("invalid api key".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_times_out() {
        let api = Arc::new(ManualWidgetApi::new());
        let boot = bootstrapper(&api);
        let token = DisposalToken::next();

        let outcome = boot.bootstrap(&config(), &token).await;

        assert_eq!(outcome.unwrap_err(), InitError::Timeout(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_dropped_callback_is_abandoned() {
        let api = Arc::new(ManualWidgetApi::new());
        let boot = bootstrapper(&api);
        let token = DisposalToken::next();

        let task = tokio::spawn({
            let boot = boot.clone();
            let token = token.clone();
            async move { boot.bootstrap(&config(), &token).await }
        });
        api.wait_for_init().await;
        api.drop_pending();

        assert_eq!(task.await.expect("join").unwrap_err(), InitError::Abandoned);
    }

    #[tokio::test]
    async fn test_unmount_before_callback_is_silent() {
        let api = Arc::new(ManualWidgetApi::new());
        let boot = bootstrapper(&api);
        let token = DisposalToken::next();

        let task = tokio::spawn({
            let boot = boot.clone();
            let token = token.clone();
            async move { boot.bootstrap(&config(), &token).await }
        });
        api.wait_for_init().await;
        token.dispose();

        let outcome = task.await.expect("join");
        assert!(matches!(outcome, Ok(Bootstrapped::Disposed)));

        // The late callback is swallowed and never touches the widget.
        let widget = Arc::new(RecordingWidget::new());
        assert!(api.complete(widget.clone()));
        assert!(widget.calls().is_empty());
    }

    #[tokio::test]
    async fn test_script_failure_skips_init() {
        let host = Arc::new(MemoryScriptHost::new());
        host.fail_times("https://cdn.example/boot.js", 1);
        let api = Arc::new(ManualWidgetApi::new());
        let boot = WidgetBootstrapper::new(
            api.clone(),
            ScriptLoader::new(host, Duration::from_secs(5)),
            Duration::from_secs(10),
        );

        let outcome = boot
            .load_and_bootstrap(
                &["https://cdn.example/boot.js".to_string()],
                &config(),
                &DisposalToken::next(),
            )
            .await;

        assert!(matches!(outcome, Err(InitError::Script(_))));
        assert_eq!(api.pending(), 0);
    }

    #[test]
    fn test_disposal_token_generations_are_unique() {
        let a = DisposalToken::next();
        let b = DisposalToken::next();
        assert_ne!(a.generation(), b.generation());
        assert!(a.is_current(a.generation()));
        assert!(!a.is_current(b.generation()));

        a.dispose();
        assert!(!a.is_current(a.generation()));
        assert!(!b.is_disposed());
    }

    #[test]
    fn test_delivery_yields_widget_once() {
        let delivery = WidgetDelivery::new(Arc::new(RecordingWidget::new()));
        let copy = delivery.clone();

        assert!(copy.take().is_some());
        assert!(delivery.take().is_none());
    }

    #[test]
    fn test_slot_attempts() {
        let mut slot = WidgetSlot::default();
        let first = slot.begin().expect("first attempt");
        assert!(slot.begin().is_none(), "already loading");

        assert!(slot.complete_failed(first, InitError::Abandoned));
        let second = slot.begin().expect("retry after failure");

        let widget = Arc::new(RecordingWidget::new());
        assert!(!slot.complete_ready(first, WidgetHandle::new(widget.clone())));
        assert!(slot.complete_ready(second, WidgetHandle::new(widget)));
        assert!(slot.is_ready());
        assert!(slot.begin().is_none(), "ready is terminal");

        slot.release();
        assert!(slot.handle().is_none());
    }

    #[test]
    fn test_bootstrap_config_wire_names() {
        let json = serde_json::to_value(config()).expect("serialize");
        assert_eq!(json["apiKey"], "test-key");
        assert_eq!(json["containerId"], "windy");
        assert_eq!(json["zoom"], 6);
    }
}
