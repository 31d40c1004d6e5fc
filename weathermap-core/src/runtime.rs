//! Runtime for one mounted map
//!
//! Owns the [`MapState`], runs the reducer and executes its effects against
//! the injected [`MapServices`]. Async work runs as tokio tasks whose
//! completions come back through the action channel.
//!
//! A tick is one batch of queued actions: [`MapRuntime::step`] waits for the
//! first, opens a tick on the view store, then drains everything already
//! queued, including actions produced while handling the batch itself.
//!
//! ```ignore
//! let mut runtime = MapRuntime::mount(config, services);
//! runtime.watch_navigation(popstate_stream);
//! runtime.run(shutdown).await;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::action::MapAction;
use crate::config::MapConfig;
use crate::effect::MapEffect;
use crate::fallback::StaticOverlaySource;
use crate::geocode::{lookup, Geocoder};
use crate::middleware::{Middleware, NoopMiddleware};
use crate::reducer::reducer;
use crate::script::ScriptLoader;
use crate::state::{MapState, MapStatus};
use crate::store::Unsubscribe;
use crate::subscriptions::Subscriptions;
use crate::tasks::TaskManager;
use crate::url_sync::Navigator;
use crate::widget::{
    Bootstrapped, DisposalToken, WidgetApi, WidgetBootstrapper, WidgetDelivery, MOVE_EVENT,
};

/// External capabilities a map mount talks to.
///
/// `scripts` is shared: hand clones of one loader to every mount.
#[derive(Clone)]
pub struct MapServices {
    pub scripts: ScriptLoader,
    pub widget_api: Arc<dyn WidgetApi>,
    pub geocoder: Arc<dyn Geocoder>,
    pub navigator: Arc<dyn Navigator>,
    pub fallback: Arc<dyn StaticOverlaySource>,
}

pub struct MapRuntime<M = NoopMiddleware> {
    state: MapState,
    services: MapServices,
    bootstrapper: WidgetBootstrapper,
    action_tx: mpsc::UnboundedSender<MapAction>,
    action_rx: mpsc::UnboundedReceiver<MapAction>,
    tasks: TaskManager<MapAction>,
    subscriptions: Subscriptions<MapAction>,
    middleware: M,
    view_subscription: Option<Unsubscribe>,
}

impl MapRuntime<NoopMiddleware> {
    /// Mount a map: read the page query and queue the first widget load.
    pub fn mount(config: MapConfig, services: MapServices) -> Self {
        Self::mount_with_middleware(config, services, NoopMiddleware)
    }
}

impl<M: Middleware<MapAction>> MapRuntime<M> {
    pub fn mount_with_middleware(config: MapConfig, services: MapServices, middleware: M) -> Self {
        let query = services.navigator.query();
        let bootstrapper = WidgetBootstrapper::new(
            services.widget_api.clone(),
            services.scripts.clone(),
            config.init_timeout,
        );
        let mut state = MapState::mount(config, &query, DisposalToken::next());

        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let sink = action_tx.clone();
        let view_subscription = state.view.subscribe(move |change| {
            let _ = sink.send(MapAction::ViewDidChange(*change));
        });

        info!(generation = state.generation(), query = %query, "Map mounted");
        let runtime = Self {
            state,
            services,
            bootstrapper,
            tasks: TaskManager::new(action_tx.clone()),
            subscriptions: Subscriptions::new(action_tx.clone()),
            action_tx,
            action_rx,
            middleware,
            view_subscription: Some(view_subscription),
        };
        runtime.enqueue(MapAction::WidgetLoad);
        runtime
    }

    /// Send an action into the runtime queue.
    pub fn enqueue(&self, action: MapAction) {
        let _ = self.action_tx.send(action);
    }

    /// Clone the action sender.
    pub fn action_tx(&self) -> mpsc::UnboundedSender<MapAction> {
        self.action_tx.clone()
    }

    pub fn state(&self) -> &MapState {
        &self.state
    }

    pub fn status(&self) -> MapStatus {
        self.state.status()
    }

    pub fn middleware(&self) -> &M {
        &self.middleware
    }

    pub fn tasks(&self) -> &TaskManager<MapAction> {
        &self.tasks
    }

    /// Feed page URL changes (back/forward) into the map.
    pub fn watch_navigation<S>(&mut self, queries: S)
    where
        S: Stream<Item = String> + Send + 'static,
    {
        self.subscriptions
            .stream("navigation", queries.map(MapAction::UrlDidChange));
    }

    /// Run one action through middleware and reducer, then its effects.
    pub fn dispatch(&mut self, action: MapAction) -> bool {
        self.middleware.before(&action);
        let result = reducer(&mut self.state, action.clone());
        self.middleware.after(&action, result.changed);

        for effect in result.effects {
            self.handle_effect(effect);
        }
        result.changed
    }

    /// Process one tick. Returns `false` once the queue is closed.
    pub async fn step(&mut self) -> bool {
        let Some(first) = self.action_rx.recv().await else {
            return false;
        };
        self.state.view.begin_tick();
        self.dispatch(first);
        while let Ok(action) = self.action_rx.try_recv() {
            self.dispatch(action);
        }
        true
    }

    /// Process ticks until `shutdown` fires, then unmount.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                more = self.step() => {
                    if !more {
                        break;
                    }
                }
            }
        }
        self.unmount();
    }

    /// Tear the mount down. Late completions become no-ops.
    pub fn unmount(&mut self) {
        if self.state.token.is_disposed() {
            return;
        }
        self.state.token.dispose();
        self.tasks.cancel_all();
        self.subscriptions.cancel_all();
        if let Some(subscription) = self.view_subscription.take() {
            self.state.view.unsubscribe(subscription);
        }
        self.state.geocode.cancel();
        self.state.overlay.clear();
        self.state.widget.release();
        info!(generation = self.state.generation(), "Map unmounted");
    }

    fn handle_effect(&mut self, effect: MapEffect) {
        let generation = self.state.generation();
        match effect {
            MapEffect::LoadWidget { attempt, config } => {
                let bootstrapper = self.bootstrapper.clone();
                let urls = self.state.config.script_urls.clone();
                let token = self.state.token.clone();
                self.tasks.spawn("widget", async move {
                    match bootstrapper.load_and_bootstrap(&urls, &config, &token).await {
                        Ok(Bootstrapped::Ready(widget)) => Some(MapAction::WidgetDidInit {
                            generation,
                            attempt,
                            delivery: WidgetDelivery::new(widget),
                        }),
                        Ok(Bootstrapped::Disposed) => None,
                        Err(error) => Some(MapAction::WidgetDidFail {
                            generation,
                            attempt,
                            error,
                        }),
                    }
                });
            }

            MapEffect::SetView { center, zoom } => {
                if let Some(handle) = self.state.widget.handle() {
                    handle.set_view(center, zoom);
                }
            }

            MapEffect::SetOverlay(kind) => {
                if let Some(handle) = self.state.widget.handle() {
                    handle.set_overlay(kind);
                }
            }

            MapEffect::ListenWidget => {
                let Some(handle) = self.state.widget.handle() else {
                    return;
                };
                // Listeners fire synchronously inside widget calls, so moves
                // echoed by our own set_view land in the current tick.
                let widget = handle.downgrade();
                let token = self.state.token.clone();
                let tx = self.action_tx.clone();
                handle.on(
                    MOVE_EVENT,
                    Box::new(move || {
                        if token.is_disposed() {
                            return;
                        }
                        let Some(widget) = widget.upgrade() else {
                            return;
                        };
                        let _ = tx.send(MapAction::WidgetDidMove {
                            generation: token.generation(),
                            center: widget.center(),
                            zoom: widget.zoom(),
                        });
                    }),
                );
            }

            MapEffect::Geocode(request) => {
                let geocoder = self.services.geocoder.clone();
                self.tasks.spawn("geocode", async move {
                    let result = lookup(geocoder.as_ref(), &request.query).await;
                    MapAction::SearchDidResolve {
                        generation,
                        sequence: request.sequence,
                        result,
                    }
                });
            }

            MapEffect::ScheduleUrlWrite(write) => {
                self.tasks.debounce("url-write", write.delay, async move {
                    MapAction::UrlWriteDue {
                        generation,
                        write_generation: write.generation,
                    }
                });
            }

            MapEffect::ReplaceUrl(query) => {
                debug!(query = %query, "Replacing page URL");
                self.services.navigator.replace_query(&query);
            }

            MapEffect::FetchFallback(kind) => {
                let source = self.services.fallback.clone();
                self.tasks.spawn("fallback", async move {
                    match source.static_overlay_url(kind).await {
                        Ok(url) => MapAction::FallbackDidLoad { generation, url },
                        Err(error) => MapAction::FallbackDidFail { generation, error },
                    }
                });
            }
        }
    }
}

impl<M> Drop for MapRuntime<M> {
    fn drop(&mut self) {
        self.state.token.dispose();
    }
}
