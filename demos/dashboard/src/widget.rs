//! A terminal map widget standing in for the embedded one

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};
use weathermap::{
    BootstrapConfig, Coordinates, InitCallback, MapWidget, OverlayKind, WidgetApi,
    WidgetListener,
};

type Listener = Arc<dyn Fn() + Send + Sync>;

struct Camera {
    center: Coordinates,
    zoom: u8,
    overlay: String,
}

/// Prints what a real map would draw. Fires `moveend` after every move.
pub struct SimulatedWidget {
    camera: Mutex<Camera>,
    listeners: Mutex<Vec<(String, Listener)>>,
}

impl SimulatedWidget {
    fn from_config(config: &BootstrapConfig) -> Self {
        Self {
            camera: Mutex::new(Camera {
                center: Coordinates::new(config.lat, config.lon),
                zoom: config.zoom,
                overlay: OverlayKind::default().widget_value().to_string(),
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn camera(&self) -> MutexGuard<'_, Camera> {
        self.camera.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A user drag: move the camera and notify listeners.
    pub fn drag_to(&self, center: Coordinates, zoom: u8) {
        {
            let mut camera = self.camera();
            camera.center = center;
            camera.zoom = zoom;
        }
        self.fire("moveend");
    }

    pub fn overlay(&self) -> String {
        self.camera().overlay.clone()
    }

    fn fire(&self, event: &str) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl MapWidget for SimulatedWidget {
    fn store_set(&self, key: &str, value: &str) {
        if key == "overlay" {
            self.camera().overlay = value.to_string();
        }
        println!("map  {} = {}", key, value);
    }

    fn set_view(&self, center: Coordinates, zoom: u8) {
        {
            let mut camera = self.camera();
            camera.center = center;
            camera.zoom = zoom;
        }
        println!("map  view {:.4},{:.4} @ {}", center.lat, center.lon, zoom);
        self.fire("moveend");
    }

    fn center(&self) -> Coordinates {
        self.camera().center
    }

    fn zoom(&self) -> u8 {
        self.camera().zoom
    }

    fn on(&self, event: &str, listener: WidgetListener) {
        debug!(event, "Widget listener registered");
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.to_string(), Arc::from(listener)));
    }
}

/// Init entry point creating a [`SimulatedWidget`] after a startup delay.
///
/// Keeps the last widget so the terminal can drag it.
pub struct SimulatedWidgetApi {
    startup: Duration,
    current: Arc<Mutex<Option<Arc<SimulatedWidget>>>>,
}

impl SimulatedWidgetApi {
    pub fn new(startup: Duration) -> Self {
        Self {
            startup,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn current(&self) -> Option<Arc<SimulatedWidget>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl WidgetApi for SimulatedWidgetApi {
    fn init(&self, config: &BootstrapConfig, callback: InitCallback) {
        if config.api_key.trim().is_empty() {
            warn!("Widget init without an API key");
            callback(Err("missing API key".to_string()));
            return;
        }

        let widget = Arc::new(SimulatedWidget::from_config(config));
        let current = self.current.clone();
        let startup = self.startup;
        tokio::spawn(async move {
            tokio::time::sleep(startup).await;
            *current.lock().unwrap_or_else(PoisonError::into_inner) = Some(widget.clone());
            let widget: Arc<dyn MapWidget> = widget;
            callback(Ok(widget));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: &str) -> BootstrapConfig {
        BootstrapConfig {
            api_key: api_key.to_string(),
            lat: 50.45,
            lon: 30.52,
            zoom: 5,
            container_id: "windy".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_delivers_widget_after_startup() {
        let api = SimulatedWidgetApi::new(Duration::from_millis(200));
        let (tx, rx) = tokio::sync::oneshot::channel();
        api.init(&config("key"), Box::new(move |result| {
            let _ = tx.send(result.map(|widget| widget.zoom()));
        }));

        assert!(api.current().is_none());
        assert_eq!(rx.await.unwrap(), Ok(5));
        assert!(api.current().is_some());
    }

    #[test]
    fn test_init_without_key_fails() {
        let api = SimulatedWidgetApi::new(Duration::ZERO);
        let failed = Arc::new(Mutex::new(None));
        let sink = failed.clone();
        api.init(&config(" "), Box::new(move |result| {
            *sink.lock().unwrap() = result.err();
        }));
        assert_eq!(failed.lock().unwrap().as_deref(), Some("missing API key"));
    }

    #[test]
    fn test_drag_fires_moveend() {
        let widget = SimulatedWidget::from_config(&config("key"));
        let moves = Arc::new(Mutex::new(0));
        let counter = moves.clone();
        widget.on("moveend", Box::new(move || *counter.lock().unwrap() += 1));

        widget.drag_to(Coordinates::new(1.0, 2.0), 7);
        widget.store_set("overlay", "rain");

        assert_eq!(*moves.lock().unwrap(), 1);
        assert_eq!(widget.center(), Coordinates::new(1.0, 2.0));
        assert_eq!(widget.overlay(), "rain");
    }
}
