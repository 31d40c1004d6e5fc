//! Per-mount map state

use crate::config::MapConfig;
use crate::geocode::GeocodeClient;
use crate::load_state::LoadState;
use crate::overlay::OverlayController;
use crate::store::ViewStateStore;
use crate::url_sync::UrlSync;
use crate::widget::{DisposalToken, WidgetSlot};

/// What the view layer renders
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MapStatus {
    Idle,
    Loading,
    Ready,
    Failed { reason: String, retryable: bool },
}

impl MapStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, MapStatus::Failed { .. })
    }
}

/// Everything owned by one mounted map view.
///
/// Created on mount, dropped together on unmount.
#[derive(Debug)]
pub struct MapState {
    pub config: MapConfig,
    pub token: DisposalToken,
    pub view: ViewStateStore,
    pub widget: WidgetSlot,
    pub overlay: OverlayController,
    pub url: UrlSync,
    pub geocode: GeocodeClient,
    /// Transient message for the user (search failures).
    pub notice: Option<String>,
    /// Static overlay image shown while the widget is unavailable.
    pub fallback_image: Option<String>,
}

impl MapState {
    /// Build the state for a mount reading `query` from the page.
    pub fn mount(config: MapConfig, query: &str, token: DisposalToken) -> Self {
        let view = ViewStateStore::new(config.default_view());
        let url = UrlSync::mount(query, config.zoom_range(), config.url_debounce);
        Self {
            config,
            token,
            view,
            widget: WidgetSlot::default(),
            overlay: OverlayController::new(),
            url,
            geocode: GeocodeClient::new(),
            notice: None,
            fallback_image: None,
        }
    }

    pub fn status(&self) -> MapStatus {
        match self.widget.state() {
            LoadState::NotStarted => MapStatus::Idle,
            LoadState::Loading => MapStatus::Loading,
            LoadState::Ready(_) => MapStatus::Ready,
            LoadState::Failed(error) => MapStatus::Failed {
                reason: error.to_string(),
                retryable: true,
            },
        }
    }

    /// Whether an async completion tagged `generation` may still apply.
    pub fn is_current(&self, generation: u64) -> bool {
        self.token.is_current(generation)
    }

    pub fn generation(&self) -> u64 {
        self.token.generation()
    }
}
