//! The map reducer: every state transition of a mounted map

use tracing::{debug, info, warn};

use crate::action::MapAction;
use crate::effect::{DispatchResult, MapEffect};
use crate::overlay::OverlayDecision;
use crate::state::MapState;
use crate::store::MutateOutcome;
use crate::url_sync::Seed;
use crate::view::{Coordinates, OverlayKind, Origin, ViewPatch, ViewState};
use crate::widget::{InitError, WidgetDelivery, WidgetHandle};

pub fn reducer(state: &mut MapState, action: MapAction) -> DispatchResult<MapEffect> {
    if state.token.is_disposed() {
        debug!(action = ?action, "Ignoring action after unmount");
        return DispatchResult::unchanged();
    }

    match action {
        MapAction::WidgetLoad => {
            if !matches!(state.widget.state(), crate::LoadState::NotStarted) {
                return DispatchResult::unchanged();
            }
            start_attempt(state)
        }

        MapAction::WidgetRetry => {
            if !state.widget.state().is_failed() {
                debug!("Retry ignored: widget has not failed");
                return DispatchResult::unchanged();
            }
            start_attempt(state)
        }

        MapAction::WidgetDidInit {
            generation,
            attempt,
            delivery,
        } => {
            if !state.is_current(generation) {
                return DispatchResult::unchanged();
            }
            widget_ready(state, attempt, delivery)
        }

        MapAction::WidgetDidFail {
            generation,
            attempt,
            error,
        } => {
            if !state.is_current(generation) {
                return DispatchResult::unchanged();
            }
            widget_failed(state, attempt, error)
        }

        MapAction::WidgetDidMove {
            generation,
            center,
            zoom,
        } => {
            if !state.is_current(generation) || !state.widget.is_ready() {
                return DispatchResult::unchanged();
            }
            let outcome = state
                .view
                .mutate(ViewPatch::camera(center, zoom), Origin::Widget);
            DispatchResult {
                changed: outcome.is_applied(),
                effects: vec![],
            }
        }

        MapAction::OverlayChange(kind) => change_overlay(state, kind),

        MapAction::SearchSubmit(query) => match state.geocode.search(&query) {
            Ok(request) => {
                info!(sequence = request.sequence, query = %request.query, "Searching");
                DispatchResult::effect(MapEffect::Geocode(request))
            }
            Err(error) => {
                state.notice = Some(error.to_string());
                DispatchResult::changed()
            }
        },

        MapAction::SearchDidResolve {
            generation,
            sequence,
            result,
        } => {
            if !state.is_current(generation) {
                return DispatchResult::unchanged();
            }
            match state.geocode.complete(sequence, result) {
                None => DispatchResult::unchanged(),
                Some(Ok(center)) => search_resolved(state, center),
                Some(Err(error)) => {
                    warn!(sequence, %error, "Search failed");
                    state.notice = Some(error.to_string());
                    DispatchResult::changed()
                }
            }
        }

        MapAction::ViewDidChange(change) => match state.url.observe(&change) {
            Some(write) => DispatchResult::effect(MapEffect::ScheduleUrlWrite(write)),
            None => DispatchResult::unchanged(),
        },

        MapAction::UrlWriteDue {
            generation,
            write_generation,
        } => {
            if !state.is_current(generation) {
                return DispatchResult::unchanged();
            }
            match state.url.flush_due(write_generation) {
                Some(query) => DispatchResult::effect(MapEffect::ReplaceUrl(query)),
                None => DispatchResult::unchanged(),
            }
        }

        MapAction::UrlDidChange(query) => match state.url.external_change(&query) {
            Some(seed) => navigated(state, seed),
            None => DispatchResult::unchanged(),
        },

        MapAction::FallbackDidLoad { generation, url } => {
            if !state.is_current(generation) || !state.widget.state().is_failed() {
                return DispatchResult::unchanged();
            }
            info!(url = %url, "Showing static overlay image");
            state.fallback_image = Some(url);
            DispatchResult::changed()
        }

        MapAction::FallbackDidFail { generation, error } => {
            if state.is_current(generation) {
                warn!(%error, "Static overlay fallback unavailable");
            }
            DispatchResult::unchanged()
        }

        MapAction::NoticeDismiss => DispatchResult {
            changed: state.notice.take().is_some(),
            effects: vec![],
        },
    }
}

fn start_attempt(state: &mut MapState) -> DispatchResult<MapEffect> {
    let Some(attempt) = state.widget.begin() else {
        return DispatchResult::unchanged();
    };
    let initial = state.url.initial_view(state.config.default_view());
    let config = state.config.bootstrap_config(&initial);
    info!(attempt, generation = state.generation(), "Loading map widget");
    DispatchResult::changed_with(MapEffect::LoadWidget { attempt, config })
}

/// Apply seed, replay deferred writes, fold in the buffered overlay, then
/// push the resulting view to the widget once.
fn widget_ready(
    state: &mut MapState,
    attempt: u32,
    delivery: WidgetDelivery,
) -> DispatchResult<MapEffect> {
    let Some(widget) = delivery.take() else {
        return DispatchResult::unchanged();
    };
    if !state.widget.complete_ready(attempt, WidgetHandle::new(widget)) {
        return DispatchResult::unchanged();
    }
    info!(attempt, generation = state.generation(), "Map widget ready");
    state.fallback_image = None;

    let seed = state.url.take_seed().unwrap_or(Seed {
        patch: ViewPatch::default(),
        origin: Origin::Default,
    });
    state.view.seed(seed.patch, seed.origin);

    let mut buffered = ViewPatch::default();
    if let Some(kind) = state.overlay.flush_into(&mut buffered) {
        debug!(%kind, "Applying buffered overlay");
        state.view.mutate(buffered, Origin::User);
    }

    let view = *state.view.state();
    DispatchResult::changed_with_many(vec![
        MapEffect::SetView {
            center: view.center,
            zoom: view.zoom,
        },
        MapEffect::SetOverlay(view.overlay),
        MapEffect::ListenWidget,
    ])
}

fn widget_failed(state: &mut MapState, attempt: u32, error: InitError) -> DispatchResult<MapEffect> {
    warn!(attempt, %error, "Map widget failed");
    if !state.widget.complete_failed(attempt, error) {
        return DispatchResult::unchanged();
    }
    let overlay = state
        .overlay
        .buffered()
        .unwrap_or_else(|| state.url.initial_view(*state.view.state()).overlay);
    DispatchResult::changed_with(MapEffect::FetchFallback(overlay))
}

fn change_overlay(state: &mut MapState, kind: OverlayKind) -> DispatchResult<MapEffect> {
    let ready = state.widget.is_ready();
    match state.overlay.change_overlay(kind, ready, &mut state.view) {
        OverlayDecision::Apply(kind) => {
            DispatchResult::changed_with(MapEffect::SetOverlay(kind))
        }
        OverlayDecision::Buffered if state.widget.state().is_failed() => {
            DispatchResult::changed_with(MapEffect::FetchFallback(kind))
        }
        OverlayDecision::Buffered => DispatchResult::changed(),
        OverlayDecision::Unchanged => DispatchResult::unchanged(),
    }
}

fn search_resolved(state: &mut MapState, center: Coordinates) -> DispatchResult<MapEffect> {
    state.notice = None;
    let mut patch = ViewPatch::center(center);
    patch.zoom = state.config.search_zoom;

    match state.view.mutate(patch, Origin::Search) {
        MutateOutcome::Applied(_) if state.widget.is_ready() => {
            let view = state.view.state();
            DispatchResult::changed_with(MapEffect::SetView {
                center: view.center,
                zoom: view.zoom,
            })
        }
        _ => DispatchResult::changed(),
    }
}

/// External navigation: re-apply URL values, pushing only what changed.
fn navigated(state: &mut MapState, seed: Seed) -> DispatchResult<MapEffect> {
    let before: ViewState = *state.view.state();
    if !state.view.mutate(seed.patch, Origin::Url).is_applied() {
        return DispatchResult::unchanged();
    }
    info!("Applying URL from navigation");
    let after = *state.view.state();

    let mut effects = Vec::new();
    if state.widget.is_ready() {
        if before.center != after.center || before.zoom != after.zoom {
            effects.push(MapEffect::SetView {
                center: after.center,
                zoom: after.zoom,
            });
        }
        if before.overlay != after.overlay {
            effects.push(MapEffect::SetOverlay(after.overlay));
        }
    }
    DispatchResult::changed_with_many(effects)
}
