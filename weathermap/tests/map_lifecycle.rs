//! End-to-end behavior of a mounted map on paused tokio time

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use weathermap::testing::{
    test_config, ManualWidgetApi, RecordingWidget, ScriptedGeocoder, TestServices,
};
use weathermap::{
    Coordinates, MapAction, MapRuntime, MapStatus, Middleware, Origin, OverlayKind,
};

const PARIS: Coordinates = Coordinates::new(48.8566, 2.3522);
const TOKYO: Coordinates = Coordinates::new(35.6762, 139.6503);

/// Process ticks until the queue stays empty for a moment.
async fn pump<M: Middleware<MapAction>>(runtime: &mut MapRuntime<M>) {
    while tokio::time::timeout(Duration::from_millis(1), runtime.step())
        .await
        .is_ok()
    {}
}

async fn ready_runtime(test: &TestServices) -> MapRuntime {
    let mut runtime = MapRuntime::mount(test_config(), test.services());
    pump(&mut runtime).await;
    assert_eq!(runtime.status(), MapStatus::Ready);
    runtime
}

#[tokio::test(start_paused = true)]
async fn two_mounts_load_each_script_once() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("").with_widget_api(ManualWidgetApi::auto_ready(widget));

    let first = ready_runtime(&test).await;
    let second = ready_runtime(&test).await;

    for url in &test_config().script_urls {
        assert_eq!(test.scripts.fetches(url), 1, "{url} fetched more than once");
    }
    assert_eq!(test.widget_api.configs().len(), 2);
    assert_ne!(first.state().generation(), second.state().generation());
}

#[tokio::test(start_paused = true)]
async fn search_recenters_once_without_feedback() {
    let widget = Arc::new(RecordingWidget::new().echo_moves());
    let test = TestServices::new("")
        .with_widget_api(ManualWidgetApi::auto_ready(widget.clone()))
        .with_geocoder(ScriptedGeocoder::new().with_city("Paris", PARIS));
    let mut runtime = ready_runtime(&test).await;

    runtime.enqueue(MapAction::SearchSubmit("Paris".into()));
    pump(&mut runtime).await;

    assert_eq!(runtime.state().view.state().center, PARIS);
    assert_eq!(runtime.state().view.state().origin, Origin::Search);
    assert_eq!(widget.set_view_calls().last(), Some(&(PARIS, 5)));

    tokio::time::sleep(Duration::from_millis(500)).await;
    pump(&mut runtime).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    pump(&mut runtime).await;

    assert_eq!(
        test.navigator.writes(),
        vec!["?overlay=wind&lat=48.8566&lon=2.3522&zoom=5".to_string()]
    );
    assert_eq!(widget.set_view_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn only_latest_search_applies() {
    let test = TestServices::new("")
        .with_widget_api(ManualWidgetApi::auto_ready(Arc::new(RecordingWidget::new())))
        .with_geocoder(
            ScriptedGeocoder::new()
                .with_city("Paris", PARIS)
                .with_delay("Paris", Duration::from_millis(300))
                .with_city("Tokyo", TOKYO),
        );
    let mut runtime = ready_runtime(&test).await;

    runtime.enqueue(MapAction::SearchSubmit("Paris".into()));
    pump(&mut runtime).await;
    runtime.enqueue(MapAction::SearchSubmit("Tokyo".into()));
    pump(&mut runtime).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    pump(&mut runtime).await;

    assert_eq!(test.geocoder.requests(), vec!["Paris", "Tokyo"]);
    assert_eq!(runtime.state().view.state().center, TOKYO);
}

#[tokio::test(start_paused = true)]
async fn unknown_city_sets_notice() {
    let test = TestServices::new("?lat=10&lon=20")
        .with_widget_api(ManualWidgetApi::auto_ready(Arc::new(RecordingWidget::new())));
    let mut runtime = ready_runtime(&test).await;

    runtime.enqueue(MapAction::SearchSubmit("Atlantis".into()));
    pump(&mut runtime).await;

    assert_eq!(
        runtime.state().notice.as_deref(),
        Some("Location not found: Atlantis")
    );
    assert_eq!(runtime.state().view.state().center, Coordinates::new(10.0, 20.0));
}

#[tokio::test(start_paused = true)]
async fn overlay_chosen_while_loading_is_applied_once() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("?overlay=clouds");
    let mut runtime = MapRuntime::mount(test_config(), test.services());
    pump(&mut runtime).await;
    test.widget_api.wait_for_init().await;

    runtime.enqueue(MapAction::OverlayChange(OverlayKind::Temperature));
    runtime.enqueue(MapAction::OverlayChange(OverlayKind::Pressure));
    pump(&mut runtime).await;
    assert!(widget.calls().is_empty());

    assert!(test.widget_api.complete(widget.clone()));
    pump(&mut runtime).await;
    assert_eq!(widget.overlay_sets(), vec!["pressure".to_string()]);

    tokio::time::sleep(Duration::from_millis(500)).await;
    pump(&mut runtime).await;
    assert_eq!(
        test.navigator.writes(),
        vec!["?overlay=pressure&lat=50.4501&lon=30.5234&zoom=5".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn url_seed_is_not_written_back() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("?overlay=rain&lat=40.7128&lon=-74.006&zoom=9")
        .with_widget_api(ManualWidgetApi::auto_ready(widget.clone()));
    let mut runtime = ready_runtime(&test).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    pump(&mut runtime).await;

    assert_eq!(widget.set_view_calls(), vec![(Coordinates::new(40.7128, -74.006), 9)]);
    assert_eq!(widget.overlay_sets(), vec!["rain".to_string()]);
    assert!(test.navigator.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn pans_are_coalesced_into_one_url_write() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("")
        .with_widget_api(ManualWidgetApi::auto_ready(widget.clone()));
    let mut runtime = ready_runtime(&test).await;

    for lon in [10.0, 11.0, 12.0] {
        widget.pan_to(Coordinates::new(45.0, lon), 6);
        pump(&mut runtime).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    pump(&mut runtime).await;

    assert_eq!(
        test.navigator.writes(),
        vec!["?overlay=wind&lat=45.0000&lon=12.0000&zoom=6".to_string()]
    );
    assert_eq!(runtime.state().view.state().origin, Origin::Widget);
}

#[tokio::test(start_paused = true)]
async fn back_navigation_moves_the_map_without_writing() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("?overlay=wind&lat=51.5&lon=-0.12&zoom=6")
        .with_widget_api(ManualWidgetApi::auto_ready(widget.clone()));
    let mut runtime = ready_runtime(&test).await;

    let (tx, rx) = mpsc::unbounded_channel();
    runtime.watch_navigation(UnboundedReceiverStream::new(rx));
    tx.send(test.navigator.navigate("?overlay=clouds&lat=51.5&lon=-0.12&zoom=6"))
        .unwrap();
    pump(&mut runtime).await;

    assert_eq!(widget.overlay_sets(), vec!["wind".to_string(), "clouds".to_string()]);
    assert_eq!(widget.set_view_calls().len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    pump(&mut runtime).await;
    assert!(test.navigator.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn init_timeout_shows_fallback_until_retry() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("");
    let mut runtime = MapRuntime::mount(test_config(), test.services());
    pump(&mut runtime).await;
    test.widget_api.wait_for_init().await;

    tokio::time::sleep(Duration::from_secs(11)).await;
    pump(&mut runtime).await;

    assert!(runtime.status().is_failed());
    assert_eq!(test.fallback.requested(), vec![OverlayKind::Wind]);
    assert_eq!(
        runtime.state().fallback_image.as_deref(),
        Some("https://tiles.example/wind.png")
    );

    test.widget_api.drop_pending();
    runtime.enqueue(MapAction::WidgetRetry);
    pump(&mut runtime).await;
    test.widget_api.wait_for_init().await;
    assert!(test.widget_api.complete(widget.clone()));
    pump(&mut runtime).await;

    assert_eq!(runtime.status(), MapStatus::Ready);
    assert!(runtime.state().fallback_image.is_none());
    assert_eq!(test.widget_api.configs().len(), 2);
    assert_eq!(widget.listener_count("moveend"), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_script_load_is_retried() {
    let test = TestServices::new("")
        .with_widget_api(ManualWidgetApi::auto_ready(Arc::new(RecordingWidget::new())));
    let first_script = test_config().script_urls[0].clone();
    test.scripts.fail_times(&first_script, 1);

    let mut runtime = MapRuntime::mount(test_config(), test.services());
    pump(&mut runtime).await;
    assert!(matches!(
        runtime.status(),
        MapStatus::Failed { retryable: true, .. }
    ));

    runtime.enqueue(MapAction::WidgetRetry);
    pump(&mut runtime).await;

    assert_eq!(runtime.status(), MapStatus::Ready);
    assert_eq!(test.scripts.fetches(&first_script), 2);
}

#[tokio::test(start_paused = true)]
async fn widget_arriving_after_unmount_is_never_touched() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("?zoom=8");
    let mut runtime = MapRuntime::mount(test_config(), test.services());
    pump(&mut runtime).await;
    test.widget_api.wait_for_init().await;

    runtime.unmount();
    assert!(test.widget_api.complete(widget.clone()));
    pump(&mut runtime).await;

    assert!(widget.calls().is_empty());
    assert!(!runtime.state().widget.is_ready());
    assert!(test.navigator.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_stops_on_shutdown_and_unmounts() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("")
        .with_widget_api(ManualWidgetApi::auto_ready(widget.clone()));
    let mut runtime = MapRuntime::mount(test_config(), test.services());

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });
    runtime.run(shutdown).await;

    assert_eq!(widget.overlay_sets(), vec!["wind".to_string()]);
    assert!(runtime.state().token.is_disposed());
    assert!(runtime.tasks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn echo_of_own_url_write_is_ignored() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("")
        .with_widget_api(ManualWidgetApi::auto_ready(widget.clone()));
    let mut runtime = ready_runtime(&test).await;
    let (tx, rx) = mpsc::unbounded_channel();
    runtime.watch_navigation(UnboundedReceiverStream::new(rx));

    widget.pan_to(Coordinates::new(10.0, 20.0), 5);
    pump(&mut runtime).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    pump(&mut runtime).await;
    assert_eq!(test.navigator.writes().len(), 1);

    // The host reports the entry we just wrote.
    tx.send(weathermap::Navigator::query(test.navigator.as_ref()))
        .unwrap();
    pump(&mut runtime).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    pump(&mut runtime).await;

    assert_eq!(
        test.navigator.writes(),
        vec!["?overlay=wind&lat=10.0000&lon=20.0000&zoom=5".to_string()]
    );
    assert_eq!(widget.set_view_calls().len(), 1);
    assert_eq!(runtime.state().view.state().origin, Origin::Widget);
}

#[tokio::test(start_paused = true)]
async fn change_after_back_navigation_is_written_even_if_it_matches_an_old_write() {
    let widget = Arc::new(RecordingWidget::new());
    let test = TestServices::new("")
        .with_widget_api(ManualWidgetApi::auto_ready(widget.clone()));
    let mut runtime = ready_runtime(&test).await;
    let (tx, rx) = mpsc::unbounded_channel();
    runtime.watch_navigation(UnboundedReceiverStream::new(rx));

    widget.pan_to(Coordinates::new(10.0, 20.0), 5);
    pump(&mut runtime).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    pump(&mut runtime).await;

    tx.send(test.navigator.navigate("?overlay=clouds&lat=10&lon=20&zoom=5"))
        .unwrap();
    pump(&mut runtime).await;
    assert_eq!(runtime.state().view.state().overlay, OverlayKind::Clouds);

    runtime.enqueue(MapAction::OverlayChange(OverlayKind::Wind));
    pump(&mut runtime).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    pump(&mut runtime).await;

    let written = "?overlay=wind&lat=10.0000&lon=20.0000&zoom=5".to_string();
    assert_eq!(test.navigator.writes(), vec![written.clone(), written.clone()]);
    assert_eq!(weathermap::Navigator::query(test.navigator.as_ref()), written);
}
