//! End-to-end tests for the monitor event loop, driven by a scripted API
//! on paused virtual time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use trainscope_api::{Channel, JobId, JobState};
use trainscope_monitor::{ImageLoad, Monitor, MonitorConfig, MonitorHandle};

use common::{
    RecordingSurface, Rendered, Reply, ScriptedApi, entity, image_url, images, running, scalars,
    settle, succeeded, unavailable,
};

// ============================================================================
// Helpers
// ============================================================================

fn start(
    api: &Arc<ScriptedApi>,
    config: MonitorConfig,
) -> (RecordingSurface, MonitorHandle, JoinHandle<RecordingSurface>) {
    let surface = RecordingSurface::default();
    let (monitor, handle) =
        Monitor::new(api.clone(), JobId::new("model-1"), surface.clone(), config).unwrap();
    let task = tokio::spawn(monitor.run());
    (surface, handle, task)
}

async fn stop(handle: MonitorHandle, task: JoinHandle<RecordingSurface>) {
    handle.shutdown().unwrap();
    task.await.unwrap();
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

// ============================================================================
// Initial fetch and change detection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_initial_fetch_renders_charts_images_and_model() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(running(), "v1", &[(10, 0.5), (20, 0.3)]));
    api.set_summaries(Channel::Images, images(running(), "i1", &[10, 20, 30]));

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    settle().await;

    let charts = surface.chart_renders();
    assert_eq!(charts.len(), 1);
    assert_eq!(charts[0].len(), 1);
    let chart = &charts[0][0];
    assert_eq!(chart.tag, "loss");
    assert_eq!(chart.x_domain, (0, 1000));
    assert_eq!(
        chart.defined_points().collect::<Vec<_>>(),
        vec![(10, 0.5), (20, 0.3)]
    );

    let views = surface.image_views();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].groups.len(), 1);
    assert_eq!(views[0].groups[0].placeholders.len(), 3);

    let panel = surface.last_model().unwrap();
    assert_eq!(panel.train_state, "Running");
    assert_eq!(panel.num_training_steps, "1,000");

    let controls = surface.last_controls().unwrap();
    assert!(controls.can_cancel);
    assert!(controls.refresh_enabled);
    assert_eq!(controls.interval_label, "5 minutes");

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_tokens_do_not_rerender_charts() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(running(), "v1", &[(10, 0.5)]));
    api.set_summaries(Channel::Images, images(running(), "", &[]));

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    settle().await;
    assert_eq!(surface.chart_renders().len(), 1);

    handle.refresh().unwrap();
    settle().await;

    assert_eq!(api.summaries_calls(Channel::Scalars), 2);
    assert_eq!(surface.chart_renders().len(), 1);

    api.set_summaries(Channel::Scalars, scalars(running(), "v2", &[(10, 0.5), (20, 0.4)]));
    handle.refresh().unwrap();
    settle().await;

    let charts = surface.chart_renders();
    assert_eq!(charts.len(), 2);
    assert_eq!(charts[1][0].points.len(), 2);

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_hidden_charts_render_once_when_shown() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(running(), "v1", &[(10, 0.5)]));

    let config = MonitorConfig::default().with_charts_visible(false);
    let (surface, handle, task) = start(&api, config);
    settle().await;
    assert!(surface.chart_renders().is_empty());

    handle.show_tab(Channel::Scalars).unwrap();
    settle().await;
    assert_eq!(surface.chart_renders().len(), 1);

    handle.show_tab(Channel::Images).unwrap();
    handle.show_tab(Channel::Scalars).unwrap();
    settle().await;
    assert_eq!(surface.chart_renders().len(), 1);

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_known_entity_is_shown_before_first_fetch() {
    let api = Arc::new(ScriptedApi::new());
    api.queue_summaries(
        Channel::Scalars,
        Reply::ok(scalars(running(), "v1", &[])).after(Duration::from_secs(10)),
    );
    api.queue_summaries(
        Channel::Images,
        Reply::ok(images(running(), "", &[])).after(Duration::from_secs(10)),
    );

    let surface = RecordingSurface::default();
    let (monitor, handle) = Monitor::new(
        api.clone(),
        JobId::new("model-1"),
        surface.clone(),
        MonitorConfig::default(),
    )
    .unwrap();
    let task = tokio::spawn(monitor.with_entity(running()).run());
    settle().await;

    assert_eq!(surface.last_model().unwrap().description, "ball detector");
    let controls = surface.last_controls().unwrap();
    assert!(!controls.refresh_enabled);

    stop(handle, task).await;
}

// ============================================================================
// Periodic refresh
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_active_job_refreshes_every_interval() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(running(), "v1", &[(10, 0.5)]));
    api.set_summaries(Channel::Images, images(running(), "", &[]));

    let (_surface, handle, task) = start(&api, MonitorConfig::default());

    tokio::time::sleep(minutes(5) + Duration::from_secs(1)).await;
    assert_eq!(api.summaries_calls(Channel::Scalars), 2);
    assert_eq!(api.summaries_calls(Channel::Images), 2);

    tokio::time::sleep(minutes(5)).await;
    assert_eq!(
        api.summaries_call_times(Channel::Scalars),
        vec![Duration::ZERO, minutes(5), minutes(10)]
    );

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_resets_timer_phase() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(running(), "v1", &[]));
    api.set_summaries(Channel::Images, images(running(), "", &[]));

    let (_surface, handle, task) = start(&api, MonitorConfig::default());

    tokio::time::sleep(minutes(4)).await;
    handle.refresh().unwrap();
    tokio::time::sleep(minutes(5) + Duration::from_secs(1)).await;

    assert_eq!(
        api.summaries_call_times(Channel::Scalars),
        vec![Duration::ZERO, minutes(4), minutes(9)]
    );

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_terminal_reply_on_refresh_tick_stops_refresh() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(running(), "v1", &[(10, 0.5)]));
    api.queue_summaries(
        Channel::Images,
        Reply::ok(images(succeeded(), "", &[])).after(minutes(5)),
    );

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    tokio::time::sleep(minutes(11)).await;

    assert_eq!(api.summaries_calls(Channel::Scalars), 1);
    assert_eq!(api.summaries_calls(Channel::Images), 1);

    let controls: Vec<_> = surface
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Rendered::Controls(controls) => Some(controls),
            _ => None,
        })
        .collect();
    let done_at = controls.iter().position(|c| !c.active).unwrap();
    assert!(controls[done_at..].iter().all(|c| c.refresh_enabled));

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_on_refresh_tick_fetches_once() {
    let api = Arc::new(ScriptedApi::new());
    api.queue_summaries(Channel::Scalars, Reply::ok(scalars(running(), "v1", &[])));
    api.queue_summaries(Channel::Images, Reply::ok(images(running(), "", &[])));
    // Later fetches stay in flight for a while.
    for _ in 0..2 {
        api.queue_summaries(
            Channel::Scalars,
            Reply::ok(scalars(running(), "v1", &[])).after(Duration::from_secs(10)),
        );
        api.queue_summaries(
            Channel::Images,
            Reply::ok(images(running(), "", &[])).after(Duration::from_secs(10)),
        );
    }

    let (_surface, handle, task) = start(&api, MonitorConfig::default());

    tokio::time::sleep(minutes(5)).await;
    handle.refresh().unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(
        api.summaries_call_times(Channel::Scalars),
        vec![Duration::ZERO, minutes(5)]
    );
    assert_eq!(api.summaries_calls(Channel::Images), 2);

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_set_interval_is_clamped_and_applied() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(running(), "v1", &[]));
    api.set_summaries(Channel::Images, images(running(), "", &[]));

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    settle().await;

    handle.set_interval(0).unwrap();
    settle().await;
    let controls = surface.last_controls().unwrap();
    assert_eq!(controls.interval_minutes, 1);
    assert_eq!(controls.interval_label, "1 minute");

    tokio::time::sleep(minutes(1) + Duration::from_secs(1)).await;
    assert_eq!(api.summaries_calls(Channel::Scalars), 2);

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_done_job_stops_refreshing() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(succeeded(), "v1", &[(10, 0.5)]));
    api.set_summaries(Channel::Images, images(succeeded(), "", &[]));

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    tokio::time::sleep(minutes(30)).await;

    assert_eq!(api.summaries_calls(Channel::Scalars), 1);
    assert_eq!(api.summaries_calls(Channel::Images), 1);

    let controls = surface.last_controls().unwrap();
    assert!(!controls.active);
    assert!(!controls.can_cancel);

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_exit_when_done() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(succeeded(), "v1", &[(10, 0.5)]));
    api.set_summaries(Channel::Images, images(succeeded(), "", &[]));

    let config = MonitorConfig::default().with_exit_when_done(true);
    let (surface, handle, task) = start(&api, config);

    let returned = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("monitor should exit once training is done")
        .unwrap();

    assert!(handle.is_closed());
    assert_eq!(returned.chart_renders().len(), surface.chart_renders().len());
    assert_eq!(surface.last_model().unwrap().train_state, "Succeeded");
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handles_stops_monitor() {
    let api = Arc::new(ScriptedApi::new());
    let (_surface, handle, task) = start(&api, MonitorConfig::default());
    settle().await;

    drop(handle);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("monitor should stop without handles")
        .unwrap();
}

// ============================================================================
// Retries and stale responses
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_summaries_retry_with_backoff_then_render() {
    let api = Arc::new(ScriptedApi::new());
    let endpoint = "/retrieveTrainingSummaries";
    api.queue_summaries(Channel::Scalars, Reply::err(unavailable(endpoint)));
    api.queue_summaries(Channel::Scalars, Reply::err(unavailable(endpoint)));
    api.queue_summaries(
        Channel::Scalars,
        Reply::ok(scalars(running(), "v1", &[(10, 0.5)])),
    );
    api.queue_summaries(
        Channel::Images,
        Reply::ok(images(running(), "", &[])).after(Duration::from_secs(10)),
    );

    let (surface, handle, task) = start(&api, MonitorConfig::default());

    tokio::time::sleep(Duration::from_millis(5900)).await;
    assert!(surface.chart_renders().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(surface.chart_renders().len(), 1);
    assert_eq!(
        api.summaries_call_times(Channel::Scalars),
        vec![Duration::ZERO, Duration::from_secs(2), Duration::from_secs(6)]
    );

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_summaries_retry_suppressed_while_refresh_timer_runs() {
    let api = Arc::new(ScriptedApi::new());
    api.queue_summaries(
        Channel::Scalars,
        Reply::err(unavailable("/retrieveTrainingSummaries")).after(Duration::from_secs(1)),
    );
    api.set_summaries(Channel::Images, images(running(), "", &[]));

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    tokio::time::sleep(minutes(4)).await;

    assert_eq!(api.summaries_calls(Channel::Scalars), 1);
    assert!(surface.last_controls().unwrap().refresh_enabled);

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_summaries_are_discarded() {
    let api = Arc::new(ScriptedApi::new());
    let mut stale = running();
    stale.description = "stale".into();
    let mut fresh = running();
    fresh.description = "fresh".into();

    api.queue_summaries(Channel::Scalars, Reply::ok(scalars(running(), "v1", &[(10, 0.5)])));
    api.queue_summaries(
        Channel::Scalars,
        Reply::ok(scalars(stale, "old", &[(10, 9.0)])).after(Duration::from_secs(90)),
    );
    api.set_summaries(Channel::Scalars, scalars(fresh, "new", &[(10, 0.5), (20, 0.2)]));
    api.set_summaries(Channel::Images, images(running(), "", &[]));

    let (surface, handle, task) = start(&api, MonitorConfig::default().with_interval(1));

    // The slow request issued at 60s is still in flight; manual refresh is refused.
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert!(!surface.last_controls().unwrap().refresh_enabled);
    handle.refresh().unwrap();
    settle().await;
    assert_eq!(api.summaries_calls(Channel::Scalars), 2);

    // Periodic refresh at 120s lands first, the slow reply arrives at 150s.
    tokio::time::sleep(Duration::from_secs(100)).await;

    let charts = surface.chart_renders();
    assert_eq!(charts.len(), 2);
    assert_eq!(
        charts[1][0].defined_points().collect::<Vec<_>>(),
        vec![(10, 0.5), (20, 0.2)]
    );
    let stale_models = surface
        .events()
        .into_iter()
        .filter(|e| matches!(e, Rendered::Model(panel) if panel.description == "stale"))
        .count();
    assert_eq!(stale_models, 0);

    stop(handle, task).await;
}

// ============================================================================
// Cancel
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_flow() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(running(), "v1", &[(1, 1.0)]));
    api.set_summaries(Channel::Images, images(running(), "", &[]));
    let mut requested = running();
    requested.cancel_requested = true;
    api.queue_cancel(Reply::ok(requested));

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    settle().await;
    assert!(surface.last_controls().unwrap().can_cancel);

    handle.cancel().unwrap();
    settle().await;
    assert_eq!(api.cancel_calls(), 1);
    let controls = surface.last_controls().unwrap();
    assert!(!controls.can_cancel);
    assert!(controls.active);
    assert_eq!(
        surface.last_model().unwrap().train_state,
        "Running (cancel requested)"
    );

    // Not offered again while the request is pending on the backend.
    handle.cancel().unwrap();
    settle().await;
    assert_eq!(api.cancel_calls(), 1);

    let mut cancelled = entity(JobState::Cancelled, JobState::StateUnspecified);
    cancelled.cancel_requested = true;
    api.set_summaries(Channel::Scalars, scalars(cancelled.clone(), "v1", &[(1, 1.0)]));
    api.set_summaries(Channel::Images, images(cancelled, "", &[]));
    handle.refresh().unwrap();
    settle().await;

    let controls = surface.last_controls().unwrap();
    assert!(!controls.active);
    assert_eq!(surface.last_model().unwrap().train_state, "Cancelled");

    let calls = api.summaries_calls(Channel::Scalars);
    tokio::time::sleep(minutes(30)).await;
    assert_eq!(api.summaries_calls(Channel::Scalars), calls);

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_not_offered_before_first_entity() {
    let api = Arc::new(ScriptedApi::new());
    api.queue_summaries(
        Channel::Scalars,
        Reply::ok(scalars(running(), "v1", &[])).after(Duration::from_secs(10)),
    );
    api.queue_summaries(
        Channel::Images,
        Reply::ok(images(running(), "", &[])).after(Duration::from_secs(10)),
    );

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    settle().await;
    let controls = surface.last_controls().unwrap();
    assert!(!controls.can_cancel);
    assert!(controls.active);

    handle.cancel().unwrap();
    settle().await;
    assert_eq!(api.cancel_calls(), 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(surface.last_controls().unwrap().can_cancel);

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_cancel_keeps_last_known_state() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Scalars, scalars(running(), "v1", &[]));
    api.set_summaries(Channel::Images, images(running(), "", &[]));

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    settle().await;

    handle.cancel().unwrap();
    settle().await;
    assert!(surface.last_controls().unwrap().can_cancel);
    assert_eq!(surface.last_model().unwrap().train_state, "Running");

    handle.cancel().unwrap();
    settle().await;
    assert_eq!(api.cancel_calls(), 2);

    stop(handle, task).await;
}

// ============================================================================
// Images
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_images_load_staggered_and_steps_toggle_without_fetching() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Images, images(running(), "i1", &[100, 200, 300]));

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let image_times: Vec<_> = api
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            common::Call::Image(_, at) => Some(at),
            _ => None,
        })
        .collect();
    assert_eq!(
        image_times,
        vec![
            Duration::ZERO,
            Duration::from_millis(10),
            Duration::from_millis(20)
        ]
    );

    let updates = surface.image_updates();
    assert_eq!(updates.len(), 3);
    for (_, placeholder) in &updates {
        let expected = image_url(placeholder.step);
        assert_eq!(placeholder.load, ImageLoad::Loaded(Arc::from(expected.as_bytes())));
        assert_eq!(placeholder.display_width, 100);
        assert_eq!(placeholder.display_height, 50);
    }

    handle.select_step(0, 0).unwrap();
    settle().await;
    let steps = surface.step_updates();
    assert_eq!(steps.len(), 1);
    let (group_index, group) = &steps[0];
    assert_eq!(*group_index, 0);
    assert_eq!(group.step_label(), "Step: 100");
    let visible: Vec<_> = group.placeholders.iter().map(|p| p.visible).collect();
    assert_eq!(visible, vec![true, false, false]);

    handle.select_step(0, 9).unwrap();
    settle().await;
    assert_eq!(surface.step_updates().len(), 1);
    assert_eq!(api.image_calls(), 3);

    stop(handle, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_images_from_replaced_view_are_discarded() {
    let api = Arc::new(ScriptedApi::new());
    api.set_summaries(Channel::Images, images(running(), "i1", &[100, 200, 300]));
    api.fail_image(&image_url(300), 2);

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    tokio::time::sleep(Duration::from_secs(1)).await;

    api.set_summaries(Channel::Images, images(running(), "i2", &[100, 200, 300]));
    handle.refresh().unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let views = surface.image_views();
    assert_eq!(views.len(), 2);
    let first = views[0].generation;
    let second = views[1].generation;

    let updates = surface.image_updates();
    let old = updates.iter().filter(|(k, _)| k.generation == first).count();
    let new: Vec<_> = updates
        .iter()
        .filter(|(k, _)| k.generation == second)
        .collect();
    assert_eq!(old, 2);
    assert_eq!(new.len(), 3);
    assert!(new.iter().all(|(_, p)| matches!(p.load, ImageLoad::Loaded(_))));

    stop(handle, task).await;
}

// ============================================================================
// Elapsed time
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_elapsed_time_ticks_until_backend_reports_it() {
    let api = Arc::new(ScriptedApi::new());
    let mut started = running();
    started.train_job_start_time = Some(Utc::now() - chrono::Duration::seconds(90));
    api.set_summaries(Channel::Scalars, scalars(started.clone(), "v1", &[]));
    api.set_summaries(Channel::Images, images(started, "", &[]));

    let (surface, handle, task) = start(&api, MonitorConfig::default());
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let ticks = surface.elapsed_updates();
    assert_eq!(ticks.len(), 2);
    assert!(ticks[0].starts_with("1:3"), "unexpected elapsed text {}", ticks[0]);

    stop(handle, task).await;
}
