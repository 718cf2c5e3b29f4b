//! The monitor event loop.
//!
//! [`Monitor::run`] owns all state. Commands, timer events and network
//! completions are handled one at a time on the same task; fetches run on
//! spawned tasks and report back through a [`JoinSet`].

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use trainscope_api::{
    ApiError, ApiResult, Channel, JobId, ModelEntity, SummariesResponse, TrainingApi,
};

use crate::config::MonitorConfig;
use crate::controller::{RefreshController, TimerEvent, TimerKind, Transition};
use crate::error::{MonitorError, MonitorResult};
use crate::panel::{ControlState, ModelCatalog, ModelPanel, elapsed_display};
use crate::poller::{AlwaysRetry, PollError, poll_with_backoff};
use crate::reconcile::{ChartReconciler, ImageKey, ImageLoad, ImageReconciler, ImageView};
use crate::sequence::{RequestSeq, RequestSequencer};
use crate::store::SummaryStore;
use crate::surface::RenderSurface;

/// User commands accepted by a running monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch both channels now and reset the refresh timer.
    Refresh,
    /// Change the refresh interval, in minutes.
    SetInterval(u32),
    /// Request cancellation of the training run.
    Cancel,
    /// A tab was shown; `Scalars` shows the charts.
    ShowTab(Channel),
    /// Select a step in an image tag group.
    SelectStep { group: usize, index: usize },
    /// Stop the monitor.
    Shutdown,
}

/// Cloneable handle for sending [`Command`]s to a monitor.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl MonitorHandle {
    pub fn send(&self, command: Command) -> MonitorResult<()> {
        self.tx.send(command).map_err(|_| MonitorError::Closed)
    }

    pub fn refresh(&self) -> MonitorResult<()> {
        self.send(Command::Refresh)
    }

    pub fn set_interval(&self, minutes: u32) -> MonitorResult<()> {
        self.send(Command::SetInterval(minutes))
    }

    pub fn cancel(&self) -> MonitorResult<()> {
        self.send(Command::Cancel)
    }

    pub fn show_tab(&self, channel: Channel) -> MonitorResult<()> {
        self.send(Command::ShowTab(channel))
    }

    pub fn select_step(&self, group: usize, index: usize) -> MonitorResult<()> {
        self.send(Command::SelectStep { group, index })
    }

    pub fn shutdown(&self) -> MonitorResult<()> {
        self.send(Command::Shutdown)
    }

    /// Whether the monitor has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Result of a spawned network task.
#[derive(Debug)]
enum Completion {
    Summaries {
        channel: Channel,
        seq: RequestSeq,
        result: Result<SummariesResponse, PollError<ApiError>>,
    },
    Cancel {
        seq: RequestSeq,
        result: ApiResult<ModelEntity>,
    },
    Image {
        key: ImageKey,
        result: Result<Vec<u8>, PollError<ApiError>>,
    },
}

/// Monitors one training run and keeps a [`RenderSurface`] up to date.
pub struct Monitor<A, S> {
    api: Arc<A>,
    job_id: JobId,
    surface: S,
    config: MonitorConfig,
    catalog: ModelCatalog,
    entity: Option<ModelEntity>,
    store: SummaryStore,
    controller: RefreshController,
    sequencer: RequestSequencer,
    charts: ChartReconciler,
    images: ImageReconciler,
    image_view: ImageView,
    cancel_in_flight: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    timers: mpsc::UnboundedReceiver<TimerEvent>,
    tasks: JoinSet<Completion>,
}

impl<A, S> Monitor<A, S>
where
    A: TrainingApi + 'static,
    S: RenderSurface,
{
    /// Create a monitor and the handle used to control it.
    pub fn new(
        api: Arc<A>,
        job_id: JobId,
        surface: S,
        config: MonitorConfig,
    ) -> MonitorResult<(Self, MonitorHandle)> {
        config.validate()?;

        let (command_tx, commands) = mpsc::unbounded_channel();
        let (timer_tx, timers) = mpsc::unbounded_channel();
        let controller =
            RefreshController::new(config.refresh_interval_minutes, config.elapsed_tick, timer_tx);

        let monitor = Self {
            api,
            job_id,
            surface,
            catalog: ModelCatalog::default(),
            entity: None,
            store: SummaryStore::new(),
            controller,
            sequencer: RequestSequencer::new(),
            charts: ChartReconciler::new(config.charts_visible),
            images: ImageReconciler::new(config.image_stagger),
            image_view: ImageView::default(),
            cancel_in_flight: false,
            commands,
            timers,
            tasks: JoinSet::new(),
            config,
        };
        Ok((monitor, MonitorHandle { tx: command_tx }))
    }

    /// Models and datasets used to describe the run's lineage.
    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Entity already known to the caller, shown before the first fetch.
    pub fn with_entity(mut self, entity: ModelEntity) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Run until shut down, until every handle is dropped, or, with
    /// `exit_when_done`, until training is done and nothing is in flight.
    ///
    /// Returns the surface.
    pub async fn run(mut self) -> S {
        info!(job = %self.job_id, interval = %self.controller.interval_label(), "Monitoring training");

        if self.entity.is_some() {
            self.render_model();
        }
        self.fetch_all();

        loop {
            if self.should_exit() {
                info!(job = %self.job_id, "Training done, monitor exiting");
                break;
            }

            // Completions go before timer events: a tick queued alongside a
            // terminal entity must see Done.
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(joined) = self.tasks.join_next() => match joined {
                    Ok(completion) => self.handle_completion(completion),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!(error = %e, "Fetch task panicked"),
                },
                Some(event) = self.timers.recv() => self.handle_timer(event),
            }
        }

        self.teardown();
        self.surface
    }

    fn should_exit(&self) -> bool {
        self.config.exit_when_done
            && self.controller.is_done()
            && !self.cancel_in_flight
            && self.tasks.is_empty()
    }

    fn teardown(&mut self) {
        let cleared = self.controller.shutdown();
        let aborted = self.tasks.len();
        self.tasks.abort_all();
        info!(job = %self.job_id, timers_cleared = cleared, tasks_aborted = aborted, "Monitor stopped");
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, "Command");
        match command {
            Command::Refresh => {
                if !self.controller.refresh_enabled() {
                    info!(in_flight = self.controller.in_flight(), "Refresh already in progress");
                    return;
                }
                self.controller.restart_refresh_timer();
                self.fetch_all();
            }
            Command::SetInterval(minutes) => {
                self.controller.set_interval(minutes);
                self.render_controls();
            }
            Command::Cancel => self.cancel(),
            Command::ShowTab(channel) => {
                self.charts.set_visible(channel == Channel::Scalars);
                if channel == Channel::Scalars {
                    self.render_charts();
                }
            }
            Command::SelectStep { group, index } => {
                if self.image_view.select_step(group, index) {
                    self.surface
                        .update_image_step(group, &self.image_view.groups[group]);
                } else {
                    warn!(group, index, "No such image step");
                }
            }
            Command::Shutdown => {}
        }
    }

    fn handle_timer(&mut self, event: TimerEvent) {
        if !self.controller.accepts(event) {
            debug!(?event, "Dropping stale timer event");
            return;
        }
        match event.kind {
            TimerKind::Refresh => {
                debug!("Periodic refresh");
                self.fetch_all();
            }
            TimerKind::ElapsedTick => {
                if let Some(elapsed) = self
                    .entity
                    .as_ref()
                    .and_then(|entity| elapsed_display(entity, Utc::now()))
                {
                    self.surface.render_elapsed(&elapsed);
                }
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Summaries {
                channel,
                seq,
                result,
            } => {
                self.controller.fetch_finished();
                match result {
                    Ok(response) => self.apply_summaries(channel, seq, response),
                    Err(e) => debug!(%channel, %seq, error = %e, "Summaries fetch abandoned"),
                }
                self.render_controls();
            }
            Completion::Cancel { seq, result } => {
                self.cancel_in_flight = false;
                match result {
                    Ok(entity) => {
                        info!(job = %self.job_id, "Cancellation requested");
                        self.apply_entity(seq, entity);
                    }
                    Err(e) => {
                        warn!(job = %self.job_id, error = %e, "Failed to cancel training");
                        self.render_controls();
                    }
                }
            }
            Completion::Image { key, result } => {
                let load = match result {
                    Ok(bytes) => ImageLoad::Loaded(Arc::from(bytes)),
                    Err(_) => ImageLoad::Failed,
                };
                if !self.image_view.set_load(key, load) {
                    debug!(?key, "Discarding image for a replaced view");
                    return;
                }
                if let Some(placeholder) = self.image_view.placeholder(key) {
                    self.surface.update_image(key, placeholder);
                }
            }
        }
    }

    fn apply_summaries(&mut self, channel: Channel, seq: RequestSeq, response: SummariesResponse) {
        let (entity, training, eval) = response.into_parts();
        self.apply_entity(seq, entity);

        if !self.sequencer.accept_channel(channel, seq) {
            debug!(%channel, %seq, "Discarding stale summaries");
            return;
        }
        if self.store.apply_response(channel, training, eval).is_changed() {
            self.surface.set_loading(channel, true);
            match channel {
                Channel::Scalars => self.render_charts(),
                Channel::Images => self.render_images(),
            }
            self.surface.set_loading(channel, false);
        }
    }

    fn apply_entity(&mut self, seq: RequestSeq, entity: ModelEntity) {
        if !self.sequencer.accept_entity(seq) {
            debug!(%seq, "Discarding stale model entity");
            return;
        }
        let transition = self.controller.on_entity(&entity);
        if let Transition::EnteredDone { timers_cleared } = transition {
            debug!(timers_cleared, "Refresh timers cleared");
        }
        self.entity = Some(entity);
        self.render_model();
    }

    fn render_model(&mut self) {
        if let Some(entity) = &self.entity {
            let panel = ModelPanel::build(entity, &self.catalog);
            self.surface.render_model(&panel);
        }
        self.render_controls();
    }

    fn controls(&self) -> ControlState {
        let refresh_enabled = self.controller.refresh_enabled();
        let interval = self.controller.interval_minutes();
        let done = self.controller.is_done();
        match &self.entity {
            Some(entity) => ControlState::new(entity, done, refresh_enabled, interval),
            None => ControlState::pending(done, refresh_enabled, interval),
        }
    }

    fn render_controls(&mut self) {
        let controls = self.controls();
        self.surface.render_controls(&controls);
    }

    fn render_charts(&mut self) {
        let x_max = self
            .entity
            .as_ref()
            .map(|e| e.num_training_steps)
            .unwrap_or(0);
        if let Some(charts) = self
            .charts
            .reconcile(self.store.channel(Channel::Scalars), x_max)
        {
            self.surface.render_charts(&charts);
        }
    }

    fn render_images(&mut self) {
        self.image_view = self.images.rebuild(self.store.channel(Channel::Images));
        self.surface.render_images(&self.image_view);

        for fetch in self.image_view.fetches() {
            let api = self.api.clone();
            let policy = self.config.retry;
            self.tasks.spawn(async move {
                tokio::time::sleep(fetch.delay).await;
                let result = poll_with_backoff(&policy, &AlwaysRetry, &fetch.url, |_| {
                    api.fetch_image_bytes(&fetch.url)
                })
                .await;
                Completion::Image {
                    key: fetch.key,
                    result,
                }
            });
        }
    }

    fn fetch_all(&mut self) {
        for channel in Channel::ALL {
            self.fetch_summaries(channel);
        }
        self.render_controls();
    }

    fn fetch_summaries(&mut self, channel: Channel) {
        let seq = self.sequencer.issue();
        self.controller.fetch_started();
        debug!(%channel, %seq, "Fetching summaries");

        let api = self.api.clone();
        let job_id = self.job_id.clone();
        let policy = self.config.retry;
        let gate = self.controller.gate();
        self.tasks.spawn(async move {
            let label = format!("summaries/{channel}");
            let result = poll_with_backoff(&policy, &gate, &label, |_| {
                api.fetch_summaries(&job_id, channel)
            })
            .await;
            Completion::Summaries {
                channel,
                seq,
                result,
            }
        });
    }

    fn cancel(&mut self) {
        if !self.controls().can_cancel {
            info!(job = %self.job_id, "Cancel not available for this job");
            return;
        }
        if self.cancel_in_flight {
            debug!("Cancel already in flight");
            return;
        }

        let seq = self.sequencer.issue();
        self.cancel_in_flight = true;
        info!(job = %self.job_id, "Requesting cancellation");

        let api = self.api.clone();
        let job_id = self.job_id.clone();
        self.tasks.spawn(async move {
            let result = api.cancel_job(&job_id).await;
            Completion::Cancel { seq, result }
        });
    }
}
