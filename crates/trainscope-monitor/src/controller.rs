//! Periodic refresh state machine.
//!
//! ```text
//!   Active ──(entity reports training done)──► Done
//! ```
//!
//! While Active, two repeating tasks run once the first non-terminal entity
//! arrives: the refresh timer (every N minutes) and the elapsed-time ticker
//! (every 500ms). Entering Done clears both. Done is never left.
//!
//! Every spawned timer gets a fresh generation that its events carry.
//! Events can still sit in the channel after their timer was restarted or
//! cleared; [`RefreshController::accepts`] rejects them.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use trainscope_api::ModelEntity;

use crate::poller::PeriodicRefreshGate;
use crate::task::RepeatingTask;

/// Smallest refresh interval, in minutes.
pub const MIN_INTERVAL_MINUTES: u32 = 1;

/// Largest refresh interval, in minutes.
pub const MAX_INTERVAL_MINUTES: u32 = 60;

/// Refresh interval used when none is configured.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Done,
}

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fetch both channels.
    Refresh,
    /// Recompute the time since the training job started.
    ElapsedTick,
}

/// Event emitted by the controller's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub kind: TimerKind,
    /// Generation of the timer that sent the event.
    pub generation: u64,
}

/// A running timer and the generation stamped on its events.
#[derive(Debug)]
struct Timer {
    generation: u64,
    task: RepeatingTask,
}

/// What a call to the controller changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// Refresh timer and elapsed ticker were started.
    TimersStarted,
    /// Entered Done; `timers_cleared` timers were running and got cleared.
    EnteredDone { timers_cleared: u32 },
}

/// Clamp a refresh interval into the accepted range.
pub fn clamp_interval(minutes: u32) -> u32 {
    let clamped = minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
    if clamped != minutes {
        warn!(
            requested = minutes,
            used = clamped,
            "Refresh interval out of range, clamping"
        );
    }
    clamped
}

/// Human readable interval, "1 minute" or "N minutes".
pub fn interval_label(minutes: u32) -> String {
    if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{minutes} minutes")
    }
}

/// Owns the refresh timer, the elapsed ticker and the in-flight count.
#[derive(Debug)]
pub struct RefreshController {
    phase: Phase,
    interval_minutes: u32,
    elapsed_tick: Duration,
    events: mpsc::UnboundedSender<TimerEvent>,
    refresh_timer: Option<Timer>,
    elapsed_ticker: Option<Timer>,
    generation: u64,
    gate: PeriodicRefreshGate,
    in_flight: usize,
    timers_cleared: u32,
}

impl RefreshController {
    /// Create a controller in the Active phase with no timers running.
    ///
    /// Timer events are delivered on `events`.
    pub fn new(
        interval_minutes: u32,
        elapsed_tick: Duration,
        events: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        Self {
            phase: Phase::Active,
            interval_minutes: clamp_interval(interval_minutes),
            elapsed_tick,
            events,
            refresh_timer: None,
            elapsed_ticker: None,
            generation: 0,
            gate: PeriodicRefreshGate::new(),
            in_flight: 0,
            timers_cleared: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Gate that suppresses summary retries while the refresh timer runs.
    pub fn gate(&self) -> PeriodicRefreshGate {
        self.gate.clone()
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    pub fn interval_label(&self) -> String {
        interval_label(self.interval_minutes)
    }

    fn refresh_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }

    pub fn refresh_timer_running(&self) -> bool {
        self.refresh_timer.as_ref().is_some_and(|t| t.task.is_running())
    }

    pub fn elapsed_ticker_running(&self) -> bool {
        self.elapsed_ticker.as_ref().is_some_and(|t| t.task.is_running())
    }

    /// Whether a received timer event should be acted on.
    ///
    /// False once Done, and for events from a timer that has since been
    /// restarted or cleared.
    pub fn accepts(&self, event: TimerEvent) -> bool {
        if self.is_done() {
            return false;
        }
        let timer = match event.kind {
            TimerKind::Refresh => self.refresh_timer.as_ref(),
            TimerKind::ElapsedTick => self.elapsed_ticker.as_ref(),
        };
        timer.is_some_and(|t| t.generation == event.generation)
    }

    /// Total number of running timers cleared by Done or shutdown.
    pub fn timers_cleared(&self) -> u32 {
        self.timers_cleared
    }

    /// React to a freshly applied model entity.
    pub fn on_entity(&mut self, entity: &ModelEntity) -> Transition {
        if self.is_done() {
            return Transition::Unchanged;
        }
        if entity.is_training_done() {
            return self.enter_done();
        }

        let mut started = false;
        if self.refresh_timer.is_none() {
            self.refresh_timer =
                Some(self.spawn_timer("refresh", self.refresh_period(), TimerKind::Refresh));
            self.gate.set_active(true);
            started = true;
        }
        if self.elapsed_ticker.is_none() {
            self.elapsed_ticker =
                Some(self.spawn_timer("elapsed", self.elapsed_tick, TimerKind::ElapsedTick));
            started = true;
        }

        if started {
            info!(
                interval = %self.interval_label(),
                "Training in progress, periodic refresh started"
            );
            Transition::TimersStarted
        } else {
            Transition::Unchanged
        }
    }

    /// Move to Done and clear both timers. Idempotent.
    pub fn enter_done(&mut self) -> Transition {
        if self.is_done() {
            return Transition::Unchanged;
        }
        self.phase = Phase::Done;
        let cleared = self.clear_timers();
        info!(timers_cleared = cleared, "Training done, periodic refresh stopped");
        Transition::EnteredDone {
            timers_cleared: cleared,
        }
    }

    /// Change the refresh interval, re-creating the timer if it runs.
    ///
    /// Returns the interval actually used.
    pub fn set_interval(&mut self, minutes: u32) -> u32 {
        self.interval_minutes = clamp_interval(minutes);
        info!(interval = %self.interval_label(), "Refresh interval changed");
        self.restart_refresh_timer();
        self.interval_minutes
    }

    /// Reset the refresh timer's phase. No-op unless it is running.
    pub fn restart_refresh_timer(&mut self) -> bool {
        let Some(timer) = self.refresh_timer.as_mut() else {
            return false;
        };
        timer.task.stop();
        self.refresh_timer =
            Some(self.spawn_timer("refresh", self.refresh_period(), TimerKind::Refresh));
        true
    }

    /// Record that a summaries fetch was issued.
    pub fn fetch_started(&mut self) {
        self.in_flight += 1;
    }

    /// Record that a summaries fetch completed, successfully or not.
    pub fn fetch_finished(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Manual refresh is allowed while no summaries fetch is in flight.
    pub fn refresh_enabled(&self) -> bool {
        self.in_flight == 0
    }

    /// Clear both timers without changing phase.
    pub fn shutdown(&mut self) -> u32 {
        self.clear_timers()
    }

    fn clear_timers(&mut self) -> u32 {
        let mut cleared = 0;
        for mut timer in [self.refresh_timer.take(), self.elapsed_ticker.take()]
            .into_iter()
            .flatten()
        {
            if timer.task.stop() {
                cleared += 1;
            }
        }
        self.gate.set_active(false);
        self.timers_cleared += cleared;
        cleared
    }

    fn spawn_timer(&mut self, name: &'static str, period: Duration, kind: TimerKind) -> Timer {
        self.generation += 1;
        let event = TimerEvent {
            kind,
            generation: self.generation,
        };
        let events = self.events.clone();
        Timer {
            generation: event.generation,
            task: RepeatingTask::start(name, period, move || events.send(event).is_ok()),
        }
    }
}
