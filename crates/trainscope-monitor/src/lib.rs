//! Trainscope monitor
//!
//! Polls a training backend for scalar and image summaries and keeps a
//! rendering surface in sync with them.
//!
//! # Components
//!
//! - [`poller`]: retry with exponential backoff
//! - [`store`]: latest summaries per channel with change detection
//! - [`controller`]: the Active/Done refresh state machine and its timers
//! - [`reconcile`]: charts and image sliders built from stored summaries
//! - [`panel`]: model details and control states
//! - [`monitor`]: the event loop tying them together
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trainscope_api::{HttpApiConfig, HttpTrainingApi, JobId};
//! use trainscope_monitor::{Monitor, MonitorConfig};
//!
//! let api = Arc::new(HttpTrainingApi::new(HttpApiConfig::new("https://fmltc.example.com"))?);
//! let (monitor, handle) = Monitor::new(api, JobId::new("0f1e2d3c"), my_surface, MonitorConfig::default())?;
//! let task = tokio::spawn(monitor.run());
//! handle.refresh()?;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod format;
pub mod monitor;
pub mod panel;
pub mod poller;
pub mod reconcile;
pub mod sequence;
pub mod store;
pub mod surface;
pub mod task;

pub use config::MonitorConfig;
pub use controller::{Phase, RefreshController, TimerEvent, TimerKind, Transition, interval_label};
pub use error::{MonitorError, MonitorResult};
pub use monitor::{Command, Monitor, MonitorHandle};
pub use panel::{ControlState, ModelCatalog, ModelPanel, PreviousModel};
pub use poller::{
    AlwaysRetry, PeriodicRefreshGate, PollError, RetryGate, RetryPolicy, Retryable,
    poll_with_backoff,
};
pub use reconcile::{
    ChartPoint, ChartReconciler, ChartWidget, ImageKey, ImageLoad, ImagePlaceholder,
    ImageReconciler, ImageTagGroup, ImageView, JobKind,
};
pub use sequence::{RequestSeq, RequestSequencer};
pub use store::{ApplyOutcome, ChannelData, SummaryStore};
pub use surface::RenderSurface;
pub use task::RepeatingTask;
