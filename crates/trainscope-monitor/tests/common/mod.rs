//! Test doubles shared by the monitor integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use trainscope_api::{
    ApiError, ApiResult, Channel, ImageRef, JobId, JobState, ModelEntity, SummariesResponse,
    Summary, SummaryValue, TrainingApi,
};
use trainscope_monitor::{
    ChartWidget, ControlState, ImageKey, ImagePlaceholder, ImageTagGroup, ImageView, ModelPanel,
    RenderSurface,
};

// ============================================================================
// Scripted API
// ============================================================================

/// One scripted reply.
pub struct Reply<T> {
    pub delay: Duration,
    pub result: ApiResult<T>,
}

impl<T> Reply<T> {
    pub fn ok(value: T) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(value),
        }
    }

    pub fn err(error: ApiError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Summaries(Channel, Duration),
    Cancel(Duration),
    Image(String, Duration),
}

#[derive(Default)]
struct Script {
    summaries: HashMap<Channel, VecDeque<Reply<SummariesResponse>>>,
    summaries_fallback: HashMap<Channel, SummariesResponse>,
    cancels: VecDeque<Reply<ModelEntity>>,
    image_failures: HashMap<String, u32>,
    calls: Vec<Call>,
}

/// In-memory [`TrainingApi`] that replays scripted replies.
///
/// Queued replies are consumed first; afterwards the channel's fallback
/// response is returned. Image downloads return the URL's bytes unless a
/// failure count was scripted for it.
pub struct ScriptedApi {
    script: Mutex<Script>,
    start: Instant,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            start: Instant::now(),
        }
    }

    pub fn queue_summaries(&self, channel: Channel, reply: Reply<SummariesResponse>) {
        let mut script = self.script.lock().unwrap();
        script.summaries.entry(channel).or_default().push_back(reply);
    }

    pub fn set_summaries(&self, channel: Channel, response: SummariesResponse) {
        let mut script = self.script.lock().unwrap();
        script.summaries_fallback.insert(channel, response);
    }

    pub fn queue_cancel(&self, reply: Reply<ModelEntity>) {
        self.script.lock().unwrap().cancels.push_back(reply);
    }

    pub fn fail_image(&self, url: &str, times: u32) {
        let mut script = self.script.lock().unwrap();
        script.image_failures.insert(url.to_string(), times);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn summaries_calls(&self, channel: Channel) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Summaries(ch, _) if *ch == channel))
            .count()
    }

    pub fn summaries_call_times(&self, channel: Channel) -> Vec<Duration> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Summaries(ch, at) if *ch == channel => Some(*at),
                _ => None,
            })
            .collect()
    }

    pub fn cancel_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Cancel(_)))
            .count()
    }

    pub fn image_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Image(..)))
            .count()
    }

    fn record(&self, call: Call) {
        self.script.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl TrainingApi for ScriptedApi {
    async fn fetch_summaries(
        &self,
        _job_id: &JobId,
        channel: Channel,
    ) -> ApiResult<SummariesResponse> {
        self.record(Call::Summaries(channel, self.start.elapsed()));
        let reply = {
            let mut script = self.script.lock().unwrap();
            match script.summaries.get_mut(&channel).and_then(VecDeque::pop_front) {
                Some(reply) => reply,
                None => Reply::ok(
                    script
                        .summaries_fallback
                        .get(&channel)
                        .cloned()
                        .unwrap_or_default(),
                ),
            }
        };
        reply.wait().await;
        reply.result
    }

    async fn cancel_job(&self, _job_id: &JobId) -> ApiResult<ModelEntity> {
        self.record(Call::Cancel(self.start.elapsed()));
        let reply = self
            .script
            .lock()
            .unwrap()
            .cancels
            .pop_front()
            .unwrap_or_else(|| Reply::err(unavailable("/cancelTrainingModel")));
        reply.wait().await;
        reply.result
    }

    async fn fetch_image_bytes(&self, url: &str) -> ApiResult<Vec<u8>> {
        self.record(Call::Image(url.to_string(), self.start.elapsed()));
        let mut script = self.script.lock().unwrap();
        if let Some(remaining) = script.image_failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(unavailable(url));
            }
        }
        Ok(url.as_bytes().to_vec())
    }
}

// ============================================================================
// Recording surface
// ============================================================================

/// Everything a surface was asked to draw.
#[derive(Debug, Clone)]
pub enum Rendered {
    Model(ModelPanel),
    Controls(ControlState),
    Elapsed(String),
    Charts(Vec<ChartWidget>),
    Images(ImageView),
    Image(ImageKey, ImagePlaceholder),
    Step(usize, ImageTagGroup),
    Loading(Channel, bool),
}

/// [`RenderSurface`] that records every call. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    log: Arc<Mutex<Vec<Rendered>>>,
}

impl RecordingSurface {
    pub fn events(&self) -> Vec<Rendered> {
        self.log.lock().unwrap().clone()
    }

    pub fn chart_renders(&self) -> Vec<Vec<ChartWidget>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::Charts(charts) => Some(charts),
                _ => None,
            })
            .collect()
    }

    pub fn image_views(&self) -> Vec<ImageView> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::Images(view) => Some(view),
                _ => None,
            })
            .collect()
    }

    pub fn image_updates(&self) -> Vec<(ImageKey, ImagePlaceholder)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::Image(key, placeholder) => Some((key, placeholder)),
                _ => None,
            })
            .collect()
    }

    pub fn step_updates(&self) -> Vec<(usize, ImageTagGroup)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::Step(group, g) => Some((group, g)),
                _ => None,
            })
            .collect()
    }

    pub fn elapsed_updates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::Elapsed(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_model(&self) -> Option<ModelPanel> {
        self.events().into_iter().rev().find_map(|e| match e {
            Rendered::Model(panel) => Some(panel),
            _ => None,
        })
    }

    pub fn last_controls(&self) -> Option<ControlState> {
        self.events().into_iter().rev().find_map(|e| match e {
            Rendered::Controls(controls) => Some(controls),
            _ => None,
        })
    }

    fn push(&self, event: Rendered) {
        self.log.lock().unwrap().push(event);
    }
}

impl RenderSurface for RecordingSurface {
    fn render_model(&mut self, panel: &ModelPanel) {
        self.push(Rendered::Model(panel.clone()));
    }

    fn render_controls(&mut self, controls: &ControlState) {
        self.push(Rendered::Controls(controls.clone()));
    }

    fn render_elapsed(&mut self, elapsed: &str) {
        self.push(Rendered::Elapsed(elapsed.to_string()));
    }

    fn render_charts(&mut self, charts: &[ChartWidget]) {
        self.push(Rendered::Charts(charts.to_vec()));
    }

    fn render_images(&mut self, view: &ImageView) {
        self.push(Rendered::Images(view.clone()));
    }

    fn update_image(&mut self, key: ImageKey, placeholder: &ImagePlaceholder) {
        self.push(Rendered::Image(key, placeholder.clone()));
    }

    fn update_image_step(&mut self, group_index: usize, group: &ImageTagGroup) {
        self.push(Rendered::Step(group_index, group.clone()));
    }

    fn set_loading(&mut self, channel: Channel, loading: bool) {
        self.push(Rendered::Loading(channel, loading));
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn unavailable(endpoint: &str) -> ApiError {
    ApiError::Status {
        endpoint: endpoint.to_string(),
        status: 503,
        message: "Service Unavailable".into(),
    }
}

pub fn entity(train: JobState, eval: JobState) -> ModelEntity {
    ModelEntity {
        model_uuid: "model-1".into(),
        description: "ball detector".into(),
        num_training_steps: 1000,
        train_job_state: train,
        eval_job_state: eval,
        ..Default::default()
    }
}

pub fn running() -> ModelEntity {
    entity(JobState::Running, JobState::StateUnspecified)
}

pub fn succeeded() -> ModelEntity {
    entity(JobState::Succeeded, JobState::Succeeded)
}

/// Scalars response with a single `loss` tag for the training job.
pub fn scalars(entity: ModelEntity, token: &str, points: &[(u64, f64)]) -> SummariesResponse {
    SummariesResponse {
        model_entity: entity,
        training_updated: token.to_string(),
        training_sorted_tags: vec!["loss".into()],
        training_sorted_steps: points.iter().map(|(step, _)| *step).collect(),
        training_summaries: points
            .iter()
            .map(|&(step, value)| Summary {
                step,
                values: [("loss".to_string(), SummaryValue::Scalar(value))]
                    .into_iter()
                    .collect(),
            })
            .collect(),
        ..Default::default()
    }
}

/// Images response with a single `sample` tag for the training job.
pub fn images(entity: ModelEntity, token: &str, steps: &[u64]) -> SummariesResponse {
    SummariesResponse {
        model_entity: entity,
        training_updated: token.to_string(),
        training_sorted_tags: vec!["sample".into()],
        training_sorted_steps: steps.to_vec(),
        training_summaries: steps
            .iter()
            .map(|&step| Summary {
                step,
                values: [(
                    "sample".to_string(),
                    SummaryValue::Image(ImageRef {
                        image_url: image_url(step),
                        width: 300,
                        height: 150,
                    }),
                )]
                .into_iter()
                .collect(),
            })
            .collect(),
        ..Default::default()
    }
}

pub fn image_url(step: u64) -> String {
    format!("/image?step={step}")
}

/// Let spawned tasks and the event loop catch up without moving far in time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
