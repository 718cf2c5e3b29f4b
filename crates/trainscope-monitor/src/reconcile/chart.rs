//! Scalar charts.

use rustc_hash::FxHashMap;
use tracing::debug;

use trainscope_api::JobData;

use super::JobKind;
use crate::store::ChannelData;

/// One point of a chart series. `value` is `None` where the tag has no
/// numeric value at that step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub step: u64,
    pub value: Option<f64>,
}

/// A single-series line chart for one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartWidget {
    pub job: JobKind,
    /// Tag name, used as the chart title.
    pub tag: String,
    /// Inclusive x-axis bounds, `0..=configured training steps`.
    pub x_domain: (u64, u64),
    /// One point per entry of `sorted_steps`.
    pub points: Vec<ChartPoint>,
    /// Whether gaps should be bridged when drawing.
    pub interpolate_nulls: bool,
}

impl ChartWidget {
    /// Points that carry a value.
    pub fn defined_points(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.points
            .iter()
            .filter_map(|p| p.value.map(|v| (p.step, v)))
    }
}

/// Build one chart per tag that has at least one numeric value.
///
/// Charts follow `sorted_tags` order. A job with an empty change token
/// contributes nothing.
pub fn build_charts(job: JobKind, data: &JobData, x_max: u64) -> Vec<ChartWidget> {
    if !data.has_data() {
        return Vec::new();
    }

    let mut by_tag: FxHashMap<&str, FxHashMap<u64, f64>> = FxHashMap::default();
    for summary in &data.summaries {
        for (tag, value) in &summary.values {
            if let Some(v) = value.as_scalar() {
                by_tag
                    .entry(tag.as_str())
                    .or_default()
                    .insert(summary.step, v);
            }
        }
    }

    data.sorted_tags
        .iter()
        .filter_map(|tag| {
            let values = by_tag.get(tag.as_str())?;
            let points = data
                .sorted_steps
                .iter()
                .map(|&step| ChartPoint {
                    step,
                    value: values.get(&step).copied(),
                })
                .collect();
            Some(ChartWidget {
                job,
                tag: tag.clone(),
                x_domain: (0, x_max),
                points,
                interpolate_nulls: true,
            })
        })
        .collect()
}

/// Decides when the chart view needs rebuilding.
#[derive(Debug, Clone, Default)]
pub struct ChartReconciler {
    visible: bool,
    last_rendered: Option<String>,
}

impl ChartReconciler {
    pub fn new(visible: bool) -> Self {
        Self {
            visible,
            last_rendered: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Record whether the chart surface is shown.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Token of the data currently on screen.
    pub fn last_rendered(&self) -> Option<&str> {
        self.last_rendered.as_deref()
    }

    /// Return the full set of charts if the surface is shown and the data
    /// changed since the last render. Training charts come first.
    pub fn reconcile(&mut self, data: &ChannelData, x_max: u64) -> Option<Vec<ChartWidget>> {
        if !self.visible {
            debug!("Chart view hidden, skipping");
            return None;
        }
        let token = data.render_token();
        if self.last_rendered.as_deref() == Some(token.as_str()) {
            debug!(%token, "Charts up to date");
            return None;
        }

        let mut charts = build_charts(JobKind::Training, &data.training, x_max);
        charts.extend(build_charts(JobKind::Eval, &data.eval, x_max));
        debug!(%token, charts = charts.len(), "Rebuilding charts");
        self.last_rendered = Some(token);
        Some(charts)
    }
}
