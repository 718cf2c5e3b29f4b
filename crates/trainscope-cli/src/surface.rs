//! Terminal rendering of monitor output.

use std::fmt::Write as _;
use std::io::{self, Write};

use console::style;
use tracing::debug;

use trainscope_api::Channel;
use trainscope_monitor::{
    ChartWidget, ControlState, ImageKey, ImageLoad, ImagePlaceholder, ImageTagGroup, ImageView,
    ModelPanel, RenderSurface,
};

const SPARK_WIDTH: usize = 40;
const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const CLEAR_LINE: &str = "\r\x1b[2K";

/// Render `values` as a one-line bar chart at most `width` cells wide.
pub fn sparkline(values: &[f64], width: usize) -> String {
    if values.is_empty() || width == 0 {
        return String::new();
    }

    let sampled: Vec<f64> = if values.len() > width {
        (0..width)
            .map(|i| values[i * (values.len() - 1) / (width - 1).max(1)])
            .collect()
    } else {
        values.to_vec()
    };

    let min = sampled.iter().copied().fold(f64::INFINITY, f64::min);
    let max = sampled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    sampled
        .iter()
        .map(|v| {
            if range <= f64::EPSILON {
                SPARK_BARS[SPARK_BARS.len() / 2]
            } else {
                let level = ((v - min) / range * (SPARK_BARS.len() - 1) as f64).round() as usize;
                SPARK_BARS[level.min(SPARK_BARS.len() - 1)]
            }
        })
        .collect()
}

/// [`RenderSurface`] that prints to a terminal or any writer.
///
/// With `live` set, elapsed-time updates rewrite a single status line;
/// otherwise they are not printed.
pub struct TerminalSurface<W> {
    out: W,
    live: bool,
    status_line: bool,
    view: ImageView,
    last_controls: Option<ControlState>,
}

impl TerminalSurface<io::Stdout> {
    /// Surface on standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout(), console::Term::stdout().is_term())
    }
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, live: bool) -> Self {
        Self {
            out,
            live,
            status_line: false,
            view: ImageView::default(),
            last_controls: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        let mut buffer = String::new();
        if self.status_line {
            buffer.push_str(CLEAR_LINE);
            self.status_line = false;
        }
        buffer.push_str(text);
        if let Err(e) = self
            .out
            .write_all(buffer.as_bytes())
            .and_then(|()| self.out.flush())
        {
            debug!(error = %e, "terminal write failed");
        }
    }

    fn group_name(&self, group: usize) -> String {
        self.view
            .groups
            .get(group)
            .map(|g| format!("{}/{}", g.job, g.tag))
            .unwrap_or_else(|| format!("group {group}"))
    }
}

impl<W: Write + Send> RenderSurface for TerminalSurface<W> {
    fn render_model(&mut self, panel: &ModelPanel) {
        let mut text = String::new();
        let _ = writeln!(text, "\n{} {}", style("→").cyan().bold(), style(&panel.description).bold());
        let _ = writeln!(text, "  Created:          {}", panel.created);
        let _ = writeln!(text, "  Starting model:   {}", panel.original_model);
        if let Some(previous) = &panel.previous_model {
            let steps = previous
                .training_steps
                .as_deref()
                .map(|s| format!(" ({s} steps)"))
                .unwrap_or_default();
            let _ = writeln!(text, "  Previous model:   {}{steps}", previous.name);
            if !previous.datasets.is_empty() {
                let _ = writeln!(text, "    datasets:       {}", previous.datasets.join(", "));
            }
        }
        if !panel.added_datasets.is_empty() {
            let _ = writeln!(text, "  Datasets:         {}", panel.added_datasets.join(", "));
        }
        let _ = writeln!(
            text,
            "  Training:         {} ({} steps)",
            style(&panel.train_state).yellow(),
            panel.num_training_steps
        );
        let _ = writeln!(text, "  Evaluation:       {}", style(&panel.eval_state).yellow());
        if let Some(elapsed) = &panel.elapsed {
            let _ = writeln!(text, "  Elapsed:          {elapsed}");
        }
        let _ = writeln!(
            text,
            "  Train frames:     {} ({} negative)",
            panel.train_frame_count, panel.train_negative_frame_count
        );
        for (label, count) in &panel.train_label_counts {
            let _ = writeln!(text, "    {:<16}{count:>10}", style(label).cyan());
        }
        let _ = writeln!(
            text,
            "  Eval frames:      {} ({} negative)",
            panel.eval_frame_count, panel.eval_negative_frame_count
        );
        for (label, count) in &panel.eval_label_counts {
            let _ = writeln!(text, "    {:<16}{count:>10}", style(label).cyan());
        }
        self.emit(&text);
    }

    fn render_controls(&mut self, controls: &ControlState) {
        if self.last_controls.as_ref() == Some(controls) {
            return;
        }
        self.last_controls = Some(controls.clone());

        let line = if controls.active {
            let refresh = if controls.refresh_enabled {
                format!("refreshing every {}", controls.interval_label)
            } else {
                "refresh in progress".to_string()
            };
            let cancel = if controls.can_cancel {
                "cancel with 'c'"
            } else {
                "cancel requested"
            };
            format!("  {} {refresh}, {cancel}\n", style("•").dim())
        } else {
            format!(
                "  {} Training finished; automatic refresh stopped\n",
                style("✓").green().bold()
            )
        };
        self.emit(&line);
    }

    fn render_elapsed(&mut self, elapsed: &str) {
        if !self.live {
            return;
        }
        let line = format!("  {} {elapsed}", style("elapsed").dim());
        self.emit(&line);
        self.status_line = true;
    }

    fn render_charts(&mut self, charts: &[ChartWidget]) {
        let mut text = String::new();
        if charts.is_empty() {
            let _ = writeln!(text, "  {}", style("No scalar summaries yet").dim());
        }
        for chart in charts {
            let values: Vec<f64> = chart.defined_points().map(|(_, v)| v).collect();
            let last = chart
                .defined_points()
                .last()
                .map(|(step, v)| format!("step {step}: {v:.4}"))
                .unwrap_or_else(|| "no values".to_string());
            let _ = writeln!(
                text,
                "  {:<28} {}  {}",
                style(format!("{}/{}", chart.job, chart.tag)).cyan(),
                style(sparkline(&values, SPARK_WIDTH)).green(),
                last
            );
        }
        self.emit(&text);
    }

    fn render_images(&mut self, view: &ImageView) {
        self.view = view.clone();

        let mut text = String::new();
        if view.groups.is_empty() {
            let _ = writeln!(text, "  {}", style("No image summaries yet").dim());
        }
        for group in &view.groups {
            let _ = writeln!(
                text,
                "  {:<28} {}  ({} steps)",
                style(format!("{}/{}", group.job, group.tag)).cyan(),
                group.step_label(),
                group.steps.len()
            );
        }
        self.emit(&text);
    }

    fn update_image(&mut self, key: ImageKey, placeholder: &ImagePlaceholder) {
        if !self.view.set_load(key, placeholder.load.clone()) {
            return;
        }
        let name = self.group_name(key.group);
        let line = match &placeholder.load {
            ImageLoad::Loaded(bytes) if placeholder.visible => format!(
                "  {} {name} step {}: {}x{}, {} bytes\n",
                style("✓").green(),
                placeholder.step,
                placeholder.display_width,
                placeholder.display_height,
                bytes.len()
            ),
            ImageLoad::Failed => format!(
                "  {} {name} step {}: image could not be loaded\n",
                style("✗").red(),
                placeholder.step
            ),
            _ => return,
        };
        self.emit(&line);
    }

    fn update_image_step(&mut self, group_index: usize, group: &ImageTagGroup) {
        if let Some(slot) = self.view.groups.get_mut(group_index) {
            *slot = group.clone();
        }
        let loaded = group
            .placeholders
            .get(group.selected)
            .is_some_and(|p| matches!(p.load, ImageLoad::Loaded(_)));
        let line = format!(
            "  {:<28} {}{}\n",
            style(format!("{}/{}", group.job, group.tag)).cyan(),
            group.step_label(),
            if loaded { "" } else { " (loading)" }
        );
        self.emit(&line);
    }

    fn set_loading(&mut self, channel: Channel, loading: bool) {
        if loading {
            debug!(%channel, "updating view");
        }
    }
}
