//! Rendering surface abstraction.
//!
//! A surface receives complete descriptors and replaces whatever it showed
//! for that area. All calls happen on the monitor's event loop.

use trainscope_api::Channel;

use crate::panel::{ControlState, ModelPanel};
use crate::reconcile::{ChartWidget, ImageKey, ImagePlaceholder, ImageTagGroup, ImageView};

/// Where the monitor draws.
pub trait RenderSurface: Send {
    /// Replace the model details table.
    fn render_model(&mut self, panel: &ModelPanel);

    /// Replace the control states (cancel, refresh, interval).
    fn render_controls(&mut self, controls: &ControlState);

    /// Update the locally computed elapsed training time.
    fn render_elapsed(&mut self, elapsed: &str);

    /// Replace all charts.
    fn render_charts(&mut self, charts: &[ChartWidget]);

    /// Replace the whole image view.
    fn render_images(&mut self, view: &ImageView);

    /// A single placeholder finished loading or failed.
    fn update_image(&mut self, key: ImageKey, placeholder: &ImagePlaceholder);

    /// The selected step of one tag group changed.
    fn update_image_step(&mut self, group_index: usize, group: &ImageTagGroup);

    /// A channel started or finished applying new data.
    fn set_loading(&mut self, _channel: Channel, _loading: bool) {}
}
