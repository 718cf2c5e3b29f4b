//! Turning stored summaries into widget descriptors.
//!
//! Both reconcilers are pure with respect to the data they are given: they
//! return complete descriptors and the [`RenderSurface`] replaces whatever
//! it showed before.
//!
//! [`RenderSurface`]: crate::surface::RenderSurface

pub mod chart;
pub mod image;

use std::fmt;

pub use chart::{ChartPoint, ChartReconciler, ChartWidget, build_charts};
pub use image::{
    ImageFetch, ImageKey, ImageLoad, ImagePlaceholder, ImageReconciler, ImageTagGroup, ImageView,
    build_image_groups,
};

/// Which backend job a widget describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Training,
    Eval,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Training, JobKind::Eval];
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Training => f.write_str("training"),
            JobKind::Eval => f.write_str("eval"),
        }
    }
}
