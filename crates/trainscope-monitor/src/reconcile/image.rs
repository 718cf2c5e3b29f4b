//! Image sliders.
//!
//! Every update rebuilds the whole view under a new generation number.
//! Image downloads are keyed by [`ImageKey`], which includes the
//! generation, so results that arrive after a rebuild are recognised and
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::debug;

use trainscope_api::{ImageRef, JobData};

use super::JobKind;
use crate::format::format_count;
use crate::store::ChannelData;

/// Images are displayed at this fraction of their native size.
const DISPLAY_DIVISOR: u32 = 3;

/// Identifies one placeholder within one generation of the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub generation: u64,
    /// Index of the tag group within the view.
    pub group: usize,
    /// Index of the step within the group.
    pub index: usize,
}

/// Download state of a placeholder.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ImageLoad {
    /// No image exists for this step; nothing will be fetched.
    Missing,
    /// Waiting for the download.
    #[default]
    Pending,
    Loaded(Arc<[u8]>),
    /// The download was abandoned.
    Failed,
}

/// One image slot, one per step of the tag group.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlaceholder {
    pub step: u64,
    pub image_url: Option<String>,
    pub display_width: u32,
    pub display_height: u32,
    /// Delay before the download starts; `None` when there is nothing to fetch.
    pub fetch_delay: Option<Duration>,
    pub visible: bool,
    pub load: ImageLoad,
}

/// Label, step selector and placeholders for one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTagGroup {
    pub job: JobKind,
    pub tag: String,
    /// Selector positions, one per step.
    pub steps: Vec<u64>,
    /// Selected position.
    pub selected: usize,
    pub placeholders: Vec<ImagePlaceholder>,
}

impl ImageTagGroup {
    /// The step currently shown.
    pub fn selected_step(&self) -> Option<u64> {
        self.steps.get(self.selected).copied()
    }

    /// Step display, e.g. `Step: 1,234`.
    pub fn step_label(&self) -> String {
        match self.selected_step() {
            Some(step) => format!("Step: {}", format_count(step)),
            None => String::new(),
        }
    }

    /// Show the placeholder at `index` and hide the others.
    ///
    /// Returns `false` if `index` is out of range; nothing changes then.
    pub fn select_step(&mut self, index: usize) -> bool {
        if index >= self.placeholders.len() {
            return false;
        }
        self.selected = index;
        for (i, placeholder) in self.placeholders.iter_mut().enumerate() {
            placeholder.visible = i == index;
        }
        true
    }
}

/// A download the monitor should start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFetch {
    pub key: ImageKey,
    pub url: String,
    pub delay: Duration,
}

/// A complete image view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageView {
    pub generation: u64,
    pub groups: Vec<ImageTagGroup>,
}

impl ImageView {
    /// Downloads to start for this view, in stagger order.
    pub fn fetches(&self) -> Vec<ImageFetch> {
        let mut fetches = Vec::new();
        for (group_index, group) in self.groups.iter().enumerate() {
            for (index, placeholder) in group.placeholders.iter().enumerate() {
                if let (Some(url), Some(delay)) = (&placeholder.image_url, placeholder.fetch_delay) {
                    fetches.push(ImageFetch {
                        key: ImageKey {
                            generation: self.generation,
                            group: group_index,
                            index,
                        },
                        url: url.clone(),
                        delay,
                    });
                }
            }
        }
        fetches
    }

    pub fn placeholder(&self, key: ImageKey) -> Option<&ImagePlaceholder> {
        if key.generation != self.generation {
            return None;
        }
        self.groups.get(key.group)?.placeholders.get(key.index)
    }

    /// Record a download result.
    ///
    /// Returns `false` for keys from another generation or out of range.
    pub fn set_load(&mut self, key: ImageKey, load: ImageLoad) -> bool {
        if key.generation != self.generation {
            return false;
        }
        match self
            .groups
            .get_mut(key.group)
            .and_then(|g| g.placeholders.get_mut(key.index))
        {
            Some(placeholder) => {
                placeholder.load = load;
                true
            }
            None => false,
        }
    }

    /// Select a step in one group. See [`ImageTagGroup::select_step`].
    pub fn select_step(&mut self, group: usize, index: usize) -> bool {
        self.groups
            .get_mut(group)
            .is_some_and(|g| g.select_step(index))
    }
}

/// Build the tag groups for one job.
///
/// Only tags with at least one image value get a group. Fetch delays grow
/// by `stagger` per image, starting at zero for each job.
pub fn build_image_groups(job: JobKind, data: &JobData, stagger: Duration) -> Vec<ImageTagGroup> {
    let mut by_tag: FxHashMap<&str, FxHashMap<u64, &ImageRef>> = FxHashMap::default();
    for summary in &data.summaries {
        for (tag, value) in &summary.values {
            if let Some(image) = value.as_image() {
                by_tag
                    .entry(tag.as_str())
                    .or_default()
                    .insert(summary.step, image);
            }
        }
    }

    let mut delay = Duration::ZERO;
    let mut groups = Vec::new();
    for tag in &data.sorted_tags {
        let Some(images) = by_tag.get(tag.as_str()) else {
            continue;
        };
        let last = data.sorted_steps.len().saturating_sub(1);

        let placeholders = data
            .sorted_steps
            .iter()
            .enumerate()
            .map(|(i, &step)| match images.get(&step) {
                Some(image) => {
                    let placeholder = ImagePlaceholder {
                        step,
                        image_url: Some(image.image_url.clone()),
                        display_width: image.width / DISPLAY_DIVISOR,
                        display_height: image.height / DISPLAY_DIVISOR,
                        fetch_delay: Some(delay),
                        visible: i == last,
                        load: ImageLoad::Pending,
                    };
                    delay += stagger;
                    placeholder
                }
                None => ImagePlaceholder {
                    step,
                    image_url: None,
                    display_width: 0,
                    display_height: 0,
                    fetch_delay: None,
                    visible: i == last,
                    load: ImageLoad::Missing,
                },
            })
            .collect();

        groups.push(ImageTagGroup {
            job,
            tag: tag.clone(),
            steps: data.sorted_steps.clone(),
            selected: last,
            placeholders,
        });
    }
    groups
}

/// Rebuilds the image view on every update.
#[derive(Debug, Clone)]
pub struct ImageReconciler {
    generation: u64,
    stagger: Duration,
}

impl ImageReconciler {
    pub fn new(stagger: Duration) -> Self {
        Self {
            generation: 0,
            stagger,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Build a fresh view, superseding all earlier generations.
    pub fn rebuild(&mut self, data: &ChannelData) -> ImageView {
        self.generation += 1;
        let mut groups = build_image_groups(JobKind::Training, &data.training, self.stagger);
        groups.extend(build_image_groups(JobKind::Eval, &data.eval, self.stagger));
        debug!(
            generation = self.generation,
            groups = groups.len(),
            "Rebuilding image view"
        );
        ImageView {
            generation: self.generation,
            groups,
        }
    }
}
