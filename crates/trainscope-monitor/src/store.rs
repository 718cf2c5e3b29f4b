//! In-memory cache of the latest summaries per channel.

use tracing::debug;

use trainscope_api::{Channel, JobData};

/// Result of applying a response to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// At least one change token differed; both snapshots were replaced.
    Changed,
    /// Both tokens matched; nothing was touched.
    Unchanged,
}

impl ApplyOutcome {
    pub fn is_changed(self) -> bool {
        matches!(self, ApplyOutcome::Changed)
    }
}

/// Training and eval snapshots for one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelData {
    pub training: JobData,
    pub eval: JobData,
}

impl ChannelData {
    /// Combined change token, `"<training>, <eval>"`.
    pub fn render_token(&self) -> String {
        format!("{}, {}", self.training.updated, self.eval.updated)
    }

    /// Whether either job has produced data.
    pub fn has_data(&self) -> bool {
        self.training.has_data() || self.eval.has_data()
    }
}

/// Latest known summaries for both channels.
#[derive(Debug, Clone, Default)]
pub struct SummaryStore {
    scalars: ChannelData,
    images: ChannelData,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for a channel.
    pub fn channel(&self, channel: Channel) -> &ChannelData {
        match channel {
            Channel::Scalars => &self.scalars,
            Channel::Images => &self.images,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelData {
        match channel {
            Channel::Scalars => &mut self.scalars,
            Channel::Images => &mut self.images,
        }
    }

    /// Replace a channel's snapshots if either change token differs.
    ///
    /// Token comparison is the only test; the payloads are not inspected.
    pub fn apply_response(
        &mut self,
        channel: Channel,
        training: JobData,
        eval: JobData,
    ) -> ApplyOutcome {
        let current = self.channel_mut(channel);
        if current.training.updated == training.updated && current.eval.updated == eval.updated {
            debug!(%channel, "Summaries unchanged");
            return ApplyOutcome::Unchanged;
        }

        debug!(
            %channel,
            training = %training.updated,
            eval = %eval.updated,
            "Summaries changed"
        );
        *current = ChannelData { training, eval };
        ApplyOutcome::Changed
    }
}
