//! Request sequence numbers and stale-response detection.
//!
//! Every fetch is tagged with a [`RequestSeq`] when it is issued. A
//! completion is applied only if its sequence is newer than the last one
//! applied for the same channel (summaries) or for the entity (any request
//! that returns a model entity).

use std::fmt;

use trainscope_api::Channel;

/// Monotonic request number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestSeq(u64);

impl RequestSeq {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues sequence numbers and tracks what has been applied.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    next: u64,
    scalars_applied: Option<RequestSeq>,
    images_applied: Option<RequestSeq>,
    entity_applied: Option<RequestSeq>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number.
    pub fn issue(&mut self) -> RequestSeq {
        self.next += 1;
        RequestSeq(self.next)
    }

    /// Record a summaries completion for `channel`.
    ///
    /// Returns `false` if a newer response was already applied.
    pub fn accept_channel(&mut self, channel: Channel, seq: RequestSeq) -> bool {
        let slot = match channel {
            Channel::Scalars => &mut self.scalars_applied,
            Channel::Images => &mut self.images_applied,
        };
        advance(slot, seq)
    }

    /// Record an entity snapshot carried by `seq`.
    ///
    /// Returns `false` if a newer entity was already applied.
    pub fn accept_entity(&mut self, seq: RequestSeq) -> bool {
        advance(&mut self.entity_applied, seq)
    }

    /// Last applied sequence for a channel.
    pub fn applied(&self, channel: Channel) -> Option<RequestSeq> {
        match channel {
            Channel::Scalars => self.scalars_applied,
            Channel::Images => self.images_applied,
        }
    }
}

fn advance(slot: &mut Option<RequestSeq>, seq: RequestSeq) -> bool {
    match slot {
        Some(applied) if *applied >= seq => false,
        _ => {
            *slot = Some(seq);
            true
        }
    }
}
