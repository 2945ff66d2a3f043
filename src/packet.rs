//! Queue element handed to consumers, and the wait policy used to fetch it.

use std::time::Duration;

use crate::sri::StreamSri;
use crate::stream_data::StreamData;
use crate::timestamp::PrecisionTime;

#[derive(Clone, Debug, PartialEq)]
pub struct Packet<D> {
    pub data: D,
    pub time: PrecisionTime,
    pub eos: bool,
    pub stream_id: String,
    /// SRI in force when the packet was enqueued.
    pub sri: StreamSri,
    /// First packet of a new stream, or first packet after its SRI changed.
    pub sri_changed: bool,
    /// Admitting this packet evicted older packets from the queue.
    pub queue_flushed: bool,
}

impl<D: StreamData> Packet<D> {
    pub fn element_count(&self) -> usize {
        self.data.len()
    }
}

/// How long `get_packet` may suspend the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    Blocking,
    NonBlocking,
    For(Duration),
}

impl Wait {
    /// Seconds convention: negative blocks forever, zero returns at once, positive waits that long.
    /// A positive value too large for a `Duration`, infinity included, blocks forever.
    pub fn from_secs(seconds: f64) -> Wait {
        if seconds < 0.0 {
            Wait::Blocking
        } else if seconds == 0.0 || seconds.is_nan() {
            Wait::NonBlocking
        } else {
            Duration::try_from_secs_f64(seconds).map_or(Wait::Blocking, Wait::For)
        }
    }
}

impl From<f64> for Wait {
    fn from(seconds: f64) -> Self {
        Wait::from_secs(seconds)
    }
}

impl From<Duration> for Wait {
    fn from(timeout: Duration) -> Self {
        if timeout.is_zero() { Wait::NonBlocking } else { Wait::For(timeout) }
    }
}
