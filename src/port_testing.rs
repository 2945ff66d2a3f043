//! Endpoint doubles for exercising send ports without a transport.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::endpoint::RemoteEndpoint;
use crate::error::DeliveryError;
use crate::sri::StreamSri;
use crate::timestamp::PrecisionTime;

#[derive(Clone, Debug, PartialEq)]
pub enum EndpointCall<D> {
    Sri(StreamSri),
    Packet { data: D, time: PrecisionTime, eos: bool, stream_id: String },
}

/// Remembers every call in arrival order.
#[derive(Debug)]
pub struct RecordingEndpoint<D> {
    calls: Mutex<Vec<EndpointCall<D>>>,
}

impl<D> Default for RecordingEndpoint<D> {
    fn default() -> Self {
        RecordingEndpoint { calls: Mutex::new(Vec::new()) }
    }
}

impl<D: Clone> RecordingEndpoint<D> {
    pub fn new() -> Self {
        RecordingEndpoint::default()
    }

    pub fn calls(&self) -> Vec<EndpointCall<D>> {
        self.calls.lock().clone()
    }

    pub fn sris(&self) -> Vec<StreamSri> {
        self.calls.lock().iter()
            .filter_map(|c| match c {
                EndpointCall::Sri(sri) => Some(sri.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(data, time, eos, stream_id)` of every packet received.
    pub fn packets(&self) -> Vec<(D, PrecisionTime, bool, String)> {
        self.calls.lock().iter()
            .filter_map(|c| match c {
                EndpointCall::Packet { data, time, eos, stream_id } => Some((data.clone(), *time, *eos, stream_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl<D: Clone + Send + Sync> RemoteEndpoint<D> for RecordingEndpoint<D> {
    fn push_sri(&self, sri: &StreamSri) -> Result<(), DeliveryError> {
        self.calls.lock().push(EndpointCall::Sri(sri.clone()));
        Ok(())
    }

    fn push_packet(&self, data: D, time: PrecisionTime, eos: bool, stream_id: &str) -> Result<(), DeliveryError> {
        self.calls.lock().push(EndpointCall::Packet { data, time, eos, stream_id: stream_id.to_string() });
        Ok(())
    }
}

/// Records like [`RecordingEndpoint`] while healthy, rejects every call while failing.
#[derive(Debug)]
pub struct FailingEndpoint<D> {
    failing: AtomicBool,
    rejected: AtomicUsize,
    recorder: RecordingEndpoint<D>,
}

impl<D: Clone> FailingEndpoint<D> {
    pub fn new(failing: bool) -> Self {
        FailingEndpoint {
            failing: AtomicBool::new(failing),
            rejected: AtomicUsize::new(0),
            recorder: RecordingEndpoint::new(),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls refused so far.
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn recorder(&self) -> &RecordingEndpoint<D> {
        &self.recorder
    }

    fn check(&self) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(DeliveryError::new("endpoint unavailable"));
        }
        Ok(())
    }
}

impl<D: Clone + Send + Sync> RemoteEndpoint<D> for FailingEndpoint<D> {
    fn push_sri(&self, sri: &StreamSri) -> Result<(), DeliveryError> {
        self.check()?;
        self.recorder.push_sri(sri)
    }

    fn push_packet(&self, data: D, time: PrecisionTime, eos: bool, stream_id: &str) -> Result<(), DeliveryError> {
        self.check()?;
        self.recorder.push_packet(data, time, eos, stream_id)
    }
}
