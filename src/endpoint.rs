//! The one capability the ports need from the transport underneath them.

use std::sync::Arc;

use crate::error::DeliveryError;
use crate::sri::StreamSri;
use crate::timestamp::PrecisionTime;

/// Destination a send port pushes to. Implemented by the transport binding for remote
/// peers, and by [`crate::InPort`] itself for in-process connections.
pub trait RemoteEndpoint<D>: Send + Sync {
    fn push_sri(&self, sri: &StreamSri) -> Result<(), DeliveryError>;

    fn push_packet(&self, data: D, time: PrecisionTime, eos: bool, stream_id: &str) -> Result<(), DeliveryError>;
}

impl<D, E: RemoteEndpoint<D> + ?Sized> RemoteEndpoint<D> for Arc<E> {
    fn push_sri(&self, sri: &StreamSri) -> Result<(), DeliveryError> {
        (**self).push_sri(sri)
    }

    fn push_packet(&self, data: D, time: PrecisionTime, eos: bool, stream_id: &str) -> Result<(), DeliveryError> {
        (**self).push_packet(data, time, eos, stream_id)
    }
}
