//! Per port settings and construction of receive and send ports.

use crate::error::{PortError, Result};
use crate::in_port::InPort;
use crate::out_port::OutPort;
use crate::port_config;
use crate::sri::{sri_equal, SriCompare};
use crate::stream_data::StreamData;

/// Settings shared by the ports it builds. Each `with_` call returns a modified copy so one
/// base builder can produce several differently tuned ports.
#[derive(Clone, Debug)]
pub struct PortBuilder {
    pub(crate) max_queue_depth: usize,
    pub(crate) history_window: usize,
    pub(crate) max_transfer_bytes: usize,
    pub(crate) statistics_enabled: bool,
    pub(crate) sri_compare: SriCompare,
}

impl Default for PortBuilder {
    fn default() -> Self {
        PortBuilder::new()
    }
}

impl PortBuilder {
    /// Builder holding the compile time defaults.
    pub fn new() -> Self {
        PortBuilder {
            max_queue_depth: port_config::DEFAULT_MAX_QUEUE_DEPTH,
            history_window: port_config::DEFAULT_HISTORY_WINDOW,
            max_transfer_bytes: port_config::DEFAULT_MAX_TRANSFER_BYTES,
            statistics_enabled: true,
            sri_compare: sri_equal,
        }
    }

    /// Builder whose queue depth and transfer limit honor the environment overrides.
    pub fn from_env() -> Self {
        PortBuilder {
            max_queue_depth: port_config::max_queue_depth(),
            max_transfer_bytes: port_config::max_transfer_bytes(),
            ..PortBuilder::new()
        }
    }

    /// Queue capacity of receive ports. Zero is rejected when the port is built.
    pub fn with_max_queue_depth(&self, depth: usize) -> Self {
        let mut result = self.clone();
        result.max_queue_depth = depth;
        result
    }

    /// Number of push samples each statistics window keeps.
    pub fn with_history_window(&self, window: usize) -> Self {
        let mut result = self.clone();
        result.history_window = window.max(1);
        result
    }

    /// Largest single transfer a send port makes, protocol overhead included.
    pub fn with_max_transfer_bytes(&self, bytes: usize) -> Self {
        let mut result = self.clone();
        result.max_transfer_bytes = bytes;
        result
    }

    pub fn with_statistics(&self, enabled: bool) -> Self {
        let mut result = self.clone();
        result.statistics_enabled = enabled;
        result
    }

    /// Comparator deciding whether a pushed SRI is a change.
    pub fn with_sri_compare(&self, compare: SriCompare) -> Self {
        let mut result = self.clone();
        result.sri_compare = compare;
        result
    }

    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Payload bits left in one transfer once the overhead is taken out.
    pub fn max_transfer_bits(&self) -> usize {
        port_config::payload_bits(self.max_transfer_bytes)
    }

    pub fn build_in_port<D: StreamData>(&self, name: &str) -> Result<InPort<D>> {
        if self.max_queue_depth == 0 {
            return Err(PortError::InvalidQueueDepth(self.max_queue_depth));
        }
        Ok(InPort::with_builder(name, self))
    }

    pub fn build_out_port<D: StreamData>(&self, name: &str) -> OutPort<D> {
        OutPort::with_builder(name, self)
    }
}
