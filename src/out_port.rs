//! Sending side: fans packets out to every connected endpoint, filtered per stream.
//!
//! Endpoint calls are made without holding the connection table lock, so a slow or blocked
//! endpoint never stalls `connections`, `statistics` or `state` queries. Pushes themselves
//! are serialized by `push_lock` to keep per stream order on every connection.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};
#[allow(unused_imports)]
use log::*;
use parking_lot::Mutex;

use crate::chunking::{chunk, Chunk};
use crate::endpoint::RemoteEndpoint;
use crate::error::{DeliveryError, PortError, Result};
use crate::in_port::PortUsage;
use crate::port_builder::PortBuilder;
use crate::port_config;
use crate::sri::{SriCompare, StreamSri};
use crate::statistics::{ConnectionStatistics, ConnectionStatsSet};
use crate::stream_data::StreamData;
use crate::timestamp::PrecisionTime;

/// Routes `stream_id` of port `port_name` to `connection_id`. Once any entry names a
/// stream, that stream goes only to the connections listed for it. An empty `port_name`
/// applies to every port.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionFilterEntry {
    pub port_name: String,
    pub connection_id: String,
    pub stream_id: String,
}

impl ConnectionFilterEntry {
    pub fn new(port_name: &str, connection_id: &str, stream_id: &str) -> Self {
        ConnectionFilterEntry {
            port_name: port_name.to_string(),
            connection_id: connection_id.to_string(),
            stream_id: stream_id.to_string(),
        }
    }

    /// Entry without a port name.
    pub fn any_port(connection_id: &str, stream_id: &str) -> Self {
        ConnectionFilterEntry::new("", connection_id, stream_id)
    }

    fn applies_to(&self, port_name: &str) -> bool {
        self.port_name.is_empty() || self.port_name == port_name
    }
}

struct Connection<D> {
    id: String,
    endpoint: Arc<dyn RemoteEndpoint<D>>,
    // last SRI delivered to this connection, per stream
    sri_sent: AHashMap<String, StreamSri>,
    active_streams: AHashSet<String>,
}

struct Target<D> {
    connection_id: String,
    endpoint: Arc<dyn RemoteEndpoint<D>>,
    needs_sri: bool,
}

struct OutState<D> {
    connections: Vec<Connection<D>>,
    filter: Vec<ConnectionFilterEntry>,
    current_sris: AHashMap<String, StreamSri>,
}

impl<D> OutState<D> {
    fn routes(&self, port_name: &str, stream_id: &str, connection_id: &str) -> bool {
        let mut listed = self.filter.iter()
            .filter(|e| e.applies_to(port_name) && e.stream_id == stream_id)
            .peekable();
        if listed.peek().is_none() {
            return true;
        }
        listed.any(|e| e.connection_id == connection_id)
    }

    fn targets(&self, port_name: &str, sri: &StreamSri, compare: SriCompare) -> Vec<Target<D>> {
        self.connections.iter()
            .filter(|c| self.routes(port_name, &sri.stream_id, &c.id))
            .map(|c| Target {
                connection_id: c.id.clone(),
                endpoint: c.endpoint.clone(),
                needs_sri: !c.sri_sent.get(&sri.stream_id).is_some_and(|sent| compare(sent, sri)),
            })
            .collect()
    }

    fn connection_mut(&mut self, connection_id: &str) -> Option<&mut Connection<D>> {
        self.connections.iter_mut().find(|c| c.id == connection_id)
    }
}

/// Send port. Each pushed SRI and packet goes to every connection the filter routes its
/// stream to, with the SRI resent to any connection that has not seen the current one.
pub struct OutPort<D> {
    name: String,
    max_transfer_bits: usize,
    compare: SriCompare,
    push_lock: Mutex<()>,
    state: Mutex<OutState<D>>,
    stats: Mutex<ConnectionStatsSet>,
}

impl<D> Debug for OutPort<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OutPort")
            .field("name", &self.name)
            .field("connections", &state.connections.iter().map(|c| c.id.as_str()).collect::<Vec<_>>())
            .field("filter", &state.filter)
            .finish()
    }
}

impl<D: StreamData> OutPort<D> {
    /// Port with the default settings and no connections.
    pub fn new(name: &str) -> Self {
        OutPort::with_builder(name, &PortBuilder::new())
    }

    pub(crate) fn with_builder(name: &str, builder: &PortBuilder) -> Self {
        let mut stats = ConnectionStatsSet::new(D::BITS_PER_ELEMENT, builder.history_window);
        stats.set_enabled(builder.statistics_enabled);
        OutPort {
            name: name.to_string(),
            max_transfer_bits: builder.max_transfer_bits(),
            compare: builder.sri_compare,
            push_lock: Mutex::new(()),
            state: Mutex::new(OutState {
                connections: Vec::new(),
                filter: Vec::new(),
                current_sris: AHashMap::new(),
            }),
            stats: Mutex::new(stats),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload bits allowed in one transfer, the chunking limit.
    pub fn max_transfer_bits(&self) -> usize {
        self.max_transfer_bits
    }

    /// Adds `endpoint` under `connection_id`, which must not be in use on this port.
    pub fn connect(&self, endpoint: Arc<dyn RemoteEndpoint<D>>, connection_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.connections.iter().any(|c| c.id == connection_id) {
            return Err(PortError::DuplicateConnection(connection_id.to_string()));
        }
        state.connections.push(Connection {
            id: connection_id.to_string(),
            endpoint,
            sri_sent: AHashMap::new(),
            active_streams: AHashSet::new(),
        });
        self.stats.lock().add(connection_id);
        info!("port {:?} connected {:?}", self.name, connection_id);
        Ok(())
    }

    /// Removes the connection, then sends an empty EOS packet for each stream it had active.
    /// The connection is gone even when a push to it is stuck; in that case the EOS packets
    /// are skipped. Failures of those final pushes are ignored.
    pub fn disconnect(&self, connection_id: &str) -> Result<()> {
        let removed = {
            let mut state = self.state.lock();
            let index = state.connections.iter().position(|c| c.id == connection_id)
                .ok_or_else(|| PortError::UnknownConnection(connection_id.to_string()))?;
            state.connections.remove(index)
        };
        self.stats.lock().remove(connection_id);

        match self.push_lock.try_lock_for(Duration::from_millis(port_config::DISCONNECT_EOS_WAIT_MS)) {
            Some(_push) => {
                let mut streams: Vec<&String> = removed.active_streams.iter().collect();
                streams.sort();
                for stream_id in streams {
                    if let Err(e) = removed.endpoint.push_packet(D::empty(), PrecisionTime::not_set(), true, stream_id) {
                        debug!("port {:?} closing stream {:?} on {:?}: {}", self.name, stream_id, connection_id, e);
                    }
                }
            }
            None => debug!("port {:?} push in flight, skipping EOS for {} streams on {:?}",
                           self.name, removed.active_streams.len(), connection_id),
        }
        info!("port {:?} disconnected {:?}", self.name, connection_id);
        Ok(())
    }

    /// Connection ids in connect order.
    pub fn connections(&self) -> Vec<String> {
        self.state.lock().connections.iter().map(|c| c.id.clone()).collect()
    }

    /// `Active` while any connection exists.
    pub fn state(&self) -> PortUsage {
        if self.state.lock().connections.is_empty() { PortUsage::Idle } else { PortUsage::Active }
    }

    /// Replaces the whole routing table. An empty table broadcasts every stream.
    pub fn update_connection_filter(&self, entries: Vec<ConnectionFilterEntry>) {
        let ignored = entries.iter().filter(|e| !e.applies_to(&self.name)).count();
        if ignored > 0 {
            debug!("port {:?} ignoring {} filter entries for other ports", self.name, ignored);
        }
        self.state.lock().filter = entries;
    }

    pub fn connection_filter(&self) -> Vec<ConnectionFilterEntry> {
        self.state.lock().filter.clone()
    }

    /// SRI most recently pushed for each open stream, sorted by stream id.
    pub fn active_sris(&self) -> Vec<StreamSri> {
        let mut sris: Vec<StreamSri> = self.state.lock().current_sris.values().cloned().collect();
        sris.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        sris
    }

    /// Forwards `sri` to every routed connection that has not already received an equal SRI
    /// for the stream.
    pub fn push_sri(&self, sri: &StreamSri) {
        let _push = self.push_lock.lock();
        let targets = {
            let mut state = self.state.lock();
            state.current_sris.insert(sri.stream_id.clone(), sri.clone());
            state.targets(&self.name, sri, self.compare)
        };
        for target in targets.iter().filter(|t| t.needs_sri) {
            if self.deliver_sri(target, sri) {
                self.mark_sri_sent(&target.connection_id, sri);
            }
        }
    }

    /// Sends `data` to every routed connection, chunked to the transfer limit. A failing
    /// connection is counted and skipped; the others still receive the packet.
    pub fn push_packet(&self, data: D, time: PrecisionTime, eos: bool, stream_id: &str) {
        let _push = self.push_lock.lock();
        let (sri, targets) = {
            let mut state = self.state.lock();
            let sri = match state.current_sris.get(stream_id) {
                Some(sri) => sri.clone(),
                None => {
                    debug!("port {:?} pushing stream {:?} without SRI, using default", self.name, stream_id);
                    let sri = StreamSri::new(stream_id);
                    state.current_sris.insert(stream_id.to_string(), sri.clone());
                    sri
                }
            };
            let targets = state.targets(&self.name, &sri, self.compare);
            (sri, targets)
        };

        if !targets.is_empty() {
            let chunks = chunk(data, time, eos, &sri, self.max_transfer_bits);
            #[cfg(feature = "trace_packets")]
            trace!("port {:?} stream {:?} to {} connections in {} transfers", self.name, stream_id, targets.len(), chunks.len());
            for target in &targets {
                if target.needs_sri {
                    if !self.deliver_sri(target, &sri) {
                        continue;
                    }
                    self.mark_sri_sent(&target.connection_id, &sri);
                }
                self.deliver_chunks(target, &chunks, stream_id);
            }
        }

        let mut state = self.state.lock();
        if eos {
            state.current_sris.remove(stream_id);
        }
        for target in &targets {
            if let Some(connection) = state.connection_mut(&target.connection_id) {
                if eos {
                    connection.active_streams.remove(stream_id);
                    connection.sri_sent.remove(stream_id);
                } else {
                    connection.active_streams.insert(stream_id.to_string());
                }
            }
        }
    }

    fn deliver_sri(&self, target: &Target<D>, sri: &StreamSri) -> bool {
        match target.endpoint.push_sri(sri) {
            Ok(()) => true,
            Err(e) => {
                self.delivery_failed(&target.connection_id, &sri.stream_id, &e);
                false
            }
        }
    }

    fn deliver_chunks(&self, target: &Target<D>, chunks: &[Chunk<D>], stream_id: &str) {
        for piece in chunks {
            let elements = piece.data.len();
            if let Err(e) = target.endpoint.push_packet(piece.data.clone(), piece.time, piece.eos, stream_id) {
                self.delivery_failed(&target.connection_id, stream_id, &e);
                return;
            }
            let mut stats = self.stats.lock();
            stats.update(&target.connection_id, elements, 0, Instant::now(), piece.eos, stream_id);
            stats.record_success(&target.connection_id);
        }
    }

    fn mark_sri_sent(&self, connection_id: &str, sri: &StreamSri) {
        if let Some(connection) = self.state.lock().connection_mut(connection_id) {
            connection.sri_sent.insert(sri.stream_id.clone(), sri.clone());
        }
    }

    fn delivery_failed(&self, connection_id: &str, stream_id: &str, e: &DeliveryError) {
        let mut stats = self.stats.lock();
        if stats.record_error(connection_id, Instant::now()) {
            error!("port {:?} connection {:?} stream {:?}: {} ({} consecutive failures)",
                   self.name, connection_id, stream_id, e, stats.error_count(connection_id).unwrap_or(0));
        }
    }

    /// Consecutive failed pushes on `connection_id`, reset by the next success.
    pub fn error_count(&self, connection_id: &str) -> Option<u64> {
        self.stats.lock().error_count(connection_id)
    }

    pub fn set_statistics_enabled(&self, enabled: bool) {
        self.stats.lock().set_enabled(enabled);
    }

    /// One snapshot per connection in connect order, including idle connections.
    pub fn statistics(&self) -> Option<Vec<ConnectionStatistics>> {
        self.stats.lock().retrieve()
    }
}
