//! Streaming data ports: bounded receive queues, fan-out send ports, stream metadata (SRI)
//! tracking, chunked delivery and live throughput statistics.

pub mod bit_buffer;
pub mod endpoint;
pub mod error;
pub mod in_port;
pub mod logging_util;
pub mod out_port;
pub mod packet;
pub mod port_builder;
pub mod port_config;
pub mod port_testing;
pub mod sri;
pub mod sri_tracker;
pub mod statistics;
pub mod stream_data;
pub mod timestamp;

pub(crate) mod chunking;

#[cfg(test)]
mod out_port_tests;

pub use bit_buffer::BitBuffer;
pub use bytes::Bytes;
pub use endpoint::RemoteEndpoint;
pub use error::{BitBufferError, DeliveryError, PortError, Result};
pub use in_port::{InPort, NewStreamListener, PortUsage};
pub use logging_util::LogLevel;
pub use out_port::{ConnectionFilterEntry, OutPort};
pub use packet::{Packet, Wait};
pub use port_builder::PortBuilder;
pub use sri::{sri_equal, Keyword, KeywordValue, SampleMode, SriCompare, StreamSri};
pub use sri_tracker::SriTracker;
pub use statistics::{ConnectionStatistics, ConnectionStatsSet, PortStatistics, StatisticsWindow};
pub use stream_data::{Sample, StreamData};
pub use timestamp::{PrecisionTime, TimeCodeMode};

pub type InCharPort = InPort<Vec<i8>>;
pub type InOctetPort = InPort<Bytes>;
pub type InShortPort = InPort<Vec<i16>>;
pub type InUShortPort = InPort<Vec<u16>>;
pub type InLongPort = InPort<Vec<i32>>;
pub type InULongPort = InPort<Vec<u32>>;
pub type InLongLongPort = InPort<Vec<i64>>;
pub type InULongLongPort = InPort<Vec<u64>>;
pub type InFloatPort = InPort<Vec<f32>>;
pub type InDoublePort = InPort<Vec<f64>>;
pub type InBitPort = InPort<BitBuffer>;

pub type OutCharPort = OutPort<Vec<i8>>;
pub type OutOctetPort = OutPort<Bytes>;
pub type OutShortPort = OutPort<Vec<i16>>;
pub type OutUShortPort = OutPort<Vec<u16>>;
pub type OutLongPort = OutPort<Vec<i32>>;
pub type OutULongPort = OutPort<Vec<u32>>;
pub type OutLongLongPort = OutPort<Vec<i64>>;
pub type OutULongLongPort = OutPort<Vec<u64>>;
pub type OutFloatPort = OutPort<Vec<f32>>;
pub type OutDoublePort = OutPort<Vec<f64>>;
pub type OutBitPort = OutPort<BitBuffer>;
