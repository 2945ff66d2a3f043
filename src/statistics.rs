//! Rolling throughput statistics for ports.
//!
//! A [`StatisticsWindow`] keeps the last `history_window` push samples in a ring. Rates are
//! computed over the time spanned by the window, so the oldest sample marks the start of
//! the interval and its own elements are not counted.

use std::time::Instant;
use ahash::AHashMap;
#[allow(unused_imports)]
use log::*;

use crate::port_config::{MAX_DELIVERY_ERROR_LOG_SECONDS, ZERO_ELAPSED_SENTINEL_SECS};

#[derive(Clone, Copy, Debug, Default)]
struct StatPoint {
    elements: usize,
    queue_depth: usize,
    time: Option<Instant>,
}

/// Snapshot returned by `retrieve`.
#[derive(Clone, Debug, PartialEq)]
pub struct PortStatistics {
    pub port_name: String,
    pub elements_per_second: f64,
    pub bits_per_second: f64,
    pub calls_per_second: f64,
    pub average_queue_depth: f64,
    pub stream_ids: Vec<String>,
    /// Seconds since the most recent update, zero when nothing was recorded yet.
    pub time_since_last_call: f64,
    pub time_since_last_flush: Option<f64>,
}

impl PortStatistics {
    fn zeroed(port_name: &str, stream_ids: Vec<String>) -> Self {
        PortStatistics {
            port_name: port_name.to_string(),
            elements_per_second: 0.0,
            bits_per_second: 0.0,
            calls_per_second: 0.0,
            average_queue_depth: 0.0,
            stream_ids,
            time_since_last_call: 0.0,
            time_since_last_flush: None,
        }
    }
}

/// Ring of the last `history_window` pushes, from which rates, average queue depth and
/// idle times are derived on demand.
#[derive(Debug)]
pub struct StatisticsWindow {
    name: String,
    enabled: bool,
    bits_per_element: usize,
    samples: Vec<StatPoint>,
    cursor: usize, // next slot to write, the oldest once the window is full
    recorded: usize,
    stream_ids: Vec<String>,
    last_flush: Option<Instant>,
}

impl StatisticsWindow {
    /// Enabled window named `name`. A zero `history_window` is raised to one.
    pub fn new(name: &str, bits_per_element: usize, history_window: usize) -> Self {
        StatisticsWindow {
            name: name.to_string(),
            enabled: true,
            bits_per_element,
            samples: vec![StatPoint::default(); history_window.max(1)],
            cursor: 0,
            recorded: 0,
            stream_ids: Vec::new(),
            last_flush: None,
        }
    }

    /// Recorded samples are kept while disabled and count again once re-enabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn history_window(&self) -> usize {
        self.samples.len()
    }

    /// Records one push. No-op while disabled.
    pub fn update(&mut self, elements: usize, queue_depth: usize, now: Instant, eos: bool, stream_id: &str, flushed: bool) {
        if !self.enabled {
            return;
        }
        self.samples[self.cursor] = StatPoint { elements, queue_depth, time: Some(now) };
        self.cursor = (self.cursor + 1) % self.samples.len();
        self.recorded = self.recorded.saturating_add(1);
        if flushed {
            self.last_flush = Some(now);
        }
        if eos {
            self.stream_ids.retain(|s| s != stream_id);
        } else if !self.stream_ids.iter().any(|s| s == stream_id) {
            self.stream_ids.push(stream_id.to_string());
        }
    }

    /// Streams seen since their last EOS, in first-seen order.
    pub fn stream_ids(&self) -> &[String] {
        &self.stream_ids
    }

    /// Snapshot as of now.
    pub fn retrieve(&self) -> Option<PortStatistics> {
        self.retrieve_at(Instant::now())
    }

    /// Snapshot as seen at `now`, `None` while disabled.
    pub fn retrieve_at(&self, now: Instant) -> Option<PortStatistics> {
        if !self.enabled {
            return None;
        }
        let window = self.samples.len();
        let mut stats = PortStatistics::zeroed(&self.name, self.stream_ids.clone());
        if self.recorded == 0 {
            return Some(stats);
        }

        let filled = self.recorded.min(window);
        let oldest = if filled == window { self.cursor } else { 0 };
        let (mut total_elements, mut total_depth) = (0usize, 0usize);
        for (i, point) in self.samples.iter().enumerate().filter(|(_, p)| p.time.is_some()) {
            total_depth += point.queue_depth;
            if i != oldest {
                total_elements += point.elements;
            }
        }

        let start = self.samples[oldest].time.unwrap_or(now);
        let mut elapsed = now.saturating_duration_since(start).as_secs_f64();
        if elapsed == 0.0 {
            elapsed = ZERO_ELAPSED_SENTINEL_SECS;
        }
        stats.elements_per_second = total_elements as f64 / elapsed;
        stats.bits_per_second = stats.elements_per_second * self.bits_per_element as f64;
        stats.average_queue_depth = total_depth as f64 / window as f64;
        stats.calls_per_second = (filled - 1) as f64 / elapsed;

        let newest = (self.cursor + window - 1) % window;
        if let Some(last) = self.samples[newest].time {
            stats.time_since_last_call = now.saturating_duration_since(last).as_secs_f64();
        }
        stats.time_since_last_flush = self.last_flush.map(|t| now.saturating_duration_since(t).as_secs_f64());
        Some(stats)
    }
}

/// Statistics of one connection of a send port.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionStatistics {
    pub connection_id: String,
    pub statistics: PortStatistics,
}

#[derive(Debug, Default)]
struct ErrorCounter {
    count: u64,
    last_report: Option<Instant>,
}

/// One statistics window and one error counter per connection of a send port.
#[derive(Debug)]
pub struct ConnectionStatsSet {
    bits_per_element: usize,
    history_window: usize,
    enabled: bool,
    order: Vec<String>,
    windows: AHashMap<String, StatisticsWindow>,
    errors: AHashMap<String, ErrorCounter>,
}

impl ConnectionStatsSet {
    /// Empty set; every window added later gets `history_window` slots.
    pub fn new(bits_per_element: usize, history_window: usize) -> Self {
        ConnectionStatsSet {
            bits_per_element,
            history_window,
            enabled: true,
            order: Vec::new(),
            windows: AHashMap::new(),
            errors: AHashMap::new(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.windows.values_mut().for_each(|w| w.set_enabled(enabled));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Starts tracking `connection_id`. Adding a known id is a no-op.
    pub fn add(&mut self, connection_id: &str) {
        if self.windows.contains_key(connection_id) {
            return;
        }
        let mut window = StatisticsWindow::new(connection_id, self.bits_per_element, self.history_window);
        window.set_enabled(self.enabled);
        self.windows.insert(connection_id.to_string(), window);
        self.errors.insert(connection_id.to_string(), ErrorCounter::default());
        self.order.push(connection_id.to_string());
    }

    /// Drops the window and error counter of `connection_id`.
    pub fn remove(&mut self, connection_id: &str) {
        self.windows.remove(connection_id);
        self.errors.remove(connection_id);
        self.order.retain(|c| c != connection_id);
    }

    /// Records one transfer to `connection_id`, ignored for unknown ids.
    pub fn update(&mut self, connection_id: &str, elements: usize, queue_depth: usize, now: Instant, eos: bool, stream_id: &str) {
        if let Some(window) = self.windows.get_mut(connection_id) {
            window.update(elements, queue_depth, now, eos, stream_id, false);
        }
    }

    /// Successful push, clears the error count.
    pub fn record_success(&mut self, connection_id: &str) {
        if let Some(counter) = self.errors.get_mut(connection_id) {
            counter.count = 0;
            counter.last_report = None;
        }
    }

    /// Failed push. Returns true when the failure should be logged: the first failure of a
    /// run, then at most once per `MAX_DELIVERY_ERROR_LOG_SECONDS`.
    pub fn record_error(&mut self, connection_id: &str, now: Instant) -> bool {
        match self.errors.get_mut(connection_id) {
            Some(counter) => {
                counter.count += 1;
                let report = counter.last_report
                    .is_none_or(|t| now.saturating_duration_since(t).as_secs() >= MAX_DELIVERY_ERROR_LOG_SECONDS);
                if report {
                    counter.last_report = Some(now);
                }
                report
            }
            None => false,
        }
    }

    /// Consecutive failures, `None` for unknown ids.
    pub fn error_count(&self, connection_id: &str) -> Option<u64> {
        self.errors.get(connection_id).map(|c| c.count)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.windows.contains_key(connection_id)
    }

    /// One snapshot per connection in connect order, `None` while disabled.
    pub fn retrieve_at(&self, now: Instant) -> Option<Vec<ConnectionStatistics>> {
        if !self.enabled {
            return None;
        }
        Some(self.order.iter()
            .filter_map(|id| {
                let statistics = self.windows.get(id)?.retrieve_at(now)?;
                Some(ConnectionStatistics { connection_id: id.clone(), statistics })
            })
            .collect())
    }

    pub fn retrieve(&self) -> Option<Vec<ConnectionStatistics>> {
        self.retrieve_at(Instant::now())
    }
}
