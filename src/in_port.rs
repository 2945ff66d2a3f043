//! Receiving side of a connection: a bounded packet queue with SRI change detection and
//! throughput statistics.
//!
//! Lock order is queue, then SRI tracker, then statistics. Consumers and blocking producers
//! wait on condition variables which release the queue lock, and the queue depth is
//! mirrored in an atomic so depth queries never take a lock at all.

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

#[allow(unused_imports)]
use log::*;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::endpoint::RemoteEndpoint;
use crate::error::{DeliveryError, PortError, Result};
use crate::packet::{Packet, Wait};
use crate::port_builder::PortBuilder;
use crate::sri::StreamSri;
use crate::sri_tracker::SriTracker;
use crate::statistics::{PortStatistics, StatisticsWindow};
use crate::stream_data::StreamData;
use crate::timestamp::PrecisionTime;

/// Observable usage of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortUsage {
    /// No active streams and nothing queued, or for a send port no connections.
    Idle,
    Active,
    /// The queue is at capacity.
    Busy,
}

/// Called with the first SRI of every new stream.
pub type NewStreamListener = Box<dyn Fn(&StreamSri) + Send + Sync>;

/// Bounded queue of packets pushed by producers and drained by `get_packet`. Safe to share
/// between threads behind an `Arc`; it also serves as the endpoint of an in process send port.
pub struct InPort<D> {
    name: String,
    queue: Mutex<VecDeque<Packet<D>>>,
    data_available: Condvar,
    space_available: Condvar,
    depth: AtomicUsize,
    max_depth: AtomicUsize,
    running: AtomicBool,
    tracker: Mutex<SriTracker>,
    stats: Mutex<StatisticsWindow>,
    new_stream_listener: Mutex<Option<NewStreamListener>>,
}

impl<D> Debug for InPort<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InPort")
            .field("name", &self.name)
            .field("depth", &self.depth.load(Ordering::Relaxed))
            .field("max_depth", &self.max_depth.load(Ordering::Relaxed))
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl<D: StreamData> InPort<D> {
    /// Port with the default settings, started.
    pub fn new(name: &str) -> Self {
        InPort::with_builder(name, &PortBuilder::new())
    }

    pub(crate) fn with_builder(name: &str, builder: &PortBuilder) -> Self {
        let mut stats = StatisticsWindow::new(name, D::BITS_PER_ELEMENT, builder.history_window);
        stats.set_enabled(builder.statistics_enabled);
        InPort {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
            data_available: Condvar::new(),
            space_available: Condvar::new(),
            depth: AtomicUsize::new(0),
            max_depth: AtomicUsize::new(builder.max_queue_depth.max(1)),
            running: AtomicBool::new(true),
            tracker: Mutex::new(SriTracker::new(builder.sri_compare)),
            stats: Mutex::new(stats),
            new_stream_listener: Mutex::new(None),
        }
    }

    /// Name given at construction, used in every log line.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allows blocking reads again after `stop`.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("port {:?} started", self.name);
        }
    }

    /// Releases every thread blocked in `get_packet` or in a blocking push. Until `start`
    /// is called again `get_packet` returns `None` at once.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("port {:?} stopped", self.name);
        }
        // taking the lock orders this wake after any waiter that already checked the flag
        let _queue = self.queue.lock();
        self.data_available.notify_all();
        self.space_available.notify_all();
    }

    /// False between `stop` and the next `start`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Replaces the callback run when the first SRI of a stream arrives. It runs on the
    /// pushing thread, so it should return quickly.
    pub fn set_new_stream_listener(&self, listener: impl Fn(&StreamSri) + Send + Sync + 'static) {
        *self.new_stream_listener.lock() = Some(Box::new(listener));
    }

    pub fn clear_new_stream_listener(&self) {
        *self.new_stream_listener.lock() = None;
    }

    /// Records `sri` for its stream. Nothing is queued; the change is reported on the next
    /// packet of the stream.
    pub fn push_sri(&self, sri: &StreamSri) {
        let (is_new, changed) = {
            let mut tracker = self.tracker.lock();
            let is_new = tracker.get(&sri.stream_id).is_none();
            (is_new, tracker.on_push(sri))
        };
        if changed {
            debug!("port {:?} SRI for stream {:?} changed", self.name, sri.stream_id);
        }
        if is_new {
            if let Some(listener) = self.new_stream_listener.lock().as_ref() {
                listener(sri);
            }
        }
    }

    /// Enqueues one packet. When the queue is full the oldest packet is evicted and the
    /// admitted packet is marked `queue_flushed`, unless the stream's SRI asks producers to
    /// block, in which case this waits for space or for the port to stop.
    pub fn push_packet(&self, data: D, time: PrecisionTime, eos: bool, stream_id: &str) {
        let elements = data.len();
        let mut queue = self.queue.lock();
        if self.tracker.lock().is_blocking(stream_id) {
            self.wait_for_space(&mut queue);
        }

        let (sri, sri_changed) = {
            let mut tracker = self.tracker.lock();
            let found = tracker.on_data(stream_id);
            if eos {
                tracker.on_eos(stream_id);
            }
            found
        };

        let max = self.max_depth.load(Ordering::SeqCst);
        let mut queue_flushed = false;
        while queue.len() >= max {
            queue.pop_front();
            queue_flushed = true;
        }
        if queue_flushed {
            debug!("port {:?} queue full at {} packets, evicted oldest to admit stream {:?}", self.name, max, stream_id);
        }

        queue.push_back(Packet {
            data,
            time,
            eos,
            stream_id: stream_id.to_string(),
            sri,
            sri_changed,
            queue_flushed,
        });
        let depth = queue.len();
        self.depth.store(depth, Ordering::SeqCst);
        self.stats.lock().update(elements, depth, Instant::now(), eos, stream_id, queue_flushed);
        #[cfg(feature = "trace_packets")]
        trace!("port {:?} queued {} elements on stream {:?}, depth {}", self.name, elements, stream_id, depth);
        self.data_available.notify_all();
    }

    fn wait_for_space(&self, queue: &mut MutexGuard<'_, VecDeque<Packet<D>>>) {
        while self.running.load(Ordering::SeqCst) && queue.len() >= self.max_depth.load(Ordering::SeqCst) {
            self.space_available.wait(queue);
        }
    }

    /// Oldest queued packet, or `None` when the wait ran out or the port is stopped.
    pub fn get_packet(&self, wait: impl Into<Wait>) -> Option<Packet<D>> {
        self.take_first(wait.into(), |_| true)
    }

    /// Oldest queued packet of `stream_id`; packets of other streams stay queued.
    pub fn get_packet_for_stream(&self, wait: impl Into<Wait>, stream_id: &str) -> Option<Packet<D>> {
        self.take_first(wait.into(), |p| p.stream_id == stream_id)
    }

    fn take_first(&self, wait: Wait, matches: impl Fn(&Packet<D>) -> bool) -> Option<Packet<D>> {
        let deadline = match wait {
            // no deadline when it lies beyond what `Instant` can hold
            Wait::For(timeout) => Instant::now().checked_add(timeout),
            _ => None,
        };
        let mut queue = self.queue.lock();
        let mut timed_out = false;
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(index) = queue.iter().position(&matches) {
                let packet = queue.remove(index);
                self.depth.store(queue.len(), Ordering::SeqCst);
                self.space_available.notify_one();
                return packet;
            }
            if timed_out || wait == Wait::NonBlocking {
                return None;
            }
            match deadline {
                Some(deadline) => timed_out = self.data_available.wait_until(&mut queue, deadline).timed_out(),
                None => self.data_available.wait(&mut queue),
            }
        }
    }

    /// Lock free, never waits behind producers or consumers.
    pub fn current_queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Capacity in packets.
    pub fn max_queue_depth(&self) -> usize {
        self.max_depth.load(Ordering::SeqCst)
    }

    /// Changes the capacity. Packets already queued beyond a lowered limit stay queued until
    /// the next push evicts them.
    pub fn set_max_queue_depth(&self, depth: usize) -> Result<()> {
        if depth == 0 {
            return Err(PortError::InvalidQueueDepth(depth));
        }
        self.max_depth.store(depth, Ordering::SeqCst);
        let _queue = self.queue.lock();
        self.space_available.notify_all();
        Ok(())
    }

    /// `Busy` at capacity, `Idle` with an empty queue and no open streams, else `Active`.
    pub fn state(&self) -> PortUsage {
        let depth = self.current_queue_depth();
        if depth >= self.max_queue_depth() {
            PortUsage::Busy
        } else if depth == 0 && self.tracker.lock().is_empty() {
            PortUsage::Idle
        } else {
            PortUsage::Active
        }
    }

    /// SRI of every stream seen and not yet closed by EOS, sorted by stream id.
    pub fn active_sris(&self) -> Vec<StreamSri> {
        self.tracker.lock().active_sris()
    }

    /// Disabling stops collection and makes `statistics` return `None`.
    pub fn set_statistics_enabled(&self, enabled: bool) {
        self.stats.lock().set_enabled(enabled);
    }

    /// Throughput snapshot with the stream ids currently known to the SRI tracker.
    pub fn statistics(&self) -> Option<PortStatistics> {
        let stream_ids = self.tracker.lock().stream_ids();
        let mut stats = self.stats.lock().retrieve()?;
        stats.stream_ids = stream_ids;
        Some(stats)
    }
}

impl<D: StreamData> RemoteEndpoint<D> for InPort<D> {
    fn push_sri(&self, sri: &StreamSri) -> std::result::Result<(), DeliveryError> {
        InPort::push_sri(self, sri);
        Ok(())
    }

    fn push_packet(&self, data: D, time: PrecisionTime, eos: bool, stream_id: &str) -> std::result::Result<(), DeliveryError> {
        InPort::push_packet(self, data, time, eos, stream_id);
        Ok(())
    }
}

#[cfg(test)]
mod in_port_tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;
    use crate::port_config::{BLOCKING, NON_BLOCKING};
    use crate::sri::SampleMode;

    fn port(depth: usize) -> InPort<Vec<i16>> {
        PortBuilder::new().with_max_queue_depth(depth).build_in_port("in").expect("valid depth")
    }

    #[test]
    fn test_round_trip_in_push_order() {
        let port = port(10);
        let times: Vec<PrecisionTime> = (0..5).map(|i| PrecisionTime::from_secs(i as f64, 0.25)).collect();
        for (i, time) in times.iter().enumerate() {
            port.push_packet(vec![i as i16; i + 1], *time, i == 4, "s");
        }
        assert_eq!(port.current_queue_depth(), 5);
        for (i, time) in times.iter().enumerate() {
            let packet = port.get_packet(NON_BLOCKING).expect("queued");
            assert_eq!(packet.data, vec![i as i16; i + 1]);
            assert_eq!(packet.time, *time);
            assert_eq!(packet.eos, i == 4);
            assert_eq!(packet.stream_id, "s");
            assert!(!packet.queue_flushed);
        }
        assert!(port.get_packet(NON_BLOCKING).is_none());
        assert_eq!(port.current_queue_depth(), 0);
    }

    #[test]
    fn test_full_queue_evicts_oldest() {
        let port = port(3);
        for i in 0..5i16 {
            port.push_packet(vec![i], PrecisionTime::not_set(), false, "s");
            assert!(port.current_queue_depth() <= 3);
        }
        let packets: Vec<_> = std::iter::from_fn(|| port.get_packet(Wait::NonBlocking)).collect();
        assert_eq!(packets.iter().map(|p| p.data[0]).collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(packets.iter().map(|p| p.queue_flushed).collect::<Vec<_>>(), vec![false, true, true]);

        let stats = port.statistics().expect("enabled");
        assert!(stats.time_since_last_flush.is_some());
    }

    #[test]
    fn test_sri_changed_policy() {
        let port = port(20);
        let base = StreamSri::new("a").with_xdelta(0.5);
        port.push_sri(&base);
        port.push_packet(vec![1], PrecisionTime::not_set(), false, "a");
        port.push_packet(vec![2], PrecisionTime::not_set(), false, "a");
        // identical SRI is not a change
        port.push_sri(&base);
        port.push_packet(vec![3], PrecisionTime::not_set(), false, "a");
        port.push_sri(&base.clone().with_xdelta(0.25));
        port.push_packet(vec![4], PrecisionTime::not_set(), false, "a");
        port.push_packet(vec![5], PrecisionTime::not_set(), false, "a");
        // data on a stream that never had SRI
        port.push_packet(vec![6], PrecisionTime::not_set(), false, "b");
        port.push_packet(vec![7], PrecisionTime::not_set(), false, "b");

        let flags: Vec<bool> = std::iter::from_fn(|| port.get_packet(NON_BLOCKING)).map(|p| p.sri_changed).collect();
        assert_eq!(flags, vec![true, false, false, true, false, true, false]);
    }

    #[test]
    fn test_packet_carries_sri_in_force() {
        let port = port(10);
        let sri = StreamSri::new("c").with_mode(SampleMode::Complex).with_xdelta(1e-3);
        port.push_sri(&sri);
        port.push_packet(vec![1, 2], PrecisionTime::not_set(), false, "c");
        port.push_packet(vec![3, 4], PrecisionTime::not_set(), false, "d");

        let first = port.get_packet(NON_BLOCKING).expect("queued");
        assert_eq!(first.sri, sri);
        let second = port.get_packet(NON_BLOCKING).expect("queued");
        assert_eq!(second.sri, StreamSri::new("d"));
        assert_eq!(second.sri.xdelta, 1.0);
    }

    #[test]
    fn test_eos_forgets_stream() {
        let port = port(10);
        port.push_sri(&StreamSri::new("s"));
        port.push_packet(vec![1], PrecisionTime::not_set(), false, "s");
        port.push_packet(vec![2], PrecisionTime::not_set(), true, "s");
        assert!(port.active_sris().is_empty());
        port.push_packet(vec![3], PrecisionTime::not_set(), false, "s");

        let flags: Vec<bool> = std::iter::from_fn(|| port.get_packet(NON_BLOCKING)).map(|p| p.sri_changed).collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_state_transitions() {
        let port = port(2);
        assert_eq!(port.state(), PortUsage::Idle);
        port.push_sri(&StreamSri::new("s"));
        assert_eq!(port.state(), PortUsage::Active);
        port.push_packet(vec![1], PrecisionTime::not_set(), false, "s");
        port.push_packet(vec![2], PrecisionTime::not_set(), true, "s");
        assert_eq!(port.state(), PortUsage::Busy);
        port.get_packet(NON_BLOCKING);
        assert_eq!(port.state(), PortUsage::Active);
        port.get_packet(NON_BLOCKING);
        assert_eq!(port.state(), PortUsage::Idle);
    }

    #[test]
    fn test_lowering_depth_evicts_lazily() {
        let port = port(5);
        for i in 0..5i16 {
            port.push_packet(vec![i], PrecisionTime::not_set(), false, "s");
        }
        port.set_max_queue_depth(2).expect("valid depth");
        assert_eq!(port.max_queue_depth(), 2);
        assert_eq!(port.current_queue_depth(), 5);

        port.push_packet(vec![5], PrecisionTime::not_set(), false, "s");
        assert_eq!(port.current_queue_depth(), 2);
        let packets: Vec<_> = std::iter::from_fn(|| port.get_packet(NON_BLOCKING)).collect();
        assert_eq!(packets.iter().map(|p| p.data[0]).collect::<Vec<_>>(), vec![4, 5]);
        assert!(packets[1].queue_flushed);

        assert_eq!(port.set_max_queue_depth(0), Err(PortError::InvalidQueueDepth(0)));
        assert_eq!(port.max_queue_depth(), 2);
    }

    #[test]
    fn test_get_packet_for_stream() {
        let port = port(10);
        port.push_packet(vec![1], PrecisionTime::not_set(), false, "a");
        port.push_packet(vec![2], PrecisionTime::not_set(), false, "b");
        port.push_packet(vec![3], PrecisionTime::not_set(), false, "a");

        let b = port.get_packet_for_stream(NON_BLOCKING, "b").expect("queued");
        assert_eq!(b.data, vec![2]);
        assert!(port.get_packet_for_stream(NON_BLOCKING, "c").is_none());
        assert_eq!(port.current_queue_depth(), 2);
        assert_eq!(port.get_packet(NON_BLOCKING).map(|p| p.data), Some(vec![1]));
    }

    #[test]
    fn test_huge_timeouts_return_queued_packet() {
        let port = port(10);
        port.push_packet(vec![1], PrecisionTime::not_set(), false, "s");
        assert_eq!(port.get_packet(f64::INFINITY).map(|p| p.data), Some(vec![1]));
        port.push_packet(vec![2], PrecisionTime::not_set(), false, "s");
        assert_eq!(port.get_packet(Duration::MAX).map(|p| p.data), Some(vec![2]));
        port.push_packet(vec![3], PrecisionTime::not_set(), false, "s");
        assert_eq!(port.get_packet(1e19).map(|p| p.data), Some(vec![3]));
        port.push_packet(vec![4], PrecisionTime::not_set(), false, "s");
        assert_eq!(port.get_packet_for_stream(Duration::MAX, "s").map(|p| p.data), Some(vec![4]));
    }

    #[test]
    fn test_timed_wait_returns_none() {
        let port = port(10);
        let started = Instant::now();
        assert!(port.get_packet(0.05).is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_blocked_reader_and_depth_queries_do_not_deadlock() {
        let port = Arc::new(port(10));
        let reader = {
            let port = port.clone();
            thread::spawn(move || port.get_packet(BLOCKING))
        };
        let watcher = {
            let port = port.clone();
            thread::spawn(move || {
                let started = Instant::now();
                for _ in 0..1000 {
                    let _ = port.current_queue_depth();
                    let _ = port.max_queue_depth();
                }
                started.elapsed()
            })
        };
        let elapsed = watcher.join().expect("watcher");
        assert!(elapsed < Duration::from_secs(1));

        thread::sleep(Duration::from_millis(20));
        let producer = {
            let port = port.clone();
            thread::spawn(move || port.push_packet(vec![42], PrecisionTime::not_set(), false, "s"))
        };
        producer.join().expect("producer");
        let packet = reader.join().expect("reader").expect("woken by the push");
        assert_eq!(packet.data, vec![42]);
    }

    #[test]
    fn test_stop_releases_blocked_reader() {
        let port = Arc::new(port(10));
        let reader = {
            let port = port.clone();
            thread::spawn(move || port.get_packet(BLOCKING))
        };
        thread::sleep(Duration::from_millis(20));
        port.stop();
        assert!(reader.join().expect("reader").is_none());

        port.push_packet(vec![1], PrecisionTime::not_set(), false, "s");
        assert!(port.get_packet(BLOCKING).is_none());
        port.start();
        assert_eq!(port.get_packet(NON_BLOCKING).map(|p| p.data), Some(vec![1]));
    }

    #[test]
    fn test_blocking_sri_producer_waits_for_space() {
        let port = Arc::new(port(1));
        port.push_sri(&StreamSri::new("slow").with_blocking(true));
        port.push_packet(vec![1], PrecisionTime::not_set(), false, "slow");

        let producer = {
            let port = port.clone();
            thread::spawn(move || port.push_packet(vec![2], PrecisionTime::not_set(), false, "slow"))
        };
        thread::sleep(Duration::from_millis(30));
        // producer is parked, metadata queries still answer
        assert_eq!(port.current_queue_depth(), 1);
        assert_eq!(port.state(), PortUsage::Busy);
        assert!(port.statistics().is_some());

        let first = port.get_packet(NON_BLOCKING).expect("queued");
        assert_eq!(first.data, vec![1]);
        producer.join().expect("producer");
        let second = port.get_packet(NON_BLOCKING).expect("queued");
        assert_eq!(second.data, vec![2]);
        assert!(!second.queue_flushed);
    }

    #[test]
    fn test_new_stream_listener() {
        let port = port(10);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        port.set_new_stream_listener(move |_sri| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        port.push_sri(&StreamSri::new("a"));
        port.push_sri(&StreamSri::new("a").with_xdelta(2.0));
        port.push_sri(&StreamSri::new("b"));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        port.clear_new_stream_listener();
        port.push_sri(&StreamSri::new("c"));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_statistics_use_tracker_streams() {
        let port = port(10);
        port.push_sri(&StreamSri::new("quiet"));
        port.push_packet(vec![0; 8], PrecisionTime::not_set(), false, "loud");
        let stats = port.statistics().expect("enabled");
        assert_eq!(stats.port_name, "in");
        assert_eq!(stats.stream_ids, vec!["loud".to_string(), "quiet".to_string()]);

        port.set_statistics_enabled(false);
        assert!(port.statistics().is_none());
    }

    #[test]
    fn test_usable_as_remote_endpoint() {
        let port = port(10);
        let endpoint: &dyn RemoteEndpoint<Vec<i16>> = &port;
        endpoint.push_sri(&StreamSri::new("s")).expect("in process");
        endpoint.push_packet(vec![9], PrecisionTime::not_set(), true, "s").expect("in process");
        let packet = port.get_packet(NON_BLOCKING).expect("queued");
        assert!(packet.sri_changed);
        assert!(packet.eos);
    }
}
