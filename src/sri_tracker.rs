//! Per stream SRI cache with change detection.
//!
//! Policy: synthesize a default SRI for data on an unknown stream, flag a change when a
//! pushed SRI differs from the stored one, forget the stream on EOS. The flag is reported
//! by the next data call for that stream and then cleared.

use ahash::AHashMap;
#[allow(unused_imports)]
use log::*;

use crate::sri::{sri_equal, SriCompare, StreamSri};

struct SriEntry {
    sri: StreamSri,
    changed: bool,
}

/// Current SRI of each open stream, plus a pending change flag per stream.
pub struct SriTracker {
    entries: AHashMap<String, SriEntry>,
    compare: SriCompare,
}

impl Default for SriTracker {
    fn default() -> Self {
        SriTracker::new(sri_equal)
    }
}

impl SriTracker {
    /// Empty tracker that treats two SRIs as equal when `compare` says so.
    pub fn new(compare: SriCompare) -> Self {
        SriTracker { entries: AHashMap::new(), compare }
    }

    /// Stores `sri`, returns true if the stream is new or the SRI differs from the stored one.
    pub fn on_push(&mut self, sri: &StreamSri) -> bool {
        match self.entries.get_mut(&sri.stream_id) {
            Some(entry) => {
                if (self.compare)(&entry.sri, sri) {
                    false
                } else {
                    entry.sri = sri.clone();
                    entry.changed = true;
                    true
                }
            }
            None => {
                self.entries.insert(sri.stream_id.clone(), SriEntry { sri: sri.clone(), changed: true });
                true
            }
        }
    }

    /// SRI in force for data on `stream_id` and whether it changed since the last data.
    /// An unknown stream gets a default SRI and always reports a change.
    pub fn on_data(&mut self, stream_id: &str) -> (StreamSri, bool) {
        match self.entries.get_mut(stream_id) {
            Some(entry) => {
                let changed = entry.changed;
                entry.changed = false;
                (entry.sri.clone(), changed)
            }
            None => {
                warn!("received data for stream {:?} with no SRI, using default", stream_id);
                let sri = StreamSri::new(stream_id);
                self.entries.insert(stream_id.to_string(), SriEntry { sri: sri.clone(), changed: false });
                (sri, true)
            }
        }
    }

    /// Forgets `stream_id`, returns true if it was known.
    pub fn on_eos(&mut self, stream_id: &str) -> bool {
        self.entries.remove(stream_id).is_some()
    }

    /// Stored SRI, without touching the change flag.
    pub fn get(&self, stream_id: &str) -> Option<&StreamSri> {
        self.entries.get(stream_id).map(|e| &e.sri)
    }

    /// True when the stored SRI asks producers to wait for queue space.
    pub fn is_blocking(&self, stream_id: &str) -> bool {
        self.entries.get(stream_id).is_some_and(|e| e.sri.blocking)
    }

    /// Open streams, sorted.
    pub fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stored SRIs sorted by stream id.
    pub fn active_sris(&self) -> Vec<StreamSri> {
        let mut sris: Vec<StreamSri> = self.entries.values().map(|e| e.sri.clone()).collect();
        sris.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        sris
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
