//! Splits oversized payloads into transfers no larger than the wire limit.
//!
//! Chunk boundaries always fall on whole samples: a complex pair is never split, and for
//! framed data (`subsize > 0`) a row is never split. Only the final chunk can hold a
//! partial row. Later chunks get timestamps advanced by the samples already sent.

#[allow(unused_imports)]
use log::*;

use crate::sri::StreamSri;
use crate::stream_data::StreamData;
use crate::timestamp::PrecisionTime;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Chunk<D> {
    pub(crate) data: D,
    pub(crate) time: PrecisionTime,
    pub(crate) eos: bool,
}

/// Scalars that must travel together: one complex pair, or one row of framed data.
pub(crate) fn alignment_unit(sri: &StreamSri) -> usize {
    let sample = if sri.is_complex() { 2 } else { 1 };
    if sri.subsize > 0 { sri.subsize * sample } else { sample }
}

/// Largest aligned chunk, in elements, that fits in `max_transfer_bits`.
///
/// A row that alone exceeds the limit is still sent whole, one row per chunk.
pub(crate) fn max_chunk_elements(max_transfer_bits: usize, bits_per_element: usize, sri: &StreamSri) -> usize {
    let unit = alignment_unit(sri);
    let max_elements = max_transfer_bits / bits_per_element.max(1);
    if unit > max_elements {
        warn!("stream {:?} needs {} elements per aligned unit, above the {} element transfer limit, sending one unit per transfer",
              sri.stream_id, unit, max_elements);
        return unit;
    }
    (max_elements / unit) * unit
}

/// Timestamp of the sample that follows `elements_sent` scalars.
pub(crate) fn advance_time(time: PrecisionTime, elements_sent: usize, sri: &StreamSri) -> PrecisionTime {
    if elements_sent == 0 {
        return time;
    }
    let samples = if sri.is_complex() { elements_sent as f64 / 2.0 } else { elements_sent as f64 };
    time + samples * sri.xdelta
}

/// Splits `data` into transfers of at most `max_transfer_bits` each. Only the last
/// transfer carries `eos`.
pub(crate) fn chunk<D: StreamData>(mut data: D, time: PrecisionTime, eos: bool, sri: &StreamSri, max_transfer_bits: usize) -> Vec<Chunk<D>> {
    let max = max_chunk_elements(max_transfer_bits, D::BITS_PER_ELEMENT, sri);
    if data.len() <= max {
        return vec![Chunk { data, time, eos }];
    }
    let unit = alignment_unit(sri);
    let mut chunks = Vec::with_capacity(data.len().div_ceil(max));
    let mut sent = 0usize;
    while data.len() > max {
        let piece = data.split_to(max);
        assert!(piece.len() % unit == 0, "malformed chunk boundary: {} elements is not a multiple of {} for stream {:?}",
                piece.len(), unit, sri.stream_id);
        chunks.push(Chunk { data: piece, time: advance_time(time, sent, sri), eos: false });
        sent += max;
    }
    chunks.push(Chunk { data, time: advance_time(time, sent, sri), eos });
    trace!("split {} elements of stream {:?} into {} transfers", sent + chunks.last().map_or(0, |c| c.data.len()), sri.stream_id, chunks.len());
    chunks
}
