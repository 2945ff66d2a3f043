//! Payload types a port can carry.
//!
//! One generic port design covers every numeric kind. A payload only has to report its
//! element count and size, and split off a prefix for chunking.

use bytes::Bytes;

use crate::bit_buffer::BitBuffer;

/// Scalar sample type of a `Vec` payload.
pub trait Sample: Copy + Default + Send + Sync + 'static {
    const BITS: usize;
}

macro_rules! impl_sample {
    ($($t:ty),* $(,)?) => {
        $(impl Sample for $t {
            const BITS: usize = <$t>::BITS as usize;
        })*
    };
}

impl_sample!(i8, u8, i16, u16, i32, u32, i64, u64);

impl Sample for f32 {
    const BITS: usize = 32;
}

impl Sample for f64 {
    const BITS: usize = 64;
}

pub trait StreamData: Clone + Send + Sync + 'static {
    /// Size of one element on the wire.
    const BITS_PER_ELEMENT: usize;

    /// Number of elements (scalars, octets or bits).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns the first `at` elements.
    fn split_to(&mut self, at: usize) -> Self;

    fn empty() -> Self;
}

impl<T: Sample> StreamData for Vec<T> {
    const BITS_PER_ELEMENT: usize = T::BITS;

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn split_to(&mut self, at: usize) -> Self {
        let rest = self.split_off(at.min(Vec::len(self)));
        std::mem::replace(self, rest)
    }

    fn empty() -> Self {
        Vec::new()
    }
}

/// Octet payloads split without copying.
impl StreamData for Bytes {
    const BITS_PER_ELEMENT: usize = 8;

    fn len(&self) -> usize {
        Bytes::len(self)
    }

    fn split_to(&mut self, at: usize) -> Self {
        Bytes::split_to(self, at.min(Bytes::len(self)))
    }

    fn empty() -> Self {
        Bytes::new()
    }
}

/// Packed bit payloads, chunks are views on the same bytes.
impl StreamData for BitBuffer {
    const BITS_PER_ELEMENT: usize = 1;

    fn len(&self) -> usize {
        BitBuffer::len(self)
    }

    fn split_to(&mut self, at: usize) -> Self {
        self.split_front(at)
    }

    fn empty() -> Self {
        BitBuffer::default()
    }
}
