//! Bit addressable buffer used by packed bit streams.
//!
//! Bits are stored MSB first in a shared byte array. Contiguous slices are views into the
//! same backing store, strided slices are materialized. Writes are copy on write so a
//! view that is modified detaches from the buffer it was cut from.

use std::borrow::Cow;
use std::fmt::{self, Debug, Display};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::BitBufferError;

type BitResult<T> = std::result::Result<T, BitBufferError>;

#[derive(Clone, Default)]
pub struct BitBuffer {
    data: Arc<Vec<u8>>,
    offset: usize, // in bits from the start of data
    len: usize,    // in bits
}

#[inline]
fn bytes_for(bits: usize) -> usize {
    bits.div_ceil(8)
}

#[inline]
fn read_bit(data: &[u8], pos: usize) -> bool {
    (data[pos >> 3] >> (7 - (pos & 7))) & 1 == 1
}

#[inline]
fn write_bit(data: &mut [u8], pos: usize, value: bool) {
    let mask = 1u8 << (7 - (pos & 7));
    if value {
        data[pos >> 3] |= mask;
    } else {
        data[pos >> 3] &= !mask;
    }
}

impl BitBuffer {
    /// New buffer of `bits` zero bits.
    pub fn new(bits: usize) -> Self {
        BitBuffer { data: Arc::new(vec![0u8; bytes_for(bits)]), offset: 0, len: bits }
    }

    /// Takes ownership of `bytes` holding `bits` packed bits. Missing bytes are zero padded.
    pub fn from_vec(mut bytes: Vec<u8>, bits: usize) -> Self {
        if bytes.len() < bytes_for(bits) {
            bytes.resize(bytes_for(bits), 0);
        }
        BitBuffer { data: Arc::new(bytes), offset: 0, len: bits }
    }

    pub fn from_bytes(bytes: &[u8], bits: usize) -> Self {
        let take = bytes.len().min(bytes_for(bits));
        Self::from_vec(bytes[..take].to_vec(), bits)
    }

    /// The low `bits` bits of `value`, most significant first.
    pub fn from_int(value: u64, bits: usize) -> BitResult<Self> {
        if bits > 64 {
            return Err(BitBufferError::IntegerTooWide { bits });
        }
        let mut buffer = BitBuffer::new(bits);
        let data = Arc::make_mut(&mut buffer.data);
        for i in 0..bits {
            write_bit(data, i, (value >> (bits - 1 - i)) & 1 == 1);
        }
        Ok(buffer)
    }

    pub fn from_bools(bits: &[bool]) -> Self {
        bits.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit offset of this buffer within its backing bytes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True when both buffers read from the same backing bytes.
    pub fn shares_backing(&self, other: &BitBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    fn resolve(&self, index: isize) -> BitResult<usize> {
        let len = self.len as isize;
        let resolved = if index < 0 { index + len } else { index };
        if resolved < 0 || resolved >= len {
            Err(BitBufferError::IndexOutOfRange { index, len: self.len })
        } else {
            Ok(resolved as usize)
        }
    }

    #[inline]
    fn bit(&self, i: usize) -> bool {
        read_bit(&self.data, self.offset + i)
    }

    /// Reads one bit, negative indexes count from the end.
    pub fn get(&self, index: isize) -> BitResult<bool> {
        let i = self.resolve(index)?;
        Ok(self.bit(i))
    }

    /// Writes one bit, negative indexes count from the end.
    pub fn set(&mut self, index: isize, value: bool) -> BitResult<()> {
        let i = self.resolve(index)?;
        let pos = self.offset + i;
        write_bit(Arc::make_mut(&mut self.data).as_mut_slice(), pos, value);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.bit(i))
    }

    /// Slices with the same rules as a Python slice.
    ///
    /// A step of one returns a view sharing this buffer's bytes, any other step returns a
    /// new owned buffer.
    pub fn slice(&self, start: Option<isize>, stop: Option<isize>, step: isize) -> BitResult<BitBuffer> {
        if step == 0 {
            return Err(BitBufferError::ZeroStep);
        }
        let len = self.len as isize;
        let (start, count) = if step > 0 {
            let clamp = |v: isize| if v < 0 { (v + len).max(0) } else { v.min(len) };
            let first = start.map_or(0, clamp);
            let last = stop.map_or(len, clamp);
            let count = if last > first { (last - first + step - 1) / step } else { 0 };
            (first, count)
        } else {
            let clamp = |v: isize| if v < 0 { (v + len).max(-1) } else { v.min(len - 1) };
            let first = start.map_or(len - 1, clamp);
            let last = stop.map_or(-1, clamp);
            let count = if first > last { (first - last - step - 1) / -step } else { 0 };
            (first, count)
        };

        if step == 1 {
            return Ok(BitBuffer {
                data: self.data.clone(),
                offset: self.offset + start as usize,
                len: count as usize,
            });
        }
        let mut data = vec![0u8; bytes_for(count as usize)];
        for n in 0..count {
            let src = (start + n * step) as usize;
            write_bit(&mut data, n as usize, self.bit(src));
        }
        Ok(BitBuffer { data: Arc::new(data), offset: 0, len: count as usize })
    }

    /// Shortcut for `slice(Some(start), Some(stop), 1)` on in range bounds.
    pub fn view(&self, start: usize, stop: usize) -> BitResult<BitBuffer> {
        if start > stop || stop > self.len {
            return Err(BitBufferError::IndexOutOfRange { index: stop as isize, len: self.len });
        }
        self.slice(Some(start as isize), Some(stop as isize), 1)
    }

    /// Left aligned bytes of this buffer. Borrowed when the buffer starts on a byte
    /// boundary and covers whole bytes, otherwise repacked into a new vector with the
    /// unused trailing bits cleared.
    pub fn bytes(&self) -> Cow<'_, [u8]> {
        if self.offset % 8 == 0 && self.len % 8 == 0 {
            let first = self.offset / 8;
            return Cow::Borrowed(&self.data[first..first + self.len / 8]);
        }
        Cow::Owned(self.to_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; bytes_for(self.len)];
        if self.offset % 8 == 0 {
            let first = self.offset / 8;
            let count = out.len();
            out.copy_from_slice(&self.data[first..first + count]);
            if self.len % 8 != 0 {
                if let Some(last) = out.last_mut() {
                    *last &= 0xFFu8 << (8 - self.len % 8);
                }
            }
        } else {
            for i in 0..self.len {
                if self.bit(i) {
                    write_bit(&mut out, i, true);
                }
            }
        }
        out
    }

    /// Owned copy that no longer shares bytes with any view.
    pub fn copy(&self) -> BitBuffer {
        BitBuffer::from_vec(self.to_bytes(), self.len)
    }

    /// Reallocates to `bits`, truncating or zero padding.
    pub fn resize(&mut self, bits: usize) {
        let mut data = vec![0u8; bytes_for(bits)];
        for i in 0..self.len.min(bits) {
            if self.bit(i) {
                write_bit(&mut data, i, true);
            }
        }
        self.data = Arc::new(data);
        self.offset = 0;
        self.len = bits;
    }

    pub fn popcount(&self) -> usize {
        self.iter().filter(|b| *b).count()
    }

    /// Hamming distance over the bits both buffers have.
    pub fn distance(&self, other: &BitBuffer) -> usize {
        self.iter().zip(other.iter()).filter(|(a, b)| a != b).count()
    }

    /// First position where `pattern` matches with at most `max_distance` differing bits.
    pub fn find(&self, pattern: &BitBuffer, max_distance: usize) -> Option<usize> {
        if pattern.len > self.len {
            return None;
        }
        (0..=self.len - pattern.len).find(|start| {
            let mut differing = 0;
            for (i, p) in pattern.iter().enumerate() {
                if self.bit(start + i) != p {
                    differing += 1;
                    if differing > max_distance {
                        return false;
                    }
                }
            }
            true
        })
    }

    /// Reads `bits` bits starting at `start` as an unsigned integer, MSB first.
    pub fn to_int(&self, start: usize, bits: usize) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitBufferError::IntegerTooWide { bits });
        }
        if start + bits > self.len {
            return Err(BitBufferError::IndexOutOfRange { index: (start + bits) as isize, len: self.len });
        }
        Ok((start..start + bits).fold(0u64, |acc, i| (acc << 1) | self.bit(i) as u64))
    }

    /// Splits off the first `at` bits as a view, leaving the rest in `self`.
    pub(crate) fn split_front(&mut self, at: usize) -> BitBuffer {
        let at = at.min(self.len);
        let front = BitBuffer { data: self.data.clone(), offset: self.offset, len: at };
        self.offset += at;
        self.len -= at;
        front
    }
}

impl FromIterator<bool> for BitBuffer {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut data = Vec::new();
        let mut len = 0usize;
        for bit in iter {
            if len % 8 == 0 {
                data.push(0u8);
            }
            write_bit(&mut data, len, bit);
            len += 1;
        }
        BitBuffer { data: Arc::new(data), offset: 0, len }
    }
}

impl FromStr for BitBuffer {
    type Err = BitBufferError;

    /// Parses a pattern of `0` and `1`, whitespace is ignored.
    fn from_str(s: &str) -> BitResult<Self> {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(BitBufferError::InvalidPattern(other)),
            })
            .collect()
    }
}

impl Display for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl Debug for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitBuffer({:?}, offset {})", self.to_string(), self.offset)
    }
}

impl PartialEq for BitBuffer {
    fn eq(&self, other: &BitBuffer) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for BitBuffer {}

impl PartialEq<str> for BitBuffer {
    fn eq(&self, other: &str) -> bool {
        let mut bits = self.iter();
        for c in other.chars().filter(|c| !c.is_whitespace()) {
            match (bits.next(), c) {
                (Some(false), '0') | (Some(true), '1') => {}
                _ => return false,
            }
        }
        bits.next().is_none()
    }
}

impl PartialEq<&str> for BitBuffer {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl PartialEq<[bool]> for BitBuffer {
    fn eq(&self, other: &[bool]) -> bool {
        self.len == other.len() && self.iter().eq(other.iter().copied())
    }
}

/// Compares against a sequence of 0/1 values, any other value never matches.
impl PartialEq<[u8]> for BitBuffer {
    fn eq(&self, other: &[u8]) -> bool {
        self.len == other.len()
            && self.iter().zip(other.iter()).all(|(bit, v)| matches!((bit, v), (false, 0) | (true, 1)))
    }
}
