//! Stream Resource Information, the metadata describing one logical stream.

use std::fmt::Debug;

/// Real or complex samples. In complex mode each sample is a real/imaginary pair of scalars.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SampleMode {
    #[default]
    Real = 0,
    Complex = 1,
}

/// Value of one SRI keyword.
#[derive(Clone, Debug, PartialEq)]
pub enum KeywordValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
}

impl From<bool> for KeywordValue {
    fn from(v: bool) -> Self {
        KeywordValue::Bool(v)
    }
}

impl From<i64> for KeywordValue {
    fn from(v: i64) -> Self {
        KeywordValue::Long(v)
    }
}

impl From<f64> for KeywordValue {
    fn from(v: f64) -> Self {
        KeywordValue::Double(v)
    }
}

impl From<&str> for KeywordValue {
    fn from(v: &str) -> Self {
        KeywordValue::Text(v.to_string())
    }
}

impl From<String> for KeywordValue {
    fn from(v: String) -> Self {
        KeywordValue::Text(v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    pub id: String,
    pub value: KeywordValue,
}

/// Metadata for one stream, keyed by `stream_id`.
///
/// Equality is structural: every field must match and both keyword lists must hold the
/// same id/value pairs, in any order.
#[derive(Clone, Debug)]
pub struct StreamSri {
    pub stream_id: String,
    pub mode: SampleMode,
    pub xstart: f64,
    /// Seconds (or other `xunits`) between samples.
    pub xdelta: f64,
    pub xunits: i16,
    /// Row length in samples for framed 2-D data, zero for contiguous data.
    pub subsize: usize,
    pub ystart: f64,
    pub ydelta: f64,
    pub yunits: i16,
    /// The producer prefers to wait on a full queue rather than have packets flushed.
    pub blocking: bool,
    pub keywords: Vec<Keyword>,
}

/// Decides whether two SRIs for the same stream describe the same thing.
pub type SriCompare = fn(&StreamSri, &StreamSri) -> bool;

/// Default comparison, full structural equality.
pub fn sri_equal(a: &StreamSri, b: &StreamSri) -> bool {
    a == b
}

impl StreamSri {
    /// Default SRI for a stream: every numeric field zero except `xdelta` of one.
    pub fn new(stream_id: impl Into<String>) -> Self {
        StreamSri {
            stream_id: stream_id.into(),
            mode: SampleMode::Real,
            xstart: 0.0,
            xdelta: 1.0,
            xunits: 0,
            subsize: 0,
            ystart: 0.0,
            ydelta: 0.0,
            yunits: 0,
            blocking: false,
            keywords: Vec::new(),
        }
    }

    pub fn is_complex(&self) -> bool {
        self.mode == SampleMode::Complex
    }

    pub fn keyword(&self, id: &str) -> Option<&KeywordValue> {
        self.keywords.iter().find(|k| k.id == id).map(|k| &k.value)
    }

    pub fn has_keyword(&self, id: &str) -> bool {
        self.keyword(id).is_some()
    }

    /// Adds or replaces a keyword, keeping its original position when replacing.
    pub fn set_keyword(&mut self, id: &str, value: impl Into<KeywordValue>) {
        let value = value.into();
        match self.keywords.iter_mut().find(|k| k.id == id) {
            Some(existing) => existing.value = value,
            None => self.keywords.push(Keyword { id: id.to_string(), value }),
        }
    }

    pub fn erase_keyword(&mut self, id: &str) -> Option<KeywordValue> {
        let pos = self.keywords.iter().position(|k| k.id == id)?;
        Some(self.keywords.remove(pos).value)
    }

    // builder style helpers, handy when setting up streams
    pub fn with_mode(mut self, mode: SampleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_xdelta(mut self, xdelta: f64) -> Self {
        self.xdelta = xdelta;
        self
    }

    pub fn with_subsize(mut self, subsize: usize) -> Self {
        self.subsize = subsize;
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    fn keywords_equal(&self, other: &StreamSri) -> bool {
        self.keywords.len() == other.keywords.len()
            && self.keywords.iter().all(|k| other.keyword(&k.id) == Some(&k.value))
    }
}

impl PartialEq for StreamSri {
    fn eq(&self, other: &StreamSri) -> bool {
        self.stream_id == other.stream_id
            && self.mode == other.mode
            && self.xstart == other.xstart
            && self.xdelta == other.xdelta
            && self.xunits == other.xunits
            && self.subsize == other.subsize
            && self.ystart == other.ystart
            && self.ydelta == other.ydelta
            && self.yunits == other.yunits
            && self.blocking == other.blocking
            && self.keywords_equal(other)
    }
}
