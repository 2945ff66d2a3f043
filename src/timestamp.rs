//! Precision timestamps carried with every packet.
//!
//! Time is split into whole and fractional seconds so that adding small sample periods to
//! a large epoch value does not lose precision.

use std::cmp::Ordering;
use std::ops::{Add, Sub};
use time::OffsetDateTime;

/// Source of the time code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TimeCodeMode {
    Off,
    #[default]
    Cpu,
    Zulu,
    Irig,
    Sdn,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrecisionTime {
    pub mode: TimeCodeMode,
    /// False for timestamps that were never set.
    pub valid: bool,
    /// Offset of the first sample, in samples.
    pub offset: f64,
    pub whole_secs: f64,
    /// Always kept in `[0, 1)`.
    pub frac_secs: f64,
}

impl Default for PrecisionTime {
    fn default() -> Self {
        PrecisionTime::not_set()
    }
}

impl PrecisionTime {
    /// Wall clock now, CPU time code.
    pub fn now() -> Self {
        let now = OffsetDateTime::now_utc();
        PrecisionTime::from_secs(now.unix_timestamp() as f64, now.nanosecond() as f64 * 1e-9)
    }

    /// Placeholder timestamp, marked invalid.
    pub fn not_set() -> Self {
        PrecisionTime { mode: TimeCodeMode::Off, valid: false, offset: 0.0, whole_secs: 0.0, frac_secs: 0.0 }
    }

    /// Valid CPU timestamp from whole and fractional seconds, normalized.
    pub fn from_secs(whole_secs: f64, frac_secs: f64) -> Self {
        let mut t = PrecisionTime { mode: TimeCodeMode::Cpu, valid: true, offset: 0.0, whole_secs, frac_secs };
        t.normalize();
        t
    }

    /// Moves whole seconds out of the fraction so the fraction lands in `[0, 1)`.
    pub fn normalize(&mut self) {
        let carry = self.frac_secs.floor();
        self.whole_secs += carry;
        self.frac_secs -= carry;
        // whole seconds must stay integral
        let whole_frac = self.whole_secs - self.whole_secs.floor();
        if whole_frac != 0.0 {
            self.whole_secs -= whole_frac;
            self.frac_secs += whole_frac;
            let carry = self.frac_secs.floor();
            self.whole_secs += carry;
            self.frac_secs -= carry;
        }
    }

    /// Total seconds as one value, loses precision for large epochs.
    pub fn as_secs_f64(&self) -> f64 {
        self.whole_secs + self.frac_secs
    }
}

impl Add<f64> for PrecisionTime {
    type Output = PrecisionTime;

    fn add(mut self, seconds: f64) -> PrecisionTime {
        let whole = seconds.trunc();
        self.whole_secs += whole;
        self.frac_secs += seconds - whole;
        self.normalize();
        self
    }
}

impl Sub for PrecisionTime {
    type Output = f64;

    /// Difference in seconds.
    fn sub(self, other: PrecisionTime) -> f64 {
        (self.whole_secs - other.whole_secs) + (self.frac_secs - other.frac_secs)
    }
}

impl PartialOrd for PrecisionTime {
    fn partial_cmp(&self, other: &PrecisionTime) -> Option<Ordering> {
        match self.whole_secs.partial_cmp(&other.whole_secs)? {
            Ordering::Equal => self.frac_secs.partial_cmp(&other.frac_secs),
            ord => Some(ord),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_and_add() {
        let t = PrecisionTime::from_secs(10.0, 1.25);
        assert_eq!(t.whole_secs, 11.0);
        assert_eq!(t.frac_secs, 0.25);

        let later = t + 0.875;
        assert_eq!(later.whole_secs, 12.0);
        assert_eq!(later.frac_secs, 0.125);

        let earlier = t + -0.5;
        assert_eq!(earlier.whole_secs, 10.0);
        assert_eq!(earlier.frac_secs, 0.75);

        let split = PrecisionTime::from_secs(2.5, 0.75);
        assert_eq!(split.whole_secs, 3.0);
        assert_eq!(split.frac_secs, 0.25);
    }

    #[test]
    fn test_difference_and_order() {
        let a = PrecisionTime::from_secs(100.0, 0.5);
        let b = PrecisionTime::from_secs(98.0, 0.75);
        assert_eq!(a - b, 1.75);
        assert!(a > b);
        assert!(b < a);
        assert_eq!(a.partial_cmp(&a), Some(Ordering::Equal));
    }

    #[test]
    fn test_now_and_not_set() {
        let now = PrecisionTime::now();
        assert!(now.valid);
        assert_eq!(now.mode, TimeCodeMode::Cpu);
        assert!(now.whole_secs > 1_600_000_000.0);
        assert!((0.0..1.0).contains(&now.frac_secs));

        let unset = PrecisionTime::not_set();
        assert!(!unset.valid);
        assert_eq!(unset, PrecisionTime::default());
    }
}
