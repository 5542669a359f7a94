//! Time bases, timestamps and the translation between them.
//!
//! Every stage of the pipeline counts time in its own ticks. A demuxer may
//! use 1/90000, a decoder 1/25 and a muxer 1/16000 for the same stream, so a
//! timestamp only means something together with its [`TimeBase`]. All
//! conversions go through [`translate`], which never loses the unset state
//! and never overflows on the full i64 range.

use std::fmt;
use std::time::Duration;

/// Duration of one timestamp tick, as a rational number of seconds.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const MILLISECONDS: TimeBase = TimeBase { num: 1, den: 1000 };
    pub const MICROSECONDS: TimeBase = TimeBase { num: 1, den: 1_000_000 };
    pub const MPEG: TimeBase = TimeBase { num: 1, den: 90000 };

    /// # Panics
    ///
    /// Panics if `den` is not positive.
    pub const fn new(num: i32, den: i32) -> Self {
        assert!(den > 0, "time base denominator must be positive");
        Self { num, den }
    }

    pub const fn try_new(num: i32, den: i32) -> Option<Self> {
        if den > 0 { Some(Self { num, den }) } else { None }
    }

    /// A usable time base has a positive numerator too.
    pub fn is_valid(self) -> bool {
        self.num > 0 && self.den > 0
    }
}

impl fmt::Debug for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for TimeBase {
    fn from((num, den): (i32, i32)) -> Self {
        Self::new(num, den)
    }
}

/// A tick count in some time base, or unset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Timestamp(Option<i64>);

impl Timestamp {
    pub const UNSET: Timestamp = Timestamp(None);

    pub const fn new(ticks: i64) -> Self {
        Self(Some(ticks))
    }

    pub const fn value(self) -> Option<i64> {
        self.0
    }

    pub const fn is_set(self) -> bool {
        self.0.is_some()
    }

    /// Falls back to `other` when this timestamp is unset.
    pub fn or(self, other: Timestamp) -> Timestamp {
        if self.is_set() { self } else { other }
    }

    pub fn to_duration(self, time_base: TimeBase) -> Option<Duration> {
        let micros = rescale(self.0?, time_base, TimeBase::MICROSECONDS);
        Some(Duration::from_micros(micros.max(0) as u64))
    }
}

impl From<Option<i64>> for Timestamp {
    fn from(value: Option<i64>) -> Self {
        Self(value)
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self(Some(value))
    }
}

impl From<Timestamp> for Option<i64> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("unset"),
        }
    }
}

/// Rescales `ticks` from one time base to another.
///
/// Computes `ticks * from.num * to.den / (from.den * to.num)` with 128-bit
/// intermediates, rounding to nearest with halves away from zero. Results
/// that do not fit an i64 saturate.
pub fn rescale(ticks: i64, from: TimeBase, to: TimeBase) -> i64 {
    if from == to {
        return ticks;
    }
    let mut num = ticks as i128 * from.num as i128 * to.den as i128;
    let mut den = from.den as i128 * to.num as i128;
    if den == 0 {
        return ticks;
    }
    if den < 0 {
        num = -num;
        den = -den;
    }
    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        -((-num + half) / den)
    };
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Translates a timestamp between time bases. Unset stays unset.
pub fn translate(ts: Timestamp, from: TimeBase, to: TimeBase) -> Timestamp {
    match ts.value() {
        Some(ticks) => Timestamp::new(rescale(ticks, from, to)),
        None => Timestamp::UNSET,
    }
}

pub fn duration_to_ticks(duration: Duration, time_base: TimeBase) -> i64 {
    let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
    rescale(micros, TimeBase::MICROSECONDS, time_base)
}

/// A requested sub-range of the source, in absolute source time.
///
/// A zero or missing bound means the range is open on that side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrimRange {
    pub start: Option<Duration>,
    pub end: Option<Duration>,
}

impl TrimRange {
    pub fn new(start: Option<Duration>, end: Option<Duration>) -> Self {
        Self { start, end }
    }

    pub fn from_millis(start_ms: i64, end_ms: i64) -> Self {
        let bound = |ms: i64| (ms > 0).then(|| Duration::from_millis(ms as u64));
        Self {
            start: bound(start_ms),
            end: bound(end_ms),
        }
    }

    pub fn start(&self) -> Option<Duration> {
        self.start.filter(|d| !d.is_zero())
    }

    pub fn end(&self) -> Option<Duration> {
        self.end.filter(|d| !d.is_zero())
    }

    pub fn is_unbounded(&self) -> bool {
        self.start().is_none() && self.end().is_none()
    }

    pub fn start_in(&self, time_base: TimeBase) -> Option<i64> {
        self.start().map(|d| duration_to_ticks(d, time_base))
    }

    pub fn end_in(&self, time_base: TimeBase) -> Option<i64> {
        self.end().map(|d| duration_to_ticks(d, time_base))
    }

    /// What to do with a packet given its source timestamps and the end
    /// bound expressed in the packet's own time base.
    ///
    /// The cut is made on dts. A packet still due for decoding but presented
    /// after the end is kept with its pts hidden, so the last partial group
    /// of pictures decodes cleanly without being shown.
    pub fn classify(&self, dts: Timestamp, pts: Timestamp, time_base: TimeBase) -> TrimDecision {
        let Some(end) = self.end_in(time_base) else {
            return TrimDecision::Keep;
        };
        if dts.value().is_some_and(|dts| dts > end) {
            return TrimDecision::Stop;
        }
        if pts.value().is_some_and(|pts| pts > end) {
            return TrimDecision::KeepHidden;
        }
        TrimDecision::Keep
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimDecision {
    Keep,
    /// Keep for decoding, but with pts unset.
    KeepHidden,
    /// The stream has passed the end of the range.
    Stop,
}

/// Timestamps of the first retained packet of a stream, in its own time base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FirstPacketTime {
    pub dts: i64,
    pub pts: i64,
}

impl FirstPacketTime {
    /// Returns `None` when the packet carries no timestamp at all.
    pub fn from_packet(dts: Timestamp, pts: Timestamp) -> Option<Self> {
        let pts = pts.or(dts).value()?;
        let dts = dts.value().unwrap_or(pts);
        Some(Self { dts, pts })
    }

    /// Re-bases a packet so the retained range starts at pts 0.
    ///
    /// `pts' = pts - pts0` and `dts' = (dts - dts0) + (dts0 - pts0)`, which is
    /// `dts - pts0`. Both shift by the same constant, so dts stays monotonic
    /// and the first packet keeps its `dts0 - pts0` lead: streams whose decode
    /// order runs ahead of presentation order start with a negative dts.
    pub fn rebase(&self, dts: Timestamp, pts: Timestamp) -> (Timestamp, Timestamp) {
        let lead = self.dts.saturating_sub(self.pts);
        let new_pts = pts.value().map(|pts| pts.saturating_sub(self.pts));
        let new_dts = dts
            .value()
            .map(|dts| dts.saturating_sub(self.dts).saturating_add(lead));
        (new_dts.into(), new_pts.into())
    }
}

#[cfg(test)]
#[path = "timebase_test.rs"]
mod timebase_test;
