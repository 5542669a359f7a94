use bytes::Bytes;

use crate::timebase::{TimeBase, Timestamp, rescale, translate};

/// A compressed unit of one stream.
///
/// The payload is reference counted, so handing a packet to the next stage
/// moves it without copying the data.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub data: Bytes,
    pub dts: Timestamp,
    pub pts: Timestamp,
    pub duration: i64,
    pub time_base: TimeBase,
    pub stream_index: usize,
    pub is_key: bool,
}

impl Packet {
    pub fn new(stream_index: usize, data: impl Into<Bytes>, time_base: TimeBase) -> Self {
        Self {
            data: data.into(),
            dts: Timestamp::UNSET,
            pts: Timestamp::UNSET,
            duration: 0,
            time_base,
            stream_index,
            is_key: false,
        }
    }

    pub fn with_timestamps(mut self, dts: impl Into<Timestamp>, pts: impl Into<Timestamp>) -> Self {
        self.dts = dts.into();
        self.pts = pts.into();
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_key(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Re-expresses dts, pts and duration in `time_base`.
    pub fn rescale_ts(&mut self, time_base: TimeBase) {
        if self.time_base == time_base {
            return;
        }
        self.dts = translate(self.dts, self.time_base, time_base);
        self.pts = translate(self.pts, self.time_base, time_base);
        if self.duration > 0 {
            self.duration = rescale(self.duration, self.time_base, time_base);
        }
        self.time_base = time_base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_ts_moves_every_field() {
        let mut packet = Packet::new(0, vec![1, 2, 3], TimeBase::new(1, 30))
            .with_timestamps(2, 3)
            .with_duration(1);
        packet.rescale_ts(TimeBase::MPEG);

        assert_eq!(packet.dts, Timestamp::new(6000));
        assert_eq!(packet.pts, Timestamp::new(9000));
        assert_eq!(packet.duration, 3000);
        assert_eq!(packet.time_base, TimeBase::MPEG);
        assert_eq!(packet.size(), 3);
    }

    #[test]
    fn rescale_ts_keeps_unset_pts() {
        let mut packet =
            Packet::new(1, Bytes::new(), TimeBase::MILLISECONDS).with_timestamps(40, Timestamp::UNSET);
        packet.rescale_ts(TimeBase::MPEG);
        assert_eq!(packet.dts, Timestamp::new(3600));
        assert!(!packet.pts.is_set());
    }
}
