//! Microsecond-resolution wall-clock timestamp with RFC 3339 serde serialization.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Point in time, stored as microseconds since the Unix epoch.
///
/// Telemetry fields (`stt`, `ent`, `elt`, `age`) are all expressed in
/// microseconds, so arithmetic stays in plain `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0);

    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    pub fn from_usec(usec: i64) -> Self {
        Self(usec)
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1000))
    }

    pub fn as_usec(&self) -> i64 {
        self.0
    }

    pub fn as_millis(&self) -> i64 {
        self.0.div_euclid(1000)
    }

    /// Shift by a signed number of microseconds.
    pub fn add_usec(self, usec: i64) -> Self {
        Self(self.0.saturating_add(usec))
    }

    /// Microseconds elapsed from `earlier` to `self`, never negative.
    pub fn usec_since(&self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0).max(0)
    }

    pub fn to_system_time(self) -> SystemTime {
        if self.0 >= 0 {
            UNIX_EPOCH + Duration::from_micros(self.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_micros(self.0.unsigned_abs())
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self(d.as_micros().min(i64::MAX as u128) as i64),
            Err(e) => Self(-(e.duration().as_micros().min(i64::MAX as u128) as i64)),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // humantime only formats times at or after the epoch
        let time = (*self).max(Timestamp::EPOCH).to_system_time();
        serializer.serialize_str(&humantime::format_rfc3339_micros(time).to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        humantime::parse_rfc3339(&s)
            .map(Timestamp::from)
            .map_err(D::Error::custom)
    }
}
