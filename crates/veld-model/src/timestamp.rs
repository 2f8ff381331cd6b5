use std::fmt;

/// Millisecond-precision instant, the wire unit for `timestamp` fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    unix_millis: i64,
}

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp { unix_millis: 0 };

    pub fn from_unix_millis(unix_millis: i64) -> Timestamp {
        Timestamp { unix_millis }
    }

    pub fn unix_millis(self) -> i64 {
        self.unix_millis
    }

    /// RFC 3339 UTC rendering with millisecond precision, used by the
    /// readable wire flavor. Instants outside the calendar range fall back
    /// to the raw millisecond count.
    pub fn to_rfc3339(self) -> String {
        let secs = self.unix_millis.div_euclid(1000);
        let millis = self.unix_millis.rem_euclid(1000) as u32;
        match chrono::DateTime::<chrono::Utc>::from_timestamp(secs, millis * 1_000_000) {
            Some(utc) => utc.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            None => self.unix_millis.to_string(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}
