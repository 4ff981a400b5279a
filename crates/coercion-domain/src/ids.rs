use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use std::fmt;

/// Time-ordered unique identifier: a millisecond timestamp prefix followed by
/// random suffix bits, rendered as fixed-width lowercase hex so that byte-wise
/// (and therefore lexicographic string) ordering matches creation order.
///
/// This is what retention windowing and `List`/`Search` ordering lean on
/// without needing a separate timestamp column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Id(String);

const TS_HEX_WIDTH: usize = 13; // enough for millis until year ~5138
const RAND_HEX_WIDTH: usize = 16;

impl Id {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(ts: DateTime<Utc>) -> Self {
        let millis = ts.timestamp_millis().max(0) as u64;
        let mut buf = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut buf);
        let rand_val = u64::from_be_bytes(buf);
        Self(format!("{:0tw$x}{:0rw$x}", millis, rand_val, tw = TS_HEX_WIDTH, rw = RAND_HEX_WIDTH))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the creation instant embedded in the ID. Returns `None` if the
    /// ID was not minted by this scheme (e.g. hand-authored in a test fixture).
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let ts_part = self.0.get(0..TS_HEX_WIDTH)?;
        let millis = i64::from_str_radix(ts_part, 16).ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
