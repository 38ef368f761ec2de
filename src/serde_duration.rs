//! Serde helpers for `Duration` ↔ integer millisecond serialization.
//!
//! Event logs and JSON summaries carry whole milliseconds. Internally
//! intervals keep `Duration` so sorting and differences stay exact.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a `Duration` as whole milliseconds.
pub fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(dur.as_millis()).unwrap_or(u64::MAX))
}

/// Deserialize whole milliseconds into a `Duration`.
pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let ms = u64::deserialize(d)?;
    Ok(Duration::from_millis(ms))
}
