//! Segment identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Label of a segment in one of the two stitched volumes.
///
/// Segment labels are 32-bit in the source volumes. The wrapper is
/// serde-transparent, so a `BTreeMap<SegmentId, _>` serializes to a JSON
/// object keyed by the decimal label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(u32);

impl SegmentId {
    /// Create a segment ID from its raw label.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw label.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SegmentId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<SegmentId> for u32 {
    fn from(id: SegmentId) -> Self {
        id.0
    }
}

impl FromStr for SegmentId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_segment_id_parse() {
        assert_eq!("42".parse::<SegmentId>().unwrap(), SegmentId::new(42));
        assert_eq!(" 7 ".parse::<SegmentId>().unwrap(), SegmentId::new(7));
        assert!("-1".parse::<SegmentId>().is_err());
        assert!("abc".parse::<SegmentId>().is_err());
    }

    #[test]
    fn test_segment_id_map_key_serializes_as_string() {
        let mut map = BTreeMap::new();
        map.insert(SegmentId::new(100), 1000u64);
        map.insert(SegmentId::new(7), 5u64);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"7":5,"100":1000}"#);

        let back: BTreeMap<SegmentId, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
