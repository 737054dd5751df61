//! Core data types for the time-series index
//!
//! - `Labels`: a sorted label set identifying a log stream
//! - `Series`: resolved identity of a stream (labels + fingerprint)
//! - `ChunkRef`: reference to one chunk of a stream over a time range

use crate::storage::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in milliseconds
pub type Timestamp = i64;

/// Hash identifying a unique label set
pub type Fingerprint = u64;

const FNV_OFFSET_64: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME_64: u64 = 0x0000_0100_0000_01b3;
const LABEL_SEPARATOR: u8 = 0xff;

/// A single name/value label pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// Sorted, de-duplicated set of labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Build a label set from pairs; later duplicates of a name win
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels: Vec<Label> = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            let value = value.into();
            match labels.iter_mut().find(|l| l.name == name) {
                Some(existing) => existing.value = value,
                None => labels.push(Label { name, value }),
            }
        }
        labels.sort();
        Self(labels)
    }

    /// Value of a label, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// FNV-1a 64 over `name 0xff value 0xff ...` in sorted order
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hash = FNV_OFFSET_64;
        for label in &self.0 {
            for byte in label
                .name
                .bytes()
                .chain(std::iter::once(LABEL_SEPARATOR))
                .chain(label.value.bytes())
                .chain(std::iter::once(LABEL_SEPARATOR))
            {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(FNV_PRIME_64);
            }
        }
        hash
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        write!(f, "}}")
    }
}

/// Resolved identity of a log stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub labels: Labels,
    pub fingerprint: Fingerprint,
}

impl Series {
    pub fn new(labels: Labels) -> Self {
        let fingerprint = labels.fingerprint();
        Self {
            labels,
            fingerprint,
        }
    }
}

/// Reference to a single chunk of one stream
///
/// Ordering via [`ChunkRef::less`] assumes every compared reference belongs to the
/// same user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Tenant the chunk belongs to
    pub user: String,
    pub fingerprint: Fingerprint,
    /// First entry timestamp (ms)
    pub start: Timestamp,
    /// Last entry timestamp (ms)
    pub end: Timestamp,
    /// CRC32 of the stored chunk bytes
    pub checksum: u32,
}

impl ChunkRef {
    pub fn new(
        user: impl Into<String>,
        fingerprint: Fingerprint,
        start: Timestamp,
        end: Timestamp,
        checksum: u32,
    ) -> Self {
        Self {
            user: user.into(),
            fingerprint,
            start,
            end,
            checksum,
        }
    }

    /// Compares by (start, end).
    ///
    /// Ties on `start` compare `end` with `<=`, so equal ranges are "less" in both
    /// directions. This is not a strict order; downstream merging relies on the
    /// tie-break as written.
    pub fn less(&self, other: &ChunkRef) -> bool {
        if self.start != other.start {
            return self.start < other.start;
        }
        self.end <= other.end
    }

    /// Storage key: `{user}/{fingerprint}/{start}:{end}:{checksum}`, numbers in hex.
    /// Times are signed (`-5`, not two's complement) so they parse back.
    pub fn external_key(&self) -> String {
        format!(
            "{}/{:x}/{}:{}:{:x}",
            self.user,
            self.fingerprint,
            signed_hex(self.start),
            signed_hex(self.end),
            self.checksum
        )
    }

    /// Inverse of [`ChunkRef::external_key`]
    pub fn parse_external_key(key: &str) -> StorageResult<Self> {
        let invalid = || StorageError::InvalidChunkKey(key.to_string());

        let (user, rest) = key.split_once('/').ok_or_else(invalid)?;
        let (fingerprint, rest) = rest.split_once('/').ok_or_else(invalid)?;
        if user.is_empty() {
            return Err(invalid());
        }

        let mut parts = rest.split(':');
        let (Some(start), Some(end), Some(checksum), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        Ok(Self {
            user: user.to_string(),
            fingerprint: u64::from_str_radix(fingerprint, 16).map_err(|_| invalid())?,
            start: i64::from_str_radix(start, 16).map_err(|_| invalid())?,
            end: i64::from_str_radix(end, 16).map_err(|_| invalid())?,
            checksum: u32::from_str_radix(checksum, 16).map_err(|_| invalid())?,
        })
    }

    /// Whether this chunk overlaps `[from, through)`
    pub fn overlaps(&self, from: Timestamp, through: Timestamp) -> bool {
        self.start < through && self.end >= from
    }
}

fn signed_hex(t: Timestamp) -> String {
    if t < 0 {
        format!("-{:x}", t.unsigned_abs())
    } else {
        format!("{:x}", t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: i64, end: i64) -> ChunkRef {
        ChunkRef::new("fake", 1, start, end, 0)
    }

    #[test]
    fn test_less_orders_by_start_first() {
        assert!(chunk(1, 100).less(&chunk(2, 3)));
        assert!(!chunk(2, 3).less(&chunk(1, 100)));
    }

    #[test]
    fn test_less_is_reflexive_on_equal_ranges() {
        let a = chunk(5, 10);
        let b = chunk(5, 10);
        assert!(a.less(&b));
        assert!(b.less(&a));
        assert!(a.less(&a));
    }

    #[test]
    fn test_less_tie_break_on_end() {
        assert!(chunk(5, 9).less(&chunk(5, 10)));
        assert!(!chunk(5, 10).less(&chunk(5, 9)));
    }

    #[test]
    fn test_sort_by_less_orders_by_start() {
        let mut refs = vec![chunk(30, 40), chunk(10, 50), chunk(20, 21), chunk(10, 15)];
        refs.sort_by(|a, b| {
            if a.less(b) && !b.less(a) {
                std::cmp::Ordering::Less
            } else if b.less(a) && !a.less(b) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });

        let starts: Vec<i64> = refs.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![10, 10, 20, 30]);
        assert_eq!(refs[0].end, 15);
    }

    #[test]
    fn test_external_key_round_trip() {
        let r = ChunkRef::new("tenant-a", 0xdead_beef, 1_000, 2_000, 0x1234);
        let key = r.external_key();
        assert_eq!(key, "tenant-a/deadbeef/3e8:7d0:1234");
        assert_eq!(ChunkRef::parse_external_key(&key).unwrap(), r);
    }

    #[test]
    fn test_external_key_negative_times() {
        let r = ChunkRef::new("fake", 0x60de, -5, 10, 0xd24b);
        let key = r.external_key();
        assert_eq!(key, "fake/60de/-5:a:d24b");
        assert_eq!(ChunkRef::parse_external_key(&key).unwrap(), r);

        let r = ChunkRef::new("fake", 1, i64::MIN, -1, 0);
        assert_eq!(ChunkRef::parse_external_key(&r.external_key()).unwrap(), r);
    }

    #[test]
    fn test_parse_external_key_rejects_garbage() {
        for key in ["", "fake", "fake/zz/1:2:3", "fake/1/1:2", "fake/1/1:2:3:4", "/1/1:2:3"] {
            assert!(
                matches!(
                    ChunkRef::parse_external_key(key),
                    Err(StorageError::InvalidChunkKey(_))
                ),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_labels_sorted_and_deduplicated() {
        let labels = Labels::new([("foo", "bar"), ("app", "x"), ("foo", "baz")]);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("foo"), Some("baz"));
        assert_eq!(labels.get("missing"), None);
        assert_eq!(labels.to_string(), r#"{app="x", foo="baz"}"#);
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = Labels::new([("foo", "bar"), ("bazz", "buzz")]);
        let b = Labels::new([("bazz", "buzz"), ("foo", "bar")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), Labels::new([("foo", "bar")]).fingerprint());
        assert_eq!(Labels::default().fingerprint(), FNV_OFFSET_64);
    }

    #[test]
    fn test_overlaps() {
        let r = chunk(10, 20);
        assert!(r.overlaps(0, 11));
        assert!(r.overlaps(20, 30));
        assert!(!r.overlaps(0, 10));
        assert!(!r.overlaps(21, 30));
    }
}
