//! Shard annotations
//!
//! A shard selects a deterministic subset of series by the top `log2(of)` bits
//! of their fingerprint, so `of` must be a power of two: `0_of_2` and `3_of_4`
//! are valid, `0_of_3` is not.

use crate::index::Fingerprint;
use crate::query::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selects shard `shard` out of `of`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardAnnotation {
    pub shard: u32,
    pub of: u32,
}

impl ShardAnnotation {
    pub fn new(shard: u32, of: u32) -> Self {
        Self { shard, of }
    }

    /// Reject shard factors that are not powers of two and out-of-range indexes
    pub fn validate(&self) -> QueryResult<()> {
        if !self.of.is_power_of_two() {
            return Err(self.invalid("shard factor must be a power of two"));
        }
        if self.shard >= self.of {
            return Err(self.invalid("shard index must be less than the shard factor"));
        }
        Ok(())
    }

    /// Number of fingerprint bits used to pick the shard
    pub fn required_bits(&self) -> u32 {
        self.of.trailing_zeros()
    }

    /// Whether a fingerprint falls into this shard. Assumes a validated annotation.
    pub fn matches(&self, fingerprint: Fingerprint) -> bool {
        let bits = self.required_bits();
        if bits == 0 {
            return true;
        }
        (fingerprint >> (64 - bits)) == self.shard as u64
    }

    fn invalid(&self, reason: &str) -> QueryError {
        QueryError::InvalidShard {
            shard: self.shard,
            of: self.of,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ShardAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_of_{}", self.shard, self.of)
    }
}

impl FromStr for ShardAnnotation {
    type Err = QueryError;

    /// Parse and validate the `"{shard}_of_{of}"` form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || QueryError::InvalidShard {
            shard: 0,
            of: 0,
            reason: format!("cannot parse {s:?}, expected <shard>_of_<of>"),
        };

        let (shard, of) = s.split_once("_of_").ok_or_else(parse_err)?;
        let annotation = ShardAnnotation {
            shard: shard.parse().map_err(|_| parse_err())?,
            of: of.parse().map_err(|_| parse_err())?,
        };
        annotation.validate()?;
        Ok(annotation)
    }
}
