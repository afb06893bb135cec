//! Placement strategies
//!
//! A strategy maps a record id (and, for the time-based strategy, the write
//! time) to a shard directory name relative to the payload root.

use chrono::{DateTime, Utc};
use clipnote_common::{Error, RecordId, Result, ShardingStrategy};

/// Directory used by the individual (flat) strategy
pub const INDIVIDUAL_DIR: &str = "items";

/// Hash a record ID to get a placement seed
#[must_use]
pub fn hash_id(id: &RecordId) -> u64 {
    xxhash_rust::xxh64::xxh64(id.as_bytes(), 0)
}

/// Shard placement for one payload store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardPlacer {
    strategy: ShardingStrategy,
}

impl ShardPlacer {
    /// Create a placer, rejecting bucket counts of zero
    pub fn new(strategy: ShardingStrategy) -> Result<Self> {
        match strategy {
            ShardingStrategy::ByCountBucket { buckets: 0 }
            | ShardingStrategy::ByHashBucket { buckets: 0 } => Err(Error::configuration(format!(
                "{strategy} needs at least one bucket"
            ))),
            _ => Ok(Self { strategy }),
        }
    }

    /// The configured strategy
    #[must_use]
    pub const fn strategy(&self) -> ShardingStrategy {
        self.strategy
    }

    /// Whether the shard depends on the write time rather than the id alone
    #[must_use]
    pub const fn is_time_based(&self) -> bool {
        matches!(self.strategy, ShardingStrategy::ByTimeBucket)
    }

    /// Shard directory for `id` written at `now_millis`
    #[must_use]
    pub fn shard_for(&self, id: &RecordId, now_millis: u64) -> String {
        match self.strategy {
            ShardingStrategy::ByTimeBucket => time_bucket(now_millis),
            ShardingStrategy::ByCountBucket { buckets } => {
                format!("c{:03}", bucket_of(id, buckets))
            }
            ShardingStrategy::Individual => INDIVIDUAL_DIR.to_string(),
            ShardingStrategy::ByHashBucket { buckets } => {
                let width = hex_width(buckets);
                format!("h{:0width$x}", bucket_of(id, buckets))
            }
        }
    }
}

fn bucket_of(id: &RecordId, buckets: u32) -> u64 {
    hash_id(id) % u64::from(buckets.max(1))
}

/// Hex digits needed to print the largest bucket number
fn hex_width(buckets: u32) -> usize {
    let max = buckets.saturating_sub(1).max(1);
    (32 - max.leading_zeros()).div_ceil(4) as usize
}

/// `YYYY-MM` in UTC
fn time_bucket(millis: u64) -> String {
    let at = i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    at.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_deterministic_placement() {
        let id = RecordId::new();
        for strategy in [
            ShardingStrategy::ByCountBucket { buckets: 32 },
            ShardingStrategy::ByHashBucket { buckets: 256 },
        ] {
            // A fresh placer stands in for a restarted process
            let first = ShardPlacer::new(strategy).unwrap().shard_for(&id, 0);
            let second = ShardPlacer::new(strategy)
                .unwrap()
                .shard_for(&id, 1_700_000_000_000);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_count_bucket_matches_hash() {
        let id = RecordId::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
        let placer = ShardPlacer::new(ShardingStrategy::ByCountBucket { buckets: 10 }).unwrap();
        let expected = format!("c{:03}", hash_id(&id) % 10);
        assert_eq!(placer.shard_for(&id, 0), expected);
    }

    #[test]
    fn test_hash_bucket_names() {
        let placer = ShardPlacer::new(ShardingStrategy::ByHashBucket { buckets: 256 }).unwrap();
        let names: HashSet<String> = (0..2000)
            .map(|_| placer.shard_for(&RecordId::new(), 0))
            .collect();
        assert!(names.len() > 200);
        assert!(names.iter().all(|n| n.len() == 3 && n.starts_with('h')));

        assert_eq!(hex_width(1), 1);
        assert_eq!(hex_width(16), 1);
        assert_eq!(hex_width(17), 2);
        assert_eq!(hex_width(4096), 3);
    }

    #[test]
    fn test_time_bucket() {
        let placer = ShardPlacer::new(ShardingStrategy::ByTimeBucket).unwrap();
        assert!(placer.is_time_based());
        // 2023-11-14T22:13:20Z
        assert_eq!(placer.shard_for(&RecordId::new(), 1_700_000_000_000), "2023-11");
        assert_eq!(placer.shard_for(&RecordId::new(), 0), "1970-01");
    }

    #[test]
    fn test_individual_is_flat() {
        let placer = ShardPlacer::new(ShardingStrategy::Individual).unwrap();
        assert_eq!(placer.shard_for(&RecordId::new(), 0), INDIVIDUAL_DIR);
        assert_eq!(placer.shard_for(&RecordId::new(), 99), INDIVIDUAL_DIR);
    }

    #[test]
    fn test_zero_buckets_rejected() {
        assert!(ShardPlacer::new(ShardingStrategy::ByCountBucket { buckets: 0 }).is_err());
        assert!(ShardPlacer::new(ShardingStrategy::ByHashBucket { buckets: 0 }).is_err());
    }
}
