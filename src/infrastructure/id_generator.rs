// ID Generator - Snowflake-like 64-bit row ids
// Layout: [timestamp:42][shard_id:10][sequence:12]

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::current_time_millis;
use crate::error::{AppError, AppResult};

const SHARD_LIMIT: u16 = 1024;
const SEQUENCE_MASK: u64 = 0xFFF;
const TIMESTAMP_MASK: u64 = 0x3FF_FFFF_FFFF;

/// Generates unique, time-ordered ids for every row the core writes.
/// 1024 shards, 4096 ids per millisecond per shard.
#[derive(Debug)]
pub struct IdGenerator {
    shard_id: u16,
    /// Packed `(last_timestamp << 12) | sequence`, swapped atomically.
    state: AtomicU64,
}

impl IdGenerator {
    pub fn new(shard_id: u16) -> AppResult<Self> {
        if shard_id >= SHARD_LIMIT {
            return Err(AppError::ConfigurationError(format!(
                "Shard ID must be less than {}, got {}",
                SHARD_LIMIT, shard_id
            )));
        }

        Ok(Self {
            shard_id,
            state: AtomicU64::new(0),
        })
    }

    pub fn next_id(&self) -> i64 {
        loop {
            let now = (current_time_millis().max(0) as u64) & TIMESTAMP_MASK;
            let prev = self.state.load(Ordering::Acquire);
            let last_ts = prev >> 12;
            let seq = prev & SEQUENCE_MASK;

            let (ts, next_seq) = if now > last_ts {
                (now, 0)
            } else if seq < SEQUENCE_MASK {
                // same millisecond, or the clock stepped back: stay on last_ts
                (last_ts, seq + 1)
            } else {
                std::hint::spin_loop();
                continue;
            };

            let next = (ts << 12) | next_seq;
            if self
                .state
                .compare_exchange(prev, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return ((ts << 22) | ((self.shard_id as u64) << 12) | next_seq) as i64;
            }
        }
    }

    pub fn extract_shard_id(id: i64) -> u16 {
        ((id as u64) >> 12 & 0x3FF) as u16
    }

    pub fn extract_timestamp(id: i64) -> u64 {
        (id as u64) >> 22
    }

    pub fn shard_id(&self) -> u16 {
        self.shard_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_id_generation() {
        let generator = IdGenerator::new(123).unwrap();

        let ids: Vec<i64> = (0..5000).map(|_| generator.next_id()).collect();

        // strictly increasing, so unique
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(ids.iter().all(|id| *id > 0));
        assert!(ids
            .iter()
            .all(|id| IdGenerator::extract_shard_id(*id) == 123));
    }

    #[test]
    fn test_shard_limit() {
        assert!(IdGenerator::new(1023).is_ok());
        assert!(matches!(
            IdGenerator::new(1024),
            Err(AppError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_concurrent_generation_is_unique() {
        let generator = Arc::new(IdGenerator::new(7).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let g = generator.clone();
                std::thread::spawn(move || (0..2000).map(|_| g.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8000);
    }
}
