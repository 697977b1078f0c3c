//! In-memory implementation of the shared store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{SharedStore, StoreResult};

/// Shared store holding every key's member collection in process memory.
///
/// One mutex acquisition spans each batched operation, which gives the
/// same atomicity the Redis transaction path provides. Suitable for tests
/// and for single-process deployments; state is lost on restart and never
/// shared across instances.
///
/// Key expiry is accepted but not emulated: score-based pruning alone ages
/// entries out, which is the only mechanism the limiters depend on for
/// correctness.
#[derive(Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<String, Vec<(String, i64)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys. Primarily useful for tests.
    pub fn key_count(&self) -> usize {
        self.sets.lock().len()
    }

    /// Number of members under a key. Primarily useful for tests.
    pub fn member_count(&self, key: &str) -> usize {
        self.sets.lock().get(key).map_or(0, |members| members.len())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    fn is_ready(&self) -> bool {
        true
    }

    async fn record_attempt(
        &self,
        key: &str,
        boundary: i64,
        member: &str,
        score: i64,
        _ttl: Duration,
    ) -> StoreResult<u64> {
        let mut sets = self.sets.lock();
        let members = sets.entry(key.to_string()).or_default();

        members.retain(|(_, s)| *s > boundary);
        let pre_count = members.len() as u64;

        // Re-adding an existing member updates its score, matching
        // ordered-set semantics.
        match members.iter_mut().find(|(m, _)| m == member) {
            Some(slot) => slot.1 = score,
            None => members.push((member.to_string(), score)),
        }

        Ok(pre_count)
    }

    async fn remove_member(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut sets = self.sets.lock();
        if let Some(members) = sets.get_mut(key) {
            members.retain(|(m, _)| m != member);
            if members.is_empty() {
                sets.remove(key);
            }
        }
        Ok(())
    }

    async fn oldest_score(&self, key: &str) -> StoreResult<Option<i64>> {
        let sets = self.sets.lock();
        Ok(sets
            .get(key)
            .and_then(|members| members.iter().map(|(_, s)| *s).min()))
    }

    async fn prune_and_count(&self, key: &str, boundary: i64) -> StoreResult<u64> {
        let mut sets = self.sets.lock();
        match sets.get_mut(key) {
            Some(members) => {
                members.retain(|(_, s)| *s > boundary);
                if members.is_empty() {
                    // An emptied collection disappears, as it would in Redis.
                    sets.remove(key);
                    Ok(0)
                } else {
                    Ok(members.len() as u64)
                }
            }
            None => Ok(0),
        }
    }

    async fn remove_key(&self, key: &str) -> StoreResult<()> {
        self.sets.lock().remove(key);
        Ok(())
    }

    async fn remove_matching(&self, pattern: &str) -> StoreResult<u64> {
        let mut sets = self.sets.lock();
        let before = sets.len();

        // Only the trailing-wildcard form used for namespace clearing is
        // supported; anything else is treated as an exact key.
        match pattern.strip_suffix('*') {
            Some(prefix) => sets.retain(|key, _| !key.starts_with(prefix)),
            None => {
                sets.remove(pattern);
            }
        }

        Ok((before - sets.len()) as u64)
    }
}
