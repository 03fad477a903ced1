//! A read-through memo for occurrence listings.
//!
//! Listings are pure functions of the stored rows, so an entry stays valid
//! until the user writes something. Every write path calls
//! [OccurrenceCache::invalidate_user] before responding.
//!
//! A listing computed while a write was in flight must not outlive that
//! write's invalidation. Readers take the user's [Generation] before reading
//! the store and pass it to [OccurrenceCache::insert], which drops the listing
//! if the user has been invalidated since.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::{
    database_id::UserId,
    date::MonthPeriod,
    transaction::{OccurrenceView, TransactionKind},
};

/// How long entries live and how many are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entries older than this are treated as missing.
    pub ttl: Duration,
    /// The maximum number of entries. Zero disables the cache.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            capacity: 100,
        }
    }
}

/// Identifies one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The owner of the listed rows.
    pub user_id: UserId,
    /// Incomes or expenses.
    pub kind: TransactionKind,
    /// The listed month, or `None` for every stored row.
    pub period: Option<MonthPeriod>,
    /// Whether only rows linked to a template are listed.
    pub fixed_only: bool,
}

/// How many times a user's entries have been invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Debug)]
struct CacheEntry {
    views: Vec<OccurrenceView>,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    generations: HashMap<UserId, u64>,
}

impl CacheState {
    fn generation(&self, user_id: UserId) -> Generation {
        Generation(self.generations.get(&user_id).copied().unwrap_or_default())
    }
}

/// Caches merged occurrence listings per user, kind, month and filter.
///
/// Clones share the same entries.
#[derive(Debug, Clone)]
pub struct OccurrenceCache {
    config: CacheConfig,
    state: Arc<Mutex<CacheState>>,
}

impl OccurrenceCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    // A panic while holding the lock cannot leave an entry half written, so
    // the state is still usable.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached listing for `key`, unless it is missing or expired.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<OccurrenceView>> {
        let mut state = self.lock();

        match state.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.config.ttl => {
                Some(entry.views.clone())
            }
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// The current generation of `user_id`'s entries.
    ///
    /// Take it before reading the store for a listing that will be inserted.
    pub fn generation(&self, user_id: UserId) -> Generation {
        self.lock().generation(user_id)
    }

    /// Store the listing for `key`, evicting the oldest entry when full.
    ///
    /// The listing is dropped if the user was invalidated after `generation`
    /// was taken, since it may predate that write.
    pub fn insert(&self, key: CacheKey, generation: Generation, views: Vec<OccurrenceView>) {
        if self.config.capacity == 0 {
            return;
        }

        let mut state = self.lock();

        if state.generation(key.user_id) != generation {
            tracing::debug!(?key, "dropping listing read before an invalidation");
            return;
        }

        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| *key);

            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                views,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every entry belonging to `user_id`.
    ///
    /// Listings read before this call can no longer be inserted.
    pub fn invalidate_user(&self, user_id: UserId) {
        let mut state = self.lock();

        state.entries.retain(|key, _| key.user_id != user_id);
        *state.generations.entry(user_id).or_default() += 1;
    }

    /// The number of cached listings, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no listing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{date::MonthPeriod, transaction::TransactionKind};

    use super::{CacheConfig, CacheKey, OccurrenceCache};

    fn key(user_id: i64, month: u8) -> CacheKey {
        CacheKey {
            user_id,
            kind: TransactionKind::Income,
            period: Some(MonthPeriod::new(2024, month).unwrap()),
            fixed_only: false,
        }
    }

    #[test]
    fn returns_inserted_entries() {
        let cache = OccurrenceCache::new(CacheConfig::default());

        cache.insert(key(1, 1), cache.generation(1), vec![]);

        assert_eq!(cache.get(&key(1, 1)), Some(vec![]));
        assert_eq!(cache.get(&key(1, 2)), None);
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = OccurrenceCache::new(CacheConfig {
            ttl: Duration::ZERO,
            capacity: 10,
        });

        cache.insert(key(1, 1), cache.generation(1), vec![]);

        assert_eq!(cache.get(&key(1, 1)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_oldest_entry_when_full() {
        let cache = OccurrenceCache::new(CacheConfig {
            ttl: Duration::from_secs(60),
            capacity: 2,
        });

        cache.insert(key(1, 1), cache.generation(1), vec![]);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(key(1, 2), cache.generation(1), vec![]);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(key(1, 3), cache.generation(1), vec![]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(1, 1)), None);
        assert!(cache.get(&key(1, 3)).is_some());
    }

    #[test]
    fn invalidate_user_only_drops_that_user() {
        let cache = OccurrenceCache::new(CacheConfig::default());
        cache.insert(key(1, 1), cache.generation(1), vec![]);
        cache.insert(key(1, 2), cache.generation(1), vec![]);
        cache.insert(key(2, 1), cache.generation(2), vec![]);

        cache.invalidate_user(1);

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(2, 1)).is_some());
    }

    #[test]
    fn zero_capacity_disables_cache() {
        let cache = OccurrenceCache::new(CacheConfig {
            ttl: Duration::from_secs(60),
            capacity: 0,
        });

        cache.insert(key(1, 1), cache.generation(1), vec![]);

        assert!(cache.is_empty());
    }

    #[test]
    fn listing_read_before_invalidation_is_not_stored() {
        let cache = OccurrenceCache::new(CacheConfig::default());
        let generation = cache.generation(1);

        cache.invalidate_user(1);
        cache.insert(key(1, 1), generation, vec![]);

        assert_eq!(cache.get(&key(1, 1)), None);

        cache.insert(key(1, 1), cache.generation(1), vec![]);
        assert!(cache.get(&key(1, 1)).is_some());
    }

    #[test]
    fn invalidation_does_not_affect_other_users_generations() {
        let cache = OccurrenceCache::new(CacheConfig::default());
        let generation = cache.generation(2);

        cache.invalidate_user(1);
        cache.insert(key(2, 1), generation, vec![]);

        assert!(cache.get(&key(2, 1)).is_some());
    }
}
