use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::debug;

/// Entrada del cache con su temporizador de expulsión
#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    /// Identifica la escritura que programó `eviction`
    generation: u64,
    eviction: JoinHandle<()>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

type Entries<V> = DashMap<String, CacheEntry<V>>;

/// Keyed store of opaque values with per-entry expiry.
///
/// Writes replace any previous entry for the same key atomically: the old
/// eviction timer is cancelled before the new one is scheduled, and every timer
/// only removes the entry written by the same `set` call. A refreshed entry can
/// therefore never be deleted by the timer of the value it replaced.
///
/// Must be constructed inside a Tokio runtime.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Arc<Entries<V>>,
    default_ttl: Duration,
    generation: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates the cache and starts its background sweep.
    pub fn new(default_ttl: Duration, sweep_interval: Duration) -> Self {
        let entries = Arc::new(DashMap::new());
        let sweeper = spawn_sweeper(Arc::downgrade(&entries), sweep_interval);

        debug!(
            "🗄️ Cache TTL iniciado (ttl={:?}, barrido cada {:?})",
            default_ttl, sweep_interval
        );

        Self {
            entries,
            default_ttl,
            generation: AtomicU64::new(0),
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Inserts or replaces `key` using the default TTL. Returns the key.
    pub fn set(&self, key: impl Into<String>, value: V) -> String {
        self.set_with_ttl(key, value, self.default_ttl)
    }

    /// Inserts or replaces `key`, expiring exactly `ttl` from now.
    ///
    /// Calling this again for a live key is how an entry's life is extended.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) -> String {
        let key = key.into();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + ttl;

        // El shard queda bloqueado durante el reemplazo: nadie ve ambas entradas
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get().eviction.abort();
                let eviction = self.schedule_eviction(&key, generation, ttl);
                occupied.insert(CacheEntry {
                    value,
                    expires_at,
                    generation,
                    eviction,
                });
            }
            Entry::Vacant(vacant) => {
                let eviction = self.schedule_eviction(&key, generation, ttl);
                vacant.insert(CacheEntry {
                    value,
                    expires_at,
                    generation,
                    eviction,
                });
            }
        }

        key
    }

    /// Returns the value if present and not yet expired.
    ///
    /// An expired entry found here is deleted immediately.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }

        if remove_expired(&self.entries, key, now) {
            debug!("⏰ Entrada expirada removida al leer: {}", key);
        }
        None
    }

    /// Cancels the pending eviction and removes the entry.
    ///
    /// Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                entry.eviction.abort();
                true
            }
            None => false,
        }
    }

    /// True when a live (unexpired) entry exists for `key`.
    #[allow(dead_code)]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs one sweep pass now and returns how many entries were removed.
    #[allow(dead_code)]
    pub fn sweep(&self) -> usize {
        sweep_expired(&self.entries)
    }

    /// Stops the background sweep and drops every entry, cancelling their timers.
    pub fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        self.clear();
        debug!("🛑 Cache TTL detenido");
    }

    fn clear(&self) {
        self.entries.retain(|_, entry| {
            entry.eviction.abort();
            false
        });
    }

    fn schedule_eviction(&self, key: &str, generation: u64, ttl: Duration) -> JoinHandle<()> {
        let entries = Arc::downgrade(&self.entries);
        let key = key.to_owned();

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;

            let Some(entries) = entries.upgrade() else {
                return;
            };
            // Solo la escritura que programó este temporizador puede ser removida
            if entries
                .remove_if(&key, |_, entry| entry.generation == generation)
                .is_some()
            {
                debug!("⌛ Entrada expulsada por TTL: {}", key);
            }
        })
    }

    #[cfg(test)]
    fn cancel_eviction(&self, key: &str) {
        if let Some(entry) = self.entries.get(key) {
            entry.eviction.abort();
        }
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
        for entry in self.entries.iter() {
            entry.eviction.abort();
        }
    }
}

fn spawn_sweeper<V>(entries: Weak<Entries<V>>, sweep_interval: Duration) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + sweep_interval, sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(entries) = entries.upgrade() else {
                break;
            };
            let removed = sweep_expired(&entries);
            if removed > 0 {
                debug!("🧹 Barrido del cache: {} entradas expiradas removidas", removed);
            }
        }
    })
}

fn sweep_expired<V>(entries: &Entries<V>) -> usize {
    let now = Instant::now();
    let expired: Vec<String> = entries
        .iter()
        .filter(|entry| entry.value().is_expired(now))
        .map(|entry| entry.key().clone())
        .collect();

    expired
        .iter()
        .filter(|key| remove_expired(entries, key, now))
        .count()
}

/// Removes `key` only if it is still expired at `now`; a concurrent refresh wins.
fn remove_expired<V>(entries: &Entries<V>, key: &str, now: Instant) -> bool {
    match entries.remove_if(key, |_, entry| entry.is_expired(now)) {
        Some((_, entry)) => {
            entry.eviction.abort();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    const TTL: Duration = Duration::from_millis(100);
    const SWEEP: Duration = Duration::from_millis(50);

    fn cache() -> TtlCache<&'static str> {
        TtlCache::new(TTL, Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn get_returns_value_before_ttl() {
        let cache = cache();
        cache.set("k", "v");

        advance(Duration::from_millis(99)).await;
        assert_eq!(cache.get("k"), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn get_returns_none_at_and_after_ttl() {
        let cache = cache();
        cache.set("k", "v");

        sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_expiry_without_timer_or_sweep() {
        let cache = cache();
        cache.set("k", "v");
        cache.cancel_eviction("k");

        advance(TTL).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn set_returns_key() {
        let cache = cache();
        assert_eq!(cache.set("1-2-3", "v"), "1-2-3");
    }

    #[tokio::test(start_paused = true)]
    async fn replace_keeps_single_entry_and_new_expiry() {
        let cache = cache();
        cache.set_with_ttl("k", "v1", Duration::from_millis(100));
        cache.set_with_ttl("k", "v2", Duration::from_millis(500));

        assert_eq!(cache.len(), 1);

        // El temporizador de v1 no debe borrar v2
        sleep(Duration::from_millis(200)).await;
        assert_eq!(cache.get("k"), Some("v2"));

        sleep(Duration::from_millis(300)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_extends_life() {
        let cache = cache();
        cache.set("k", "v");

        sleep(Duration::from_millis(80)).await;
        cache.set("k", "v");

        sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get("k"), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_is_idempotent() {
        let cache = cache();
        assert!(!cache.delete("missing"));

        cache.set("k", "v");
        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_then_set_is_not_evicted_by_old_timer() {
        let cache = cache();
        cache.set_with_ttl("k", "old", Duration::from_millis(50));
        cache.delete("k");
        cache.set_with_ttl("k", "new", Duration::from_millis(200));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get("k"), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_reclaims_entries_never_read() {
        let cache: TtlCache<&'static str> = TtlCache::new(TTL, SWEEP);
        cache.set("abandoned", "v");
        cache.set_with_ttl("fresh", "v", Duration::from_secs(10));
        cache.cancel_eviction("abandoned");

        // Expira en t=100; el barrido de t=150 debe reclamarla
        sleep(TTL + SWEEP + Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_sweep_counts_removed() {
        let cache = cache();
        cache.set("a", "v");
        cache.set("b", "v");
        cache.set_with_ttl("c", "v", Duration::from_secs(5));
        cache.cancel_eviction("a");
        cache.cancel_eviction("b");

        advance(TTL).await;
        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_clears_entries() {
        let cache = cache();
        cache.set("a", "v");
        cache.set("b", "v");

        cache.shutdown();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }
}
