//! # Cache Module
//!
//! Memory-resident keyed cache with per-entry time-to-live.
//!
//! Every entry owns a one-shot eviction timer scheduled on the Tokio runtime.
//! A background sweep runs on a fixed interval and removes anything whose
//! deadline has passed, so entries nobody reads again are reclaimed even if a
//! timer misbehaves. Reads check the deadline themselves: a caller never sees a
//! logically expired value.
//!
//! ## Lifecycle
//!
//! The cache is an owned component. It is created at process start (inside a
//! Tokio runtime, because construction spawns the sweep task) and torn down with
//! [`TtlCache::shutdown`] or by dropping it. Neither the sweep nor the eviction
//! timers keep the map alive: they hold weak references only.
//!
//! ## Configuration
//!
//! ```env
//! SESSION_TTL_MS=180000    # default entry lifetime
//! SESSION_SWEEP_MS=30000   # background sweep interval
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use crate::cache::TtlCache;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(180), Duration::from_secs(30));
//!
//! let key = cache.set("guild-user-message", "payload".to_string());
//! assert_eq!(cache.get(&key).as_deref(), Some("payload"));
//!
//! // Extend the lifetime while the entry is in active use
//! cache.set_with_ttl(key.clone(), "payload".to_string(), Duration::from_secs(300));
//!
//! assert!(cache.delete(&key));
//! assert!(!cache.delete(&key));
//! # }
//! ```

pub mod ttl_cache;

pub use ttl_cache::TtlCache;

use std::time::Duration;

/// Default lifetime for an entry when the caller does not override it.
pub const DEFAULT_TTL: Duration = Duration::from_millis(180_000);

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(30_000);
