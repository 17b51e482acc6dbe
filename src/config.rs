//! Centralized configuration and builder for GenCache.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - CacheConfig::from_env() reads GENCACHE_* variables; unknown/invalid values keep defaults.
//! - StoreBuilder returns a CacheConfig or a ready ContentStore.
//!
//! Scavenger triggers:
//! - collect_auto + collect_min_gen_delta: a pin that sees `live_gen - floor_gen > delta`
//!   requests a collect (background scavenger if attached, otherwise a one-shot thread).
//! - collect_every_writes: a commit that pushes the write counter over the threshold
//!   requests a collect.
//! - collect_interval_ms: period of the background Scavenger thread.
//!
//! Safety valve:
//! - max_chain_depth caps retained versions per key (0 = unlimited, minimum 2).

use std::fmt;
use std::hash::Hash;

use crate::store::ContentStore;

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        let s = v.trim().to_ascii_lowercase();
        s == "1" || s == "true" || s == "yes" || s == "on"
    })
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
}

// A chain of one version would leave no room for the committed value under
// a new write; the smallest useful cap is 2.
fn clamp_chain_depth(depth: usize) -> usize {
    if depth == 1 {
        2
    } else {
        depth
    }
}

/// Top-level configuration of a ContentStore.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Request a collect from `pin()` when generations pile up.
    /// Env: GENCACHE_COLLECT_AUTO (default true)
    pub collect_auto: bool,

    /// Generation distance (live - floor) above which `pin()` requests a collect.
    /// Env: GENCACHE_COLLECT_MIN_GEN_DELTA (default 8)
    pub collect_min_gen_delta: i64,

    /// Writes since the last collect that make a commit request one (0 disables).
    /// Env: GENCACHE_COLLECT_EVERY_WRITES (default 4096)
    pub collect_every_writes: u64,

    /// Background scavenger period in milliseconds.
    /// Env: GENCACHE_COLLECT_INTERVAL_MS (default 1000)
    pub collect_interval_ms: u64,

    /// Per-key cap on retained versions (0 = unlimited, 1 is raised to 2).
    /// Env: GENCACHE_MAX_CHAIN_DEPTH (default 64)
    pub max_chain_depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            collect_auto: true,
            collect_min_gen_delta: 8,
            collect_every_writes: 4096,
            collect_interval_ms: 1000,
            max_chain_depth: 64,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(on) = env_bool("GENCACHE_COLLECT_AUTO") {
            cfg.collect_auto = on;
        }
        if let Some(n) = env_parse::<i64>("GENCACHE_COLLECT_MIN_GEN_DELTA") {
            cfg.collect_min_gen_delta = n.max(0);
        }
        if let Some(n) = env_parse::<u64>("GENCACHE_COLLECT_EVERY_WRITES") {
            cfg.collect_every_writes = n;
        }
        if let Some(n) = env_parse::<u64>("GENCACHE_COLLECT_INTERVAL_MS") {
            cfg.collect_interval_ms = n;
        }
        if let Some(n) = env_parse::<usize>("GENCACHE_MAX_CHAIN_DEPTH") {
            cfg.max_chain_depth = clamp_chain_depth(n);
        }

        cfg
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_collect_auto(mut self, on: bool) -> Self {
        self.collect_auto = on;
        self
    }

    pub fn with_collect_min_gen_delta(mut self, delta: i64) -> Self {
        self.collect_min_gen_delta = delta.max(0);
        self
    }

    pub fn with_collect_every_writes(mut self, writes: u64) -> Self {
        self.collect_every_writes = writes;
        self
    }

    pub fn with_collect_interval_ms(mut self, ms: u64) -> Self {
        self.collect_interval_ms = ms;
        self
    }

    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = clamp_chain_depth(depth);
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheConfig {{ \
             collect_auto: {}, \
             collect_min_gen_delta: {}, \
             collect_every_writes: {}, \
             collect_interval_ms: {}, \
             max_chain_depth: {} \
             }}",
            self.collect_auto,
            self.collect_min_gen_delta,
            if self.collect_every_writes == 0 {
                "off".to_string()
            } else {
                self.collect_every_writes.to_string()
            },
            self.collect_interval_ms,
            if self.max_chain_depth == 0 {
                "unlimited".to_string()
            } else {
                self.max_chain_depth.to_string()
            },
        )
    }
}

/// Builder that produces a CacheConfig or a ContentStore.
#[derive(Clone, Debug)]
pub struct StoreBuilder {
    cfg: CacheConfig,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: CacheConfig::from_env(),
        }
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: CacheConfig::default(),
        }
    }

    pub fn collect_auto(mut self, on: bool) -> Self {
        self.cfg.collect_auto = on;
        self
    }

    pub fn collect_min_gen_delta(mut self, delta: i64) -> Self {
        self.cfg.collect_min_gen_delta = delta.max(0);
        self
    }

    pub fn collect_every_writes(mut self, writes: u64) -> Self {
        self.cfg.collect_every_writes = writes;
        self
    }

    pub fn collect_interval_ms(mut self, ms: u64) -> Self {
        self.cfg.collect_interval_ms = ms;
        self
    }

    pub fn max_chain_depth(mut self, depth: usize) -> Self {
        self.cfg.max_chain_depth = clamp_chain_depth(depth);
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build_config(self) -> CacheConfig {
        self.cfg
    }

    /// Empty store at generation 0.
    pub fn build<K, V>(self) -> ContentStore<K, V>
    where
        K: Eq + Hash + Clone,
    {
        ContentStore::with_config(self.cfg)
    }

    /// Store whose generation 0 is populated from `items` (baseline load,
    /// before any reader can pin).
    pub fn build_with_baseline<K, V, I>(self, items: I) -> ContentStore<K, V>
    where
        K: Eq + Hash + Clone,
        I: IntoIterator<Item = (K, V)>,
    {
        ContentStore::with_baseline(self.cfg, items)
    }
}
