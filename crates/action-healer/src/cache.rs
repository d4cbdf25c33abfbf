//! Healing cache: previously successful replacement locators, keyed by page
//! pattern and step identity.
//!
//! Entries are served only while unexpired and while their running success
//! rate clears the configured minimum. A failing entry stays in the cache so
//! its history is kept, it just stops being served.

use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use l6_observe::now_ms;
use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use soulbrowser_core_types::{ActionDescriptor, ActionKind, LocatorHint};
use soulbrowser_policy_center::validate::validate_cache;
use soulbrowser_policy_center::HealCachePolicy;
use tracing::{debug, info};
use url::Url;

use crate::errors::HealError;
use crate::types::HealingProviderKind;

const WILDCARD: &str = "*";
const HASH_LEN: usize = 16;
const FILE_VERSION: u32 = 1;

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});
static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

fn normalize_segment(segment: &str) -> &str {
    if NUMERIC_SEGMENT.is_match(segment) || UUID_SEGMENT.is_match(segment) {
        WILDCARD
    } else {
        segment
    }
}

fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(normalize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Page URL reduced to a pattern: query and fragment dropped, numeric and
/// UUID path segments replaced with `*`.
pub fn normalize_url_pattern(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) if url.has_host() => {
            let mut pattern = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
            if let Some(port) = url.port() {
                pattern.push_str(&format!(":{}", port));
            }
            pattern.push_str(&normalize_path(url.path()));
            pattern
        }
        _ => {
            let path = raw.split(['?', '#']).next().unwrap_or_default();
            normalize_path(path)
        }
    }
}

/// Truncated SHA-256 of the locator's canonical form; stable across processes.
pub fn locator_hash(locator: Option<&LocatorHint>) -> String {
    let canonical = locator.map(|hint| hint.to_string()).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_LEN);
    hash
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub url_pattern: String,
    pub step_kind: ActionKind,
    pub step_label: String,
    pub locator_hash: String,
}

impl CacheKey {
    pub fn new(
        page_url: &str,
        step_kind: ActionKind,
        step_label: &str,
        locator: Option<&LocatorHint>,
    ) -> Self {
        Self {
            url_pattern: normalize_url_pattern(page_url),
            step_kind,
            step_label: step_label.trim().to_string(),
            locator_hash: locator_hash(locator),
        }
    }

    /// Key for a step's originally recorded locator on the given page.
    pub fn for_step(action: &ActionDescriptor, page_url: &str) -> Self {
        Self::new(page_url, action.kind, &action.label, action.primary_locator())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.url_pattern, self.step_kind, self.step_label, self.locator_hash
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub original: Option<LocatorHint>,
    pub healed: LocatorHint,
    pub confidence: f64,
    pub provider: HealingProviderKind,
    pub created_at_ms: i64,
    pub last_used_ms: i64,
    pub success_count: u32,
    pub failure_count: u32,
    pub expires_at_ms: i64,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        original: Option<LocatorHint>,
        healed: LocatorHint,
        confidence: f64,
        provider: HealingProviderKind,
        ttl: Duration,
    ) -> Self {
        let now = now_ms();
        Self {
            key,
            original,
            healed,
            confidence,
            provider,
            created_at_ms: now,
            last_used_ms: now,
            success_count: 0,
            failure_count: 0,
            expires_at_ms: now.saturating_add(ttl.as_millis() as i64),
        }
    }

    /// Fraction of recorded uses that worked; 1.0 before any evidence.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub healthy: usize,
    pub expired: usize,
    pub hits: u64,
    pub misses: u64,
    pub below_threshold: u64,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

struct CacheInner {
    entries: LruCache<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    below_threshold: u64,
}

pub struct HealingCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    min_success_rate: f64,
}

impl HealingCache {
    pub fn new(policy: &HealCachePolicy) -> Result<Self, HealError> {
        validate_cache(policy)?;
        Ok(Self::build(policy))
    }

    fn build(policy: &HealCachePolicy) -> Self {
        let capacity = NonZeroUsize::new(policy.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                below_threshold: 0,
            }),
            ttl: policy.ttl(),
            min_success_rate: policy.min_success_rate,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn min_success_rate(&self) -> f64 {
        self.min_success_rate
    }

    /// Entry for `key` if it may be reused. Expired entries are dropped;
    /// entries below the success-rate minimum are kept but not served.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = now_ms();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.entries.get_mut(key) else {
            inner.misses += 1;
            return None;
        };
        if entry.is_expired(now) {
            inner.entries.pop(key);
            inner.misses += 1;
            debug!(key = %key, "cache entry expired");
            return None;
        }
        if entry.success_rate() < self.min_success_rate {
            let rate = entry.success_rate();
            inner.below_threshold += 1;
            inner.misses += 1;
            debug!(key = %key, rate, "cache entry below success threshold");
            return None;
        }
        entry.last_used_ms = now;
        let found = entry.clone();
        inner.hits += 1;
        Some(found)
    }

    /// Lookup by the composite key's parts.
    pub fn lookup(
        &self,
        page_url: &str,
        step_kind: ActionKind,
        step_label: &str,
        locator_hash: &str,
    ) -> Option<CacheEntry> {
        self.get(&CacheKey {
            url_pattern: normalize_url_pattern(page_url),
            step_kind,
            step_label: step_label.trim().to_string(),
            locator_hash: locator_hash.to_string(),
        })
    }

    /// Insert or replace; evicts the least recently used entry when full.
    pub fn set(&self, entry: CacheEntry) {
        let key = entry.key.clone();
        if let Some((evicted, _)) = self.inner.lock().entries.push(key.clone(), entry) {
            if evicted != key {
                debug!(evicted = %evicted, "cache full, evicted least recently used entry");
            }
        }
    }

    /// Store a fresh healing result. When the key already holds a live entry
    /// for the same healed locator, its outcome history and creation time are
    /// kept and only confidence, provider, last use and expiry are refreshed.
    pub fn upsert(&self, entry: CacheEntry) {
        let now = now_ms();
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.get_mut(&entry.key) {
            if existing.healed == entry.healed && !existing.is_expired(now) {
                existing.confidence = entry.confidence;
                existing.provider = entry.provider;
                existing.last_used_ms = entry.last_used_ms;
                existing.expires_at_ms = entry.expires_at_ms;
                debug!(
                    key = %entry.key,
                    successes = existing.success_count,
                    failures = existing.failure_count,
                    "cache entry refreshed"
                );
                return;
            }
        }
        drop(inner);
        self.set(entry);
    }

    /// Count a confirmed success and extend the entry's lifetime.
    pub fn record_success(&self, key: &CacheKey) -> bool {
        let now = now_ms();
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.success_count = entry.success_count.saturating_add(1);
                entry.last_used_ms = now;
                entry.expires_at_ms = now.saturating_add(self.ttl.as_millis() as i64);
                true
            }
            None => false,
        }
    }

    /// Count a confirmed failure. The entry is kept for its history.
    pub fn record_failure(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.peek_mut(key) {
            Some(entry) => {
                entry.failure_count = entry.failure_count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Raw entry regardless of expiry or health, without touching recency.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.lock().entries.peek(key).cloned()
    }

    pub fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.lock().entries.pop(key)
    }

    pub fn purge_expired(&self) -> usize {
        let now = now_ms();
        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let now = now_ms();
        let inner = self.inner.lock();
        let mut stats = CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            below_threshold: inner.below_threshold,
            ..CacheStats::default()
        };
        for (_, entry) in inner.entries.iter() {
            if entry.is_expired(now) {
                stats.expired += 1;
            } else if entry.success_rate() >= self.min_success_rate {
                stats.healthy += 1;
            }
        }
        stats
    }

    /// Write every entry, least recently used first.
    pub fn save(&self, path: &Path) -> Result<(), HealError> {
        let entries: Vec<CacheEntry> = {
            let inner = self.inner.lock();
            inner.entries.iter().rev().map(|(_, entry)| entry.clone()).collect()
        };
        let file = CacheFile {
            version: FILE_VERSION,
            entries,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|err| HealError::Persist(err.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| HealError::Persist(err.to_string()))?;
            }
        }
        fs::write(path, json).map_err(|err| HealError::Persist(err.to_string()))?;
        debug!(path = %path.display(), entries = file.entries.len(), "healing cache saved");
        Ok(())
    }

    /// Merge entries from a saved file; returns how many were loaded.
    /// A missing file loads nothing.
    pub fn load(&self, path: &Path) -> Result<usize, HealError> {
        if !path.exists() {
            return Ok(0);
        }
        let raw = fs::read_to_string(path).map_err(|err| HealError::Persist(err.to_string()))?;
        let file: CacheFile =
            serde_json::from_str(&raw).map_err(|err| HealError::Persist(err.to_string()))?;
        if file.version != FILE_VERSION {
            return Err(HealError::Persist(format!(
                "unsupported cache file version {}",
                file.version
            )));
        }
        let count = file.entries.len();
        let mut inner = self.inner.lock();
        for entry in file.entries {
            inner.entries.push(entry.key.clone(), entry);
        }
        info!(path = %path.display(), entries = count, "healing cache loaded");
        Ok(count)
    }

    pub fn open(policy: &HealCachePolicy, path: &Path) -> Result<Self, HealError> {
        let cache = Self::new(policy)?;
        cache.load(path)?;
        Ok(cache)
    }
}

impl Default for HealingCache {
    fn default() -> Self {
        Self::build(&HealCachePolicy::default())
    }
}
