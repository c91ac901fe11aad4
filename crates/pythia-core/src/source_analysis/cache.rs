// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Parse result caching.
//!
//! Editors re-request parses of the same buffer content constantly (every
//! completion, every hover). The cache keys results by a fast content hash
//! of the source plus the parse options that shape the tree, holds a bounded
//! number of entries with least-recently-used eviction, and drops entries
//! older than a staleness window on access.
//!
//! The cache is an explicitly constructed value handed to [`parse`]; there
//! is no process-global instance, so tests and independent services build
//! their own.
//!
//! [`parse`]: super::parse

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHasher};

use crate::ast::Module;

use super::error::Diagnostic;
use super::parser::{ErrorMode, ParseOptions};

/// Default entry cap.
pub const DEFAULT_CAPACITY: usize = 200;

/// Default staleness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry {
    module: Arc<Module>,
    diagnostics: Vec<Diagnostic>,
    inserted: Instant,
}

struct Inner {
    entries: FxHashMap<u64, Entry>,
    /// Keys oldest-first; an access moves its key to the back.
    order: Vec<u64>,
}

/// A bounded, time-limited cache of parse results, safe to share across
/// threads.
pub struct ParseCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl ParseCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner {
                entries: FxHashMap::default(),
                order: Vec::new(),
            }),
        }
    }

    /// Hashes source content together with the option fields that change
    /// the shape of the parse tree.
    #[must_use]
    pub fn content_hash(source: &str, options: &ParseOptions) -> u64 {
        let mut hasher = FxHasher::default();
        source.hash(&mut hasher);
        matches!(options.error_mode, ErrorMode::Recover).hash(&mut hasher);
        options.approximate.hash(&mut hasher);
        options.max_depth.hash(&mut hasher);
        options.cursor.hash(&mut hasher);
        hasher.finish()
    }

    /// Looks up a parse result, refreshing its recency. Entries older than
    /// the staleness window are dropped on the spot.
    #[must_use]
    pub fn get(&self, hash: u64) -> Option<(Arc<Module>, Vec<Diagnostic>)> {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let stale = match inner.entries.get(&hash) {
            Some(entry) => entry.inserted.elapsed() > self.ttl,
            None => return None,
        };
        if stale {
            inner.entries.remove(&hash);
            inner.order.retain(|&k| k != hash);
            tracing::debug!(hash, "parse cache entry expired");
            return None;
        }
        inner.order.retain(|&k| k != hash);
        inner.order.push(hash);
        let entry = inner.entries.get(&hash)?;
        tracing::debug!(hash, "parse cache hit");
        Some((Arc::clone(&entry.module), entry.diagnostics.clone()))
    }

    /// Stores a parse result, evicting the least recently used entries when
    /// over capacity.
    pub fn put(&self, hash: u64, module: Arc<Module>, diagnostics: Vec<Diagnostic>) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.entries.insert(
            hash,
            Entry {
                module,
                diagnostics,
                inserted: Instant::now(),
            },
        ).is_none()
        {
            inner.order.push(hash);
        } else {
            inner.order.retain(|&k| k != hash);
            inner.order.push(hash);
        }
        while inner.entries.len() > self.capacity {
            let oldest = inner.order.remove(0);
            inner.entries.remove(&oldest);
            tracing::debug!(hash = oldest, "parse cache eviction");
        }
    }

    /// Drops every entry.
    pub fn purge(&self) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.entries.clear();
        inner.order.clear();
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.entries.len(),
            Err(poisoned) => poisoned.into_inner().entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl std::fmt::Debug for ParseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish()
    }
}
