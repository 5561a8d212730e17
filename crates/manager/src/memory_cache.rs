//! In-memory cache resource
//!
//! The reference cache implementation: a TTL-aware map. Expired entries
//! are dropped lazily on access.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use sluice_component::{Cache, Error, Result};

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// TTL-aware in-memory cache
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    default_ttl: Option<Duration>,
}

impl MemoryCache {
    /// Create a cache whose entries never expire by default
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    fn expires_at(&self, ttl: Option<Duration>) -> Option<Instant> {
        ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut entries = self.entries.lock().expect("cache poisoned");
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value,
            expires_at: self.expires_at(ttl),
        };
        self.entries
            .lock()
            .expect("cache poisoned")
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn add(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.lock().expect("cache poisoned");
        if let Some(existing) = entries.get(key) {
            if !existing.expired() {
                return Err(Error::KeyAlreadyExists);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: self.expires_at(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.entries.lock().expect("cache poisoned").remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::KeyNotFound),
        }
    }
}
