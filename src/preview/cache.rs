use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Key-value store for resolved previews.
///
/// `Some(None)` from [`get`](PreviewCache::get) is a cached miss: the track
/// was looked up and nothing was found.
#[async_trait]
pub trait PreviewCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Option<String>>;

    async fn put(&self, key: &str, value: Option<String>, ttl: Duration);
}

/// In-process cache. Lost on restart, which is fine for previews.
#[derive(Default)]
pub struct MemoryPreviewCache {
    entries: RwLock<HashMap<String, (Instant, Option<String>)>>,
}

impl MemoryPreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PreviewCache for MemoryPreviewCache {
    async fn get(&self, key: &str) -> Option<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((expires, value)) if Instant::now() < *expires => Some(value.clone()),
            _ => None,
        }
    }

    async fn put(&self, key: &str, value: Option<String>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        if entries.len() >= 50_000 {
            entries.retain(|_, (expires, _)| now < *expires);
        }
        entries.insert(key.to_string(), (now + ttl, value));
    }
}
