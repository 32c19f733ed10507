use crate::memo::MemoCache;
use futures::StreamExt;
use reddit_client::ContentSource;
use redmood_core::{
    CoreError, MetricsSink, PostRecord, PostTable, QueryKey, TimeFilter, POST_COUNTER,
    REQUEST_COUNTER,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a community's top listing into a `PostTable`, once per `QueryKey`.
pub struct Fetcher {
    source: Arc<dyn ContentSource>,
    metrics: Arc<dyn MetricsSink>,
    cache: MemoCache<QueryKey, PostTable>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn ContentSource>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            source,
            metrics,
            cache: MemoCache::new(),
        }
    }

    pub async fn fetch(
        &self,
        subreddit: &str,
        time_filter: TimeFilter,
        limit: u32,
    ) -> Result<Arc<PostTable>, CoreError> {
        let key = QueryKey::new(subreddit, time_filter, limit)?;
        self.fetch_key(key).await
    }

    pub async fn fetch_key(&self, key: QueryKey) -> Result<Arc<PostTable>, CoreError> {
        if let Some(table) = self.cache.get(&key) {
            debug!("Post cache hit for {}", key);
            return Ok(table);
        }
        self.cache.get_or_try_init(&key, || self.load(&key)).await
    }

    /// Forgets every fetched table.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    async fn load(&self, key: &QueryKey) -> Result<PostTable, CoreError> {
        info!("Fetching {}", key);
        self.metrics.incr(REQUEST_COUNTER);

        let limit = key.limit() as usize;
        let mut items = self
            .source
            .list_top(key.subreddit(), key.time_filter(), key.limit())
            .take(limit);

        let mut rows = Vec::with_capacity(limit);
        while let Some(item) = items.next().await {
            let raw = item.map_err(|e| fetch_failed(key, e))?;
            self.metrics.incr(POST_COUNTER);
            rows.push(PostRecord::try_from(raw).map_err(|e| fetch_failed(key, e))?);
        }

        info!("Fetched {} posts for {}", rows.len(), key);
        Ok(PostTable::new(key.clone(), rows))
    }
}

fn fetch_failed(key: &QueryKey, cause: CoreError) -> CoreError {
    warn!("Fetching {} failed: {}", key, cause);
    CoreError::fetch_failed(key.subreddit(), cause)
}
