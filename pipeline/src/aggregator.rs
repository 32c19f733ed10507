use crate::memo::MemoCache;
use crate::progress::{ProgressObserver, ScoringRun};
use emotion_classifier::EmotionClassifier;
use redmood_core::{
    CoreError, MetricsSink, PostTable, SentimentTable, TimerScope, SENTIMENT_TIMER,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Scores post tables into sentiment tables, once per table.
pub struct SentimentAggregator {
    classifier: Arc<dyn EmotionClassifier>,
    metrics: Arc<dyn MetricsSink>,
    cache: MemoCache<Uuid, SentimentTable>,
}

impl SentimentAggregator {
    pub fn new(classifier: Arc<dyn EmotionClassifier>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            classifier,
            metrics,
            cache: MemoCache::new(),
        }
    }

    /// A fresh, uncached scoring run over `posts`.
    pub fn scoring_run<'a>(&'a self, posts: &'a PostTable) -> ScoringRun<'a> {
        ScoringRun::new(self.classifier.as_ref(), posts)
    }

    pub async fn aggregate(
        &self,
        posts: &PostTable,
        observer: &dyn ProgressObserver,
    ) -> Result<Arc<SentimentTable>, CoreError> {
        let id = posts.id();
        if let Some(table) = self.cache.get(&id) {
            debug!("Sentiment cache hit for table {}", id);
            return Ok(table);
        }
        self.cache
            .get_or_try_init(&id, || async move { self.score_all(posts, observer) })
            .await
    }

    pub fn invalidate(&self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn score_all(
        &self,
        posts: &PostTable,
        observer: &dyn ProgressObserver,
    ) -> Result<SentimentTable, CoreError> {
        info!("Scoring {} posts for {}", posts.len(), posts.query());
        let timer = TimerScope::start(self.metrics.as_ref(), SENTIMENT_TIMER);

        let mut run = self.scoring_run(posts);
        for progress in run.by_ref() {
            observer.on_progress(progress?);
        }
        let table = run.finish()?;

        info!("Scored {} posts in {:?}", table.len(), timer.elapsed());
        Ok(table)
    }
}
