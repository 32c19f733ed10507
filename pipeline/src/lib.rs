pub mod aggregator;
pub mod fetcher;
pub mod memo;
pub mod progress;
pub mod views;

pub use aggregator::SentimentAggregator;
pub use fetcher::Fetcher;
pub use memo::MemoCache;
pub use progress::{Progress, ProgressObserver, ScoringRun, Silent};
pub use views::ViewSet;

use emotion_classifier::EmotionClassifier;
use reddit_client::ContentSource;
use redmood_core::{CoreError, MetricsSink, PostTable, SentimentTable, TimeFilter};
use std::sync::Arc;

/// Fetches a listing and scores it.
pub struct Pipeline {
    fetcher: Fetcher,
    aggregator: SentimentAggregator,
}

/// Row-aligned result of one run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub posts: Arc<PostTable>,
    pub sentiments: Arc<SentimentTable>,
}

impl PipelineOutput {
    pub fn views(&self) -> Result<ViewSet, CoreError> {
        ViewSet::build(
            &self.posts,
            &self.sentiments,
            self.posts.query().time_filter(),
        )
    }
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ContentSource>,
        classifier: Arc<dyn EmotionClassifier>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(source, metrics.clone()),
            aggregator: SentimentAggregator::new(classifier, metrics),
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn aggregator(&self) -> &SentimentAggregator {
        &self.aggregator
    }

    pub async fn run(
        &self,
        subreddit: &str,
        time_filter: TimeFilter,
        limit: u32,
        observer: &dyn ProgressObserver,
    ) -> Result<PipelineOutput, CoreError> {
        let posts = self.fetcher.fetch(subreddit, time_filter, limit).await?;
        let sentiments = self.aggregator.aggregate(&posts, observer).await?;
        Ok(PipelineOutput { posts, sentiments })
    }

    /// Clears both caches.
    pub fn invalidate(&self) {
        self.fetcher.invalidate();
        self.aggregator.invalidate();
    }
}
