use emotion_classifier::EmotionClassifier;
use redmood_core::{
    CoreError, EmotionVector, PostRecord, PostTable, SentimentRow, SentimentTable,
};
use serde::Serialize;
use std::slice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed == self.total
    }
}

/// Receives scoring progress. Advisory only; observers cannot stop a run.
pub trait ProgressObserver {
    fn on_progress(&self, progress: Progress);
}

impl<F> ProgressObserver for F
where
    F: Fn(Progress),
{
    fn on_progress(&self, progress: Progress) {
        self(progress)
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl ProgressObserver for Silent {
    fn on_progress(&self, _progress: Progress) {}
}

/// Classifies a post table title by title, in table order.
///
/// Each step yields `(processed, total)`; the run is consumed once and turned
/// into a `SentimentTable` with `finish`. The first classification error is
/// yielded and ends the run.
pub struct ScoringRun<'a> {
    classifier: &'a dyn EmotionClassifier,
    posts: &'a PostTable,
    pending: slice::Iter<'a, PostRecord>,
    scores: Vec<EmotionVector>,
    failed: bool,
}

impl<'a> ScoringRun<'a> {
    pub fn new(classifier: &'a dyn EmotionClassifier, posts: &'a PostTable) -> Self {
        Self {
            classifier,
            posts,
            pending: posts.iter(),
            scores: Vec::with_capacity(posts.len()),
            failed: false,
        }
    }

    pub fn total(&self) -> usize {
        self.posts.len()
    }

    /// Pairs every score with its post's UTC date and hour.
    pub fn finish(self) -> Result<SentimentTable, CoreError> {
        if self.scores.len() != self.posts.len() {
            return Err(CoreError::Internal {
                message: format!(
                    "scoring run finished after {} of {} posts",
                    self.scores.len(),
                    self.posts.len()
                ),
            });
        }

        let rows = self
            .scores
            .into_iter()
            .zip(self.posts.iter())
            .map(|(emotions, post)| SentimentRow::new(emotions, post))
            .collect();
        SentimentTable::new(self.posts, rows)
    }
}

impl Iterator for ScoringRun<'_> {
    type Item = Result<Progress, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let post = self.pending.next()?;

        match self.classifier.score(&post.title) {
            Ok(emotions) => {
                self.scores.push(emotions);
                Some(Ok(Progress {
                    processed: self.scores.len(),
                    total: self.posts.len(),
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
