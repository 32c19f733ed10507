//! Data behind the report views: post volume, emotion distributions, emotion
//! trends by day and by hour, and emotions against score and comment count.
//!
//! Every function takes a post table and the sentiment table scored from it.

use chrono::NaiveDate;
use redmood_core::{
    CoreError, Emotion, PostRecord, PostTable, SentimentRow, SentimentTable, TimeFilter,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Histogram bucket: an hour of the day for daily listings, a date otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Hour(u32),
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    pub bucket: TimeBucket,
    pub posts: usize,
}

/// Five-number summary plus mean for one emotion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionSummary {
    pub emotion: Emotion,
    pub min: f64,
    pub lower_quartile: f64,
    pub median: f64,
    pub upper_quartile: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyEmotion {
    pub date: NaiveDate,
    pub emotion: Emotion,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyEmotion {
    pub hour: u32,
    pub emotion: Emotion,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreEmotionPoint {
    pub score: i64,
    pub emotion: Emotion,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentsEmotionPoint {
    pub comments: u64,
    pub emotion: Emotion,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSet {
    pub posts_over_time: Vec<BucketCount>,
    pub general_emotions: Vec<EmotionSummary>,
    pub emotions_over_time: Vec<DailyEmotion>,
    pub emotions_over_time_hourly: Vec<HourlyEmotion>,
    pub score_on_emotions: Vec<ScoreEmotionPoint>,
    pub comments_on_emotions: Vec<CommentsEmotionPoint>,
}

impl ViewSet {
    pub fn build(
        posts: &PostTable,
        sentiments: &SentimentTable,
        time_filter: TimeFilter,
    ) -> Result<Self, CoreError> {
        ensure_aligned(posts, sentiments)?;
        Ok(Self {
            posts_over_time: posts_over_time(posts, time_filter),
            general_emotions: general_emotions(sentiments),
            emotions_over_time: emotions_over_time(sentiments),
            emotions_over_time_hourly: emotions_over_time_hourly(sentiments),
            score_on_emotions: score_on_emotions(posts, sentiments)?,
            comments_on_emotions: comments_on_emotions(posts, sentiments)?,
        })
    }
}

fn ensure_aligned(posts: &PostTable, sentiments: &SentimentTable) -> Result<(), CoreError> {
    if sentiments.source_table() != posts.id() || sentiments.len() != posts.len() {
        return Err(CoreError::invalid_input(format!(
            "sentiment table {} ({} rows) was not scored from post table {} ({} rows)",
            sentiments.source_table(),
            sentiments.len(),
            posts.id(),
            posts.len()
        )));
    }
    Ok(())
}

/// Post counts per hour for `Day`, per date otherwise. Sorted, non-empty
/// buckets only.
pub fn posts_over_time(posts: &PostTable, time_filter: TimeFilter) -> Vec<BucketCount> {
    let mut counts: BTreeMap<TimeBucket, usize> = BTreeMap::new();
    for post in posts.iter() {
        let bucket = match time_filter {
            TimeFilter::Day => TimeBucket::Hour(post.hour()),
            TimeFilter::Week | TimeFilter::Month => TimeBucket::Date(post.date()),
        };
        *counts.entry(bucket).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(bucket, posts)| BucketCount { bucket, posts })
        .collect()
}

pub fn general_emotions(sentiments: &SentimentTable) -> Vec<EmotionSummary> {
    if sentiments.is_empty() {
        return Vec::new();
    }

    Emotion::ALL
        .into_iter()
        .map(|emotion| {
            let mut values: Vec<f64> = sentiments
                .iter()
                .map(|row| row.emotions.get(emotion) as f64)
                .collect();
            values.sort_by(f64::total_cmp);

            EmotionSummary {
                emotion,
                min: values[0],
                lower_quartile: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                upper_quartile: quantile(&values, 0.75),
                max: values[values.len() - 1],
                mean: values.iter().sum::<f64>() / values.len() as f64,
            }
        })
        .collect()
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

pub fn emotions_over_time(sentiments: &SentimentTable) -> Vec<DailyEmotion> {
    bucket_means(sentiments, |row| row.date)
        .into_iter()
        .map(|((date, emotion), mean)| DailyEmotion {
            date,
            emotion,
            mean,
        })
        .collect()
}

pub fn emotions_over_time_hourly(sentiments: &SentimentTable) -> Vec<HourlyEmotion> {
    bucket_means(sentiments, |row| row.hour)
        .into_iter()
        .map(|((hour, emotion), mean)| HourlyEmotion {
            hour,
            emotion,
            mean,
        })
        .collect()
}

fn bucket_means<B, F>(sentiments: &SentimentTable, bucket_of: F) -> BTreeMap<(B, Emotion), f64>
where
    B: Ord + Copy,
    F: Fn(&SentimentRow) -> B,
{
    let mut sums: BTreeMap<(B, Emotion), (f64, usize)> = BTreeMap::new();
    for row in sentiments.iter() {
        let bucket = bucket_of(row);
        for (emotion, value) in row.emotions.iter() {
            let entry = sums.entry((bucket, emotion)).or_insert((0.0, 0));
            entry.0 += value as f64;
            entry.1 += 1;
        }
    }

    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect()
}

/// Long form, one point per (post, emotion), grouped by emotion.
pub fn score_on_emotions(
    posts: &PostTable,
    sentiments: &SentimentTable,
) -> Result<Vec<ScoreEmotionPoint>, CoreError> {
    ensure_aligned(posts, sentiments)?;
    Ok(melt(posts, sentiments, |post, emotion, value| {
        ScoreEmotionPoint {
            score: post.score,
            emotion,
            value,
        }
    }))
}

pub fn comments_on_emotions(
    posts: &PostTable,
    sentiments: &SentimentTable,
) -> Result<Vec<CommentsEmotionPoint>, CoreError> {
    ensure_aligned(posts, sentiments)?;
    Ok(melt(posts, sentiments, |post, emotion, value| {
        CommentsEmotionPoint {
            comments: post.comment_count,
            emotion,
            value,
        }
    }))
}

fn melt<T, F>(posts: &PostTable, sentiments: &SentimentTable, point: F) -> Vec<T>
where
    F: Fn(&PostRecord, Emotion, f32) -> T,
{
    Emotion::ALL
        .into_iter()
        .flat_map(|emotion| {
            posts
                .iter()
                .zip(sentiments.iter())
                .map(move |(post, row)| (post, emotion, row.emotions.get(emotion)))
        })
        .map(|(post, emotion, value)| point(post, emotion, value))
        .collect()
}
