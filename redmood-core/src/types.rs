use crate::error::{ClassificationError, CoreError};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_SUBREDDIT: &str = "memes";
pub const MIN_ITEM_LIMIT: u32 = 1;
pub const MAX_ITEM_LIMIT: u32 = 200;
pub const DEFAULT_ITEM_LIMIT: u32 = 10;

/// Ranking window of the "top" listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    #[default]
    Day,
    Week,
    Month,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 3] = [TimeFilter::Day, TimeFilter::Week, TimeFilter::Month];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(TimeFilter::Day),
            "week" => Ok(TimeFilter::Week),
            "month" => Ok(TimeFilter::Month),
            other => Err(CoreError::invalid_input(format!(
                "unknown time filter '{}', expected day, week or month",
                other
            ))),
        }
    }
}

/// Identifies one fetch request. Only constructible with a valid
/// subreddit name and an item limit inside `[MIN_ITEM_LIMIT, MAX_ITEM_LIMIT]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryKey {
    subreddit: String,
    time_filter: TimeFilter,
    limit: u32,
}

impl QueryKey {
    pub fn new(
        subreddit: impl Into<String>,
        time_filter: TimeFilter,
        limit: u32,
    ) -> Result<Self, CoreError> {
        let subreddit = subreddit.into().trim().to_string();
        if subreddit.is_empty() {
            return Err(CoreError::invalid_input("subreddit name must not be empty"));
        }
        if !(MIN_ITEM_LIMIT..=MAX_ITEM_LIMIT).contains(&limit) {
            return Err(CoreError::invalid_input(format!(
                "item limit {} outside [{}, {}]",
                limit, MIN_ITEM_LIMIT, MAX_ITEM_LIMIT
            )));
        }

        Ok(Self {
            subreddit,
            time_filter,
            limit,
        })
    }

    pub fn subreddit(&self) -> &str {
        &self.subreddit
    }

    pub fn time_filter(&self) -> TimeFilter {
        self.time_filter
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r/{} top/{} limit={}",
            self.subreddit, self.time_filter, self.limit
        )
    }
}

/// Converts the source's epoch-seconds field to UTC, keeping microseconds.
pub fn utc_from_epoch(epoch_seconds: f64) -> Result<DateTime<Utc>, CoreError> {
    if !epoch_seconds.is_finite() {
        return Err(CoreError::invalid_input(format!(
            "epoch timestamp {} is not finite",
            epoch_seconds
        )));
    }

    let micros = (epoch_seconds * 1_000_000.0).round() as i64;
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;

    DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
        CoreError::invalid_input(format!("epoch timestamp {} out of range", epoch_seconds))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "Content")]
    pub body: String,
    #[serde(rename = "Score")]
    pub score: i64,
    #[serde(rename = "Comments")]
    pub comment_count: u64,
}

impl PostRecord {
    pub fn new(
        title: impl Into<String>,
        created_at: DateTime<Utc>,
        body: impl Into<String>,
        score: i64,
        comment_count: u64,
    ) -> Result<Self, CoreError> {
        let title = title.into();
        if title.is_empty() {
            return Err(CoreError::invalid_input("post title must not be empty"));
        }

        Ok(Self {
            title,
            created_at,
            body: body.into(),
            score,
            comment_count,
        })
    }

    pub fn from_epoch(
        title: impl Into<String>,
        created_utc: f64,
        body: impl Into<String>,
        score: i64,
        comment_count: u64,
    ) -> Result<Self, CoreError> {
        Self::new(
            title,
            utc_from_epoch(created_utc)?,
            body,
            score,
            comment_count,
        )
    }

    pub fn date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn hour(&self) -> u32 {
        self.created_at.hour()
    }
}

/// Posts answering one `QueryKey`, in the order the source listed them.
#[derive(Debug, Serialize)]
pub struct PostTable {
    id: Uuid,
    query: QueryKey,
    fetched_at: DateTime<Utc>,
    rows: Vec<PostRecord>,
}

impl PostTable {
    pub fn new(query: QueryKey, rows: Vec<PostRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query,
            fetched_at: Utc::now(),
            rows,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn query(&self) -> &QueryKey {
        &self.query
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn rows(&self) -> &[PostRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PostRecord> {
        self.rows.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Anger,
    Love,
    Sadness,
    Fear,
    Surprise,
}

impl Emotion {
    pub const ALL: [Emotion; 6] = [
        Emotion::Joy,
        Emotion::Anger,
        Emotion::Love,
        Emotion::Sadness,
        Emotion::Fear,
        Emotion::Surprise,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Anger => "anger",
            Emotion::Love => "love",
            Emotion::Sadness => "sadness",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Emotion::ALL
            .into_iter()
            .find(|emotion| emotion.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Float noise from softmax/sigmoid may land a hair outside [0, 1].
const SCORE_TOLERANCE: f32 = 1e-5;

/// Independent per-label probabilities from one classifier call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionVector {
    pub joy: f32,
    pub anger: f32,
    pub love: f32,
    pub sadness: f32,
    pub fear: f32,
    pub surprise: f32,
}

impl EmotionVector {
    /// Builds a vector from scores keyed by emotion. Every emotion must be
    /// present and every score must be a probability.
    pub fn from_scores<I>(scores: I) -> Result<Self, ClassificationError>
    where
        I: IntoIterator<Item = (Emotion, f32)>,
    {
        let mut slots: [Option<f32>; 6] = [None; 6];
        for (emotion, score) in scores {
            if score.is_nan()
                || score < -SCORE_TOLERANCE
                || score > 1.0 + SCORE_TOLERANCE
            {
                return Err(ClassificationError::ScoreOutOfRange {
                    label: emotion.label().to_string(),
                    score,
                });
            }
            slots[emotion as usize] = Some(score.clamp(0.0, 1.0));
        }

        let mut values = [0.0f32; 6];
        for (emotion, slot) in Emotion::ALL.iter().zip(slots) {
            values[*emotion as usize] = slot.ok_or_else(|| ClassificationError::MissingLabel {
                label: emotion.label().to_string(),
            })?;
        }

        Ok(Self {
            joy: values[Emotion::Joy as usize],
            anger: values[Emotion::Anger as usize],
            love: values[Emotion::Love as usize],
            sadness: values[Emotion::Sadness as usize],
            fear: values[Emotion::Fear as usize],
            surprise: values[Emotion::Surprise as usize],
        })
    }

    /// Same as `from_scores`, keyed by the model's label strings.
    pub fn from_labeled<'a, I>(scores: I) -> Result<Self, ClassificationError>
    where
        I: IntoIterator<Item = (&'a str, f32)>,
    {
        let keyed = scores
            .into_iter()
            .map(|(label, score)| {
                Emotion::from_label(label)
                    .map(|emotion| (emotion, score))
                    .ok_or_else(|| ClassificationError::UnknownLabel {
                        label: label.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_scores(keyed)
    }

    pub fn get(&self, emotion: Emotion) -> f32 {
        match emotion {
            Emotion::Joy => self.joy,
            Emotion::Anger => self.anger,
            Emotion::Love => self.love,
            Emotion::Sadness => self.sadness,
            Emotion::Fear => self.fear,
            Emotion::Surprise => self.surprise,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        Emotion::ALL.into_iter().map(move |e| (e, self.get(e)))
    }
}

/// One classified post: its emotion scores plus the UTC day and hour it was
/// created, row-aligned with the post table it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentRow {
    #[serde(flatten)]
    pub emotions: EmotionVector,
    pub date: NaiveDate,
    pub hour: u32,
}

impl SentimentRow {
    pub fn new(emotions: EmotionVector, post: &PostRecord) -> Self {
        Self {
            emotions,
            date: post.date(),
            hour: post.hour(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SentimentTable {
    source_table: Uuid,
    rows: Vec<SentimentRow>,
}

impl SentimentTable {
    pub fn new(posts: &PostTable, rows: Vec<SentimentRow>) -> Result<Self, CoreError> {
        if rows.len() != posts.len() {
            return Err(CoreError::Internal {
                message: format!(
                    "sentiment rows ({}) not aligned with posts ({})",
                    rows.len(),
                    posts.len()
                ),
            });
        }

        Ok(Self {
            source_table: posts.id(),
            rows,
        })
    }

    pub fn source_table(&self) -> Uuid {
        self.source_table
    }

    pub fn rows(&self) -> &[SentimentRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SentimentRow> {
        self.rows.iter()
    }
}
