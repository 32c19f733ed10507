use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to fetch posts from r/{subreddit}")]
    FetchFailed {
        subreddit: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        CoreError::InvalidInput {
            message: message.into(),
        }
    }

    /// Collapses a content-source failure into the terminal fetch error.
    pub fn fetch_failed(subreddit: impl Into<String>, cause: CoreError) -> Self {
        CoreError::FetchFailed {
            subreddit: subreddit.into(),
            source: Box::new(cause),
        }
    }

    /// How the content source failed, if this error came from it.
    pub fn source_kind(&self) -> Option<SourceErrorKind> {
        match self {
            CoreError::RedditApi(e) => Some(e.kind()),
            CoreError::Network(_) => Some(SourceErrorKind::SourceUnavailable),
            CoreError::FetchFailed { source, .. } => source.source_kind(),
            _ => None,
        }
    }

    pub fn is_fetch_failed(&self) -> bool {
        matches!(self, CoreError::FetchFailed { .. })
    }
}

/// The two ways a content source can fail. Both collapse into
/// `CoreError::FetchFailed` once they leave the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    SourceNotFound,
    SourceUnavailable,
}

#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("Missing Reddit credential: {field}")]
    MissingCredentials { field: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Invalid OAuth token")]
    InvalidToken,

    #[error("Subreddit not found: {subreddit}")]
    SubredditNotFound { subreddit: String },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Unexpected response status: {status_code}")]
    UnexpectedStatus { status_code: u16 },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },
}

impl RedditApiError {
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            RedditApiError::SubredditNotFound { .. } => SourceErrorKind::SourceNotFound,
            _ => SourceErrorKind::SourceUnavailable,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ClassificationError {
    #[error("Model loading failed for {model}: {reason}")]
    ModelLoadingFailed { model: String, reason: String },

    #[error("Tokenization failed for {text_length} characters: {reason}")]
    TokenizationFailed { text_length: usize, reason: String },

    #[error("Input too long: {length} tokens, max: {max_tokens}")]
    InputTooLong { length: usize, max_tokens: usize },

    #[error("Model inference failed: {reason}")]
    InferenceFailed { reason: String },

    #[error("Unknown emotion label: {label}")]
    UnknownLabel { label: String },

    #[error("Classifier output is missing label: {label}")]
    MissingLabel { label: String },

    #[error("Score for {label} out of range: {score}")]
    ScoreOutOfRange { label: String, score: f32 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
