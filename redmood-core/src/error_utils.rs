use crate::error::*;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::RedditApi(e) => {
                error!("Reddit API error details: {:?}", e);
            }
            CoreError::Classification(e) => {
                error!("Classification error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            CoreError::FetchFailed { source, .. } => {
                error!("Fetch failure cause: {}", source);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Classification(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::FetchFailed { subreddit, .. } => format!(
                "Subreddit {} does not exist or could not be reached.",
                subreddit
            ),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(_) => "REDDIT_API".to_string(),
            CoreError::Classification(_) => "CLASSIFICATION".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::FetchFailed { .. } => "FETCH_FAILED".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!("RedditApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RedditApiError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::MissingCredentials { field } => format!(
                "Reddit credential '{}' is not configured. Set it in the environment or config file.",
                field
            ),
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your credentials.".to_string()
            }
            RedditApiError::InvalidToken => {
                "Reddit authentication token is invalid. Please check your credentials."
                    .to_string()
            }
            RedditApiError::SubredditNotFound { subreddit } => {
                format!("Subreddit '{}' does not exist.", subreddit)
            }
            RedditApiError::Forbidden { resource } => format!(
                "Access denied to {}. The subreddit may be private or quarantined.",
                resource
            ),
            RedditApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            RedditApiError::RequestTimeout => {
                "Request to Reddit timed out. Please try again.".to_string()
            }
            _ => "Reddit API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            RedditApiError::MissingCredentials { .. } => "REDDIT_MISSING_CREDENTIALS".to_string(),
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED".to_string(),
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN".to_string(),
            RedditApiError::SubredditNotFound { .. } => "REDDIT_SUBREDDIT_NOT_FOUND".to_string(),
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN".to_string(),
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT".to_string(),
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT".to_string(),
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR".to_string(),
            RedditApiError::UnexpectedStatus { .. } => "REDDIT_UNEXPECTED_STATUS".to_string(),
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE".to_string(),
        }
    }
}

impl ErrorExt for ClassificationError {
    fn log_error(&self) -> &Self {
        error!("ClassificationError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ClassificationError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ClassificationError::ModelLoadingFailed { model, .. } => format!(
                "Failed to load emotion model '{}'. Please check your connection.",
                model
            ),
            ClassificationError::InputTooLong { max_tokens, .. } => {
                format!("Text is too long. Maximum {} tokens allowed.", max_tokens)
            }
            ClassificationError::UnknownLabel { label }
            | ClassificationError::MissingLabel { label } => format!(
                "The emotion model does not produce the expected labels ({}).",
                label
            ),
            _ => "Emotion classification failed. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ClassificationError::ModelLoadingFailed { .. } => "CLS_MODEL_LOAD_FAILED".to_string(),
            ClassificationError::TokenizationFailed { .. } => "CLS_TOKENIZATION_FAILED".to_string(),
            ClassificationError::InputTooLong { .. } => "CLS_INPUT_TOO_LONG".to_string(),
            ClassificationError::InferenceFailed { .. } => "CLS_INFERENCE_FAILED".to_string(),
            ClassificationError::UnknownLabel { .. } => "CLS_UNKNOWN_LABEL".to_string(),
            ClassificationError::MissingLabel { .. } => "CLS_MISSING_LABEL".to_string(),
            ClassificationError::ScoreOutOfRange { .. } => "CLS_SCORE_OUT_OF_RANGE".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
