use redmood_core::{
    ClassificationError, ConfigError, CoreError, ErrorExt, ErrorReporter, RedditApiError,
    SourceErrorKind,
};

#[test]
fn test_error_codes() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    assert_eq!(reddit_error.error_code(), "REDDIT_API");

    let classification_error = CoreError::Classification(ClassificationError::InputTooLong {
        length: 600,
        max_tokens: 512,
    });
    assert_eq!(classification_error.error_code(), "CLASSIFICATION");

    let config_error = CoreError::Config(ConfigError::ValidationFailed {
        reason: "bad".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");

    let fetch_error = CoreError::fetch_failed("memes", reddit_error);
    assert_eq!(fetch_error.error_code(), "FETCH_FAILED");
}

#[test]
fn test_source_error_kinds() {
    let not_found = RedditApiError::SubredditNotFound {
        subreddit: "doesnotexist123".to_string(),
    };
    assert_eq!(not_found.kind(), SourceErrorKind::SourceNotFound);

    for unavailable in [
        RedditApiError::InvalidToken,
        RedditApiError::RequestTimeout,
        RedditApiError::ServerError { status_code: 503 },
        RedditApiError::MissingCredentials {
            field: "client_id".to_string(),
        },
    ] {
        assert_eq!(unavailable.kind(), SourceErrorKind::SourceUnavailable);
    }
}

#[test]
fn test_fetch_failed_keeps_cause() {
    let cause = CoreError::RedditApi(RedditApiError::SubredditNotFound {
        subreddit: "doesnotexist123".to_string(),
    });
    let error = CoreError::fetch_failed("doesnotexist123", cause);

    assert!(error.is_fetch_failed());
    assert_eq!(error.source_kind(), Some(SourceErrorKind::SourceNotFound));
    assert!(std::error::Error::source(&error).is_some());
    assert_eq!(
        error.to_string(),
        "Failed to fetch posts from r/doesnotexist123"
    );
}

#[test]
fn test_user_friendly_messages() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    let message = reddit_error.user_friendly_message();
    assert!(message.contains("authentication token is invalid"));

    let fetch_error = CoreError::fetch_failed(
        "doesnotexist123",
        CoreError::RedditApi(RedditApiError::RequestTimeout),
    );
    let message = fetch_error.user_friendly_message();
    assert!(message.contains("Subreddit doesnotexist123 does not exist"));

    let missing = CoreError::RedditApi(RedditApiError::MissingCredentials {
        field: "client_secret".to_string(),
    });
    assert!(missing.user_friendly_message().contains("client_secret"));
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new()
        .with_error_reporting(true)
        .with_warning_reporting(true);
    let error = CoreError::RedditApi(RedditApiError::InvalidToken);

    // This test just ensures the methods don't panic
    reporter.report_error(&error);
    reporter.report_warning(&error);
}
