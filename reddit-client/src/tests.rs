#[cfg(test)]
mod tests {
    use crate::{
        api, classify_status, parse_listing, ContentSource, PasswordAuthenticator, RawPost,
        RedditApiClient, RedditClient, RedditToken,
    };
    use futures::{StreamExt, TryStreamExt};
    use redmood_core::{
        CoreError, PostRecord, RedditApiError, RedditCredentials, SourceErrorKind, TimeFilter,
    };
    use reqwest::StatusCode;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use url::Url;

    const LISTING_FIXTURE: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": "t3_abc124",
            "dist": 2,
            "modhash": "",
            "children": [
                {
                    "kind": "t3",
                    "data": {
                        "id": "abc123",
                        "title": "When the code compiles on the first try",
                        "selftext": "",
                        "author": "someone",
                        "subreddit": "memes",
                        "permalink": "/r/memes/comments/abc123/",
                        "created_utc": 1640995200.0,
                        "score": 42000,
                        "num_comments": 512,
                        "over_18": false,
                        "stickied": false,
                        "thumbnail": "https://example.invalid/thumb.jpg",
                        "upvote_ratio": 0.97
                    }
                },
                {
                    "kind": "t3",
                    "data": {
                        "id": "abc124",
                        "title": "Monday again",
                        "selftext": "Why is it always Monday",
                        "created_utc": 1641044700.5,
                        "score": 12,
                        "num_comments": 3
                    }
                }
            ]
        }
    }"#;

    fn create_test_credentials() -> RedditCredentials {
        RedditCredentials {
            client_id: Some("test_client_id".to_string()),
            client_secret: Some("test_client_secret".to_string()),
            username: Some("test_user".to_string()),
            password: Some("hunter2".to_string()),
            user_agent: Some("redmood/0.1 by test_user".to_string()),
        }
    }

    #[test]
    fn test_listing_parsing() {
        let listing = parse_listing(LISTING_FIXTURE).unwrap();
        assert_eq!(listing.data.children.len(), 2);
        assert_eq!(listing.data.after.as_deref(), Some("t3_abc124"));

        let first = &listing.data.children[0].data;
        assert_eq!(first.title, "When the code compiles on the first try");
        assert_eq!(first.score, 42000);
        assert_eq!(first.num_comments, 512);

        // Missing fields fall back to defaults.
        let second = &listing.data.children[1].data;
        assert_eq!(second.selftext, "Why is it always Monday");
        assert_eq!(first.selftext, "");
    }

    #[test]
    fn test_listing_rejects_other_payloads() {
        let result = parse_listing(r#"{"kind": "t5", "data": {"children": []}}"#);
        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::InvalidResponse { .. }))
        ));

        let result = parse_listing("<html>search results</html>");
        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::InvalidResponse { .. }))
        ));
    }

    #[test]
    fn test_empty_listing() {
        let listing =
            parse_listing(r#"{"kind": "Listing", "data": {"children": [], "after": null}}"#)
                .unwrap();
        assert!(listing.data.children.is_empty());
        assert!(listing.data.after.is_none());
    }

    #[test]
    fn test_reddit_post_data_conversion() {
        let listing = parse_listing(LISTING_FIXTURE).unwrap();
        let post_data = listing.data.children[1].data.clone();

        let post: PostRecord = post_data.try_into().unwrap();
        assert_eq!(post.title, "Monday again");
        assert_eq!(post.body, "Why is it always Monday");
        assert_eq!(post.score, 12);
        assert_eq!(post.comment_count, 3);
        assert_eq!(post.hour(), 13);
        assert_eq!(post.created_at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_reddit_post_data_conversion_requires_title() {
        let post_data = api::RedditPostData {
            created_utc: 1640995200.0,
            ..Default::default()
        };
        let result: Result<PostRecord, _> = post_data.try_into();
        assert!(result.is_err());
    }

    #[test]
    fn test_status_classification() {
        let not_found = classify_status(StatusCode::NOT_FOUND, "nope", "/r/nope/top", None);
        assert!(matches!(
            not_found,
            Some(RedditApiError::SubredditNotFound { ref subreddit }) if subreddit == "nope"
        ));

        let redirected = classify_status(StatusCode::FOUND, "nope", "/r/nope/top", None).unwrap();
        assert_eq!(redirected.kind(), SourceErrorKind::SourceNotFound);

        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "memes", "/r/memes/top", None),
            Some(RedditApiError::InvalidToken)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "private", "/r/private/top", None),
            Some(RedditApiError::Forbidden { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "memes", "/r/memes/top", Some(7)),
            Some(RedditApiError::RateLimitExceeded { retry_after: 7 })
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "memes", "/r/memes/top", None),
            Some(RedditApiError::ServerError { status_code: 502 })
        ));
        assert!(matches!(
            classify_status(StatusCode::IM_A_TEAPOT, "memes", "/r/memes/top", None),
            Some(RedditApiError::UnexpectedStatus { status_code: 418 })
        ));
        assert!(classify_status(StatusCode::OK, "memes", "/r/memes/top", None).is_none());
    }

    #[test]
    fn test_top_url() {
        let api = RedditApiClient::new().unwrap();
        assert_eq!(
            api.top_url("memes").unwrap().as_str(),
            "https://oauth.reddit.com/r/memes/top"
        );

        // Path-like input stays inside its own segment.
        let url = api.top_url("a/b?c").unwrap();
        assert_eq!(url.path(), "/r/a%2Fb%3Fc/top");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_invalid_base_url() {
        let result = RedditApiClient::with_base_url("not a url");
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_token_expiry() {
        let now = SystemTime::now();
        let valid = RedditToken {
            access_token: "valid".to_string(),
            expires_at: now + Duration::from_secs(3600),
            scope: vec!["*".to_string()],
        };
        let expiring = RedditToken {
            access_token: "expiring".to_string(),
            expires_at: now + Duration::from_secs(10),
            scope: Vec::new(),
        };
        assert!(!valid.is_expired());
        assert!(expiring.is_expired());
    }

    #[test]
    fn test_token_serialization() {
        let token = RedditToken {
            access_token: "test_access_token".to_string(),
            expires_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1640995200),
            scope: vec!["*".to_string()],
        };

        let serialized = serde_json::to_string(&token).unwrap();
        assert!(serialized.contains("test_access_token"));

        let deserialized: RedditToken = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.access_token, token.access_token);
        assert_eq!(deserialized.expires_at, token.expires_at);
    }

    #[test]
    fn test_missing_credentials_fail_on_first_use() {
        let mut credentials = create_test_credentials();
        credentials.client_secret = None;
        let auth = PasswordAuthenticator::new(credentials);

        let result = tokio_test::block_on(auth.authorize());
        match result {
            Err(CoreError::RedditApi(RedditApiError::MissingCredentials { field })) => {
                assert_eq!(field, "client_secret");
            }
            other => panic!("Expected MissingCredentials, got {:?}", other),
        }
        assert!(tokio_test::block_on(auth.cached_token()).is_none());
    }

    #[test]
    fn test_missing_user_agent_fails_first() {
        let credentials = RedditCredentials {
            user_agent: None,
            ..create_test_credentials()
        };
        let auth = PasswordAuthenticator::new(credentials);
        let result = tokio_test::block_on(auth.authorize());
        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::MissingCredentials { ref field })) if field == "user_agent"
        ));
    }

    #[tokio::test]
    async fn test_client_creation_is_lazy() {
        // No credentials at all still builds a client.
        let client = RedditClient::new(RedditCredentials::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_list_top_surfaces_unavailable_source() {
        let client = RedditClient::new(RedditCredentials::default()).unwrap();
        let mut stream = client.list_top("memes", TimeFilter::Day, 10);

        let first = stream.next().await.expect("stream should yield the error");
        let error = first.unwrap_err();
        assert_eq!(
            error.source_kind(),
            Some(SourceErrorKind::SourceUnavailable)
        );

        // A failed stream ends.
        assert!(stream.next().await.is_none());
    }

    /// Local stand-in for the token and listing endpoints. Serves one request
    /// per connection and records each request line without the HTTP version.
    ///
    /// - `POST /token` issues a one-hour bearer token
    /// - `GET /r/memes/top` pages through posts `p0, p1, ...` by `after`
    /// - `GET /r/gone/top` redirects to search
    /// - `GET /r/locked/top` rejects the token
    struct FakeReddit {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeReddit {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));

            let log = requests.clone();
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let log = log.clone();
                    tokio::spawn(async move {
                        let Some(request_line) = read_request(&mut socket).await else {
                            return;
                        };
                        log.lock().unwrap().push(request_line.clone());
                        let response = respond(&request_line);
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
            });

            Self { base_url, requests }
        }

        fn client(&self) -> RedditClient {
            RedditClient::with_parts(
                RedditApiClient::with_base_url(&self.base_url).unwrap(),
                PasswordAuthenticator::with_token_url(
                    create_test_credentials(),
                    &format!("{}/token", self.base_url),
                ),
            )
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn read_request(socket: &mut TcpStream) -> Option<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let request_line = head.lines().next()?;
        let (without_version, _) = request_line.rsplit_once(' ')?;
        Some(without_version.to_string())
    }

    fn respond(request_line: &str) -> String {
        let (method, target) = request_line.split_once(' ').unwrap_or((request_line, "/"));
        let url = Url::parse(&format!("http://reddit.test{}", target)).unwrap();

        match (method, url.path()) {
            ("POST", "/token") => http_response(
                "200 OK",
                "",
                r#"{"access_token": "fake-token", "token_type": "bearer", "expires_in": 3600, "scope": "*"}"#
                    .to_string(),
            ),
            ("GET", "/r/memes/top") => http_response("200 OK", "", top_page(&url)),
            ("GET", "/r/gone/top") => http_response(
                "302 Found",
                "Location: /subreddits/search.json?q=gone\r\n",
                String::new(),
            ),
            ("GET", "/r/locked/top") => http_response("401 Unauthorized", "", String::new()),
            _ => http_response("404 Not Found", "", String::new()),
        }
    }

    fn top_page(url: &Url) -> String {
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };
        let limit: usize = param("limit")
            .and_then(|value| value.parse().ok())
            .unwrap_or(25);
        let start = param("after")
            .and_then(|after| after.strip_prefix("t3_")?.parse::<usize>().ok())
            .map_or(0, |last| last + 1);

        let children: Vec<serde_json::Value> = (start..start + limit)
            .map(|i| {
                serde_json::json!({
                    "kind": "t3",
                    "data": {
                        "title": format!("p{}", i),
                        "created_utc": 1640995200.0 + i as f64,
                        "score": i,
                        "num_comments": 0
                    }
                })
            })
            .collect();
        serde_json::json!({
            "kind": "Listing",
            "data": {"children": children, "after": format!("t3_{}", start + limit - 1)}
        })
        .to_string()
    }

    fn http_response(status: &str, extra_headers: &str, body: String) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
            status,
            body.len(),
            extra_headers,
            body
        )
    }

    #[tokio::test]
    async fn test_list_top_follows_the_after_cursor() {
        let reddit = FakeReddit::start().await;
        let client = reddit.client();

        let posts: Vec<RawPost> = client
            .list_top("memes", TimeFilter::Day, 150)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(posts.len(), 150);
        assert!(posts
            .iter()
            .enumerate()
            .all(|(i, post)| post.title == format!("p{}", i)));

        let requests = reddit.requests();
        assert_eq!(requests.len(), 3, "{:?}", requests);
        assert_eq!(requests[0], "POST /token");
        assert!(requests[1].starts_with("GET /r/memes/top?"));
        assert!(requests[1].contains("t=day"));
        assert!(requests[1].contains("limit=100"));
        assert!(!requests[1].contains("after="));
        assert!(requests[2].contains("limit=50"));
        assert!(requests[2].contains("after=t3_99"));
    }

    #[tokio::test]
    async fn test_token_is_reused_until_rejected() {
        let reddit = FakeReddit::start().await;
        let client = reddit.client();

        let posts: Vec<RawPost> = client
            .list_top("memes", TimeFilter::Week, 3)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(posts.len(), 3);
        assert!(client.authenticator().cached_token().await.is_some());

        // Unknown subreddits redirect to search.
        let gone: Result<Vec<RawPost>, CoreError> =
            client.list_top("gone", TimeFilter::Week, 10).try_collect().await;
        assert_eq!(
            gone.unwrap_err().source_kind(),
            Some(SourceErrorKind::SourceNotFound)
        );
        assert!(client.authenticator().cached_token().await.is_some());

        let locked: Result<Vec<RawPost>, CoreError> =
            client.list_top("locked", TimeFilter::Week, 10).try_collect().await;
        assert!(matches!(
            locked,
            Err(CoreError::RedditApi(RedditApiError::InvalidToken))
        ));
        assert!(client.authenticator().cached_token().await.is_none());

        let token_requests = reddit
            .requests()
            .iter()
            .filter(|request| request.starts_with("POST "))
            .count();
        assert_eq!(token_requests, 1);
    }
}
