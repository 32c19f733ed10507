use crate::auth::AccessGrant;
use redmood_core::{ConfigError, CoreError, PostRecord, RedditApiError, TimeFilter};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Largest page the listing endpoints hand out.
pub const MAX_PAGE_SIZE: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

/// A post as the listing endpoints return it. Only the fields the pipeline
/// reads are kept; everything else in the payload is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub title: String,
    pub selftext: String,
    pub created_utc: f64,
    pub score: i64,
    pub num_comments: u64,
}

impl TryFrom<RedditPostData> for PostRecord {
    type Error = CoreError;

    fn try_from(post_data: RedditPostData) -> Result<Self, Self::Error> {
        PostRecord::from_epoch(
            post_data.title,
            post_data.created_utc,
            post_data.selftext,
            post_data.score,
            post_data.num_comments,
        )
    }
}

/// Maps a non-success status of a subreddit listing call to an API error.
/// Redirects count as "not found": Reddit sends unknown subreddits to search.
pub fn classify_status(
    status: StatusCode,
    subreddit: &str,
    endpoint: &str,
    retry_after: Option<u64>,
) -> Option<RedditApiError> {
    if status.is_success() {
        return None;
    }

    let error = match status.as_u16() {
        300..=399 | 404 => RedditApiError::SubredditNotFound {
            subreddit: subreddit.to_string(),
        },
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        429 => RedditApiError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(60),
        },
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::UnexpectedStatus { status_code: code },
    };
    Some(error)
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    base_url: Url,
}

impl RedditApiClient {
    pub fn new() -> Result<Self, CoreError> {
        Self::with_base_url(REDDIT_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            field: "reddit.api_base".to_string(),
            value: format!("{} ({})", base_url, e),
        })?;

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// `<base>/r/<subreddit>/top`, with the subreddit percent-encoded as a
    /// single path segment.
    pub fn top_url(&self, subreddit: &str) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CoreError::Internal {
                message: format!("API base {} cannot hold a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(["r", subreddit, "top"]);
        Ok(url)
    }

    async fn make_request(
        &self,
        url: Url,
        grant: &AccessGrant,
        query_params: &[(&str, String)],
        subreddit: &str,
    ) -> Result<Response, CoreError> {
        let endpoint = url.path().to_string();

        info!("Making Reddit API request: GET {}", endpoint);
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&grant.access_token)
            .header("User-Agent", &grant.user_agent)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for GET {}: {}", endpoint, e);
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        if let Some(api_error) = classify_status(status, subreddit, &endpoint, retry_after) {
            warn!("Request failed with status: {} for {}", status, endpoint);
            return Err(api_error.into());
        }

        debug!("Request successful: {} {}", status, endpoint);
        Ok(response)
    }

    /// One page of the "top" listing. `limit` is capped at `MAX_PAGE_SIZE`.
    pub async fn get_top_posts(
        &self,
        grant: &AccessGrant,
        subreddit: &str,
        time_filter: TimeFilter,
        limit: u32,
        after: Option<&str>,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let url = self.top_url(subreddit)?;
        let mut params = vec![
            ("t", time_filter.as_str().to_string()),
            ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(after_val) = after {
            params.push(("after", after_val.to_string()));
        }

        let response = self.make_request(url, grant, &params, subreddit).await?;
        let body = response.text().await?;
        let listing = parse_listing(&body).map_err(|e| {
            error!("Failed to parse top posts for r/{}: {}", subreddit, e);
            e
        })?;

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing)
    }
}

pub fn parse_listing(body: &str) -> Result<RedditListing<RedditPostData>, CoreError> {
    let listing: RedditListing<RedditPostData> =
        serde_json::from_str(body).map_err(|e| RedditApiError::InvalidResponse {
            details: format!("not a post listing: {}", e),
        })?;

    if listing.kind != "Listing" {
        return Err(RedditApiError::InvalidResponse {
            details: format!("expected a Listing, got {}", listing.kind),
        }
        .into());
    }
    Ok(listing)
}
