pub mod api;
pub mod auth;
#[cfg(test)]
mod tests;

pub use api::{
    classify_status, parse_listing, RedditApiClient, RedditListing, RedditListingChild,
    RedditListingData, RedditPostData, MAX_PAGE_SIZE, REDDIT_API_BASE,
};
pub use auth::{AccessGrant, PasswordAuthenticator, RedditToken};

use futures::stream::{self, BoxStream, StreamExt};
use redmood_core::{CoreError, RedditApiError, RedditCredentials, TimeFilter};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// A raw item as produced by a content source, before it becomes a `PostRecord`.
pub type RawPost = RedditPostData;

/// Something that can list a community's top items.
///
/// The returned stream is lazy and finite (at most `limit` items) and can be
/// consumed only once; listing again issues new requests.
pub trait ContentSource: Send + Sync {
    fn list_top<'a>(
        &'a self,
        subreddit: &'a str,
        time_filter: TimeFilter,
        limit: u32,
    ) -> BoxStream<'a, Result<RawPost, CoreError>>;
}

/// Authenticated Reddit client. Authentication happens lazily on the first
/// listing request.
#[derive(Debug)]
pub struct RedditClient {
    api: RedditApiClient,
    auth: PasswordAuthenticator,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self, CoreError> {
        Ok(Self {
            api: RedditApiClient::new()?,
            auth: PasswordAuthenticator::new(credentials),
        })
    }

    pub fn with_parts(api: RedditApiClient, auth: PasswordAuthenticator) -> Self {
        Self { api, auth }
    }

    pub fn authenticator(&self) -> &PasswordAuthenticator {
        &self.auth
    }

    async fn fetch_page(
        &self,
        subreddit: &str,
        time_filter: TimeFilter,
        limit: u32,
        after: Option<&str>,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let grant = self.auth.authorize().await?;
        let result = self
            .api
            .get_top_posts(&grant, subreddit, time_filter, limit, after)
            .await;

        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = &result {
            warn!("Reddit rejected the access token; it will be renewed on the next request");
            self.auth.invalidate().await;
        }
        result
    }
}

impl ContentSource for RedditClient {
    fn list_top<'a>(
        &'a self,
        subreddit: &'a str,
        time_filter: TimeFilter,
        limit: u32,
    ) -> BoxStream<'a, Result<RawPost, CoreError>> {
        let pager = TopPager {
            client: self,
            subreddit,
            time_filter,
            remaining: limit,
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        };
        stream::try_unfold(pager, TopPager::next_post).boxed()
    }
}

/// Walks the "top" listing page by page through its `after` cursor, handing
/// out buffered posts before fetching the next page.
struct TopPager<'a> {
    client: &'a RedditClient,
    subreddit: &'a str,
    time_filter: TimeFilter,
    remaining: u32,
    after: Option<String>,
    buffer: VecDeque<RawPost>,
    exhausted: bool,
}

impl<'a> TopPager<'a> {
    async fn next_post(mut self) -> Result<Option<(RawPost, Self)>, CoreError> {
        loop {
            if let Some(post) = self.buffer.pop_front() {
                return Ok(Some((post, self)));
            }
            if self.exhausted || self.remaining == 0 {
                return Ok(None);
            }

            let page_size = self.remaining.min(MAX_PAGE_SIZE);
            let listing = self
                .client
                .fetch_page(
                    self.subreddit,
                    self.time_filter,
                    page_size,
                    self.after.as_deref(),
                )
                .await?;

            let mut children = listing.data.children;
            children.truncate(self.remaining as usize);
            self.remaining -= children.len() as u32;
            self.after = listing.data.after;
            self.exhausted = self.after.is_none() || children.is_empty();
            debug!(
                "Buffered {} posts from r/{}, {} still wanted",
                children.len(),
                self.subreddit,
                self.remaining
            );
            self.buffer.extend(children.into_iter().map(|child| child.data));
        }
    }
}
