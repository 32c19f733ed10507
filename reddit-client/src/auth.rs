use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, TokenResponse, TokenUrl,
};
use redmood_core::{ConfigError, CoreError, RedditApiError, RedditCredentials};
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
pub const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Reddit issues one-hour tokens; used when the response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= SystemTime::now() + EXPIRY_MARGIN
    }
}

/// What a request needs to be authorized by Reddit.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub access_token: String,
    pub user_agent: String,
}

/// Script-app authentication: the resource-owner password grant, with the
/// resulting token cached until it is about to expire.
#[derive(Debug)]
pub struct PasswordAuthenticator {
    credentials: RedditCredentials,
    token_url: String,
    token: Mutex<Option<RedditToken>>,
}

impl PasswordAuthenticator {
    pub fn new(credentials: RedditCredentials) -> Self {
        Self::with_token_url(credentials, REDDIT_TOKEN_URL)
    }

    pub fn with_token_url(credentials: RedditCredentials, token_url: &str) -> Self {
        Self {
            credentials,
            token_url: token_url.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Returns a usable grant, requesting a new token when none is cached or
    /// the cached one is about to expire. Concurrent callers share one
    /// token request.
    pub async fn authorize(&self) -> Result<AccessGrant, CoreError> {
        let user_agent = require(&self.credentials.user_agent, "user_agent")?.to_string();

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| !token.is_expired()) {
            debug!("Using cached Reddit access token");
            return Ok(AccessGrant {
                access_token: token.access_token.clone(),
                user_agent,
            });
        }

        let token = self.request_token(&user_agent).await?;
        let grant = AccessGrant {
            access_token: token.access_token.clone(),
            user_agent,
        };
        *cached = Some(token);
        Ok(grant)
    }

    /// Drops the cached token so the next call authenticates again.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    pub async fn cached_token(&self) -> Option<RedditToken> {
        self.token.lock().await.clone()
    }

    async fn request_token(&self, user_agent: &str) -> Result<RedditToken, CoreError> {
        let client_id = require(&self.credentials.client_id, "client_id")?;
        let client_secret = require(&self.credentials.client_secret, "client_secret")?;
        let username = require(&self.credentials.username, "username")?;
        let password = require(&self.credentials.password, "password")?;

        let oauth_client = BasicClient::new(
            ClientId::new(client_id.to_string()),
            Some(ClientSecret::new(client_secret.to_string())),
            AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(invalid_url)?,
            Some(TokenUrl::new(self.token_url.clone()).map_err(invalid_url)?),
        )
        .set_auth_type(AuthType::BasicAuth);

        info!("Requesting Reddit access token for {}", username);
        let agent = user_agent.to_string();
        let response = oauth_client
            .exchange_password(
                &ResourceOwnerUsername::new(username.to_string()),
                &ResourceOwnerPassword::new(password.to_string()),
            )
            .request_async(|request| token_http_client(agent, request))
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(e) if e.is_timeout() => {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                }
                RequestTokenError::Request(e) => CoreError::Network(e),
                other => {
                    error!("Reddit token exchange failed: {}", other);
                    CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                        reason: other.to_string(),
                    })
                }
            })?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let scope = response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();

        info!("Obtained Reddit access token valid for {:?}", lifetime);
        Ok(RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + lifetime,
            scope,
        })
    }
}

fn require<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, CoreError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            RedditApiError::MissingCredentials {
                field: field.to_string(),
            }
            .into()
        })
}

fn invalid_url(e: url::ParseError) -> CoreError {
    ConfigError::InvalidValue {
        field: "reddit.token_url".to_string(),
        value: e.to_string(),
    }
    .into()
}

/// Sends oauth2's token request through reqwest with Reddit's required
/// User-Agent header.
async fn token_http_client(
    user_agent: String,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(Policy::none())
        .timeout(Duration::from_secs(30))
        .build()?;

    let response = client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().to_owned();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
