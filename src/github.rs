use crate::config::GitHubConfig;
use crate::error::GitHubError;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_LENGTH};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use url::Url;

/// Entry of the followers / following list endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
}

/// Subset of `GET /users/{username}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub login: String,
    pub followers: u64,
}

/// Core REST quota as reported by `GET /rate_limit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp at which the quota refills
    pub reset: i64,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitStatus,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Result of a follow call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    /// The target account no longer exists
    NotFound,
}

/// GitHub operations needed by the follow-back pass
#[allow(async_fn_in_trait)] // Swapped for in-memory doubles in tests
pub trait GitHubApi {
    async fn list_followers(&self, account: &str) -> Result<BTreeSet<String>, GitHubError>;
    async fn list_following(&self, account: &str) -> Result<BTreeSet<String>, GitHubError>;
    async fn follow_user(&self, username: &str) -> Result<FollowOutcome, GitHubError>;
    async fn user_profile(&self, account: &str) -> Result<UserProfile, GitHubError>;
    async fn rate_limit(&self) -> Result<RateLimitStatus, GitHubError>;
}

/// GitHub REST client authenticated with a personal access token
#[derive(Clone)]
pub struct GitHubClient {
    http_client: reqwest::Client,
    base_url: Url,
    token: String,
    per_page: u32,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let base_url = Url::parse(config.api_url())
            .map_err(|e| GitHubError::ClientSetup(format!("Invalid API URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GitHubError::ClientSetup(format!(
                "API URL cannot be used as a base: {base_url}"
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("followback/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GitHubError::ClientSetup(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url,
            token: config.token.clone(),
            per_page: config.per_page(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Walk `page=1..` until a page comes back short or empty
    async fn list_users(&self, account: &str, relation: &str) -> Result<Vec<GitHubUser>, GitHubError> {
        let url = self.endpoint(&["users", account, relation]);
        let mut users = Vec::new();
        let mut page: u32 = 1;

        loop {
            let response = self
                .authorized(self.http_client.get(url.clone()))
                .query(&[("per_page", self.per_page), ("page", page)])
                .send()
                .await
                .map_err(|e| {
                    GitHubError::Network(format!("Failed to fetch {relation} page {page}: {e}"))
                })?;

            if !response.status().is_success() {
                return Err(error_from_response(response, account).await);
            }

            let batch: Vec<GitHubUser> = response.json().await.map_err(|e| {
                GitHubError::InvalidResponse(format!("Failed to parse {relation} page {page}: {e}"))
            })?;

            debug!("Fetched {} {} from page {}", batch.len(), relation, page);

            let page_len = batch.len();
            users.extend(batch);

            if page_len < self.per_page as usize {
                break;
            }
            page += 1;
        }

        info!("Fetched {} {} for {}", users.len(), relation, account);
        Ok(users)
    }

    async fn list_logins(&self, account: &str, relation: &str) -> Result<BTreeSet<String>, GitHubError> {
        let users = self.list_users(account, relation).await?;
        Ok(users.into_iter().map(|user| user.login).collect())
    }

    /// Every follower of `account` with its id, avatar and profile URL, in API order
    pub async fn follower_details(&self, account: &str) -> Result<Vec<GitHubUser>, GitHubError> {
        self.list_users(account, "followers").await
    }
}

impl GitHubApi for GitHubClient {
    async fn list_followers(&self, account: &str) -> Result<BTreeSet<String>, GitHubError> {
        self.list_logins(account, "followers").await
    }

    async fn list_following(&self, account: &str) -> Result<BTreeSet<String>, GitHubError> {
        self.list_logins(account, "following").await
    }

    async fn follow_user(&self, username: &str) -> Result<FollowOutcome, GitHubError> {
        let url = self.endpoint(&["user", "following", username]);

        let response = self
            .authorized(self.http_client.put(url))
            .header(CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| GitHubError::Network(format!("Failed to follow {username}: {e}")))?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                debug!("Follow request accepted for {}", username);
                Ok(FollowOutcome::Followed)
            }
            StatusCode::NOT_MODIFIED => Ok(FollowOutcome::AlreadyFollowing),
            StatusCode::NOT_FOUND => {
                warn!("User not found: {}", username);
                Ok(FollowOutcome::NotFound)
            }
            _ => Err(error_from_response(response, username).await),
        }
    }

    async fn user_profile(&self, account: &str) -> Result<UserProfile, GitHubError> {
        let url = self.endpoint(&["users", account]);

        let response = self
            .authorized(self.http_client.get(url))
            .send()
            .await
            .map_err(|e| GitHubError::Network(format!("Failed to fetch profile: {e}")))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, account).await);
        }

        response
            .json()
            .await
            .map_err(|e| GitHubError::InvalidResponse(format!("Failed to parse profile: {e}")))
    }

    async fn rate_limit(&self) -> Result<RateLimitStatus, GitHubError> {
        let url = self.endpoint(&["rate_limit"]);

        let response = self
            .authorized(self.http_client.get(url))
            .send()
            .await
            .map_err(|e| GitHubError::Network(format!("Failed to check rate limit: {e}")))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "rate_limit").await);
        }

        let body: RateLimitResponse = response.json().await.map_err(|e| {
            GitHubError::InvalidResponse(format!("Failed to parse rate limit response: {e}"))
        })?;

        Ok(body.resources.core)
    }
}

async fn error_from_response(response: reqwest::Response, subject: &str) -> GitHubError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    classify_failure(status, &headers, &body, subject)
}

/// Map a non-success response onto the error taxonomy.
///
/// GitHub signals primary rate-limit exhaustion with 403 or 429 and
/// `x-ratelimit-remaining: 0`; secondary limits carry `retry-after` or a
/// message mentioning the rate limit. A 403 is only a credential problem when
/// the message says so. Otherwise it concerns the target alone, for example a
/// user who blocked the account.
pub fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    subject: &str,
) -> GitHubError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string());

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let reset_at = header("x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok());
    let exhausted = header("x-ratelimit-remaining") == Some("0")
        || header("retry-after").is_some()
        || message.to_lowercase().contains("rate limit");

    match status {
        StatusCode::UNAUTHORIZED => GitHubError::AuthenticationFailed(message),
        StatusCode::TOO_MANY_REQUESTS => GitHubError::RateLimitExceeded { reset_at },
        StatusCode::FORBIDDEN if exhausted => GitHubError::RateLimitExceeded { reset_at },
        StatusCode::FORBIDDEN if is_credential_message(&message) => {
            GitHubError::AuthenticationFailed(message)
        }
        StatusCode::NOT_FOUND => GitHubError::NotFound {
            username: subject.to_string(),
        },
        s if s.is_server_error() => GitHubError::ServerError { status: s.as_u16() },
        s => GitHubError::ApiRequestFailed {
            status: s.as_u16(),
            message,
        },
    }
}

fn is_credential_message(message: &str) -> bool {
    let message = message.to_lowercase();
    [
        "bad credentials",
        "requires authentication",
        "resource not accessible",
        "token",
        "scope",
    ]
    .iter()
    .any(|hint| message.contains(hint))
}
