use crate::config::RetryConfig;
use crate::error::{ErrorRecovery, FollowbackError, GitHubError, StoreError};
use crate::github::{FollowOutcome, GitHubApi};
use crate::status::format_reset;
use crate::store::{FollowCounter, FollowLog};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Bounded retry for transient transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts(), config.base_delay_ms())
    }
}

/// Outcome counts of one follow-back pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowReport {
    pub pending: usize,
    pub followed: usize,
    pub skipped_already_logged: usize,
    pub failed: usize,
    pub not_found: usize,
    /// The pass stopped early because the API quota ran out
    pub rate_limited: bool,
    /// Pending usernames never attempted because of the rate limit
    pub unprocessed: Vec<String>,
}

impl fmt::Display for FollowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Follow-back pass: {} pending, {} followed, {} already logged, {} failed, {} not found",
            self.pending, self.followed, self.skipped_already_logged, self.failed, self.not_found
        )?;
        if self.rate_limited {
            write!(
                f,
                " (stopped by rate limit, {} left for the next run)",
                self.unprocessed.len()
            )?;
        }
        Ok(())
    }
}

/// Followers not yet followed, in lexicographic order
pub fn compute_pending(followers: &BTreeSet<String>, following: &BTreeSet<String>) -> Vec<String> {
    followers.difference(following).cloned().collect()
}

/// Follows back every follower of the configured account that is not followed yet
pub struct FollowBackWorker<A, L, C> {
    api: A,
    log: L,
    counter: C,
    retry: RetryPolicy,
}

impl<A, L, C> FollowBackWorker<A, L, C>
where
    A: GitHubApi,
    L: FollowLog,
    C: FollowCounter,
{
    pub fn new(api: A, log: L, counter: C, retry: RetryPolicy) -> Self {
        Self {
            api,
            log,
            counter,
            retry,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }

    pub async fn fetch_followers(&self, account: &str) -> Result<BTreeSet<String>, GitHubError> {
        let api = &self.api;
        self.with_retry("Fetching followers", move || api.list_followers(account))
            .await
    }

    pub async fn fetch_following(&self, account: &str) -> Result<BTreeSet<String>, GitHubError> {
        let api = &self.api;
        self.with_retry("Fetching following", move || api.list_following(account))
            .await
    }

    pub async fn follow(&self, username: &str) -> Result<FollowOutcome, GitHubError> {
        let api = &self.api;
        self.with_retry("Following user", move || api.follow_user(username))
            .await
    }

    /// Run one pass: fetch both lists, follow every pending user and persist each
    /// success before moving on to the next username.
    pub async fn run(&mut self, account: &str) -> Result<FollowReport, FollowbackError> {
        info!("Starting follow-back pass for {}", account);
        let mut report = FollowReport::default();

        let followers = match self.fetch_followers(account).await {
            Ok(followers) => followers,
            Err(GitHubError::RateLimitExceeded { reset_at }) => {
                warn!(
                    "Rate limit exhausted while fetching followers (resets {})",
                    format_reset(reset_at)
                );
                report.rate_limited = true;
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };

        let following = match self.fetch_following(account).await {
            Ok(following) => following,
            Err(GitHubError::RateLimitExceeded { reset_at }) => {
                warn!(
                    "Rate limit exhausted while fetching following (resets {})",
                    format_reset(reset_at)
                );
                report.rate_limited = true;
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };

        let pending = compute_pending(&followers, &following);
        report.pending = pending.len();

        if pending.is_empty() {
            info!("No new followers to process");
            return Ok(report);
        }
        info!("Total new followers to process: {}", pending.len());

        for (position, username) in pending.iter().enumerate() {
            debug!("Processing {}/{}: {}", position + 1, pending.len(), username);

            match self.follow(username).await {
                Ok(FollowOutcome::Followed) | Ok(FollowOutcome::AlreadyFollowing) => {
                    self.record(username, &mut report)?;
                }
                Ok(FollowOutcome::NotFound) => {
                    info!("Skipping {}: account no longer exists", username);
                    report.not_found += 1;
                }
                Err(e) if ErrorRecovery::aborts_pass(&e) => match e {
                    GitHubError::RateLimitExceeded { reset_at } => {
                        warn!(
                            "Rate limit exhausted at {}, stopping pass (resets {})",
                            username,
                            format_reset(reset_at)
                        );
                        report.rate_limited = true;
                        report.unprocessed = pending[position..].to_vec();
                        break;
                    }
                    other => return Err(other.into()),
                },
                Err(e) => {
                    error!("Failed to follow {}: {}", username, e);
                    report.failed += 1;
                }
            }
        }

        info!("{}", report);
        Ok(report)
    }

    fn record(&mut self, username: &str, report: &mut FollowReport) -> Result<(), StoreError> {
        if self.log.contains(username) {
            info!("{} is already in the follow log, not counting it again", username);
            report.skipped_already_logged += 1;
            return Ok(());
        }

        self.log.append(username)?;
        let total = self.counter.increment()?;
        info!("Successfully followed {} (total followed: {})", username, total);
        report.followed += 1;
        Ok(())
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, GitHubError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitHubError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e)
                    if ErrorRecovery::is_recoverable(&e)
                        && attempt + 1 < self.retry.max_attempts =>
                {
                    let delay = ErrorRecovery::retry_delay_ms(self.retry.base_delay_ms, attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {}ms",
                        what,
                        attempt + 1,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
