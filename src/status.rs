use crate::error::GitHubError;
use crate::github::{GitHubApi, RateLimitStatus};
use crate::store::{FollowCounter, FollowLog};
use chrono::DateTime;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// How much follow-back work is left and how much of it the quota allows now
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub total_followers: u64,
    pub already_followed: u64,
    pub followers_left: u64,
    pub remaining_requests: u64,
    pub request_limit: u64,
    pub rate_limit_reset: Option<i64>,
    pub can_follow_now: u64,
    pub follow_counter: u64,
}

impl StatusReport {
    /// A missing rate limit is treated as no requests left
    pub fn compute(
        total_followers: u64,
        already_followed: u64,
        rate_limit: Option<RateLimitStatus>,
        follow_counter: u64,
    ) -> Self {
        let followers_left = total_followers.saturating_sub(already_followed);
        let remaining_requests = rate_limit.map(|r| r.remaining).unwrap_or(0);

        Self {
            total_followers,
            already_followed,
            followers_left,
            remaining_requests,
            request_limit: rate_limit.map(|r| r.limit).unwrap_or(0),
            rate_limit_reset: rate_limit.map(|r| r.reset),
            can_follow_now: followers_left.min(remaining_requests),
            follow_counter,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=========================================")?;
        writeln!(f, "Total Followers: {}", self.total_followers)?;
        writeln!(f, "Already Followed: {}", self.already_followed)?;
        writeln!(f, "Followers Left to Follow: {}", self.followers_left)?;
        writeln!(
            f,
            "API Requests Remaining: {}/{}",
            self.remaining_requests, self.request_limit
        )?;
        writeln!(f, "Rate Limit Resets: {}", format_reset(self.rate_limit_reset))?;
        writeln!(f, "Can Follow Now: {}", self.can_follow_now)?;
        writeln!(f, "Follow Counter: {}", self.follow_counter)?;
        write!(f, "=========================================")
    }
}

/// Render a rate-limit reset timestamp for logs
pub fn format_reset(reset_at: Option<i64>) -> String {
    reset_at
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn check_status<A, L, C>(
    api: &A,
    account: &str,
    log: &L,
    counter: &C,
) -> Result<StatusReport, GitHubError>
where
    A: GitHubApi,
    L: FollowLog,
    C: FollowCounter,
{
    let profile = api.user_profile(account).await?;
    info!("Total followers: {}", profile.followers);

    let rate_limit = match api.rate_limit().await {
        Ok(rate_limit) => {
            info!(
                "Rate Limit - Remaining: {}/{}, Reset at: {}",
                rate_limit.remaining,
                rate_limit.limit,
                format_reset(Some(rate_limit.reset))
            );
            Some(rate_limit)
        }
        Err(e) => {
            warn!(
                "Unable to retrieve rate limit information ({}), assuming 0 remaining requests",
                e
            );
            None
        }
    };

    Ok(StatusReport::compute(
        profile.followers,
        log.len() as u64,
        rate_limit,
        counter.value(),
    ))
}
