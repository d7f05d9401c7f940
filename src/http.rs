use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};
use url::Url;

use crate::api::{AuthInfo, ChannelInfo, HistoryPage, HistoryRequest, SlackApi, UsersPage};
use crate::error::{AppError, Result};

pub const DEFAULT_API_URL: &str = "https://slack.com/api/";
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const MAX_BACKOFF_SECS: u64 = 60;
/// First fallback wait is `2 * unit`, doubling per retry.
const DEFAULT_BACKOFF_UNIT_MILLIS: u64 = 500;
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Called before sleeping on a rate limit with (wait_secs, attempt, max_retries).
pub type RateLimitCallback = Box<dyn Fn(u64, u32, u32)>;

/// Blocking Slack Web API client.
pub struct HttpSlackApi {
    client: Client,
    token: String,
    base_url: Url,
    max_retries: u32,
    backoff_unit_millis: u64,
    on_rate_limit: Option<RateLimitCallback>,
}

#[derive(Deserialize)]
struct ConversationsInfoResponse {
    channel: ChannelInfoRaw,
}

#[derive(Deserialize)]
struct ChannelInfoRaw {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_private: bool,
}

enum Attempt<T> {
    Done(T),
    RateLimited(Option<u64>),
}

impl HttpSlackApi {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_URL)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| AppError::Config(format!("invalid Slack API URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::transport("client_error", e.to_string()))?;

        Ok(Self {
            client,
            token: token.to_string(),
            base_url,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit_millis: DEFAULT_BACKOFF_UNIT_MILLIS,
            on_rate_limit: None,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Scales the fallback backoff used when Slack sends no `Retry-After`.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit_millis = u64::try_from(unit.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_rate_limit_callback(mut self, callback: impl Fn(u64, u32, u32) + 'static) -> Self {
        self.on_rate_limit = Some(Box::new(callback));
        self
    }

    fn method_url(&self, method: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(method)
            .map_err(|e| AppError::transport("invalid_url", e.to_string()))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter().copied());
        }
        Ok(url)
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = self.method_url(method, params)?;
        let mut attempt: u32 = 0;
        let mut backoff = backoff_strategy(self.backoff_unit_millis);

        loop {
            match self.attempt(method, &url)? {
                Attempt::Done(body) => {
                    return serde_json::from_value(body).map_err(|e| {
                        AppError::JsonParse(format!("{} response: {}", method, e))
                    });
                }
                Attempt::RateLimited(retry_after) => {
                    let delay = retry_delay(retry_after, backoff.next());
                    if attempt >= self.max_retries {
                        return Err(AppError::RateLimited {
                            retry_after_secs: delay.as_secs(),
                        });
                    }
                    attempt += 1;
                    warn!(
                        method,
                        attempt,
                        max_retries = self.max_retries,
                        wait_ms = delay.as_millis() as u64,
                        "rate limited by Slack, backing off"
                    );
                    if let Some(cb) = &self.on_rate_limit {
                        cb(delay.as_secs(), attempt, self.max_retries);
                    }
                    thread::sleep(delay);
                }
            }
        }
    }

    fn attempt(&self, method: &str, url: &Url) -> Result<Attempt<serde_json::Value>> {
        debug!(method, "calling Slack API");

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| AppError::transport("request_failed", format!("{}: {}", method, e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Ok(Attempt::RateLimited(retry_after));
        }
        if !status.is_success() {
            return Err(AppError::transport(
                format!("http_{}", status.as_u16()),
                format!("{} returned HTTP status {}", method, status),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| AppError::transport("invalid_response", format!("{}: {}", method, e)))?;

        if body.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            return Ok(Attempt::Done(body));
        }

        let code = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown_error")
            .to_string();
        if code == "ratelimited" {
            return Ok(Attempt::RateLimited(None));
        }
        Err(AppError::Transport {
            message: format!("{} failed: {}", method, code),
            code,
        })
    }
}

impl SlackApi for HttpSlackApi {
    fn auth_test(&self) -> Result<AuthInfo> {
        self.call("auth.test", &[])
    }

    fn conversations_info(&self, channel: &str) -> Result<ChannelInfo> {
        let response: ConversationsInfoResponse =
            self.call("conversations.info", &[("channel", channel)])?;
        let raw = response.channel;
        Ok(ChannelInfo {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            is_private: raw.is_private,
        })
    }

    fn conversations_history(&self, request: &HistoryRequest) -> Result<HistoryPage> {
        let limit = request.limit.to_string();
        let mut params: Vec<(&str, &str)> =
            vec![("channel", request.channel.as_str()), ("limit", limit.as_str())];
        if let Some(cursor) = &request.cursor {
            params.push(("cursor", cursor.as_str()));
        }
        if let Some(oldest) = &request.oldest {
            params.push(("oldest", oldest.as_str()));
        }
        if let Some(latest) = &request.latest {
            params.push(("latest", latest.as_str()));
        }
        self.call("conversations.history", &params)
    }

    fn users_list(&self, cursor: Option<&str>) -> Result<UsersPage> {
        match cursor {
            Some(c) => self.call("users.list", &[("cursor", c)]),
            None => self.call("users.list", &[]),
        }
    }
}

pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

/// Exponential waits of `2^n * unit_millis`, capped at [`MAX_BACKOFF_SECS`], with full jitter.
pub fn backoff_strategy(unit_millis: u64) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(unit_millis)
        .max_delay(Duration::from_secs(MAX_BACKOFF_SECS))
        .map(jitter)
}

/// A server-provided `Retry-After` wins over the backoff step.
pub fn retry_delay(retry_after: Option<u64>, fallback: Option<Duration>) -> Duration {
    match retry_after {
        Some(secs) => Duration::from_secs(secs),
        None => fallback.unwrap_or(Duration::from_secs(MAX_BACKOFF_SECS)),
    }
}
