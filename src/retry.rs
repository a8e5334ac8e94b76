// =============================================================================
// retry.rs — ASK AGAIN, BUT NOT FOREVER
// =============================================================================
//
// The portal times out. The portal answers 503 at 10:29 every morning when
// every lawyer in the district refreshes at once. The portal occasionally
// says 429 and means it. All of those deserve another attempt after a short
// wait.
//
// A 404 or 400 does not. If we asked for the wrong thing, asking for it
// again three times just makes the logs longer.
//
// Every attempt is made from a fresh RequestBuilder, the backoff doubles
// from the base delay up to a cap, and nothing is shared between calls.
// =============================================================================

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, SET_COOKIE};
use tracing::{debug, warn};

use crate::error::FetchCondition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never less than one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// How long to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// A fully-read upstream response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Raw `Set-Cookie` header values, in order.
    pub set_cookies: Vec<String>,
    pub body: Vec<u8>,
    /// Final URL after redirects.
    pub url: String,
}

/// The call gave up. `attempts` is how many requests actually went out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub condition: FetchCondition,
}

/// Send a request built by `build`, retrying transient failures.
///
/// A 2xx with a blank body comes back as `FetchCondition::EmptyBody`, which
/// is not retried: the portal answered, it just had nothing to say.
pub async fn send_with_retry<F>(
    policy: &RetryPolicy,
    label: &str,
    mut build: F,
) -> Result<HttpResponse, RetryExhausted>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let condition = match attempt_once(build()).await {
            Ok(response) => {
                debug!(
                    label,
                    attempt,
                    status = response.status,
                    bytes = response.body.len(),
                    "upstream answered"
                );
                return Ok(response);
            }
            Err(condition) => condition,
        };

        if !condition.is_transient() || attempt >= max_attempts {
            warn!(
                label,
                attempt,
                condition = %condition,
                "giving up on upstream call"
            );
            return Err(RetryExhausted {
                attempts: attempt,
                condition,
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            label,
            attempt,
            condition = %condition,
            retry_in_ms = delay.as_millis() as u64,
            "transient upstream failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

async fn attempt_once(request: reqwest::RequestBuilder) -> Result<HttpResponse, FetchCondition> {
    let response = request.send().await.map_err(describe_transport_error)?;

    let status = response.status().as_u16();
    if !response.status().is_success() {
        return Err(FetchCondition::HttpStatus(status));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let set_cookies = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();
    let url = response.url().to_string();

    let body = response
        .bytes()
        .await
        .map_err(describe_transport_error)?
        .to_vec();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(FetchCondition::EmptyBody);
    }

    Ok(HttpResponse {
        status,
        content_type,
        set_cookies,
        body,
        url,
    })
}

fn describe_transport_error(err: reqwest::Error) -> FetchCondition {
    let what = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "response body could not be read"
    } else {
        "request failed"
    };
    FetchCondition::Unavailable(format!("{}: {}", what, err))
}
