//! Relay API access with bounded retries and auth short-circuit.
//!
//! # Architecture
//!
//! - [`JsonTransport`]: one GET returning a JSON body, no retry logic
//! - [`ReqwestTransport`]: the production transport, carrying the credential headers
//! - [`RetryClient`]: decorator adding the retry policy to any [`JsonTransport`]
//!
//! # Retry Strategy
//!
//! - 401/403 fail immediately with [`HarvestError::Auth`]; never retried
//! - any other failure is retried up to `retries` extra times
//! - the delay before retry `n` (0-based) is `backoff_base^n` seconds, capped at 60s
//! - exhaustion after a 4xx yields [`HarvestError::Http`], otherwise
//!   [`HarvestError::RetryExhausted`]
//!
//! Credentials never reach the logs: headers are only logged through
//! [`redact_headers`].

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde_json::Value;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::HarvestConfig;
use crate::error::{HarvestError, TransportError};

/// Header names whose values are masked in logs.
const SENSITIVE_HEADERS: [&str; 3] = ["cookie", "authorization", "set-cookie"];

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: StdDuration = StdDuration::from_secs(60);

/// Copy of `headers` safe to log: sensitive values become `***`.
pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_string();
            let shown = if SENSITIVE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                "***".to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name, shown)
        })
        .collect()
}

/// A single GET against the relay, decoded as JSON.
///
/// Implementors report every failure as a [`TransportError`] and leave the
/// retry decision to [`RetryClient`].
pub trait JsonTransport {
    async fn get_json(&self, url: &Url, params: &[(String, String)])
    -> Result<Value, TransportError>;
}

/// Production transport over a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    headers: HeaderMap,
}

impl ReqwestTransport {
    /// Build a client sending the credential as a `Cookie` header.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Config`] when a header value is not representable or
    /// the client cannot be built. The credential itself is never part of the
    /// message.
    pub fn new(config: &HarvestConfig, credential: &str) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        let mut cookie = HeaderValue::from_str(credential).map_err(|_| {
            HarvestError::Config("credential contains characters not allowed in a header".into())
        })?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);
        headers.insert(USER_AGENT, header_value(&config.user_agent, "user_agent")?);
        headers.insert(REFERER, header_value(&config.referer, "referer")?);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            header_value(&config.accept_language, "accept_language")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers.clone())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| HarvestError::Config(format!("http client: {e}")))?;

        debug!(headers = ?redact_headers(&headers), "Built relay transport");
        Ok(Self { client, headers })
    }
}

fn header_value(raw: &str, field: &str) -> Result<HeaderValue, HarvestError> {
    HeaderValue::from_str(raw)
        .map_err(|_| HarvestError::Config(format!("{field} is not a valid header value")))
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("headers", &redact_headers(&self.headers))
            .finish()
    }
}

impl JsonTransport for ReqwestTransport {
    async fn get_json(
        &self,
        url: &Url,
        params: &[(String, String)],
    ) -> Result<Value, TransportError> {
        let resp = self.client.get(url.clone()).query(params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        resp.json::<Value>().await.map_err(TransportError::from)
    }
}

/// Wrapper that adds the retry policy to any [`JsonTransport`].
pub struct RetryClient<T> {
    inner: T,
    /// Attempts allowed after the first one.
    retries: usize,
    /// Base of the exponential backoff, in seconds.
    backoff_base: f64,
}

impl<T> RetryClient<T>
where
    T: JsonTransport,
{
    pub fn new(inner: T, retries: usize, backoff_base: f64) -> Self {
        Self {
            inner,
            retries,
            backoff_base,
        }
    }

    pub fn from_config(inner: T, config: &HarvestConfig) -> Self {
        Self::new(inner, config.retries, config.backoff_base)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Delay before retry number `retry` (0-based).
    fn backoff_delay(&self, retry: usize) -> StdDuration {
        let secs = self.backoff_base.powi(retry as i32);
        StdDuration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    /// GET `url` with `params`, applying the retry policy.
    ///
    /// # Arguments
    ///
    /// * `url` - Endpoint, possibly already carrying query parameters
    /// * `params` - Extra query pairs appended to `url` (pagination offset, etc.)
    ///
    /// # Returns
    ///
    /// The decoded JSON body of the first successful attempt.
    ///
    /// # Errors
    ///
    /// - [`HarvestError::Auth`] on 401/403, without retrying
    /// - [`HarvestError::Http`] when a non-auth 4xx outlasts the retries
    /// - [`HarvestError::RetryExhausted`] for any other failure that outlasts them
    ///
    /// # Retry Behavior
    ///
    /// - `retries` extra attempts after the first
    /// - Exponential backoff: `backoff_base^n` seconds (1s, 2s, 4s with base 2), capped at 60s
    /// - No sleep after the final attempt
    #[instrument(level = "info", skip_all, fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &Url,
        params: &[(String, String)],
    ) -> Result<Value, HarvestError> {
        let total_t0 = Instant::now();
        let max = self.retries + 1;
        let mut attempt = 0usize;

        loop {
            info!(attempt = attempt + 1, max, ?params, "GET {}", url);
            let err = match self.inner.get_json(url, params).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if let Some(status) = err.auth_status() {
                error!(status, "Relay rejected the credential; it has probably expired");
                return Err(HarvestError::Auth { status });
            }

            attempt += 1;
            if attempt > self.retries {
                error!(
                    attempt,
                    max,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %err,
                    "GET exhausted retries"
                );
                return Err(match err {
                    TransportError::Status { status } if status < 500 => HarvestError::Http {
                        status,
                        attempts: attempt,
                    },
                    last => HarvestError::RetryExhausted {
                        attempts: attempt,
                        last,
                    },
                });
            }

            let delay = self.backoff_delay(attempt - 1);
            warn!(
                attempt,
                max,
                transient = err.is_transient(),
                ?delay,
                error = %err,
                "GET attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}

impl<T> fmt::Debug for RetryClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryClient")
            .field("retries", &self.retries)
            .field("backoff_base", &self.backoff_base)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeRelay;
    use super::*;
    use serde_json::json;

    const URL: &str = "https://relay.test/article/list?mpId=A";

    fn url() -> Url {
        Url::parse(URL).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let relay = FakeRelay::new();
        relay.respond(URL, &[], Ok(json!({"ok": true})));
        let client = RetryClient::new(relay, 2, 2.0);

        let body = client.fetch(&url(), &[]).await.unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(client.inner().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let relay = FakeRelay::new();
        relay.respond(URL, &[], Err(TransportError::Status { status: 401 }));
        let client = RetryClient::new(relay, 2, 2.0);

        let err = client.fetch(&url(), &[]).await.unwrap_err();
        assert!(matches!(err, HarvestError::Auth { status: 401 }));
        assert_eq!(client.inner().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_is_auth() {
        let relay = FakeRelay::new();
        relay.respond(URL, &[], Err(TransportError::Status { status: 403 }));
        let client = RetryClient::new(relay, 5, 2.0);

        let err = client.fetch(&url(), &[]).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(client.inner().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_recovers_within_budget() {
        let relay = FakeRelay::new();
        relay
            .respond(URL, &[], Err(TransportError::Status { status: 502 }))
            .respond(URL, &[], Err(TransportError::Timeout))
            .respond(URL, &[], Ok(json!([1, 2])));
        let client = RetryClient::new(relay, 2, 2.0);

        let body = client.fetch(&url(), &[]).await.unwrap();
        assert_eq!(body, json!([1, 2]));
        assert_eq!(client.inner().call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_exhausts_retries() {
        let relay = FakeRelay::new();
        relay.respond(URL, &[], Err(TransportError::Status { status: 500 }));
        let client = RetryClient::new(relay, 2, 2.0);

        let err = client.fetch(&url(), &[]).await.unwrap_err();
        match err {
            HarvestError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, TransportError::Status { status: 500 });
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.inner().call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_surfaces_as_http_error() {
        let relay = FakeRelay::new();
        relay.respond(URL, &[], Err(TransportError::Status { status: 404 }));
        let client = RetryClient::new(relay, 1, 2.0);

        let err = client.fetch(&url(), &[]).await.unwrap_err();
        assert!(matches!(
            err,
            HarvestError::Http {
                status: 404,
                attempts: 2
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_exponential() {
        let relay = FakeRelay::new();
        relay.respond(URL, &[], Err(TransportError::Timeout));
        let client = RetryClient::new(relay, 2, 2.0);

        let t0 = tokio::time::Instant::now();
        let _ = client.fetch(&url(), &[]).await;
        // 2^0 + 2^1 seconds, no sleep after the final attempt
        let elapsed = t0.elapsed();
        assert!(elapsed >= StdDuration::from_secs(3));
        assert!(elapsed < StdDuration::from_secs(4));
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let client = RetryClient::new(FakeRelay::new(), 100, 10.0);
        assert_eq!(client.backoff_delay(0), StdDuration::from_secs(1));
        assert_eq!(client.backoff_delay(1), StdDuration::from_secs(10));
        assert_eq!(client.backoff_delay(50), MAX_BACKOFF);
    }

    #[test]
    fn test_redact_headers_masks_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("wr_skey=secret"));
        headers.insert("Authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert(USER_AGENT, HeaderValue::from_static("harvest"));

        let redacted = redact_headers(&headers);
        assert!(redacted.iter().all(|(_, v)| !v.contains("secret")));
        assert!(redacted.contains(&("cookie".to_string(), "***".to_string())));
        assert!(redacted.contains(&("authorization".to_string(), "***".to_string())));
        assert!(redacted.contains(&("user-agent".to_string(), "harvest".to_string())));
    }

    #[test]
    fn test_transport_debug_hides_cookie() {
        let transport = ReqwestTransport::new(&HarvestConfig::default(), "wr_skey=secret").unwrap();
        let shown = format!("{transport:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("***"));
    }

    #[test]
    fn test_transport_rejects_invalid_credential_without_echoing_it() {
        let err = ReqwestTransport::new(&HarvestConfig::default(), "bad\nsecret").unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }
}
