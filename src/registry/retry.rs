use crate::config::ModsConfig;
use crate::error::{ModpilotError, Result};
use crate::registry::http::{HttpRequest, HttpResponse, HttpTransport};
use std::time::Duration;

/// Pacing and exponential backoff shared by every registry request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Slept before every attempt, whatever the previous outcome.
    pub request_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, request_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            request_delay,
        }
    }

    pub fn from_config(mods: &ModsConfig) -> Self {
        Self::new(mods.max_retries, mods.base_delay(), mods.request_delay())
    }

    /// Same backoff, no fixed pause. Used for CDN downloads.
    pub fn without_pacing(&self) -> Self {
        Self {
            request_delay: Duration::ZERO,
            ..self.clone()
        }
    }

    /// Wait before retry number `attempt + 1`: `base_delay * 2^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Send `request`, retrying rate limits, 5xx responses and network errors.
    ///
    /// 404 maps to `NotFound`; any other non-2xx fails without retry.
    pub async fn send(
        &self,
        transport: &dyn HttpTransport,
        request: HttpRequest,
    ) -> Result<HttpResponse> {
        let url = request.url.clone();
        let mut attempt = 0;

        loop {
            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            let failure = match transport.send(request.clone()).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => Self::classify(&url, response.status),
                Err(e) => e,
            };

            if !failure.is_transient() {
                return Err(failure);
            }

            if attempt >= self.max_retries {
                return Err(match failure {
                    ModpilotError::RateLimited { url, .. } => ModpilotError::RateLimited {
                        url,
                        retries: self.max_retries,
                    },
                    other => other,
                });
            }

            let delay = self.backoff_delay(attempt);
            tracing::warn!(
                url = %url,
                attempt = attempt + 1,
                delay_secs = delay.as_secs_f64(),
                "{failure}, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn classify(url: &str, status: u16) -> ModpilotError {
        match status {
            404 => ModpilotError::NotFound {
                url: url.to_string(),
            },
            429 => ModpilotError::RateLimited {
                url: url.to_string(),
                retries: 0,
            },
            status => ModpilotError::Upstream {
                url: url.to_string(),
                status,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{Reply, ScriptedTransport};
    use crate::registry::http::HttpMethod;
    use tokio::time::Instant;

    const URL: &str = "https://api.modrinth.com/v2/project/sodium";

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_secs(2), Duration::ZERO)
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = policy(5);
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_two_rate_limits() {
        let transport = ScriptedTransport::new();
        transport.script(
            HttpMethod::Get,
            URL,
            vec![Reply::status(429), Reply::status(429), Reply::json(200, "{}")],
        );

        let started = Instant::now();
        let response = policy(3)
            .send(&transport, HttpRequest::get(URL))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(started.elapsed() >= Duration::from_secs(2 + 4));
        assert_eq!(transport.request_count(HttpMethod::Get, URL), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_between_attempts_follows_backoff() {
        let transport = ScriptedTransport::new();
        transport.script(
            HttpMethod::Get,
            URL,
            vec![
                Reply::status(429),
                Reply::status(503),
                Reply::status(429),
                Reply::json(200, "[]"),
            ],
        );

        policy(4)
            .send(&transport, HttpRequest::get(URL))
            .await
            .unwrap();

        let times = transport.request_times();
        assert_eq!(times.len(), 4);
        for k in 0..3 {
            let gap = times[k + 1] - times[k];
            assert!(gap >= Duration::from_secs(2 << k), "gap {k} was {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_rate_limit_is_reported() {
        let transport = ScriptedTransport::new();
        transport.script(HttpMethod::Get, URL, vec![Reply::status(429)]);

        let err = policy(2)
            .send(&transport, HttpRequest::get(URL))
            .await
            .unwrap_err();

        assert!(matches!(err, ModpilotError::RateLimited { retries: 2, .. }));
        assert_eq!(transport.request_count(HttpMethod::Get, URL), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let transport = ScriptedTransport::new();
        transport.script(HttpMethod::Get, URL, vec![Reply::status(404)]);

        let err = policy(3)
            .send(&transport, HttpRequest::get(URL))
            .await
            .unwrap_err();

        assert!(matches!(err, ModpilotError::NotFound { .. }));
        assert_eq!(transport.request_count(HttpMethod::Get, URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_fails_immediately() {
        let transport = ScriptedTransport::new();
        transport.script(HttpMethod::Get, URL, vec![Reply::status(400)]);

        let err = policy(3)
            .send(&transport, HttpRequest::get(URL))
            .await
            .unwrap_err();

        assert!(matches!(err, ModpilotError::Upstream { status: 400, .. }));
        assert_eq!(transport.request_count(HttpMethod::Get, URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_exhaust_into_upstream() {
        let transport = ScriptedTransport::new();
        transport.script(HttpMethod::Get, URL, vec![Reply::status(502)]);

        let err = policy(1)
            .send(&transport, HttpRequest::get(URL))
            .await
            .unwrap_err();

        assert!(matches!(err, ModpilotError::Upstream { status: 502, .. }));
        assert_eq!(transport.request_count(HttpMethod::Get, URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_delay_precedes_every_request() {
        let transport = ScriptedTransport::new();
        transport.script(HttpMethod::Get, URL, vec![Reply::json(200, "{}")]);
        let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(1));

        let started = Instant::now();
        policy.send(&transport, HttpRequest::get(URL)).await.unwrap();
        policy.send(&transport, HttpRequest::get(URL)).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
