//! HTTP probe executor with retry and exponential backoff.

use std::time::{Duration, Instant};

use super::ProbeError;
use crate::db::ProbeResult;
use crate::registry::Target;

/// Timeout applied to each individual HTTP attempt.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Delay before the first retry; doubles on each subsequent one.
pub const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Retries allowed after the initial attempt, for non-timeout transport
/// failures.
pub const MAX_RETRIES: u32 = 2;

/// Executes health probes against targets.
///
/// `probe` never fails: timeouts, refused connections, and bad responses
/// all come back as a status on the result record.
pub struct ProbeExecutor {
    client: reqwest::Client,
    attempt_timeout: Duration,
    base_delay: Duration,
    max_retries: u32,
}

impl ProbeExecutor {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_policy(ATTEMPT_TIMEOUT, BASE_RETRY_DELAY, MAX_RETRIES)
    }

    /// Build an executor with an explicit retry policy.
    pub fn with_policy(
        attempt_timeout: Duration,
        base_delay: Duration,
        max_retries: u32,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(attempt_timeout)
            .build()?;

        Ok(Self {
            client,
            attempt_timeout,
            base_delay,
            max_retries,
        })
    }

    /// Probe one target, absorbing every failure mode into the result.
    ///
    /// Latency is measured from just before the first attempt to the final
    /// response receipt, so it includes any backoff spent along the way;
    /// it is absent when no response was ever received.
    pub async fn probe(&self, target: &Target) -> ProbeResult {
        let url = target.probe_url();
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            match self.attempt(&url).await {
                Ok(response) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    let code = response.status().as_u16();

                    if code == 200 {
                        return match response.json::<serde_json::Value>().await {
                            Ok(body) => ProbeResult::healthy(&target.id, latency_ms, body),
                            Err(e) => ProbeResult::error(
                                &target.id,
                                Some(latency_ms),
                                format!("invalid status payload: {}", e),
                            ),
                        };
                    }

                    return ProbeResult::unhealthy(
                        &target.id,
                        latency_ms,
                        format!("HTTP {}", code),
                    );
                }
                Err(ProbeError::Timeout(after)) => {
                    return ProbeResult::timeout(
                        &target.id,
                        format!("request timed out after {:?}", after),
                    );
                }
                Err(ProbeError::Transport(description)) => {
                    if attempt >= self.max_retries {
                        return ProbeResult::error(&target.id, None, description);
                    }
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        "Retry attempt {} for {} after {:?}: {}",
                        attempt + 1,
                        target.id,
                        delay,
                        description
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<reqwest::Response, ProbeError> {
        self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.attempt_timeout)
            } else {
                ProbeError::Transport(e.to_string())
            }
        })
    }

    /// Delay before retrying after the given zero-based failed attempt.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProbeStatus;
    use crate::registry::{Priority, Target};
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// What the fixture server does with each successive connection.
    enum Step {
        Respond(u16, &'static str, &'static str),
        Hangup,
        Stall,
    }

    fn test_target(addr: SocketAddr) -> Target {
        Target {
            id: "svc".to_string(),
            display_name: "Service".to_string(),
            base_address: format!("http://{}", addr),
            probe_path: "/api/status".to_string(),
            cadence_seconds: 300,
            priority: Priority::High,
        }
    }

    async fn spawn_server(steps: Vec<Step>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for step in steps {
                let (mut socket, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                match step {
                    Step::Respond(code, reason, body) => {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            code,
                            reason,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                    Step::Hangup => drop(socket),
                    Step::Stall => {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        // Hold the connection open without answering.
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        addr
    }

    fn fast_executor() -> ProbeExecutor {
        ProbeExecutor::with_policy(
            Duration::from_millis(200),
            Duration::from_millis(40),
            MAX_RETRIES,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn healthy_on_200_with_json_body() {
        let addr = spawn_server(vec![Step::Respond(200, "OK", r#"{"status":"ok"}"#)]).await;
        let result = fast_executor().probe(&test_target(addr)).await;

        assert_eq!(result.status, ProbeStatus::Healthy);
        assert!(result.latency_ms.is_some());
        assert_eq!(result.metadata, Some(serde_json::json!({"status": "ok"})));
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn unhealthy_on_non_200() {
        let addr = spawn_server(vec![Step::Respond(503, "Service Unavailable", "{}")]).await;
        let result = fast_executor().probe(&test_target(addr)).await;

        assert_eq!(result.status, ProbeStatus::Unhealthy);
        assert_eq!(result.error_message.as_deref(), Some("HTTP 503"));
        assert!(result.latency_ms.is_some());
        assert!(result.metadata.is_none());
    }

    #[tokio::test]
    async fn error_on_200_with_undecodable_body() {
        let addr = spawn_server(vec![Step::Respond(200, "OK", "plain text")]).await;
        let result = fast_executor().probe(&test_target(addr)).await;

        assert_eq!(result.status, ProbeStatus::Error);
        // A response arrived, so latency is still recorded.
        assert!(result.latency_ms.is_some());
        assert!(result.metadata.is_none());
    }

    #[tokio::test]
    async fn timeout_is_not_retried() {
        let addr = spawn_server(vec![Step::Stall]).await;
        let started = Instant::now();
        let result = fast_executor().probe(&test_target(addr)).await;

        assert_eq!(result.status, ProbeStatus::Timeout);
        assert!(result.latency_ms.is_none());
        // One 200ms attempt, no backoff rounds.
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn transport_failures_exhaust_retries() {
        // Bind then drop so the port refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let started = Instant::now();
        let result = fast_executor().probe(&test_target(addr)).await;

        assert_eq!(result.status, ProbeStatus::Error);
        assert!(result.latency_ms.is_none());
        assert!(result.error_message.is_some());
        // Two backoff rounds at 40ms and 80ms.
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn recovers_after_transport_failures() {
        let addr = spawn_server(vec![
            Step::Hangup,
            Step::Hangup,
            Step::Respond(200, "OK", r#"{"status":"ok"}"#),
        ])
        .await;

        let started = Instant::now();
        let result = fast_executor().probe(&test_target(addr)).await;

        assert_eq!(result.status, ProbeStatus::Healthy);
        // The two retry delays (40ms, 80ms) are part of the measured latency.
        assert!(started.elapsed() >= Duration::from_millis(120));
        assert!(result.latency_ms.unwrap() >= 120);
    }

    #[test]
    fn default_backoff_is_one_then_two_seconds() {
        let executor = ProbeExecutor::new().unwrap();
        assert_eq!(executor.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(executor.backoff_delay(1), Duration::from_secs(2));
    }
}
