use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::provider::{RemoteTaskRequest, TaskBatchOutput};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends a remote task request to a peer endpoint.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Deliver `request` to `endpoint` and return the peer's results.
    ///
    /// `timeout` is the job's deadline; implementations fall back to their
    /// own default when it is absent.
    async fn run_tasks(
        &self,
        endpoint: &str,
        request: &RemoteTaskRequest,
        timeout: Option<Duration>,
    ) -> anyhow::Result<TaskBatchOutput>;
}

/// Failures talking to a peer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {endpoint} timed out after {after_ms} ms")]
    Timeout {
        endpoint: String,
        after_ms: u64,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("request to {endpoint} failed")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("peer {endpoint} answered {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to build http client")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid response from {endpoint}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// True when the peer did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// JSON-over-HTTP transport: `POST {endpoint}` with the request body.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport whose calls default to `default_timeout`.
    ///
    /// # Errors
    ///
    /// Fails when the TLS backend or system configuration cannot be loaded.
    pub fn new(default_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|source| TransportError::Client { source })?;
        Ok(Self::with_client(client, default_timeout))
    }

    /// Wraps an existing client, e.g. one with custom TLS or proxy settings.
    pub fn with_client(client: reqwest::Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    fn request_error(endpoint: &str, deadline: Duration, source: reqwest::Error) -> TransportError {
        if source.is_timeout() {
            TransportError::Timeout {
                endpoint: endpoint.to_string(),
                after_ms: duration_ms(deadline),
                source: Some(source),
            }
        } else {
            TransportError::Request {
                endpoint: endpoint.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn run_tasks(
        &self,
        endpoint: &str,
        request: &RemoteTaskRequest,
        timeout: Option<Duration>,
    ) -> anyhow::Result<TaskBatchOutput> {
        let deadline = timeout.unwrap_or(self.default_timeout);

        let response = self
            .client
            .post(endpoint)
            .json(request)
            .timeout(deadline)
            .send()
            .await
            .map_err(|source| Self::request_error(endpoint, deadline, source))?;

        let status = response.status();
        if status.is_success() {
            let output = response.json::<TaskBatchOutput>().await.map_err(|source| {
                if source.is_timeout() {
                    Self::request_error(endpoint, deadline, source)
                } else {
                    TransportError::Decode {
                        endpoint: endpoint.to_string(),
                        source,
                    }
                }
            })?;
            return Ok(output);
        }

        if matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT) {
            return Err(TransportError::Timeout {
                endpoint: endpoint.to_string(),
                after_ms: duration_ms(deadline),
                source: None,
            }
            .into());
        }

        let body = match response.bytes().await {
            Ok(bytes) => error_message(&bytes),
            Err(err) => {
                tracing::warn!(endpoint, status = status.as_u16(), error = %err, "failed to read error body from peer");
                format!("unreadable response body: {err}")
            }
        };
        Err(TransportError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        }
        .into())
    }
}

/// Pull `message` or `error` out of a JSON error body, else the raw text.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).to_string())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::classify::{classify_failure, FailureKind};
    use crate::job::RunnerResult;
    use crate::provider::TaskInvocation;
    use crate::run::RunId;
    use axum::body::{Body, Bytes};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    async fn spawn_peer(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/run")
    }

    fn request() -> RemoteTaskRequest {
        RemoteTaskRequest {
            url: "https://x".into(),
            runners: vec![TaskInvocation {
                name: "title".into(),
                input: serde_json::Map::new(),
            }],
            run_id: RunId::from("run-1"),
            region: "eu".into(),
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_posts_request_and_decodes_results() {
        let app = Router::new().route(
            "/run",
            post(|Json(body): Json<RemoteTaskRequest>| async move {
                let results: Vec<RunnerResult> = body
                    .runners
                    .iter()
                    .map(|r| RunnerResult::pass(r.name.clone()))
                    .collect();
                Json(TaskBatchOutput { results })
            }),
        );
        let endpoint = spawn_peer(app).await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let output = transport.run_tasks(&endpoint, &request(), None).await.unwrap();
        assert_eq!(output.results, vec![RunnerResult::pass("title")]);
    }

    #[tokio::test]
    async fn test_error_status_surfaces_message() {
        let app = Router::new().route(
            "/run",
            post(|| async {
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "message": "browser pool exhausted" })),
                )
            }),
        );
        let endpoint = spawn_peer(app).await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport
            .run_tasks(&endpoint, &request(), None)
            .await
            .unwrap_err();
        let transport_err = err.downcast_ref::<TransportError>().unwrap();
        assert!(matches!(
            transport_err,
            TransportError::Status { status: 502, .. }
        ));
        assert!(err.to_string().contains("browser pool exhausted"));
        assert_eq!(classify_failure(&err), FailureKind::Failed);
    }

    #[tokio::test]
    async fn test_truncated_error_body_is_reported() {
        let app = Router::new().route(
            "/run",
            post(|| async {
                let chunks = futures::stream::iter(vec![
                    Ok::<_, std::io::Error>(Bytes::from_static(b"{\"message\":")),
                    Err(std::io::Error::other("peer crashed mid-response")),
                ]);
                (StatusCode::INTERNAL_SERVER_ERROR, Body::from_stream(chunks))
            }),
        );
        let endpoint = spawn_peer(app).await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport
            .run_tasks(&endpoint, &request(), None)
            .await
            .unwrap_err();
        match err.downcast_ref::<TransportError>() {
            Some(TransportError::Status { status: 500, body, .. }) => {
                assert!(body.starts_with("unreadable response body"), "{body}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_new_builds_client() {
        let transport = HttpTransport::new(Duration::from_secs(7)).unwrap();
        assert_eq!(transport.default_timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_gateway_timeout_status_is_timeout() {
        let app = Router::new().route("/run", post(|| async { StatusCode::GATEWAY_TIMEOUT }));
        let endpoint = spawn_peer(app).await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport
            .run_tasks(&endpoint, &request(), None)
            .await
            .unwrap_err();
        assert_eq!(classify_failure(&err), FailureKind::TimedOut);
    }

    #[tokio::test]
    async fn test_slow_peer_hits_job_deadline() {
        let app = Router::new().route(
            "/run",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(TaskBatchOutput::default())
            }),
        );
        let endpoint = spawn_peer(app).await;
        let transport = HttpTransport::new(Duration::from_secs(30)).unwrap();

        let err = transport
            .run_tasks(&endpoint, &request(), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<TransportError>().unwrap().is_timeout());
        assert_eq!(classify_failure(&err), FailureKind::TimedOut);
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_request_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport
            .run_tasks(&format!("http://{addr}/run"), &request(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::Request { .. })
        ));
    }

    #[test]
    fn test_error_message_prefers_json_fields() {
        assert_eq!(error_message(br#"{"error": "bad region"}"#), "bad region");
        assert_eq!(error_message(b"plain text"), "plain text");
    }
}
