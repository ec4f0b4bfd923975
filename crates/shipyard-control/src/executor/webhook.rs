//! Executor that triggers a CI pipeline through a webhook.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{DeploymentExecutor, ExecutionRequest};
use crate::config::ExecutorConfig;
use crate::error::{ControlError, ControlResult};

/// POSTs each deployment as JSON to a CI webhook.
///
/// A non-2xx response or a transport error fails the deployment.
#[derive(Debug, Clone)]
pub struct WebhookExecutor {
    client: Client,
    url: String,
    token: Option<String>,
}

impl WebhookExecutor {
    /// Create a webhook executor from configuration.
    pub fn new(config: &ExecutorConfig) -> ControlResult<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ControlError::Config("executor.url is not set".to_owned()))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ControlError::Http)?;

        Ok(Self {
            client,
            url,
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl DeploymentExecutor for WebhookExecutor {
    async fn apply(&self, request: &ExecutionRequest) -> ControlResult<()> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %self.url, error = %e, "webhook request failed");
            ControlError::executor(format!("webhook request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::executor(format!(
                "webhook returned {status}"
            )));
        }

        debug!(
            service = %request.service_name,
            environment = %request.environment,
            version = %request.version,
            status = %status,
            "webhook accepted deployment"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;
    use crate::config::ExecutorKind;
    use crate::types::DeploymentAction;

    type Seen = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn hook(
        State((seen, reply)): State<(Seen, StatusCode)>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        seen.lock().unwrap().push((auth, body));
        reply
    }

    async fn serve(reply: StatusCode) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/deploy", post(hook))
            .with_state((Arc::clone(&seen), reply));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{addr}/deploy"), seen)
    }

    fn config(url: String) -> ExecutorConfig {
        ExecutorConfig {
            kind: ExecutorKind::Webhook,
            url: Some(url),
            token: Some("s3cret".to_owned()),
            timeout_secs: 5,
        }
    }

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            service_name: "orders".to_owned(),
            environment: "prod".to_owned(),
            branch: "master".to_owned(),
            version: "v3".to_owned(),
            action: DeploymentAction::Rollback,
            requested_by: "alice".to_owned(),
        }
    }

    #[tokio::test]
    async fn posts_payload_with_bearer_token() {
        let (url, seen) = serve(StatusCode::ACCEPTED).await;
        let executor = WebhookExecutor::new(&config(url)).unwrap();
        executor.apply(&request()).await.unwrap();

        let seen = seen.lock().unwrap();
        let (auth, body) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Bearer s3cret"));
        assert_eq!(body["serviceName"], "orders");
        assert_eq!(body["branch"], "master");
        assert_eq!(body["action"], "rollback");
    }

    #[tokio::test]
    async fn error_status_fails_deployment() {
        let (url, _) = serve(StatusCode::BAD_GATEWAY).await;
        let executor = WebhookExecutor::new(&config(url)).unwrap();
        let err = executor.apply(&request()).await.unwrap_err();
        assert!(matches!(err, ControlError::ExecutorFailure(_)));
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn unreachable_webhook_fails_deployment() {
        let executor =
            WebhookExecutor::new(&config("http://127.0.0.1:1/deploy".to_owned())).unwrap();
        assert!(matches!(
            executor.apply(&request()).await,
            Err(ControlError::ExecutorFailure(_))
        ));
    }
}
