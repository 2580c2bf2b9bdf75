//! Notification over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use certloom_capability::{CapabilityError, InvokeContext, Notifier, RunSummary};
use tracing::{info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// POSTs the run summary as JSON to the `url` parameter.
///
/// Any 2xx response counts as delivered.
#[derive(Debug, Clone, Default)]
pub struct WebhookNotifier {
  client: reqwest::Client,
}

impl WebhookNotifier {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Notifier for WebhookNotifier {
  async fn notify(&self, ctx: &InvokeContext, summary: &RunSummary) -> Result<(), CapabilityError> {
    let url = ctx
      .param_str("url")
      .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
      .ok_or_else(|| CapabilityError::InvalidParams("'url' must be an http(s) URL".to_string()))?;

    let request = self
      .client
      .post(url)
      .timeout(ctx.remaining().unwrap_or(DEFAULT_TIMEOUT))
      .json(summary)
      .send();

    let response = tokio::select! {
      _ = ctx.cancel.cancelled() => return Err(CapabilityError::Canceled),
      response = request => response.map_err(|e| CapabilityError::Failed(e.to_string()))?,
    };

    let status = response.status();
    if !status.is_success() {
      warn!(node_id = %ctx.node_id, status = %status, "webhook_rejected");
      return Err(CapabilityError::Failed(format!("webhook returned {status}")));
    }
    info!(node_id = %ctx.node_id, status = %status, "webhook_delivered");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use certloom_capability::NodeSummary;
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn summary() -> RunSummary {
    RunSummary {
      workflow_id: "wf".to_string(),
      run_id: "run-1".to_string(),
      status: "running".to_string(),
      subject: "[running] wf".to_string(),
      message: "2 nodes".to_string(),
      nodes: vec![NodeSummary {
        id: "apply".to_string(),
        name: "Apply".to_string(),
        status: "succeeded".to_string(),
      }],
      error: None,
    }
  }

  fn ctx(url: &str) -> InvokeContext {
    let mut ctx = InvokeContext::new("wf", "run-1", "notify");
    ctx.params.insert("url".to_string(), serde_json::json!(url));
    ctx
  }

  #[tokio::test]
  async fn test_posts_summary_json() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/hook"))
      .and(body_json(summary()))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&mock_server)
      .await;

    let url = format!("{}/hook", mock_server.uri());
    WebhookNotifier::new().notify(&ctx(&url), &summary()).await.unwrap();
  }

  #[tokio::test]
  async fn test_error_status_fails() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/hook"))
      .respond_with(ResponseTemplate::new(500))
      .expect(1)
      .mount(&mock_server)
      .await;

    let url = format!("{}/hook", mock_server.uri());
    let err = WebhookNotifier::new()
      .notify(&ctx(&url), &summary())
      .await
      .unwrap_err();
    assert!(matches!(err, CapabilityError::Failed(m) if m.contains("500")));
  }

  #[tokio::test]
  async fn test_rejects_missing_url() {
    let err = WebhookNotifier::new()
      .notify(&ctx("ftp://example.com"), &summary())
      .await
      .unwrap_err();
    assert!(matches!(err, CapabilityError::InvalidParams(_)));
  }

  #[tokio::test]
  async fn test_cancel_interrupts_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/hook"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
      .mount(&mock_server)
      .await;

    let ctx = ctx(&format!("{}/hook", mock_server.uri()));
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      cancel.cancel();
    });

    let started = std::time::Instant::now();
    let err = WebhookNotifier::new()
      .notify(&ctx, &summary())
      .await
      .unwrap_err();
    assert!(matches!(err, CapabilityError::Canceled));
    assert!(started.elapsed() < Duration::from_secs(10));
  }
}
