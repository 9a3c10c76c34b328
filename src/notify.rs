//! 上传完成后的 Webhook 通知：后台发送，失败只记录日志，不重试。

use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub files_uploaded: usize,
}

#[derive(Serialize)]
struct WebhookPayload {
    text: String,
}

#[derive(Debug)]
pub enum NotifyError {
    Request(reqwest::Error),
    Status(StatusCode),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Request(err) => write!(f, "webhook request failed: {err}"),
            NotifyError::Status(status) => write!(f, "webhook responded with {status}"),
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Request(err)
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    url: Option<String>,
}

impl Notifier {
    /// 构建通知器；`url` 为空时不发送任何请求。
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, std::io::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        let url = url.filter(|value| !value.trim().is_empty());
        Ok(Self { client, url })
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// 在独立任务中发送通知，不阻塞调用方。
    pub fn notify(&self, summary: UploadSummary) -> Option<JoinHandle<()>> {
        self.url.as_ref()?;
        let notifier = self.clone();
        Some(tokio::spawn(async move {
            match notifier.send(summary).await {
                Ok(()) => info!(files = summary.files_uploaded, "upload webhook delivered"),
                Err(err) => warn!(error = %err, "upload webhook failed"),
            }
        }))
    }

    /// 发送一次通知请求。
    pub async fn send(&self, summary: UploadSummary) -> Result<(), NotifyError> {
        let Some(url) = self.url.as_deref() else {
            return Ok(());
        };
        let payload = WebhookPayload {
            text: format!(
                "{} file(s) uploaded successfully",
                summary.files_uploaded
            ),
        };
        let response = self.client.post(url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status));
        }
        Ok(())
    }
}
