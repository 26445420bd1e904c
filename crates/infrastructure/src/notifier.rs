use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use taskhub_core::{
    Notification, NotifierConfig, NotifierKind, Notifier, NotifyPriority, SchedulerError,
    SchedulerResult,
};

/// 写入日志的通知渠道
pub struct LogNotifier {
    name: String,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self {
            name: "log".to_string(),
        }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> SchedulerResult<()> {
        match notification.priority {
            NotifyPriority::High => warn!(
                channel = %self.name,
                priority = %notification.priority,
                title = %notification.title,
                message = %notification.message,
                "Notification sent"
            ),
            NotifyPriority::Low | NotifyPriority::Medium => info!(
                channel = %self.name,
                priority = %notification.priority,
                title = %notification.title,
                message = %notification.message,
                "Notification sent"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 以 JSON POST 推送到 webhook 的通知渠道
pub struct WebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Notification(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            webhook_url: webhook_url.into(),
            client,
        })
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> SchedulerResult<()> {
        let payload = json!({
            "title": notification.title,
            "message": notification.message,
            "priority": notification.priority,
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                SchedulerError::Notification(format!("发送webhook到 {} 失败: {e}", self.webhook_url))
            })?;

        let status = response.status();
        if status.is_success() {
            info!(url = %self.webhook_url, status = %status, "Webhook notification sent");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        error!(
            url = %self.webhook_url,
            status = %status,
            response_body = %body,
            "Webhook notification failed"
        );
        Err(SchedulerError::Notification(format!(
            "webhook 返回状态 {status}: {body}"
        )))
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// 按配置构建通知渠道
pub fn build_notifier(config: &NotifierConfig) -> SchedulerResult<Arc<dyn Notifier>> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier::new())),
        NotifierKind::Webhook => {
            let url = config
                .webhook_url
                .as_deref()
                .ok_or_else(|| SchedulerError::config_error("webhook 通知需要配置 webhook_url"))?;
            Ok(Arc::new(WebhookNotifier::new(
                url,
                Duration::from_secs(config.timeout_seconds),
            )?))
        }
    }
}
