//! Telegram 渠道 - 通过 Bot API 发送信号

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::notification::channel::{DeliveryReport, Destination, Notifier, RenderedAlert, SendResult};

/// Telegram 渠道配置
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token
    pub token: String,
    /// API 地址（测试时可指向 mock server）
    pub api_base: String,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 15,
        }
    }
}

/// Bot API 响应
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram 通知器
#[derive(Debug)]
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, String> {
        if config.token.is_empty() {
            return Err("telegram token is required".to_string());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    /// 构建请求体：有图片时用 sendPhoto（caption），否则 sendMessage
    fn request_body(destination: &Destination, alert: &RenderedAlert) -> (&'static str, serde_json::Value) {
        let mut body = match &alert.image_url {
            Some(photo) => serde_json::json!({
                "chat_id": destination.as_str(),
                "photo": photo,
                "caption": alert.text,
                "parse_mode": "HTML",
            }),
            None => serde_json::json!({
                "chat_id": destination.as_str(),
                "text": alert.text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
        };

        if let Some((label, url)) = &alert.link {
            body["reply_markup"] = serde_json::json!({
                "inline_keyboard": [[{ "text": label, "url": url }]]
            });
        }

        let method = if alert.image_url.is_some() { "sendPhoto" } else { "sendMessage" };
        (method, body)
    }

    async fn send_one(&self, destination: &Destination, alert: &RenderedAlert) -> SendResult {
        let (method, body) = Self::request_body(destination, alert);

        let response = match self.client.post(self.method_url(method)).json(&body).send().await {
            Ok(r) => r,
            Err(e) => return SendResult::Failed(format!("HTTP request failed: {}", e)),
        };

        let status = response.status();
        match response.json::<TelegramResponse>().await {
            Ok(r) if r.ok => {
                debug!(destination = %destination, method, "Telegram message sent");
                SendResult::Sent
            }
            Ok(r) => SendResult::Failed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                r.description.unwrap_or_else(|| "Unknown error".to_string())
            )),
            Err(e) => SendResult::Failed(format!("HTTP {}: failed to parse response: {}", status.as_u16(), e)),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, destinations: &[Destination], alert: &RenderedAlert) -> Vec<DeliveryReport> {
        let sends = destinations.iter().map(|d| async move {
            DeliveryReport {
                destination: d.clone(),
                result: self.send_one(d, alert).await,
            }
        });
        join_all(sends).await
    }
}
