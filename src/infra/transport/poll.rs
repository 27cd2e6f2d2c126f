//! 轮询 transport - 固定间隔获取整个文档

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::Client;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::{Payload, Transport, TransportError};
use crate::infra::archive::PayloadArchive;
use crate::infra::credentials::CredentialProvider;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/124.0";

/// 轮询配置
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub url: String,
    /// 两次请求的间隔
    pub interval: Duration,
    /// 请求超时（不小于 interval）
    pub timeout: Duration,
    pub user_agent: String,
    /// 响应中出现该子串（不区分大小写）表示会话过期
    pub expired_marker: Option<String>,
}

impl PollConfig {
    pub fn new(url: impl Into<String>, interval: Duration) -> Self {
        Self {
            url: url.into(),
            interval,
            timeout: interval,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            expired_marker: None,
        }
    }

    /// 超时短于轮询间隔会导致无意义的 backoff，这里取两者较大值
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.max(self.interval)
    }
}

/// HTTP 轮询 transport
pub struct PollTransport {
    client: Client,
    config: PollConfig,
    credentials: Option<Arc<dyn CredentialProvider>>,
    archive: Option<PayloadArchive>,
    next_due: Option<Instant>,
}

impl PollTransport {
    pub fn new(config: PollConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.effective_timeout())
            .build()
            .map_err(|e| TransportError::Io(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            credentials: None,
            archive: None,
            next_due: None,
        })
    }

    /// 设置凭证提供者
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// 设置原始文档归档
    pub fn with_archive(mut self, archive: PayloadArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    async fn fetch(&self) -> Result<String, TransportError> {
        let mut request = self
            .client
            .get(&self.config.url)
            .header(USER_AGENT, &self.config.user_agent);

        if let Some(creds) = self.credentials.as_ref().and_then(|p| p.current_credentials()) {
            request = request.header(COOKIE, creds.cookie_header);
        }

        let response = request.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        response.text().await.map_err(|e| self.map_error(e))
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.config.effective_timeout())
        } else if e.is_connect() {
            TransportError::Connect {
                url: self.config.url.clone(),
                reason: e.to_string(),
            }
        } else {
            TransportError::Io(e.to_string())
        }
    }

    fn session_expired(&self, body: &str) -> bool {
        match &self.config.expired_marker {
            Some(marker) if !marker.is_empty() => body.to_lowercase().contains(&marker.to_lowercase()),
            _ => false,
        }
    }
}

#[async_trait]
impl Transport for PollTransport {
    fn describe(&self) -> String {
        format!("poll {} every {:?}", self.config.url, self.config.interval)
    }

    async fn next_payload(&mut self) -> Result<Payload, TransportError> {
        if let Some(due) = self.next_due {
            sleep_until(due).await;
        }
        self.next_due = Some(Instant::now() + self.config.interval);

        let body = self.fetch().await?;

        if self.session_expired(&body) {
            warn!(url = %self.config.url, "Session expired, requesting credential refresh");
            if let Some(provider) = &self.credentials {
                provider.mark_expired();
            }
            return Err(TransportError::CredentialsExpired);
        }

        if let Some(archive) = &self.archive {
            match archive.save(&body) {
                Ok(path) => debug!(path = %path.display(), len = body.len(), "Payload archived"),
                Err(e) => warn!(error = %e, "Failed to archive payload"),
            }
        }

        debug!(len = body.len(), "Document fetched");
        Ok(Payload::new(body))
    }

    async fn close(&mut self) {
        self.next_due = None;
        debug!(url = %self.config.url, "Poll transport closed");
    }
}
