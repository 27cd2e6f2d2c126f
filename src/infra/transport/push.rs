//! 推送 transport - WebSocket 长连接

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::{Payload, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport
///
/// 连接在第一次 `next_payload` 时建立；任何断开都会丢弃连接句柄，
/// 下一次调用重新连接。
pub struct PushTransport {
    url: String,
    connect_timeout: Duration,
    /// 超过该时长没有任何入站消息视为连接失效
    idle_timeout: Duration,
    stream: Option<WsStream>,
}

impl PushTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(120),
            stream: None,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let (stream, response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        info!(url = %self.url, status = response.status().as_u16(), "WebSocket connected");
        self.stream = Some(stream);
        Ok(())
    }
}

#[async_trait]
impl Transport for PushTransport {
    fn describe(&self) -> String {
        format!("push {}", self.url)
    }

    async fn next_payload(&mut self) -> Result<Payload, TransportError> {
        if self.stream.is_none() {
            self.connect().await?;
        }

        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Err(TransportError::Closed("not connected".to_string()));
            };

            let next = match timeout(self.idle_timeout, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.stream = None;
                    return Err(TransportError::Timeout(self.idle_timeout));
                }
            };

            match next {
                Some(Ok(Message::Text(text))) => return Ok(Payload::new(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Payload::new(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Some(Ok(Message::Close(frame))) => {
                    self.stream = None;
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "remote closed".to_string());
                    return Err(TransportError::Closed(reason));
                }
                // ping/pong 由 tungstenite 自动应答
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(TransportError::Io(e.to_string()));
                }
                None => {
                    self.stream = None;
                    return Err(TransportError::Closed("stream ended".to_string()));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(url = %self.url, error = %e, "WebSocket close failed");
            }
            info!(url = %self.url, "WebSocket closed");
        }
    }
}
