//! 会话凭证 - 为轮询请求提供 cookie
//!
//! 核心只需要同步地拿到当前凭证，以及在发现会话过期时通知刷新。
//! 登录流程本身在外部（由它负责重写 cookie 文件）。

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

/// 不透明凭证（Cookie 请求头）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub cookie_header: String,
}

impl Credentials {
    /// 从 name -> value 映射构建 cookie 头
    pub fn from_cookies(cookies: &BTreeMap<String, String>) -> Self {
        let cookie_header = cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        Self { cookie_header }
    }
}

/// 凭证提供者
pub trait CredentialProvider: Send + Sync {
    fn current_credentials(&self) -> Option<Credentials>;

    /// 会话已过期，请刷新
    fn mark_expired(&self);
}

/// 固定凭证
pub struct StaticCredentials(pub Option<Credentials>);

impl CredentialProvider for StaticCredentials {
    fn current_credentials(&self) -> Option<Credentials> {
        self.0.clone()
    }

    fn mark_expired(&self) {
        warn!("Static credentials expired; they cannot be refreshed");
    }
}

/// 从 JSON cookie 文件（`{"name": "value"}`）读取凭证，过期后重新加载
pub struct CookieFileCredentials {
    path: PathBuf,
    cached: Mutex<Option<Credentials>>,
}

impl CookieFileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    fn load(&self) -> Option<Credentials> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read cookie file");
                return None;
            }
        };
        match serde_json::from_str::<BTreeMap<String, String>>(&content) {
            Ok(cookies) => {
                debug!(path = %self.path.display(), count = cookies.len(), "Cookies loaded");
                Some(Credentials::from_cookies(&cookies))
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Invalid cookie file");
                None
            }
        }
    }
}

impl CredentialProvider for CookieFileCredentials {
    fn current_credentials(&self) -> Option<Credentials> {
        let mut cached = self.cached.lock().unwrap_or_else(|p| p.into_inner());
        if cached.is_none() {
            *cached = self.load();
        }
        cached.clone()
    }

    fn mark_expired(&self) {
        let mut cached = self.cached.lock().unwrap_or_else(|p| p.into_inner());
        *cached = None;
    }
}
