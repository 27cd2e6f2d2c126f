//! 原始 payload 归档 - 保存轮询到的文档，便于离线调整提取规则

use anyhow::Result;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;

/// payload 归档目录
#[derive(Debug, Clone)]
pub struct PayloadArchive {
    dir: PathBuf,
}

impl PayloadArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 写入 `html_<时间戳>.html`，返回文件路径
    pub fn save(&self, body: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let name = format!("html_{}.html", Utc::now().format("%Y%m%d_%H%M%S_%6f"));
        let path = self.dir.join(name);
        fs::write(&path, body)?;
        Ok(path)
    }
}
