//! 信号存储 - 本地 JSONL 文件（只追加）

use anyhow::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::signal::AlertRecord;

/// 信号日志 trait
///
/// 只追加，每次调用一条记录，从不覆盖。
pub trait LogSink: Send + Sync {
    fn append(&self, record: &AlertRecord) -> Result<()>;
}

/// JSONL 文件日志
#[derive(Debug, Clone)]
pub struct JsonlLogSink {
    path: PathBuf,
}

impl JsonlLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取最近 N 条信号（按时间排序）
    pub fn read_recent(&self, n: usize) -> Vec<AlertRecord> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let reader = BufReader::new(file);
        let records: Vec<AlertRecord> = reader
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        let start = records.len().saturating_sub(n);
        let mut recent = records[start..].to_vec();
        recent.sort_by_key(|r| r.observed_at);
        recent
    }
}

impl LogSink for JsonlLogSink {
    /// 追加记录（带文件锁）
    fn append(&self, record: &AlertRecord) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        file.lock_exclusive()?;
        let mut file = file;
        let result = writeln!(file, "{}", serde_json::to_string(record)?);
        file.unlock()?;

        Ok(result?)
    }
}
