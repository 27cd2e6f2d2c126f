//! Monitor lease - 单实例锁文件
//!
//! 文件以 create-new 方式创建，内容是创建时间（RFC 3339），
//! 持有期间加 fs2 排他锁。启动时文件已存在则放弃启动。

use chrono::Utc;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{MonitorError, Result};

/// 单实例 lease
#[derive(Debug)]
pub struct MonitorLease {
    path: PathBuf,
    file: Option<File>,
    created_at: String,
}

impl MonitorLease {
    /// 获取 lease；已被持有时返回 `LeaseConflict`
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(MonitorError::LeaseConflict {
                    path: path.display().to_string(),
                    created_at: Self::inspect(&path).unwrap_or_else(|| "unknown".to_string()),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = file.try_lock_exclusive() {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        // 写入失败时 lease 被 drop，文件随之删除
        let mut lease = Self {
            path,
            file: Some(file),
            created_at: Utc::now().to_rfc3339(),
        };
        lease.write_stamp()?;

        info!(path = %lease.path.display(), "Monitor lease acquired");
        Ok(lease)
    }

    fn write_stamp(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(self.created_at.as_bytes())?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// 读取现有 lease 的创建时间；不存在时返回 None
    pub fn inspect(path: &Path) -> Option<String> {
        fs::read_to_string(path).ok().map(|s| s.trim().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// 释放 lease（解锁并删除文件）
    pub fn release(mut self) -> Result<()> {
        self.remove()?;
        info!(path = %self.path.display(), "Monitor lease released");
        Ok(())
    }

    fn remove(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
            drop(file);
            match fs::remove_file(&self.path) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }
}

impl Drop for MonitorLease {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove lease file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.lock");

        let lease = MonitorLease::acquire(&path).unwrap();
        assert!(path.exists());
        assert_eq!(MonitorLease::inspect(&path).as_deref(), Some(lease.created_at()));

        match MonitorLease::acquire(&path) {
            Err(MonitorError::LeaseConflict { created_at, .. }) => {
                assert_eq!(created_at, lease.created_at());
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        lease.release().unwrap();
        assert!(!path.exists());
        assert!(MonitorLease::inspect(&path).is_none());
    }

    #[test]
    fn test_failed_stamp_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.lock");
        fs::write(&path, "").unwrap();

        // 只读句柄使 write_all 失败
        let mut lease = MonitorLease {
            path: path.clone(),
            file: Some(File::open(&path).unwrap()),
            created_at: Utc::now().to_rfc3339(),
        };
        assert!(lease.write_stamp().is_err());
        drop(lease);

        assert!(!path.exists());
        let next = MonitorLease::acquire(&path).unwrap();
        assert_eq!(MonitorLease::inspect(&path).as_deref(), Some(next.created_at()));
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.lock");
        {
            let _lease = MonitorLease::acquire(&path).unwrap();
        }
        assert!(!path.exists());
        assert!(MonitorLease::acquire(&path).is_ok());
    }
}
