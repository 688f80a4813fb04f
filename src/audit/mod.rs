//! 转换尝试审计日志
//!
//! 每次转换尝试恰好记录一条，成功失败都计入。写入是尽力而为的，
//! 失败由调用方降级为警告日志，不影响转换结果。

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 单次转换尝试的记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// 使用的转换器命令名
    pub converter_name: String,
    /// 发起者标识
    pub caller_id: String,
    /// 会话/群组标识
    pub context_id: String,
    /// 原始协议（检测失败时为 unknown）
    pub protocol: String,
    /// 原始传输层类型
    pub network: String,
    /// 原始服务器
    pub original_server: String,
    /// 修改后服务器（失败时为空）
    pub modified_server: String,
    /// 是否成功
    pub success: bool,
    /// 失败原因
    pub error_message: Option<String>,
    /// 记录时间
    pub used_at: DateTime<Utc>,
}

impl ConversionRecord {
    /// 成功记录
    pub fn success(
        converter_name: &str,
        caller_id: &str,
        context_id: &str,
        protocol: &str,
        network: &str,
        original_server: &str,
        modified_server: &str,
    ) -> Self {
        Self {
            converter_name: converter_name.to_string(),
            caller_id: caller_id.to_string(),
            context_id: context_id.to_string(),
            protocol: protocol.to_string(),
            network: network.to_string(),
            original_server: original_server.to_string(),
            modified_server: modified_server.to_string(),
            success: true,
            error_message: None,
            used_at: Utc::now(),
        }
    }

    /// 失败记录
    pub fn failure(
        converter_name: &str,
        caller_id: &str,
        context_id: &str,
        protocol: &str,
        network: &str,
        original_server: &str,
        error_message: String,
    ) -> Self {
        Self {
            converter_name: converter_name.to_string(),
            caller_id: caller_id.to_string(),
            context_id: context_id.to_string(),
            protocol: protocol.to_string(),
            network: network.to_string(),
            original_server: original_server.to_string(),
            modified_server: String::new(),
            success: false,
            error_message: Some(error_message),
            used_at: Utc::now(),
        }
    }
}

/// 审计日志接口
pub trait AuditLog: Send + Sync {
    /// 追加一条记录
    fn record(&self, entry: &ConversionRecord) -> anyhow::Result<()>;
    /// 最近的记录，新的在前
    fn recent(&self, limit: usize) -> anyhow::Result<Vec<ConversionRecord>>;
    /// 近 N 天内各转换器的成功次数
    fn usage_stats(&self, days: u32) -> anyhow::Result<BTreeMap<String, u64>>;
}

/// 按时间窗口统计成功次数
fn count_successes(
    records: &[ConversionRecord],
    days: u32,
) -> BTreeMap<String, u64> {
    let cutoff = Utc::now() - Duration::days(i64::from(days));
    let mut stats = BTreeMap::new();
    for record in records {
        if record.success && record.used_at >= cutoff {
            *stats.entry(record.converter_name.clone()).or_insert(0) += 1;
        }
    }
    stats
}

/// 内存审计日志
#[derive(Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<ConversionRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// 当前记录总数
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, entry: &ConversionRecord) -> anyhow::Result<()> {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> anyhow::Result<Vec<ConversionRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    fn usage_stats(&self, days: u32) -> anyhow::Result<BTreeMap<String, u64>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(count_successes(&records, days))
    }
}

/// JSON Lines 文件审计日志，一行一条记录
pub struct FileAuditLog {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl FileAuditLog {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_guard: Mutex::new(()),
        })
    }

    /// 读取全部记录，坏行跳过不中断
    fn load_all(&self) -> anyhow::Result<Vec<ConversionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ConversionRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("跳过无法解析的审计记录: {}", e),
            }
        }
        Ok(records)
    }
}

impl AuditLog for FileAuditLog {
    fn record(&self, entry: &ConversionRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(entry)?;
        let _guard = self.write_guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> anyhow::Result<Vec<ConversionRecord>> {
        let records = self.load_all()?;
        Ok(records.into_iter().rev().take(limit).collect())
    }

    fn usage_stats(&self, days: u32) -> anyhow::Result<BTreeMap<String, u64>> {
        let records = self.load_all()?;
        Ok(count_successes(&records, days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_success_record(converter: &str) -> ConversionRecord {
        ConversionRecord::success(
            converter,
            "user-1",
            "group-1",
            "trojan",
            "ws",
            "example.com",
            "bug.test",
        )
    }

    #[test]
    fn test_memory_audit_recent_order() {
        let audit = MemoryAuditLog::new();
        assert!(audit.is_empty());
        audit.record(&create_success_record("first")).unwrap();
        audit.record(&create_success_record("second")).unwrap();
        audit.record(&create_success_record("third")).unwrap();

        let recent = audit.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].converter_name, "third");
        assert_eq!(recent[1].converter_name, "second");
    }

    #[test]
    fn test_memory_audit_stats_counts_successes_only() {
        let audit = MemoryAuditLog::new();
        audit.record(&create_success_record("a")).unwrap();
        audit.record(&create_success_record("a")).unwrap();
        audit
            .record(&ConversionRecord::failure(
                "a",
                "user-1",
                "group-1",
                "unknown",
                "",
                "",
                "解码失败".to_string(),
            ))
            .unwrap();

        let stats = audit.usage_stats(30).unwrap();
        assert_eq!(stats.get("a"), Some(&2));
    }

    #[test]
    fn test_memory_audit_stats_time_window() {
        let audit = MemoryAuditLog::new();
        let mut old = create_success_record("a");
        old.used_at = Utc::now() - Duration::days(40);
        audit.record(&old).unwrap();
        audit.record(&create_success_record("a")).unwrap();

        let stats = audit.usage_stats(30).unwrap();
        assert_eq!(stats.get("a"), Some(&1));
    }

    #[test]
    fn test_file_audit_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversions.jsonl");

        let audit = FileAuditLog::open(&path).unwrap();
        audit.record(&create_success_record("a")).unwrap();
        audit.record(&create_success_record("b")).unwrap();

        // 重新打开后记录仍在
        let audit = FileAuditLog::open(&path).unwrap();
        let recent = audit.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].converter_name, "b");

        let stats = audit.usage_stats(30).unwrap();
        assert_eq!(stats.get("a"), Some(&1));
        assert_eq!(stats.get("b"), Some(&1));
    }

    #[test]
    fn test_file_audit_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversions.jsonl");

        let audit = FileAuditLog::open(&path).unwrap();
        audit.record(&create_success_record("a")).unwrap();
        fs::write(
            &path,
            format!("{}\nnot-json\n", fs::read_to_string(&path).unwrap().trim_end()),
        )
        .unwrap();

        let recent = audit.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_file_audit_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let audit = FileAuditLog::open(dir.path().join("missing.jsonl")).unwrap();
        assert!(audit.recent(10).unwrap().is_empty());
        assert!(audit.usage_stats(7).unwrap().is_empty());
    }
}
