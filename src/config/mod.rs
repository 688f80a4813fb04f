use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // 存储配置
    pub converters_file: String,
    pub audit_log_file: Option<String>,

    // 输出配置
    pub output_dir: String,
    pub write_yaml_file: bool,

    // 日志配置
    pub log_level: String,

    // 启动时写入内置预设
    pub seed_default_converters: bool,

    // 默认身份标识（命令行未指定时使用）
    pub default_caller_id: String,
    pub default_context_id: String,

    // 统计窗口（天）
    pub stats_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            converters_file: "./data/converters.yaml".to_string(),
            audit_log_file: Some("./data/conversions.jsonl".to_string()),
            output_dir: "./output".to_string(),
            write_yaml_file: true,
            log_level: "info".to_string(),
            seed_default_converters: true,
            default_caller_id: "cli".to_string(),
            default_context_id: "local".to_string(),
            stats_days: 30,
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn is_audit_enabled(&self) -> bool {
        self.audit_log_file.is_some()
    }
}
