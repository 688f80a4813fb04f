//! 转换器存储：内存实现与 YAML 文件实现

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::types::{Converter, DEFAULT_CONVERTERS};

/// 转换器存储接口
pub trait ConverterStore: Send + Sync {
    /// 按命令名查找
    fn get(&self, name: &str) -> anyhow::Result<Option<Converter>>;
    /// 全量列表（按名称排序）
    fn list(&self) -> anyhow::Result<Vec<Converter>>;
    /// 新建，命令名重复时报错
    fn create(&self, converter: &Converter) -> anyhow::Result<()>;
    /// 更新已有转换器并刷新更新时间
    fn update(&self, converter: &Converter) -> anyhow::Result<()>;
    /// 删除，返回是否确实存在
    fn delete(&self, name: &str) -> anyhow::Result<bool>;
    /// 使用次数加一
    fn increment_usage(&self, name: &str) -> anyhow::Result<()>;

    /// 仅启用中的转换器
    fn list_active(&self) -> anyhow::Result<Vec<Converter>> {
        Ok(self.list()?.into_iter().filter(|c| c.is_active).collect())
    }
}

/// 将缺失的内置预设写入存储，返回新插入的数量
pub fn seed_defaults(store: &dyn ConverterStore) -> anyhow::Result<usize> {
    let mut inserted = 0;
    for preset in DEFAULT_CONVERTERS.iter() {
        // 已存在的转换器不覆盖，保留用户修改
        if store.get(&preset.name)?.is_none() {
            let mut converter = preset.clone();
            let now = chrono::Utc::now();
            converter.created_at = now;
            converter.updated_at = now;
            store.create(&converter)?;
            inserted += 1;
        }
    }
    if inserted > 0 {
        log::info!("已写入 {} 个内置转换器预设", inserted);
    }
    Ok(inserted)
}

/// 内存存储，可并发读写
#[derive(Default)]
pub struct MemoryConverterStore {
    converters: DashMap<String, Converter>,
}

impl MemoryConverterStore {
    pub fn new() -> Self {
        Self {
            converters: DashMap::new(),
        }
    }
}

impl ConverterStore for MemoryConverterStore {
    fn get(&self, name: &str) -> anyhow::Result<Option<Converter>> {
        Ok(self.converters.get(name).map(|e| e.value().clone()))
    }

    fn list(&self) -> anyhow::Result<Vec<Converter>> {
        let mut all: Vec<Converter> = self
            .converters
            .iter()
            .map(|e| e.value().clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn create(&self, converter: &Converter) -> anyhow::Result<()> {
        match self.converters.entry(converter.name.clone()) {
            Entry::Occupied(_) => Err(anyhow::anyhow!("转换器已存在: {}", converter.name)),
            Entry::Vacant(slot) => {
                slot.insert(converter.clone());
                Ok(())
            }
        }
    }

    fn update(&self, converter: &Converter) -> anyhow::Result<()> {
        match self.converters.get_mut(&converter.name) {
            Some(mut entry) => {
                let mut updated = converter.clone();
                updated.updated_at = chrono::Utc::now();
                *entry = updated;
                Ok(())
            }
            None => Err(anyhow::anyhow!("转换器不存在: {}", converter.name)),
        }
    }

    fn delete(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.converters.remove(name).is_some())
    }

    fn increment_usage(&self, name: &str) -> anyhow::Result<()> {
        match self.converters.get_mut(name) {
            Some(mut entry) => {
                entry.usage_count += 1;
                Ok(())
            }
            None => Err(anyhow::anyhow!("转换器不存在: {}", name)),
        }
    }
}

/// YAML 文件存储
///
/// 启动时全量加载，每次变更全量写回。写操作经 RwLock 串行化，
/// 读操作走内存副本不碰磁盘。
pub struct FileConverterStore {
    path: PathBuf,
    converters: RwLock<Vec<Converter>>,
}

impl FileConverterStore {
    /// 打开存储文件，不存在时从空列表开始
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let converters = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_yaml::from_str(&content)?
            }
        } else {
            Vec::new()
        };
        log::debug!(
            "转换器存储已加载: {} ({} 条)",
            path.display(),
            converters.len()
        );
        Ok(Self {
            path,
            converters: RwLock::new(converters),
        })
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Vec<Converter>> {
        self.converters.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Vec<Converter>> {
        self.converters.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 全量写回文件
    fn persist(&self, converters: &[Converter]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_yaml::to_string(converters)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl ConverterStore for FileConverterStore {
    fn get(&self, name: &str) -> anyhow::Result<Option<Converter>> {
        Ok(self.read_lock().iter().find(|c| c.name == name).cloned())
    }

    fn list(&self) -> anyhow::Result<Vec<Converter>> {
        let mut all = self.read_lock().clone();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn create(&self, converter: &Converter) -> anyhow::Result<()> {
        let mut converters = self.write_lock();
        if converters.iter().any(|c| c.name == converter.name) {
            return Err(anyhow::anyhow!("转换器已存在: {}", converter.name));
        }
        converters.push(converter.clone());
        self.persist(&converters)
    }

    fn update(&self, converter: &Converter) -> anyhow::Result<()> {
        let mut converters = self.write_lock();
        match converters.iter_mut().find(|c| c.name == converter.name) {
            Some(slot) => {
                *slot = converter.clone();
                slot.updated_at = chrono::Utc::now();
            }
            None => return Err(anyhow::anyhow!("转换器不存在: {}", converter.name)),
        }
        self.persist(&converters)
    }

    fn delete(&self, name: &str) -> anyhow::Result<bool> {
        let mut converters = self.write_lock();
        let before = converters.len();
        converters.retain(|c| c.name != name);
        if converters.len() == before {
            return Ok(false);
        }
        self.persist(&converters)?;
        Ok(true)
    }

    fn increment_usage(&self, name: &str) -> anyhow::Result<()> {
        let mut converters = self.write_lock();
        match converters.iter_mut().find(|c| c.name == name) {
            Some(slot) => slot.usage_count += 1,
            None => return Err(anyhow::anyhow!("转换器不存在: {}", name)),
        }
        self.persist(&converters)
    }
}
