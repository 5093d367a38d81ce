/// 编辑器配置
///
/// 从 JSON 文件加载，所有字段都有默认值，部分配置文件也是合法的。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::PortalError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub search: SearchConfig,
    pub store: StoreConfig,
}

/// 搜索配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// 输入防抖时间（毫秒）
    pub debounce_ms: u64,
    /// 每批匹配的条目数，批与批之间检查取消
    pub chunk_size: usize,
    /// 默认是否同时搜索代码内容
    pub search_content: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            chunk_size: 64,
            search_content: false,
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// 内置存储配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 首次写入前为快照文件创建带时间戳的备份
    pub backup_on_first_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backup_on_first_write: true,
        }
    }
}

impl EditorConfig {
    /// 从 JSON 文件加载配置
    pub fn load(path: &Path) -> Result<Self, PortalError> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EditorConfig =
            serde_json::from_str(r#"{ "search": { "debounce_ms": 0 } }"#).unwrap();
        assert_eq!(config.search.debounce_ms, 0);
        assert_eq!(config.search.chunk_size, 64);
        assert!(config.store.backup_on_first_write);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("editor.json");
        std::fs::write(&path, r#"{ "store": { "backup_on_first_write": false } }"#).unwrap();

        let config = EditorConfig::load(&path).unwrap();
        assert!(!config.store.backup_on_first_write);
        assert_eq!(config.search, SearchConfig::default());
    }
}
