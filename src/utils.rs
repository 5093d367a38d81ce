use thiserror::Error;
use std::path::Path;

use crate::fragment::FragmentKind;
use crate::item::{ItemId, ItemKind};
use crate::provider::ProviderError;

/// 自定义错误类型
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Invariant violation during {operation}: {detail}")]
    InvariantViolation {
        operation: &'static str,
        detail: String,
    },

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("Item {item} has no {kind} fragment")]
    UnknownFragment { item: ItemId, kind: FragmentKind },

    #[error("No provider registered for {0}")]
    MissingProvider(ItemKind),

    #[error("A provider is already registered for {0}")]
    DuplicateProvider(ItemKind),

    #[error("Provider for {kind} failed during {operation}: {source}")]
    Provider {
        kind: ItemKind,
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("Commit in progress for {0}")]
    CommitInProgress(ItemId),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// 大小写不敏感的子串匹配
///
/// `needle_lower` 必须已经转成小写
pub fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(needle_lower)
}

/// 截断过长文本用于输出预览
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 复数后缀
pub(crate) fn plural(count: usize) -> &'static str {
    if count < 2 { "" } else { "s" }
}

/// 创建文件备份
pub fn create_backup(file_path: &Path) -> Result<std::path::PathBuf, PortalError> {
    if !file_path.exists() {
        return Err(PortalError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "原文件不存在"
        )));
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    let backup_path = file_path.with_extension(format!("{}.bak", timestamp));

    std::fs::copy(file_path, &backup_path)
        .map_err(PortalError::IoError)?;

    Ok(backup_path)
}
