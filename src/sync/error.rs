use thiserror::Error;

use crate::fragment::FragmentKind;
use crate::item::{ItemId, ItemKind};
use crate::provider::{FaultClass, ProviderError};

/// 提交错误
///
/// 每个变体都带有条目标识，调用方据此显示并决定是否重试。
/// 核心从不自动重试。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("Commit of {item} rejected: the record changed remotely since it was last read")]
    Conflict { item: ItemId },

    #[error("Commit of {item} failed: {message}")]
    Transport { item: ItemId, message: String },

    #[error("Commit of {item} failed: the record was deleted remotely")]
    NotFound { item: ItemId },

    #[error("Commit of {item} is already in progress")]
    Busy { item: ItemId },

    #[error("Cannot commit unknown item {item}")]
    UnknownItem { item: ItemId },

    #[error("Cannot commit {item}: no provider registered for {kind}")]
    MissingProvider { item: ItemId, kind: ItemKind },
}

impl CommitError {
    /// 按后端错误码归类
    pub fn from_provider(item: &ItemId, error: ProviderError) -> Self {
        match error.classify() {
            FaultClass::Conflict => CommitError::Conflict { item: item.clone() },
            FaultClass::NotFound => CommitError::NotFound { item: item.clone() },
            FaultClass::SchemaMismatch | FaultClass::Other => CommitError::Transport {
                item: item.clone(),
                message: error.to_string(),
            },
        }
    }

    pub fn item(&self) -> &ItemId {
        match self {
            CommitError::Conflict { item }
            | CommitError::Transport { item, .. }
            | CommitError::NotFound { item }
            | CommitError::Busy { item }
            | CommitError::UnknownItem { item }
            | CommitError::MissingProvider { item, .. } => item,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CommitError::Conflict { .. })
    }
}

/// 刷新错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh of {item} {fragment} failed: the record was deleted remotely")]
    NotFound { item: ItemId, fragment: FragmentKind },

    #[error("Refresh of {item} {fragment} failed: {message}")]
    Transport {
        item: ItemId,
        fragment: FragmentKind,
        message: String,
    },

    #[error("Cannot refresh {item} while a commit is in progress")]
    Busy { item: ItemId },

    #[error("Cannot refresh unknown item {item}")]
    UnknownItem { item: ItemId },

    #[error("Item {item} has no {fragment} fragment")]
    UnknownFragment { item: ItemId, fragment: FragmentKind },

    #[error("Cannot refresh {item}: no provider registered for {kind}")]
    MissingProvider { item: ItemId, kind: ItemKind },
}

impl RefreshError {
    pub fn from_provider(item: &ItemId, fragment: FragmentKind, error: ProviderError) -> Self {
        match error.classify() {
            FaultClass::NotFound => RefreshError::NotFound {
                item: item.clone(),
                fragment,
            },
            _ => RefreshError::Transport {
                item: item.clone(),
                fragment,
                message: error.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FAULT_CONCURRENCY_VERSION_MISMATCH, FAULT_OBJECT_DOES_NOT_EXIST};

    #[test]
    fn test_commit_error_classification() {
        let id = ItemId::new("p1");
        let conflict = CommitError::from_provider(
            &id,
            ProviderError::fault(FAULT_CONCURRENCY_VERSION_MISMATCH, "stale"),
        );
        assert!(conflict.is_conflict());

        let gone = CommitError::from_provider(
            &id,
            ProviderError::fault(FAULT_OBJECT_DOES_NOT_EXIST, "gone"),
        );
        assert_eq!(gone, CommitError::NotFound { item: id.clone() });

        let other = CommitError::from_provider(&id, ProviderError::Transport("reset".into()));
        assert!(matches!(other, CommitError::Transport { .. }));
        assert_eq!(other.item(), &id);
    }

    #[test]
    fn test_refresh_error_classification() {
        let id = ItemId::new("p1");
        let err = RefreshError::from_provider(
            &id,
            FragmentKind::Style,
            ProviderError::fault(FAULT_OBJECT_DOES_NOT_EXIST, "gone"),
        );
        assert!(matches!(err, RefreshError::NotFound { .. }));
    }
}
