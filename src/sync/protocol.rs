/// 单个条目的提交/刷新协议（同步版本）
///
/// 协调器的后台提交与这里共用 `prepare_commit`/`complete_commit`，
/// 区别只在于后端调用发生在哪个线程。

use super::error::{CommitError, RefreshError};
use crate::fragment::FragmentKind;
use crate::item::{CommitReport, EditableItem};
use crate::provider::ItemProvider;

impl EditableItem {
    /// 提交全部脏片段
    ///
    /// # 参数
    /// * `provider` - 该条目类型的提供者
    /// * `force_overwrite` - `false` 时仅在远端令牌与本地一致时写入；`true` 时无条件覆盖
    ///
    /// # 返回
    /// 成功时令牌更新、片段回到 `Clean`。没有脏片段时不访问后端，直接成功。
    /// 失败时本地编辑与脏标志保持不变。
    pub fn commit(
        &mut self,
        provider: &dyn ItemProvider,
        force_overwrite: bool,
    ) -> Result<CommitReport, CommitError> {
        let request = self.prepare_commit(force_overwrite);
        if request.is_empty() {
            let token = self.token().clone();
            return Ok(self.complete_commit(&request, token));
        }

        let token = provider
            .write(&request)
            .map_err(|e| CommitError::from_provider(self.id(), e))?;
        Ok(self.complete_commit(&request, token))
    }

    /// 重新读取一个片段的远端内容
    ///
    /// 更新本地令牌并返回远端内容；不修改任何片段的内容和脏状态，
    /// 调用方需要时再通过 `apply_remote_content` 应用。
    pub fn refresh(
        &mut self,
        provider: &dyn ItemProvider,
        fragment: FragmentKind,
    ) -> Result<String, RefreshError> {
        if self.fragment(fragment).is_none() {
            return Err(RefreshError::UnknownFragment {
                item: self.id().clone(),
                fragment,
            });
        }

        let (content, token) = provider
            .read_fragment(self.id(), fragment)
            .map_err(|e| RefreshError::from_provider(self.id(), fragment, e))?;
        self.set_token(token);
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemId, ItemKind};
    use crate::loader::load_from;
    use crate::provider::store::tests::sample_snapshot;
    use crate::provider::{PortalStore, StoreProvider};
    use std::sync::Arc;

    fn setup() -> (Arc<PortalStore>, StoreProvider, EditableItem) {
        let store = Arc::new(PortalStore::in_memory(sample_snapshot()));
        let provider = StoreProvider::new(store.clone(), ItemKind::WebPage);
        let item = load_from(&provider)
            .unwrap()
            .into_iter()
            .find(|i| i.id().as_str() == "page-home")
            .unwrap();
        (store, provider, item)
    }

    #[test]
    fn test_commit_without_changes_is_noop() {
        let (_store, provider, mut item) = setup();
        let before = item.clone();

        let report = item.commit(&provider, false).unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(item, before);
    }

    #[test]
    fn test_commit_twice_is_idempotent() {
        let (_store, provider, mut item) = setup();
        item.set_fragment_content(FragmentKind::Style, "body { margin: 1px; }".into())
            .unwrap();

        let first = item.commit(&provider, false).unwrap();
        assert_eq!(first.written, 1);
        let after_first = item.clone();

        let second = item.commit(&provider, false).unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(item, after_first);
    }

    #[test]
    fn test_stale_token_conflicts_and_keeps_edits() {
        let (store, provider, mut item) = setup();
        item.set_fragment_content(FragmentKind::JavaScript, "initHeader(2);".into())
            .unwrap();
        store
            .remote_edit(&ItemId::new("page-home"), FragmentKind::Style, "body{}")
            .unwrap();
        let before = item.clone();

        let err = item.commit(&provider, false).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(item, before);
    }

    #[test]
    fn test_forced_commit_takes_backend_token() {
        let (store, provider, mut item) = setup();
        item.set_fragment_content(FragmentKind::JavaScript, "initHeader(3);".into())
            .unwrap();
        let id = ItemId::new("page-home");
        store.remote_edit(&id, FragmentKind::Style, "body{}").unwrap();

        item.commit(&provider, true).unwrap();
        assert_eq!(item.token(), &provider.fetch_token(&id).unwrap());
        assert!(!item.has_pending_changes());
    }

    #[test]
    fn test_refresh_updates_token_only() {
        let (store, provider, mut item) = setup();
        let id = ItemId::new("page-home");
        item.set_fragment_content(FragmentKind::JavaScript, "local();".into())
            .unwrap();
        let remote_token = store.remote_edit(&id, FragmentKind::Style, "remote{}").unwrap();

        let content = item.refresh(&provider, FragmentKind::Style).unwrap();
        assert_eq!(content, "remote{}");
        assert_eq!(item.token(), &remote_token);
        // 本地编辑与脏状态不受影响
        assert_eq!(item.fragment(FragmentKind::JavaScript).unwrap().content(), "local();");
        assert!(item.has_pending_changes());
        assert_eq!(item.fragment(FragmentKind::Style).unwrap().content(), "body { margin: 0; }");
    }

    #[test]
    fn test_refresh_deleted_record() {
        let (store, provider, mut item) = setup();
        store.remove_record(&ItemId::new("page-home"));
        let err = item.refresh(&provider, FragmentKind::Style).unwrap_err();
        assert!(matches!(err, RefreshError::NotFound { .. }));
    }
}
