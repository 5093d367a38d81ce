//! 提交协议集成测试
//!
//! 通过内置存储跑完整的 编辑 → 条件写入 → 读取令牌 流程：
//! - 空提交、重复提交
//! - 过期令牌冲突与强制覆盖
//! - 批量提交中单个条目失败不影响其他条目

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use common::{config, id, store, workspace};
use portal_code_editor::provider::{Capabilities, StoreOp, StoreProvider};
use portal_code_editor::{
    CommitError, CommitRequest, CommitState, ConcurrencyToken, FragmentKind, ItemId, ItemKind,
    ItemProvider, ItemRecord, ProviderError, ProviderSet, Workspace,
};

/// 读取正常、写入时 panic 的表单提供者
struct CrashingFormProvider(StoreProvider);

impl ItemProvider for CrashingFormProvider {
    fn kind(&self) -> ItemKind {
        ItemKind::EntityForm
    }

    fn fetch_all(&self, capabilities: Capabilities) -> Result<Vec<ItemRecord>, ProviderError> {
        self.0.fetch_all(capabilities)
    }

    fn update(&self, _request: &CommitRequest) -> Result<(), ProviderError> {
        panic!("form backend crashed during update");
    }

    fn fetch_token(&self, id: &ItemId) -> Result<ConcurrencyToken, ProviderError> {
        self.0.fetch_token(id)
    }

    fn read_fragment(
        &self,
        id: &ItemId,
        fragment: FragmentKind,
    ) -> Result<(String, ConcurrencyToken), ProviderError> {
        self.0.read_fragment(id, fragment)
    }
}

#[tokio::test]
async fn test_batch_commit_isolates_conflict() {
    let store = store();
    let mut ws = workspace(&store);

    ws.edit(&id("form-contact"), FragmentKind::JavaScript, "validate(form);")
        .unwrap();
    ws.edit(&id("tpl-header"), FragmentKind::Template, "<header>{{ page.name }}</header>")
        .unwrap();
    ws.edit(&id("file-theme"), FragmentKind::FileContent, "h1 { color: navy; }")
        .unwrap();
    assert_eq!(
        ws.pending_summary().to_string(),
        "3 items with pending changes on 2 sites"
    );

    // 其他用户先改了模板
    store
        .remote_edit(&id("tpl-header"), FragmentKind::Template, "<header>remote</header>")
        .unwrap();

    let outcomes = ws.commit_all(false).await;
    let states: Vec<_> = outcomes.iter().map(|o| (o.item.as_str(), o.state())).collect();
    assert_eq!(
        states,
        vec![
            ("form-contact", CommitState::Committed),
            ("tpl-header", CommitState::Conflict),
            ("file-theme", CommitState::Committed),
        ]
    );

    // 冲突条目的本地内容保持不变，仍在待提交集合中
    let template = ws.item(&id("tpl-header")).unwrap();
    assert!(template.has_pending_changes());
    assert_eq!(
        template.fragments()[0].content(),
        "<header>{{ page.name }}</header>"
    );
    assert_eq!(
        ws.pending_summary().to_string(),
        "1 item with pending changes on 1 site"
    );
    assert_eq!(ws.commit_state(&id("form-contact")), CommitState::Committed);
    assert_eq!(ws.commit_state(&id("tpl-header")), CommitState::Conflict);
}

#[tokio::test]
async fn test_noop_commit_succeeds_without_changes() {
    let store = store();
    let mut ws = workspace(&store);
    let home = id("page-home");
    let before = ws.item(&home).unwrap().clone();
    let version_before = store.snapshot();

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    ws.subscribe_items(move |e| sink.borrow_mut().push((e.item.clone(), e.pending)));

    let outcome = ws.commit(&home, false).await;
    let report = outcome.result.as_ref().unwrap();
    assert_eq!(report.written, 0);
    assert_eq!(ws.item(&home).unwrap(), &before);
    assert_eq!(store.snapshot(), version_before);

    // 空提交也恰好通知一次条目状态
    assert_eq!(*events.borrow(), vec![(home, false)]);
}

#[tokio::test]
async fn test_second_commit_is_idempotent() {
    let store = store();
    let mut ws = workspace(&store);
    let home = id("page-home");

    ws.edit(&home, FragmentKind::Style, "body { margin: 4px; }").unwrap();
    ws.edit(&home, FragmentKind::JavaScript, "initHeader(true);").unwrap();

    let first = ws.commit(&home, false).await;
    assert_eq!(first.result.as_ref().unwrap().written, 2);
    let after_first = ws.item(&home).unwrap().clone();
    let remote_after_first = store.snapshot();

    let second = ws.commit(&home, false).await;
    assert_eq!(second.result.as_ref().unwrap().written, 0);
    assert_eq!(ws.item(&home).unwrap(), &after_first);
    assert_eq!(store.snapshot(), remote_after_first);
}

#[tokio::test]
async fn test_stale_token_conflicts_and_preserves_contents() {
    let store = store();
    let mut ws = workspace(&store);
    let form = id("form-contact");

    ws.edit(&form, FragmentKind::JavaScript, "validate(local);").unwrap();
    store
        .remote_edit(&form, FragmentKind::JavaScript, "validate(remote);")
        .unwrap();
    let before = ws.item(&form).unwrap().clone();

    let outcome = ws.commit(&form, false).await;
    assert_eq!(
        outcome.result,
        Err(CommitError::Conflict { item: form.clone() })
    );
    assert_eq!(ws.item(&form).unwrap(), &before);
}

#[tokio::test]
async fn test_forced_commit_takes_post_write_token() {
    let store = store();
    let mut ws = workspace(&store);
    let form = id("form-contact");

    ws.edit(&form, FragmentKind::JavaScript, "validate(mine);").unwrap();
    store
        .remote_edit(&form, FragmentKind::JavaScript, "validate(theirs);")
        .unwrap();

    let outcome = ws.commit(&form, true).await;
    assert!(outcome.is_committed());

    let provider = ws.providers().get(ItemKind::EntityForm).unwrap().clone();
    let backend_token = provider.fetch_token(&form).unwrap();
    assert_eq!(ws.item(&form).unwrap().token(), &backend_token);
    assert_eq!(outcome.result.unwrap().token, backend_token);
    assert!(!ws.item(&form).unwrap().has_pending_changes());
}

#[tokio::test]
async fn test_refresh_then_retry_after_conflict() {
    let store = store();
    let mut ws = workspace(&store);
    let file = id("file-theme");

    ws.edit(&file, FragmentKind::FileContent, "h1 { font-weight: bold; }")
        .unwrap();
    store
        .remote_edit(&file, FragmentKind::FileContent, "h1 { }")
        .unwrap();
    assert_eq!(ws.commit(&file, false).await.state(), CommitState::Conflict);

    // 刷新只更新令牌，本地修改仍然待提交
    let remote = ws
        .refresh_fragment(&file, FragmentKind::FileContent)
        .await
        .unwrap();
    assert_eq!(remote, "h1 { }");
    assert!(ws.item(&file).unwrap().has_pending_changes());

    assert!(ws.commit(&file, false).await.is_committed());
    let stored = store.snapshot();
    let record = stored.records.iter().find(|r| r.id == file).unwrap();
    assert_eq!(
        record.fragments[&FragmentKind::FileContent].as_deref(),
        Some("h1 { font-weight: bold; }")
    );
}

#[tokio::test]
async fn test_token_fetch_failure_keeps_edits_dirty() {
    let store = store();
    let mut ws = workspace(&store);
    let form = id("form-contact");

    ws.edit(&form, FragmentKind::JavaScript, "validate(late);").unwrap();
    store.inject_fault(
        StoreOp::FetchToken,
        ProviderError::Transport("connection reset".into()),
    );

    let outcome = ws.commit(&form, false).await;
    assert_eq!(outcome.state(), CommitState::Failed);
    assert!(matches!(outcome.result, Err(CommitError::Transport { .. })));
    assert!(ws.item(&form).unwrap().has_pending_changes());
}

#[tokio::test]
async fn test_deleted_record_is_not_found() {
    let store = store();
    let mut ws = workspace(&store);
    let tpl = id("tpl-header");

    ws.edit(&tpl, FragmentKind::Template, "<header/>").unwrap();
    assert!(store.remove_record(&tpl));

    let outcome = ws.commit(&tpl, false).await;
    assert_eq!(outcome.result, Err(CommitError::NotFound { item: tpl.clone() }));
    assert_eq!(outcome.state(), CommitState::Failed);
    assert!(ws.item(&tpl).unwrap().has_pending_changes());
}

#[tokio::test]
async fn test_unknown_item_outcome() {
    let store = store();
    let mut ws = workspace(&store);
    let ghost = id("ghost");

    let outcomes = ws
        .commit_items(&[id("form-contact"), ghost.clone()], false)
        .await;
    assert!(outcomes[0].is_committed());
    assert_eq!(
        outcomes[1].result,
        Err(CommitError::UnknownItem { item: ghost })
    );
}

#[tokio::test]
async fn test_provider_panic_fails_commit_instead_of_hanging() {
    let store = store();
    let mut providers = ProviderSet::new();
    for kind in ItemKind::ALL {
        let provider = StoreProvider::new(store.clone(), kind);
        if kind == ItemKind::EntityForm {
            providers
                .register(Arc::new(CrashingFormProvider(provider)))
                .unwrap();
        } else {
            providers.register(Arc::new(provider)).unwrap();
        }
    }
    let mut ws = Workspace::load(providers, config()).unwrap();
    let form = id("form-contact");
    let template = id("tpl-header");

    ws.edit(&form, FragmentKind::JavaScript, "validate(crash);").unwrap();
    ws.edit(&template, FragmentKind::Template, "<header/>").unwrap();

    let outcomes = tokio::time::timeout(
        Duration::from_secs(5),
        ws.commit_items(&[form.clone(), template.clone()], false),
    )
    .await
    .expect("commit must finish even when a provider panics");

    assert_eq!(outcomes[0].state(), CommitState::Failed);
    assert!(matches!(outcomes[0].result, Err(CommitError::Transport { .. })));
    assert!(outcomes[1].is_committed());
    assert_eq!(ws.commit_state(&form), CommitState::Failed);
    assert!(ws.item(&form).unwrap().has_pending_changes());

    // 条目不再处于提交中：可以刷新，也可以重新加载
    let remote = ws
        .refresh_fragment(&form, FragmentKind::JavaScript)
        .await
        .unwrap();
    assert_eq!(remote, "validate();");
    ws.reload().unwrap();
}
