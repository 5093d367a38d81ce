//! JSON 快照文件后端集成测试
//!
//! - 提交后文件被回写，首次写入前生成时间戳备份
//! - 文件写入失败时存储不保留这次修改，重试不会与自己冲突
//! - 旧版结构的快照通过能力协商降级加载

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{config, id, snapshot};
use portal_code_editor::provider::PortalSnapshot;
use portal_code_editor::{
    CommitError, CommitState, FragmentKind, PortalStore, ProviderSet, StoreConfig, Workspace,
};

fn write_snapshot(path: &Path, snapshot: &PortalSnapshot) {
    std::fs::write(path, serde_json::to_string_pretty(snapshot).unwrap()).unwrap();
}

fn open(path: &Path, backup: bool) -> Workspace {
    let store = PortalStore::open(
        path,
        &StoreConfig {
            backup_on_first_write: backup,
        },
    )
    .unwrap();
    Workspace::load(ProviderSet::for_store(Arc::new(store)), config()).unwrap()
}

fn backups(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
        .count()
}

#[tokio::test]
async fn test_commit_persists_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portal.json");
    write_snapshot(&path, &snapshot());

    let mut ws = open(&path, true);
    let tpl = id("tpl-header");
    ws.edit(&tpl, FragmentKind::Template, "<header>{{ site.name }}</header>")
        .unwrap();
    assert!(ws.commit(&tpl, false).await.is_committed());
    ws.edit(&tpl, FragmentKind::Template, "<header/>").unwrap();
    assert!(ws.commit(&tpl, false).await.is_committed());

    // 只在第一次写入前备份
    assert_eq!(backups(dir.path()), 1);

    let reopened = open(&path, false);
    let item = reopened.item(&tpl).unwrap();
    assert_eq!(item.fragments()[0].content(), "<header/>");
    assert_eq!(item.token().as_str(), "3");
    assert!(!item.has_pending_changes());
}

#[tokio::test]
async fn test_reload_picks_up_remote_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portal.json");
    write_snapshot(&path, &snapshot());

    let mut ws = open(&path, false);
    let form = id("form-contact");
    ws.edit(&form, FragmentKind::JavaScript, "validate(saved);").unwrap();
    assert!(ws.commit(&form, false).await.is_committed());
    ws.edit(&form, FragmentKind::JavaScript, "validate(unsaved);").unwrap();

    ws.reload().unwrap();
    let item = ws.item(&form).unwrap();
    assert_eq!(item.fragments()[0].content(), "validate(saved);");
    assert!(ws.pending_summary().is_empty());
    assert_eq!(backups(dir.path()), 0);
}

#[tokio::test]
async fn test_failed_file_write_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portal.json");
    write_snapshot(&path, &snapshot());

    let store = Arc::new(
        PortalStore::open(
            &path,
            &StoreConfig {
                backup_on_first_write: false,
            },
        )
        .unwrap(),
    );
    let mut ws = Workspace::load(ProviderSet::for_store(store.clone()), config()).unwrap();
    let form = id("form-contact");
    ws.edit(&form, FragmentKind::JavaScript, "validate(x);").unwrap();

    // 快照路径变成目录，写入必然失败
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let outcome = ws.commit(&form, false).await;
    assert_eq!(outcome.state(), CommitState::Failed);
    assert!(matches!(outcome.result, Err(CommitError::Transport { .. })));

    let stored = store.snapshot();
    let record = stored.records.iter().find(|r| r.id == form).unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(
        record.fragments[&FragmentKind::JavaScript].as_deref(),
        Some("validate();")
    );
    assert_eq!(ws.item(&form).unwrap().token().as_str(), "1");
    assert!(ws.item(&form).unwrap().has_pending_changes());

    // 路径恢复后重试直接成功
    std::fs::remove_dir(&path).unwrap();
    let retry = ws.commit(&form, false).await;
    assert!(retry.is_committed());
    assert_eq!(ws.item(&form).unwrap().token().as_str(), "2");

    let reopened = open(&path, false);
    assert_eq!(
        reopened.item(&form).unwrap().fragments()[0].content(),
        "validate(x);"
    );
}

#[test]
fn test_legacy_schema_downgrades_capabilities() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.json");
    let mut legacy = snapshot();
    legacy.legacy_schema = true;
    write_snapshot(&path, &legacy);

    let ws = open(&path, false);

    // 没有语言与层级信息：名称不带语言，页面按名称排序
    let pages: Vec<_> = ws
        .items()
        .iter()
        .filter(|i| i.page().is_some())
        .map(|i| i.name().to_string())
        .collect();
    assert_eq!(pages, vec!["About", "Home"]);
    assert!(ws
        .items()
        .iter()
        .filter_map(|i| i.page())
        .all(|p| p.language.is_none() && !p.is_root));
    assert_eq!(ws.items().len(), 5);
}

#[test]
fn test_malformed_snapshot_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ \"records\": [ { \"id\": 1 } ] }").unwrap();

    let result = PortalStore::open(
        &path,
        &StoreConfig {
            backup_on_first_write: false,
        },
    );
    assert!(result.is_err());
}
