//! 集成测试共用的门户快照

#![allow(dead_code)]

use std::sync::Arc;

use portal_code_editor::provider::{PortalSnapshot, StoredRecord};
use portal_code_editor::{
    EditorConfig, FragmentKind, ItemId, ItemKind, PageInfo, PortalStore, ProviderSet, SiteRef,
    Workspace,
};

/// 两个站点、五条记录：
///
/// - Customer Portal: Home（根页面）、About（English 内容页）、Contact Form
/// - Partner Portal: Site Header（模板）、theme.css（文件）
pub fn snapshot() -> PortalSnapshot {
    PortalSnapshot {
        websites: vec![
            SiteRef::new("site-a", "Customer Portal"),
            SiteRef::new("site-b", "Partner Portal"),
        ],
        records: vec![
            StoredRecord::new("page-about", ItemKind::WebPage, "About", "site-a")
                .with_fragment(FragmentKind::JavaScript, "console.log('about');")
                .with_page(PageInfo {
                    is_root: false,
                    parent_page: Some(ItemId::new("page-home")),
                    language: Some("English".to_string()),
                }),
            StoredRecord::new("page-home", ItemKind::WebPage, "Home", "site-a")
                .with_fragment(FragmentKind::JavaScript, "initHeader();")
                .with_fragment(FragmentKind::Style, "body { margin: 0; }")
                .with_page(PageInfo {
                    is_root: true,
                    ..PageInfo::default()
                }),
            StoredRecord::new("form-contact", ItemKind::EntityForm, "Contact Form", "site-a")
                .with_fragment(FragmentKind::JavaScript, "validate();"),
            StoredRecord::new("tpl-header", ItemKind::WebTemplate, "Site Header", "site-b")
                .with_fragment(FragmentKind::Template, "<header>{{ page.title }}</header>"),
            StoredRecord::new("file-theme", ItemKind::WebFile, "theme.css", "site-b")
                .with_fragment(FragmentKind::FileContent, "/* header styles */ h1 { }"),
        ],
        legacy_schema: false,
    }
}

pub fn store() -> Arc<PortalStore> {
    Arc::new(PortalStore::in_memory(snapshot()))
}

/// 无防抖的配置，测试不需要等待
pub fn config() -> EditorConfig {
    let mut config = EditorConfig::default();
    config.search.debounce_ms = 0;
    config.search.chunk_size = 2;
    config
}

pub fn workspace(store: &Arc<PortalStore>) -> Workspace {
    Workspace::load(ProviderSet::for_store(store.clone()), config()).unwrap()
}

pub fn id(s: &str) -> ItemId {
    ItemId::new(s)
}
