use std::sync::Arc;

use super::store::{PortalStore, StoreProvider};
use super::traits::ItemProvider;
use crate::item::ItemKind;
use crate::utils::PortalError;

/// 按记录类型注册的提供者集合
///
/// 每种类型最多一个提供者；加载顺序即注册顺序。
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: Vec<Arc<dyn ItemProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册提供者
    ///
    /// # 错误
    /// 同一类型重复注册返回 `DuplicateProvider`
    pub fn register(&mut self, provider: Arc<dyn ItemProvider>) -> Result<(), PortalError> {
        let kind = provider.kind();
        if self.get(kind).is_some() {
            return Err(PortalError::DuplicateProvider(kind));
        }
        self.providers.push(provider);
        Ok(())
    }

    /// 为内置存储的全部记录类型创建提供者
    pub fn for_store(store: Arc<PortalStore>) -> Self {
        Self {
            providers: ItemKind::ALL
                .iter()
                .map(|kind| {
                    Arc::new(StoreProvider::new(store.clone(), *kind)) as Arc<dyn ItemProvider>
                })
                .collect(),
        }
    }

    pub fn get(&self, kind: ItemKind) -> Option<&Arc<dyn ItemProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    pub(crate) fn require(&self, kind: ItemKind) -> Result<Arc<dyn ItemProvider>, PortalError> {
        self.get(kind)
            .cloned()
            .ok_or(PortalError::MissingProvider(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ItemProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.kind()))
            .finish()
    }
}
