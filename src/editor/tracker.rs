/// 变更追踪模块
///
/// 单一传播规则：片段内容变化 → 片段脏状态；片段状态迁移 → 重新推导条目
/// pending 标志；条目 pending 迁移 → 重新推导全局待提交集合。
/// 通知在执行编辑的线程上同步、按 片段 → 条目 → 全局 的顺序投递，
/// 状态不变时不重复通知。

use std::collections::BTreeMap;

use super::summary::PendingSummary;
use crate::fragment::{DirtyState, FragmentKind};
use crate::item::{CommitReport, EditableItem, ItemId, ItemTransition};

/// 片段脏状态变化通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentStateChanged {
    pub item: ItemId,
    pub fragment: FragmentKind,
    pub old: DirtyState,
    pub new: DirtyState,
}

/// 条目状态变化的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Edit,
    Commit,
    Refresh,
}

/// 条目状态变化通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStateChanged {
    pub item: ItemId,
    pub pending: bool,
    pub cause: ChangeCause,
}

/// 订阅句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = (SubscriptionId, Box<dyn FnMut(&E)>);

/// 变更追踪器
///
/// 缓存待提交集合（条目 → 站点）及其摘要，供显示层读取。
#[derive(Default)]
pub struct ChangeTracker {
    next_id: u64,
    fragment_listeners: Vec<Listener<FragmentStateChanged>>,
    item_listeners: Vec<Listener<ItemStateChanged>>,
    pending_listeners: Vec<Listener<PendingSummary>>,
    pending: BTreeMap<ItemId, String>,
    summary: PendingSummary,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_fragments(
        &mut self,
        listener: impl FnMut(&FragmentStateChanged) + 'static,
    ) -> SubscriptionId {
        let id = self.allocate();
        self.fragment_listeners.push((id, Box::new(listener)));
        id
    }

    pub fn subscribe_items(
        &mut self,
        listener: impl FnMut(&ItemStateChanged) + 'static,
    ) -> SubscriptionId {
        let id = self.allocate();
        self.item_listeners.push((id, Box::new(listener)));
        id
    }

    pub fn subscribe_pending(
        &mut self,
        listener: impl FnMut(&PendingSummary) + 'static,
    ) -> SubscriptionId {
        let id = self.allocate();
        self.pending_listeners.push((id, Box::new(listener)));
        id
    }

    /// 取消订阅，句柄不存在时返回 `false`
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listener_count();
        self.fragment_listeners.retain(|(i, _)| *i != id);
        self.item_listeners.retain(|(i, _)| *i != id);
        self.pending_listeners.retain(|(i, _)| *i != id);
        self.listener_count() != before
    }

    pub fn summary(&self) -> PendingSummary {
        self.summary
    }

    /// 待提交条目（按标识排序）
    pub fn pending_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.pending.keys()
    }

    pub fn is_pending(&self, id: &ItemId) -> bool {
        self.pending.contains_key(id)
    }

    /// 记录一次编辑或应用远端内容引起的迁移
    pub(crate) fn record_edit(
        &mut self,
        item: &EditableItem,
        fragment: FragmentKind,
        transition: ItemTransition,
        cause: ChangeCause,
    ) {
        let Some(change) = transition.fragment else {
            return;
        };

        self.publish_fragment(FragmentStateChanged {
            item: item.id().clone(),
            fragment,
            old: change.old,
            new: change.new,
        });

        if let Some(pending) = transition.pending {
            self.publish_item(ItemStateChanged {
                item: item.id().clone(),
                pending,
                cause,
            });
            self.sync_pending(item);
        }
    }

    /// 记录一次提交的结果
    ///
    /// 无论改动了多少片段（包括空提交与失败），条目通知恰好发送一次。
    pub(crate) fn record_commit(&mut self, item: &EditableItem, report: Option<&CommitReport>) {
        if let Some(report) = report {
            for (fragment, change) in &report.fragment_changes {
                self.publish_fragment(FragmentStateChanged {
                    item: item.id().clone(),
                    fragment: *fragment,
                    old: change.old,
                    new: change.new,
                });
            }
        }

        self.publish_item(ItemStateChanged {
            item: item.id().clone(),
            pending: item.has_pending_changes(),
            cause: ChangeCause::Commit,
        });
        self.sync_pending(item);
    }

    /// 工作集重新加载后整体重建待提交集合
    pub(crate) fn reset(&mut self, items: &[EditableItem]) {
        self.pending = items
            .iter()
            .filter(|i| i.has_pending_changes())
            .map(|i| (i.id().clone(), i.site().id.clone()))
            .collect();
        self.republish_summary();
    }

    fn sync_pending(&mut self, item: &EditableItem) {
        if item.has_pending_changes() {
            self.pending.insert(item.id().clone(), item.site().id.clone());
        } else {
            self.pending.remove(item.id());
        }
        self.republish_summary();
    }

    fn republish_summary(&mut self) {
        let summary = PendingSummary::from_sites(self.pending.values().map(String::as_str));
        if summary == self.summary {
            return;
        }
        self.summary = summary;

        tracing::debug!(items = summary.items, sites = summary.sites, "pending set changed");
        for (_, listener) in &mut self.pending_listeners {
            listener(&summary);
        }
    }

    fn publish_fragment(&mut self, event: FragmentStateChanged) {
        tracing::trace!(
            item = %event.item,
            fragment = %event.fragment,
            new = ?event.new,
            "fragment state changed"
        );
        for (_, listener) in &mut self.fragment_listeners {
            listener(&event);
        }
    }

    fn publish_item(&mut self, event: ItemStateChanged) {
        for (_, listener) in &mut self.item_listeners {
            listener(&event);
        }
    }

    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn listener_count(&self) -> usize {
        self.fragment_listeners.len() + self.item_listeners.len() + self.pending_listeners.len()
    }
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("pending", &self.pending)
            .field("summary", &self.summary)
            .field("listeners", &self.listener_count())
            .finish()
    }
}
