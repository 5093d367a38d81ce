/// 工作集协调器
///
/// 所有状态修改（片段内容、脏标志、待提交集合、令牌）都发生在持有
/// `Workspace` 的协调线程上。后端 IO 与搜索过滤在后台执行，结果经通道
/// 交回后由这里应用。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::summary::PendingSummary;
use super::tracker::{
    ChangeCause, ChangeTracker, FragmentStateChanged, ItemStateChanged, SubscriptionId,
};
use crate::config::EditorConfig;
use crate::fragment::FragmentKind;
use crate::index::{build_index, HierarchyIndex};
use crate::item::{EditableItem, ItemId, ItemTransition};
use crate::loader::load_items;
use crate::provider::ProviderSet;
use crate::search::{SearchEngine, SearchFilter, SearchQuery, SearchView};
use crate::sync::controller::CommitCompletion;
use crate::sync::{CommitController, CommitError, CommitOutcome, CommitState, RefreshError};
use crate::utils::PortalError;
use crate::worker::{self, TaskClass};

/// 工作集
///
/// # 使用示例
///
/// ```rust,ignore
/// use portal_code_editor::{EditorConfig, PortalStore, ProviderSet, Workspace};
///
/// let store = Arc::new(PortalStore::open(path, &config.store)?);
/// let mut workspace = Workspace::load(ProviderSet::for_store(store), config)?;
///
/// workspace.subscribe_pending(|summary| println!("{}", summary));
/// workspace.edit(&id, FragmentKind::JavaScript, "initHeader();")?;
///
/// for outcome in workspace.commit_all(false).await {
///     println!("{}: {}", outcome.item, outcome.state());
/// }
/// ```
pub struct Workspace {
    providers: ProviderSet,
    config: EditorConfig,
    items: Vec<EditableItem>,
    positions: HashMap<ItemId, usize>,
    /// 后台搜索使用的只读副本，任何修改后失效
    snapshot: Option<Arc<[EditableItem]>>,
    tracker: ChangeTracker,
    controller: CommitController,
    search: SearchEngine,
    /// 已完成但尚未被等待者领取的提交结果
    unclaimed: VecDeque<CommitOutcome>,
}

impl Workspace {
    /// 从全部提供者加载工作集
    ///
    /// # 错误
    /// 任一提供者失败或数据不合法时整个加载失败
    pub fn load(providers: ProviderSet, config: EditorConfig) -> Result<Self, PortalError> {
        let items = load_items(&providers)?;
        let positions = index_positions(&items)?;

        let mut tracker = ChangeTracker::new();
        tracker.reset(&items);

        tracing::info!(items = items.len(), providers = providers.len(), "workspace loaded");

        Ok(Self {
            search: SearchEngine::new(config.search.clone()),
            providers,
            config,
            items,
            positions,
            snapshot: None,
            tracker,
            controller: CommitController::new(),
            unclaimed: VecDeque::new(),
        })
    }

    /// 重新从后端加载，丢弃本地未提交的修改
    ///
    /// # 错误
    /// 有提交正在进行时返回 `CommitInProgress`
    pub fn reload(&mut self) -> Result<(), PortalError> {
        if let Some(id) = self.controller.committing().next() {
            return Err(PortalError::CommitInProgress(id.clone()));
        }

        let items = load_items(&self.providers)?;
        self.positions = index_positions(&items)?;
        self.items = items;
        self.snapshot = None;
        self.unclaimed.clear();
        self.controller.clear_finished();
        self.tracker.reset(&self.items);

        tracing::info!(items = self.items.len(), "workspace reloaded");
        Ok(())
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// 全部条目（提供者顺序）
    pub fn items(&self) -> &[EditableItem] {
        &self.items
    }

    pub fn item(&self, id: &ItemId) -> Option<&EditableItem> {
        self.positions.get(id).map(|pos| &self.items[*pos])
    }

    /// 工作集的共享只读副本
    pub fn snapshot(&mut self) -> Arc<[EditableItem]> {
        self.snapshot
            .get_or_insert_with(|| Arc::from(self.items.clone()))
            .clone()
    }

    /// 编辑一个片段
    ///
    /// 通知按 片段 → 条目 → 全局 的顺序在当前线程同步投递。
    pub fn edit(
        &mut self,
        id: &ItemId,
        fragment: FragmentKind,
        content: impl Into<String>,
    ) -> Result<ItemTransition, PortalError> {
        self.mutate(id, fragment, content.into(), ChangeCause::Edit)
    }

    /// 应用刷新得到的远端内容，该片段回到 `Clean`
    pub fn apply_remote_content(
        &mut self,
        id: &ItemId,
        fragment: FragmentKind,
        content: impl Into<String>,
    ) -> Result<ItemTransition, PortalError> {
        self.mutate(id, fragment, content.into(), ChangeCause::Refresh)
    }

    pub fn subscribe_fragments(
        &mut self,
        listener: impl FnMut(&FragmentStateChanged) + 'static,
    ) -> SubscriptionId {
        self.tracker.subscribe_fragments(listener)
    }

    pub fn subscribe_items(
        &mut self,
        listener: impl FnMut(&ItemStateChanged) + 'static,
    ) -> SubscriptionId {
        self.tracker.subscribe_items(listener)
    }

    pub fn subscribe_pending(
        &mut self,
        listener: impl FnMut(&PendingSummary) + 'static,
    ) -> SubscriptionId {
        self.tracker.subscribe_pending(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.tracker.unsubscribe(id)
    }

    /// 有未提交修改的条目（工作集顺序）
    pub fn pending_items(&self) -> Vec<&EditableItem> {
        self.items
            .iter()
            .filter(|item| item.has_pending_changes())
            .collect()
    }

    pub fn pending_summary(&self) -> PendingSummary {
        self.tracker.summary()
    }

    /// 基于当前工作集同步构建索引
    pub fn index(&self, filter: Option<&SearchFilter>) -> HierarchyIndex {
        build_index(&self.items, filter)
    }

    /// 条目当前的提交状态
    pub fn commit_state(&self, id: &ItemId) -> CommitState {
        self.controller.state(id)
    }

    /// 开始提交（不等待结果）
    ///
    /// # 错误
    /// - 条目不存在返回 `UnknownItem`
    /// - 该条目已有提交进行中返回 `Busy`
    pub fn start_commit(&mut self, id: &ItemId, force_overwrite: bool) -> Result<(), CommitError> {
        let pos = self
            .positions
            .get(id)
            .copied()
            .ok_or_else(|| CommitError::UnknownItem { item: id.clone() })?;
        let item = &self.items[pos];

        let provider = self
            .providers
            .require(item.kind())
            .map_err(|_| CommitError::MissingProvider {
                item: id.clone(),
                kind: item.kind(),
            })?;

        let request = item.prepare_commit(force_overwrite);
        self.controller
            .begin(request, item.token().clone(), provider)
    }

    /// 等待下一个提交结果；没有进行中的提交时返回 `None`
    pub async fn next_commit_outcome(&mut self) -> Option<CommitOutcome> {
        if let Some(outcome) = self.unclaimed.pop_front() {
            return Some(outcome);
        }
        self.await_completion().await
    }

    /// 取出全部已到达的提交结果（不等待）
    pub fn drain_commit_outcomes(&mut self) -> Vec<CommitOutcome> {
        let mut outcomes: Vec<CommitOutcome> = self.unclaimed.drain(..).collect();
        while let Some(completion) = self.controller.try_next_completion() {
            outcomes.push(self.apply_completion(completion));
        }
        outcomes
    }

    /// 提交单个条目并等待结果
    pub async fn commit(&mut self, id: &ItemId, force_overwrite: bool) -> CommitOutcome {
        let ids = [id.clone()];
        let mut outcomes = self.commit_items(&ids, force_overwrite).await;
        outcomes
            .pop()
            .unwrap_or_else(|| lost_outcome(id))
    }

    /// 批量提交
    ///
    /// 每个条目独立提交，一个条目失败不影响其他条目。
    /// 结果顺序与 `ids` 一致。
    pub async fn commit_items(
        &mut self,
        ids: &[ItemId],
        force_overwrite: bool,
    ) -> Vec<CommitOutcome> {
        let mut results: Vec<Option<CommitOutcome>> = vec![None; ids.len()];
        let mut waiting: HashMap<ItemId, usize> = HashMap::new();

        for (slot, id) in ids.iter().enumerate() {
            match self.start_commit(id, force_overwrite) {
                Ok(()) => {
                    waiting.insert(id.clone(), slot);
                }
                Err(e) => {
                    tracing::warn!(item = %id, error = %e, "commit not started");
                    results[slot] = Some(CommitOutcome {
                        item: id.clone(),
                        result: Err(e),
                    });
                }
            }
        }

        while !waiting.is_empty() {
            let Some(outcome) = self.await_completion().await else {
                break;
            };
            match waiting.remove(&outcome.item) {
                Some(slot) => results[slot] = Some(outcome),
                None => self.unclaimed.push_back(outcome),
            }
        }

        results
            .into_iter()
            .zip(ids)
            .map(|(outcome, id)| outcome.unwrap_or_else(|| lost_outcome(id)))
            .collect()
    }

    /// 提交全部有未提交修改的条目
    pub async fn commit_all(&mut self, force_overwrite: bool) -> Vec<CommitOutcome> {
        let ids: Vec<ItemId> = self
            .pending_items()
            .into_iter()
            .map(|item| item.id().clone())
            .collect();
        tracing::info!(items = ids.len(), forced = force_overwrite, "committing pending items");
        self.commit_items(&ids, force_overwrite).await
    }

    /// 重新读取一个片段的远端内容
    ///
    /// 更新本地令牌并返回远端内容，不修改片段内容与脏状态；
    /// 需要时调用 `apply_remote_content` 应用。
    ///
    /// # 错误
    /// 该条目有提交进行中时返回 `Busy`
    pub async fn refresh_fragment(
        &mut self,
        id: &ItemId,
        fragment: FragmentKind,
    ) -> Result<String, RefreshError> {
        let pos = self
            .positions
            .get(id)
            .copied()
            .ok_or_else(|| RefreshError::UnknownItem { item: id.clone() })?;
        if self.controller.is_committing(id) {
            return Err(RefreshError::Busy { item: id.clone() });
        }

        let item = &self.items[pos];
        if item.fragment(fragment).is_none() {
            return Err(RefreshError::UnknownFragment {
                item: id.clone(),
                fragment,
            });
        }
        let provider = self
            .providers
            .require(item.kind())
            .map_err(|_| RefreshError::MissingProvider {
                item: id.clone(),
                kind: item.kind(),
            })?;

        let target = id.clone();
        let read = worker::spawn_blocking(TaskClass::Io, move || {
            provider.read_fragment(&target, fragment)
        })
        .await
        .map_err(|e| RefreshError::Transport {
            item: id.clone(),
            fragment,
            message: e.to_string(),
        })?;

        let (content, token) = read.map_err(|e| RefreshError::from_provider(id, fragment, e))?;
        tracing::debug!(item = %id, %fragment, token = %token, "fragment refreshed");

        self.items[pos].set_token(token);
        self.snapshot = None;
        Ok(content)
    }

    /// 启动一趟搜索，返回本趟代数
    pub fn search(&mut self, query: SearchQuery) -> u64 {
        let items = self.snapshot();
        self.search.request(query, items)
    }

    /// 等待最新一趟搜索完成
    pub async fn next_search_view(&mut self) -> &SearchView {
        self.search.next_view().await
    }

    /// 非阻塞地应用已到达的搜索结果，返回显示是否更新
    pub fn poll_search(&mut self) -> bool {
        self.search.poll()
    }

    pub fn search_view(&self) -> &SearchView {
        self.search.view()
    }

    fn mutate(
        &mut self,
        id: &ItemId,
        fragment: FragmentKind,
        content: String,
        cause: ChangeCause,
    ) -> Result<ItemTransition, PortalError> {
        let pos = self
            .positions
            .get(id)
            .copied()
            .ok_or_else(|| PortalError::UnknownItem(id.clone()))?;

        let item = &mut self.items[pos];
        let transition = match cause {
            ChangeCause::Refresh => item.apply_remote_content(fragment, content)?,
            _ => item.set_fragment_content(fragment, content)?,
        };
        self.snapshot = None;
        self.tracker.record_edit(item, fragment, transition, cause);
        Ok(transition)
    }

    async fn await_completion(&mut self) -> Option<CommitOutcome> {
        let completion = self.controller.next_completion().await?;
        Some(self.apply_completion(completion))
    }

    /// 在协调线程上应用后台提交的结果
    fn apply_completion(&mut self, completion: CommitCompletion) -> CommitOutcome {
        let CommitCompletion { request, result } = completion;
        let id = request.item.clone();

        let Some(pos) = self.positions.get(&id).copied() else {
            self.controller.finish(&id, CommitState::Failed);
            return CommitOutcome {
                item: id.clone(),
                result: Err(CommitError::UnknownItem { item: id }),
            };
        };

        let item = &mut self.items[pos];
        let result = match result {
            Ok(token) => {
                let report = item.complete_commit(&request, token);
                tracing::info!(
                    item = %id,
                    written = report.written,
                    token = %report.token,
                    "commit succeeded"
                );
                self.tracker.record_commit(item, Some(&report));
                Ok(report)
            }
            Err(e) => {
                let error = CommitError::from_provider(&id, e);
                tracing::warn!(item = %id, error = %error, "commit failed, local edits kept");
                self.tracker.record_commit(item, None);
                Err(error)
            }
        };
        self.snapshot = None;

        let outcome = CommitOutcome { item: id, result };
        self.controller.finish(&outcome.item, outcome.state());
        outcome
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("providers", &self.providers)
            .field("items", &self.items.len())
            .field("tracker", &self.tracker)
            .field("in_flight", &self.controller.in_flight())
            .finish()
    }
}

fn index_positions(items: &[EditableItem]) -> Result<HashMap<ItemId, usize>, PortalError> {
    let mut positions = HashMap::with_capacity(items.len());
    for (pos, item) in items.iter().enumerate() {
        if positions.insert(item.id().clone(), pos).is_some() {
            return Err(PortalError::InvariantViolation {
                operation: "load",
                detail: format!("duplicate item id {}", item.id()),
            });
        }
    }
    Ok(positions)
}

fn lost_outcome(id: &ItemId) -> CommitOutcome {
    CommitOutcome {
        item: id.clone(),
        result: Err(CommitError::Transport {
            item: id.clone(),
            message: "commit task ended without reporting a result".to_string(),
        }),
    }
}
