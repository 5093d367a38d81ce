use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::filter::SearchQuery;
use crate::config::SearchConfig;
use crate::index::{build_index_cancellable, HierarchyIndex};
use crate::item::EditableItem;
use crate::worker::{self, TaskClass};

/// 显示层看到的搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SearchView {
    /// 未应用过滤
    Unfiltered(HierarchyIndex),
    /// 有过滤且有匹配
    Matches {
        query: SearchQuery,
        index: HierarchyIndex,
    },
    /// 有过滤但没有任何匹配（与“未过滤”区分）
    NoMatches { query: SearchQuery },
}

impl SearchView {
    fn from_result(query: SearchQuery, index: HierarchyIndex) -> Self {
        if query.is_empty() {
            SearchView::Unfiltered(index)
        } else if index.is_empty() {
            SearchView::NoMatches { query }
        } else {
            SearchView::Matches { query, index }
        }
    }

    pub fn index(&self) -> Option<&HierarchyIndex> {
        match self {
            SearchView::Unfiltered(index) | SearchView::Matches { index, .. } => Some(index),
            SearchView::NoMatches { .. } => None,
        }
    }

    pub fn query(&self) -> Option<&SearchQuery> {
        match self {
            SearchView::Unfiltered(_) => None,
            SearchView::Matches { query, .. } | SearchView::NoMatches { query } => Some(query),
        }
    }

    pub fn is_no_matches(&self) -> bool {
        matches!(self, SearchView::NoMatches { .. })
    }
}

impl Default for SearchView {
    fn default() -> Self {
        SearchView::Unfiltered(HierarchyIndex::default())
    }
}

/// 后台过滤完成的结果
///
/// `index` 为 `None` 表示该趟被取消或失败。
#[derive(Debug)]
pub struct SearchCompletion {
    pub generation: u64,
    pub query: SearchQuery,
    pub index: Option<HierarchyIndex>,
}

/// 搜索引擎
///
/// # 执行模型
/// - 每次 `request` 先取消上一趟，再把代数加一并启动新的后台过滤
/// - 取消是协作式的：防抖等待和每批匹配之间检查取消标记
/// - 结果通过通道回到协调线程，只有代数等于当前代数的结果才会被应用
pub struct SearchEngine {
    config: SearchConfig,
    generation: u64,
    applied_generation: u64,
    cancel: Option<CancellationToken>,
    tx: mpsc::UnboundedSender<SearchCompletion>,
    rx: mpsc::UnboundedReceiver<SearchCompletion>,
    view: SearchView,
}

impl SearchEngine {
    pub fn new(config: SearchConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            generation: 0,
            applied_generation: 0,
            cancel: None,
            tx,
            rx,
            view: SearchView::default(),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// 当前代数
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 当前显示的结果
    pub fn view(&self) -> &SearchView {
        &self.view
    }

    /// 最新一趟的结果是否已经应用
    pub fn is_settled(&self) -> bool {
        self.applied_generation == self.generation
    }

    /// 启动新的过滤，返回本趟代数
    ///
    /// # 参数
    /// * `query` - 查询
    /// * `items` - 条目集合快照（后台只读）
    pub fn request(&mut self, query: SearchQuery, items: Arc<[EditableItem]>) -> u64 {
        if let Some(previous) = self.cancel.take() {
            previous.cancel();
        }

        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());

        tracing::debug!(
            generation,
            query = %query.text,
            content = query.search_content,
            "search requested"
        );

        let tx = self.tx.clone();
        let debounce = self.config.debounce();
        let chunk_size = self.config.chunk_size;
        worker::spawn(TaskClass::Search, async move {
            let index = run_pass(items, query.clone(), token, debounce, chunk_size).await;
            // 接收端随引擎一起释放，发送失败说明已无人关心
            let _ = tx.send(SearchCompletion {
                generation,
                query,
                index,
            });
        });

        generation
    }

    /// 应用一趟结果
    ///
    /// # 返回
    /// 结果被应用（显示发生更新）时返回 `true`；过期结果被丢弃时返回 `false`
    pub fn accept(&mut self, completion: SearchCompletion) -> bool {
        if completion.generation != self.generation {
            tracing::debug!(
                stale = completion.generation,
                current = self.generation,
                "discarding stale search pass"
            );
            return false;
        }

        self.applied_generation = completion.generation;
        match completion.index {
            Some(index) => {
                self.view = SearchView::from_result(completion.query, index);
                true
            }
            None => {
                tracing::warn!(
                    generation = completion.generation,
                    "search pass produced no result"
                );
                false
            }
        }
    }

    /// 等待最新一趟完成并返回结果
    pub async fn next_view(&mut self) -> &SearchView {
        while !self.is_settled() {
            match self.rx.recv().await {
                Some(completion) => {
                    self.accept(completion);
                }
                None => break,
            }
        }
        &self.view
    }

    /// 非阻塞地处理已到达的结果
    ///
    /// # 返回
    /// 显示是否发生更新
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(completion) = self.rx.try_recv() {
            changed |= self.accept(completion);
        }
        changed
    }
}

impl Drop for SearchEngine {
    fn drop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

async fn run_pass(
    items: Arc<[EditableItem]>,
    query: SearchQuery,
    token: CancellationToken,
    debounce: Duration,
    chunk_size: usize,
) -> Option<HierarchyIndex> {
    if !debounce.is_zero() {
        tokio::select! {
            _ = token.cancelled() => return None,
            _ = tokio::time::sleep(debounce) => {}
        }
    }
    if token.is_cancelled() {
        return None;
    }

    let handle = worker::spawn_blocking(TaskClass::Search, move || {
        let filter = query.filter();
        build_index_cancellable(&items, filter.as_ref(), &token, chunk_size)
    });

    match handle.await {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(error = %e, "search task failed");
            None
        }
    }
}
