use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::error::CommitError;
use crate::item::{CommitReport, CommitRequest, ConcurrencyToken, ItemId};
use crate::provider::{ItemProvider, ProviderError};
use crate::worker::{self, TaskClass};

/// 单个条目的提交状态
///
/// `Idle -> Committing -> {Committed | Conflict | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitState {
    Idle,
    Committing,
    Committed,
    Conflict,
    Failed,
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommitState::Committed | CommitState::Conflict | CommitState::Failed
        )
    }
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CommitState::Idle => "idle",
            CommitState::Committing => "committing",
            CommitState::Committed => "committed",
            CommitState::Conflict => "conflict",
            CommitState::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// 一次提交的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub item: ItemId,
    pub result: Result<CommitReport, CommitError>,
}

impl CommitOutcome {
    pub fn state(&self) -> CommitState {
        match &self.result {
            Ok(_) => CommitState::Committed,
            Err(e) if e.is_conflict() => CommitState::Conflict,
            Err(_) => CommitState::Failed,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.result.is_ok()
    }
}

/// 后台写入完成后回到协调线程的数据
#[derive(Debug)]
pub(crate) struct CommitCompletion {
    pub(crate) request: CommitRequest,
    pub(crate) result: Result<ConcurrencyToken, ProviderError>,
}

/// 并发控制器
///
/// 负责按条目串行化提交：同一条目处于 `Committing` 时拒绝新的提交请求；
/// 不同条目的提交彼此独立，可以同时进行。后台只执行后端写入，
/// 写入结果经通道交回协调线程后才修改条目状态。
#[derive(Debug)]
pub struct CommitController {
    states: HashMap<ItemId, CommitState>,
    in_flight: usize,
    tx: mpsc::UnboundedSender<CommitCompletion>,
    rx: mpsc::UnboundedReceiver<CommitCompletion>,
}

impl Default for CommitController {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitController {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            states: HashMap::new(),
            in_flight: 0,
            tx,
            rx,
        }
    }

    /// 条目当前的提交状态
    pub fn state(&self, id: &ItemId) -> CommitState {
        self.states.get(id).copied().unwrap_or(CommitState::Idle)
    }

    pub fn is_committing(&self, id: &ItemId) -> bool {
        self.state(id) == CommitState::Committing
    }

    /// 正在进行的提交数
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// 正在提交的条目
    pub fn committing(&self) -> impl Iterator<Item = &ItemId> {
        self.states
            .iter()
            .filter(|(_, s)| **s == CommitState::Committing)
            .map(|(id, _)| id)
    }

    /// 开始提交
    ///
    /// # 参数
    /// * `request` - 由条目生成的提交请求
    /// * `current` - 条目当前令牌（空提交时原样返回）
    /// * `provider` - 该条目类型的提供者
    ///
    /// # 错误
    /// 该条目已有提交在进行时返回 `Busy`
    pub(crate) fn begin(
        &mut self,
        request: CommitRequest,
        current: ConcurrencyToken,
        provider: Arc<dyn ItemProvider>,
    ) -> Result<(), CommitError> {
        if self.is_committing(&request.item) {
            return Err(CommitError::Busy {
                item: request.item.clone(),
            });
        }

        self.states.insert(request.item.clone(), CommitState::Committing);
        self.in_flight += 1;

        // 没有脏片段：不访问后端，直接投递成功结果
        if request.is_empty() {
            tracing::debug!(item = %request.item, "nothing to commit");
            let _ = self.tx.send(CommitCompletion {
                request,
                result: Ok(current),
            });
            return Ok(());
        }

        tracing::debug!(
            item = %request.item,
            fragments = request.fragments.len(),
            forced = request.is_forced(),
            "commit started"
        );

        // 写入任务异常结束（提供者 panic）时也必须投递结果，否则条目停留在 Committing
        let tx = self.tx.clone();
        let fallback = request.clone();
        worker::spawn(TaskClass::Io, async move {
            let write = worker::spawn_blocking(TaskClass::Io, move || {
                let result = provider.write(&request);
                (request, result)
            });
            let completion = match write.await {
                Ok((request, result)) => CommitCompletion { request, result },
                Err(e) => {
                    tracing::error!(item = %fallback.item, error = %e, "commit task aborted");
                    let message = format!("commit task aborted: {}", e);
                    CommitCompletion {
                        request: fallback,
                        result: Err(ProviderError::Transport(message)),
                    }
                }
            };
            let _ = tx.send(completion);
        });

        Ok(())
    }

    /// 等待下一个完成的提交；没有进行中的提交时返回 `None`
    pub(crate) async fn next_completion(&mut self) -> Option<CommitCompletion> {
        if self.in_flight == 0 {
            return None;
        }
        self.rx.recv().await
    }

    /// 非阻塞地取出一个已完成的提交
    pub(crate) fn try_next_completion(&mut self) -> Option<CommitCompletion> {
        self.rx.try_recv().ok()
    }

    /// 记录终态
    pub(crate) fn finish(&mut self, id: &ItemId, state: CommitState) {
        debug_assert!(state.is_terminal());
        if self.states.insert(id.clone(), state) == Some(CommitState::Committing) {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
    }

    /// 清除全部终态记录（重新加载工作集时调用）
    pub(crate) fn clear_finished(&mut self) {
        self.states.retain(|_, s| *s == CommitState::Committing);
    }
}
