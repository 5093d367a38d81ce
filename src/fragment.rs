use serde::{Deserialize, Serialize};

use crate::item::ItemId;

/// 代码片段的内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// 自定义 JavaScript
    #[serde(rename = "javascript")]
    JavaScript,
    /// 自定义样式表
    Style,
    /// 模板源码（Liquid/HTML）
    Template,
    /// 文件正文
    FileContent,
}

impl FragmentKind {
    /// 树节点上显示的名称
    pub fn label(&self) -> &'static str {
        match self {
            FragmentKind::JavaScript => "JavaScript",
            FragmentKind::Style => "Style",
            FragmentKind::Template => "Template",
            FragmentKind::FileContent => "Content",
        }
    }

    /// 从命令行/JSON 中的名称解析（大小写不敏感）
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "javascript" | "js" | "script" => Some(FragmentKind::JavaScript),
            "style" | "css" => Some(FragmentKind::Style),
            "template" => Some(FragmentKind::Template),
            "content" | "file_content" | "file" => Some(FragmentKind::FileContent),
            _ => None,
        }
    }
}

impl std::fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 片段的脏状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirtyState {
    /// 与最近一次获取/提交的内容一致
    Clean,
    /// 与远端已有内容不同
    Modified,
    /// 远端没有内容（null），本地新写入了内容
    New,
}

impl DirtyState {
    pub fn is_dirty(&self) -> bool {
        !matches!(self, DirtyState::Clean)
    }
}

/// 一次脏状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub old: DirtyState,
    pub new: DirtyState,
}

/// 可编辑的代码片段
///
/// 保存当前内容和基线（最近一次成功获取或提交的远端值）。
/// 脏状态总是由 `content` 与基线是否一致推导，因此
/// `state != Clean` 当且仅当内容与基线不同。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFragment {
    kind: FragmentKind,
    content: String,
    /// 远端基线，`None` 表示远端字段为 null
    baseline: Option<String>,
    state: DirtyState,
    /// 所属条目（非拥有，仅用于归属）
    owner: ItemId,
}

impl CodeFragment {
    /// 从远端数据创建片段，初始状态为 `Clean`
    pub fn new(owner: ItemId, kind: FragmentKind, remote: Option<String>) -> Self {
        Self {
            kind,
            content: remote.clone().unwrap_or_default(),
            baseline: remote,
            state: DirtyState::Clean,
            owner,
        }
    }

    pub fn kind(&self) -> FragmentKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn state(&self) -> DirtyState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    pub fn owner(&self) -> &ItemId {
        &self.owner
    }

    /// 最近一次获取或提交的远端内容
    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }

    /// 修改内容
    ///
    /// # 返回
    /// 状态发生迁移时返回 `Some`；内容或状态不变时返回 `None`（不触发通知）
    pub fn set_content(&mut self, content: String) -> Option<StateChange> {
        if content == self.content {
            return None;
        }
        self.content = content;
        self.rederive()
    }

    /// 提交成功后以已提交文本作为新基线
    ///
    /// 提交期间又有新编辑时，内容与已提交文本不同，片段保持脏状态。
    pub(crate) fn mark_committed(&mut self, committed: &str) -> Option<StateChange> {
        self.baseline = Some(committed.to_string());
        self.rederive()
    }

    /// 接受远端内容：内容与基线都替换为远端值
    pub(crate) fn accept_remote(&mut self, remote: String) -> Option<StateChange> {
        self.content = remote.clone();
        self.baseline = Some(remote);
        self.rederive()
    }

    fn rederive(&mut self) -> Option<StateChange> {
        let new = match self.baseline.as_deref() {
            Some(base) if base == self.content => DirtyState::Clean,
            Some(_) => DirtyState::Modified,
            None if self.content.is_empty() => DirtyState::Clean,
            None => DirtyState::New,
        };

        if new == self.state {
            return None;
        }

        let old = std::mem::replace(&mut self.state, new);
        Some(StateChange { old, new })
    }
}
