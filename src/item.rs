use serde::{Deserialize, Serialize};

use crate::fragment::{CodeFragment, FragmentKind, StateChange};
use crate::utils::PortalError;

/// 条目的稳定标识符
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 所属站点引用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteRef {
    pub id: String,
    pub name: String,
}

impl SiteRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// 并发令牌（不透明的远端版本戳）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    pub fn new(stamp: impl Into<String>) -> Self {
        Self(stamp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 记录类型
///
/// 类型集合是封闭的：新增一种记录类型需要在这里增加一个变体，
/// 并给出它的分组名称和片段布局。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    WebPage,
    EntityForm,
    WebTemplate,
    WebFile,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [
        ItemKind::WebPage,
        ItemKind::EntityForm,
        ItemKind::WebTemplate,
        ItemKind::WebFile,
    ];

    /// 分组节点的键
    pub fn group_key(&self) -> &'static str {
        match self {
            ItemKind::WebPage => "WebPage",
            ItemKind::EntityForm => "EntityForm",
            ItemKind::WebTemplate => "WebTemplate",
            ItemKind::WebFile => "WebFile",
        }
    }

    /// 分组节点显示名称
    pub fn group_label(&self) -> &'static str {
        match self {
            ItemKind::WebPage => "Web Pages",
            ItemKind::EntityForm => "Entity Forms",
            ItemKind::WebTemplate => "Web Templates",
            ItemKind::WebFile => "Web Files",
        }
    }

    /// 该类型条目拥有的片段（有序）
    pub fn fragment_layout(&self) -> &'static [FragmentKind] {
        match self {
            ItemKind::WebPage => &[FragmentKind::JavaScript, FragmentKind::Style],
            ItemKind::EntityForm => &[FragmentKind::JavaScript],
            ItemKind::WebTemplate => &[FragmentKind::Template],
            ItemKind::WebFile => &[FragmentKind::FileContent],
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.group_key())
    }
}

/// 网页特有的元数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub is_root: bool,
    pub parent_page: Option<ItemId>,
    pub language: Option<String>,
}

impl PageInfo {
    /// 计算网页显示名称
    ///
    /// 根页面和旧版门户（无语言信息）直接使用名称，
    /// 其余内容页附加语言：`"{name} ({language})"`
    pub fn display_name(&self, name: &str, legacy: bool) -> String {
        if self.is_root || legacy {
            return name.to_string();
        }
        format!(
            "{} ({})",
            name,
            self.language.as_deref().unwrap_or("no language")
        )
    }
}

/// 提供者交给核心的记录数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: ItemId,
    pub kind: ItemKind,
    pub name: String,
    pub site: Option<SiteRef>,
    /// 片段类型及远端内容（`None` 表示远端为 null）
    pub fragments: Vec<(FragmentKind, Option<String>)>,
    pub token: ConcurrencyToken,
    pub page: Option<PageInfo>,
}

/// 一次编辑引起的状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemTransition {
    pub fragment: Option<StateChange>,
    /// 条目 pending 标志变化后的值（未变化为 `None`）
    pub pending: Option<bool>,
}

/// 一次提交的写入内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub item: ItemId,
    pub kind: ItemKind,
    /// 需要写入的脏片段
    pub fragments: Vec<(FragmentKind, String)>,
    /// 条件写入的期望令牌；`None` 表示强制覆盖
    pub expected_token: Option<ConcurrencyToken>,
}

impl CommitRequest {
    pub fn is_forced(&self) -> bool {
        self.expected_token.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// 提交完成后的状态报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub item: ItemId,
    /// 写入的片段数；0 表示无改动的空提交
    pub written: usize,
    pub fragment_changes: Vec<(FragmentKind, StateChange)>,
    pub pending: Option<bool>,
    pub token: ConcurrencyToken,
}

/// 可编辑条目
///
/// 独占其代码片段与并发令牌。`pending` 始终等于各片段脏标志的逻辑或，
/// 只能经由片段编辑或提交结果改变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableItem {
    id: ItemId,
    kind: ItemKind,
    name: String,
    site: SiteRef,
    fragments: Vec<CodeFragment>,
    token: ConcurrencyToken,
    pending: bool,
    page: Option<PageInfo>,
}

impl EditableItem {
    /// 从提供者记录创建条目
    ///
    /// # 错误
    /// 缺少站点引用、片段布局与类型不符时返回 `InvariantViolation`
    pub fn from_record(record: ItemRecord) -> Result<Self, PortalError> {
        let ItemRecord {
            id,
            kind,
            name,
            site,
            fragments,
            token,
            page,
        } = record;

        let site = site.ok_or_else(|| PortalError::InvariantViolation {
            operation: "load",
            detail: format!("{} {} has no website reference", kind, id),
        })?;

        let layout = kind.fragment_layout();
        let actual: Vec<FragmentKind> = fragments.iter().map(|(k, _)| *k).collect();
        if actual != layout {
            return Err(PortalError::InvariantViolation {
                operation: "load",
                detail: format!(
                    "{} {} has fragments {:?}, expected {:?}",
                    kind, id, actual, layout
                ),
            });
        }

        let fragments = fragments
            .into_iter()
            .map(|(fragment_kind, remote)| CodeFragment::new(id.clone(), fragment_kind, remote))
            .collect();

        Ok(Self {
            id,
            kind,
            name,
            site,
            fragments,
            token,
            pending: false,
            page,
        })
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn site(&self) -> &SiteRef {
        &self.site
    }

    pub fn fragments(&self) -> &[CodeFragment] {
        &self.fragments
    }

    pub fn fragment(&self, kind: FragmentKind) -> Option<&CodeFragment> {
        self.fragments.iter().find(|f| f.kind() == kind)
    }

    pub fn token(&self) -> &ConcurrencyToken {
        &self.token
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending
    }

    pub fn page(&self) -> Option<&PageInfo> {
        self.page.as_ref()
    }

    /// 编辑一个片段
    pub fn set_fragment_content(
        &mut self,
        kind: FragmentKind,
        content: String,
    ) -> Result<ItemTransition, PortalError> {
        let fragment = self.fragment_mut(kind)?;
        let change = fragment.set_content(content);
        let pending = match change {
            Some(_) => self.rederive_pending(),
            None => None,
        };
        Ok(ItemTransition {
            fragment: change,
            pending,
        })
    }

    /// 用远端内容覆盖一个片段（刷新后由调用方显式应用）
    pub fn apply_remote_content(
        &mut self,
        kind: FragmentKind,
        content: String,
    ) -> Result<ItemTransition, PortalError> {
        let fragment = self.fragment_mut(kind)?;
        let change = fragment.accept_remote(content);
        let pending = match change {
            Some(_) => self.rederive_pending(),
            None => None,
        };
        Ok(ItemTransition {
            fragment: change,
            pending,
        })
    }

    /// 收集脏片段，生成提交请求
    pub fn prepare_commit(&self, force_overwrite: bool) -> CommitRequest {
        let fragments = self
            .fragments
            .iter()
            .filter(|f| f.is_dirty())
            .map(|f| (f.kind(), f.content().to_string()))
            .collect();

        CommitRequest {
            item: self.id.clone(),
            kind: self.kind,
            fragments,
            expected_token: (!force_overwrite).then(|| self.token.clone()),
        }
    }

    /// 应用成功提交的结果：更新令牌并以已提交文本作为新基线
    pub fn complete_commit(
        &mut self,
        request: &CommitRequest,
        token: ConcurrencyToken,
    ) -> CommitReport {
        let mut fragment_changes = Vec::new();
        for (kind, committed) in &request.fragments {
            if let Some(fragment) = self.fragments.iter_mut().find(|f| f.kind() == *kind) {
                if let Some(change) = fragment.mark_committed(committed) {
                    fragment_changes.push((*kind, change));
                }
            }
        }

        self.token = token;
        let pending = self.rederive_pending();

        CommitReport {
            item: self.id.clone(),
            written: request.fragments.len(),
            fragment_changes,
            pending,
            token: self.token.clone(),
        }
    }

    /// 刷新片段后更新本地令牌
    pub(crate) fn set_token(&mut self, token: ConcurrencyToken) {
        self.token = token;
    }

    fn fragment_mut(&mut self, kind: FragmentKind) -> Result<&mut CodeFragment, PortalError> {
        let item = self.id.clone();
        self.fragments
            .iter_mut()
            .find(|f| f.kind() == kind)
            .ok_or(PortalError::UnknownFragment { item, kind })
    }

    fn rederive_pending(&mut self) -> Option<bool> {
        let pending = self.fragments.iter().any(CodeFragment::is_dirty);
        if pending == self.pending {
            return None;
        }
        self.pending = pending;
        Some(pending)
    }
}
