/// 内置门户存储
///
/// 一个以 JSON 快照为载体的后端实现，行为与真实门户后端一致：
/// 每条记录带递增版本号作为并发令牌，条件写入在版本不一致时以
/// 版本冲突错误码失败，旧版结构拒绝可选列。
/// 命令行工具和测试都通过它运行完整的提交协议。

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::traits::{
    Capabilities, ItemProvider, ProviderError, FAULT_CONCURRENCY_VERSION_MISMATCH,
    FAULT_OBJECT_DOES_NOT_EXIST, FAULT_QUERY_ATTRIBUTE_MISSING,
};
use crate::config::StoreConfig;
use crate::fragment::FragmentKind;
use crate::item::{
    CommitRequest, ConcurrencyToken, ItemId, ItemKind, ItemRecord, PageInfo, SiteRef,
};
use crate::utils::{create_backup, PortalError};

/// 门户快照（JSON 文件格式）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortalSnapshot {
    #[serde(default)]
    pub websites: Vec<SiteRef>,
    #[serde(default)]
    pub records: Vec<StoredRecord>,
    /// 旧版门户：不支持语言、根页面等可选列
    #[serde(default)]
    pub legacy_schema: bool,
}

/// 存储中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: ItemId,
    pub kind: ItemKind,
    pub name: String,
    #[serde(default)]
    pub website_id: Option<String>,
    #[serde(default)]
    pub fragments: BTreeMap<FragmentKind, Option<String>>,
    #[serde(default = "initial_version")]
    pub version: u64,
    #[serde(default = "Utc::now")]
    pub modified_on: DateTime<Utc>,
    #[serde(default)]
    pub page: Option<PageInfo>,
}

fn initial_version() -> u64 {
    1
}

impl StoredRecord {
    pub fn new(id: &str, kind: ItemKind, name: &str, website_id: &str) -> Self {
        Self {
            id: ItemId::new(id),
            kind,
            name: name.to_string(),
            website_id: Some(website_id.to_string()),
            fragments: kind
                .fragment_layout()
                .iter()
                .map(|k| (*k, None))
                .collect(),
            version: initial_version(),
            modified_on: Utc::now(),
            page: None,
        }
    }

    /// 设置片段内容（构造测试数据/快照用）
    pub fn with_fragment(mut self, kind: FragmentKind, content: &str) -> Self {
        self.fragments.insert(kind, Some(content.to_string()));
        self
    }

    pub fn with_page(mut self, page: PageInfo) -> Self {
        self.page = Some(page);
        self
    }

    fn token(&self) -> ConcurrencyToken {
        ConcurrencyToken::new(self.version.to_string())
    }
}

/// 可注入故障的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Fetch,
    Update,
    FetchToken,
    ReadFragment,
}

#[derive(Debug)]
struct StoreState {
    snapshot: PortalSnapshot,
    faults: VecDeque<(StoreOp, ProviderError)>,
    backed_up: bool,
}

/// 门户存储
#[derive(Debug)]
pub struct PortalStore {
    state: Mutex<StoreState>,
    path: Option<PathBuf>,
    backup_on_first_write: bool,
}

impl PortalStore {
    /// 创建纯内存存储
    pub fn in_memory(snapshot: PortalSnapshot) -> Self {
        Self {
            state: Mutex::new(StoreState {
                snapshot,
                faults: VecDeque::new(),
                backed_up: false,
            }),
            path: None,
            backup_on_first_write: false,
        }
    }

    /// 从 JSON 文件打开存储，写入成功后回写文件
    ///
    /// # 参数
    /// * `path` - 快照文件路径
    /// * `config` - 存储配置（是否在首次写入前备份）
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self, PortalError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: PortalSnapshot = serde_json::from_str(&content)?;

        tracing::debug!(
            path = %path.display(),
            records = snapshot.records.len(),
            "portal store opened"
        );

        Ok(Self {
            state: Mutex::new(StoreState {
                snapshot,
                faults: VecDeque::new(),
                backed_up: false,
            }),
            path: Some(path.to_path_buf()),
            backup_on_first_write: config.backup_on_first_write,
        })
    }

    /// 当前快照副本
    pub fn snapshot(&self) -> PortalSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// 让下一次 `op` 操作以 `error` 失败
    pub fn inject_fault(&self, op: StoreOp, error: ProviderError) {
        self.state.lock().faults.push_back((op, error));
    }

    /// 模拟其他用户对记录的并发修改（版本号递增）
    pub fn remote_edit(
        &self,
        id: &ItemId,
        fragment: FragmentKind,
        content: &str,
    ) -> Result<ConcurrencyToken, ProviderError> {
        let mut state = self.state.lock();
        let record = find_record_mut(&mut state.snapshot, id)?;
        record.fragments.insert(fragment, Some(content.to_string()));
        record.version += 1;
        record.modified_on = Utc::now();
        Ok(record.token())
    }

    /// 模拟远端删除记录
    pub fn remove_record(&self, id: &ItemId) -> bool {
        let mut state = self.state.lock();
        let before = state.snapshot.records.len();
        state.snapshot.records.retain(|r| &r.id != id);
        state.snapshot.records.len() != before
    }

    fn take_fault(state: &mut StoreState, op: StoreOp) -> Result<(), ProviderError> {
        if let Some(pos) = state.faults.iter().position(|(o, _)| *o == op) {
            if let Some((_, error)) = state.faults.remove(pos) {
                return Err(error);
            }
        }
        Ok(())
    }

    fn fetch(
        &self,
        kind: ItemKind,
        capabilities: Capabilities,
    ) -> Result<Vec<ItemRecord>, ProviderError> {
        let mut state = self.state.lock();
        Self::take_fault(&mut state, StoreOp::Fetch)?;

        if state.snapshot.legacy_schema && !capabilities.is_empty() {
            return Err(ProviderError::fault(
                FAULT_QUERY_ATTRIBUTE_MISSING,
                format!("{} query references attributes missing from this schema", kind),
            ));
        }

        let snapshot = &state.snapshot;
        let hierarchy = capabilities.contains(Capabilities::PAGE_HIERARCHY);
        let mut rows: Vec<&StoredRecord> =
            snapshot.records.iter().filter(|r| r.kind == kind).collect();

        // 根页面在前，其余按名称排序
        rows.sort_by(|a, b| {
            let root_a = hierarchy && a.page.as_ref().is_some_and(|p| p.is_root);
            let root_b = hierarchy && b.page.as_ref().is_some_and(|p| p.is_root);
            root_b.cmp(&root_a).then_with(|| a.name.cmp(&b.name))
        });

        Ok(rows
            .into_iter()
            .map(|row| to_item_record(snapshot, row, capabilities))
            .collect())
    }

    fn update(&self, request: &CommitRequest) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        Self::take_fault(&mut state, StoreOp::Update)?;

        let pos = find_position(&state.snapshot, &request.item)?;
        let record = &state.snapshot.records[pos];

        if let Some(expected) = &request.expected_token {
            if expected.as_str() != record.version.to_string() {
                return Err(ProviderError::fault(
                    FAULT_CONCURRENCY_VERSION_MISMATCH,
                    format!(
                        "record {} is at version {}, update expected {}",
                        record.id, record.version, expected
                    ),
                ));
            }
        }

        let layout = record.kind.fragment_layout();
        if let Some((kind, _)) = request.fragments.iter().find(|(k, _)| !layout.contains(k)) {
            return Err(ProviderError::Malformed {
                id: record.id.to_string(),
                detail: format!("{} has no {} column", record.kind, kind),
            });
        }

        let mut updated = record.clone();
        for (kind, content) in &request.fragments {
            updated.fragments.insert(*kind, Some(content.clone()));
        }
        updated.version += 1;
        updated.modified_on = Utc::now();

        // 文件写入失败时恢复原记录，内存状态与磁盘保持一致
        let previous = std::mem::replace(&mut state.snapshot.records[pos], updated);
        if let Err(e) = self.persist(&mut state) {
            tracing::warn!(item = %request.item, error = %e, "update rolled back");
            state.snapshot.records[pos] = previous;
            return Err(e);
        }
        Ok(())
    }

    fn token(&self, id: &ItemId) -> Result<ConcurrencyToken, ProviderError> {
        let mut state = self.state.lock();
        Self::take_fault(&mut state, StoreOp::FetchToken)?;
        find_record(&state.snapshot, id).map(StoredRecord::token)
    }

    fn read_fragment(
        &self,
        id: &ItemId,
        fragment: FragmentKind,
    ) -> Result<(String, ConcurrencyToken), ProviderError> {
        let mut state = self.state.lock();
        Self::take_fault(&mut state, StoreOp::ReadFragment)?;
        let record = find_record(&state.snapshot, id)?;
        let content = record
            .fragments
            .get(&fragment)
            .cloned()
            .flatten()
            .unwrap_or_default();
        Ok((content, record.token()))
    }

    /// 把快照写回文件（纯内存存储直接返回）
    fn persist(&self, state: &mut StoreState) -> Result<(), ProviderError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if self.backup_on_first_write && !state.backed_up {
            let backup =
                create_backup(path).map_err(|e| ProviderError::Transport(e.to_string()))?;
            tracing::info!(backup = %backup.display(), "portal store backed up");
            state.backed_up = true;
        }

        let json = serde_json::to_string_pretty(&state.snapshot)
            .map_err(|e| ProviderError::Transport(format!("序列化快照失败: {}", e)))?;
        std::fs::write(path, json)
            .map_err(|e| ProviderError::Transport(format!("写入快照失败: {}", e)))
    }
}

fn find_record<'a>(
    snapshot: &'a PortalSnapshot,
    id: &ItemId,
) -> Result<&'a StoredRecord, ProviderError> {
    find_position(snapshot, id).map(|pos| &snapshot.records[pos])
}

fn find_record_mut<'a>(
    snapshot: &'a mut PortalSnapshot,
    id: &ItemId,
) -> Result<&'a mut StoredRecord, ProviderError> {
    let pos = find_position(snapshot, id)?;
    Ok(&mut snapshot.records[pos])
}

fn find_position(snapshot: &PortalSnapshot, id: &ItemId) -> Result<usize, ProviderError> {
    snapshot
        .records
        .iter()
        .position(|r| &r.id == id)
        .ok_or_else(|| not_found(id))
}

fn not_found(id: &ItemId) -> ProviderError {
    ProviderError::fault(FAULT_OBJECT_DOES_NOT_EXIST, format!("record {} does not exist", id))
}

/// 转换为提供者记录，只保留本次能力允许的列
fn to_item_record(
    snapshot: &PortalSnapshot,
    row: &StoredRecord,
    capabilities: Capabilities,
) -> ItemRecord {
    let site = row
        .website_id
        .as_ref()
        .and_then(|id| snapshot.websites.iter().find(|w| &w.id == id))
        .cloned();

    // 布局内的片段按布局顺序排列，布局外的片段附加在末尾交给核心校验
    let layout = row.kind.fragment_layout();
    let mut fragments: Vec<(FragmentKind, Option<String>)> = layout
        .iter()
        .map(|k| (*k, row.fragments.get(k).cloned().flatten()))
        .collect();
    fragments.extend(
        row.fragments
            .iter()
            .filter(|(k, _)| !layout.contains(k))
            .map(|(k, v)| (*k, v.clone())),
    );

    let legacy = !capabilities.contains(Capabilities::LANGUAGES);
    let page = (row.kind == ItemKind::WebPage).then(|| {
        let stored = row.page.clone().unwrap_or_default();
        PageInfo {
            is_root: capabilities.contains(Capabilities::PAGE_HIERARCHY) && stored.is_root,
            parent_page: stored
                .parent_page
                .filter(|_| capabilities.contains(Capabilities::PAGE_HIERARCHY)),
            language: stored.language.filter(|_| !legacy),
        }
    });

    let name = match &page {
        Some(info) => info.display_name(&row.name, legacy),
        None => row.name.clone(),
    };

    ItemRecord {
        id: row.id.clone(),
        kind: row.kind,
        name,
        site,
        fragments,
        token: row.token(),
        page,
    }
}

/// 基于 `PortalStore` 的单类型提供者
#[derive(Debug, Clone)]
pub struct StoreProvider {
    store: Arc<PortalStore>,
    kind: ItemKind,
}

impl StoreProvider {
    pub fn new(store: Arc<PortalStore>, kind: ItemKind) -> Self {
        Self { store, kind }
    }
}

impl ItemProvider for StoreProvider {
    fn kind(&self) -> ItemKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        match self.kind {
            ItemKind::WebPage => Capabilities::LANGUAGES | Capabilities::PAGE_HIERARCHY,
            _ => Capabilities::empty(),
        }
    }

    fn fetch_all(&self, capabilities: Capabilities) -> Result<Vec<ItemRecord>, ProviderError> {
        self.store.fetch(self.kind, capabilities)
    }

    fn update(&self, request: &CommitRequest) -> Result<(), ProviderError> {
        self.store.update(request)
    }

    fn fetch_token(&self, id: &ItemId) -> Result<ConcurrencyToken, ProviderError> {
        self.store.token(id)
    }

    fn read_fragment(
        &self,
        id: &ItemId,
        fragment: FragmentKind,
    ) -> Result<(String, ConcurrencyToken), ProviderError> {
        self.store.read_fragment(id, fragment)
    }
}
