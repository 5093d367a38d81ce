/// 提供者抽象层 - trait 定义
///
/// 提供者负责把某一种记录类型与后端结构互相转换，
/// 核心只通过这里的接口读取、写入和刷新记录。

use bitflags::bitflags;
use thiserror::Error;

use crate::fragment::FragmentKind;
use crate::item::{CommitRequest, ConcurrencyToken, ItemId, ItemKind, ItemRecord};

/// 条件写入因版本不匹配被拒绝
pub const FAULT_CONCURRENCY_VERSION_MISMATCH: i32 = -2147088254;
/// 记录不存在（已被远端删除）
pub const FAULT_OBJECT_DOES_NOT_EXIST: i32 = -2147220969;
/// 查询引用了后端不存在的列（旧版结构）
pub const FAULT_QUERY_ATTRIBUTE_MISSING: i32 = -2147217149;

bitflags! {
    /// 后端可选能力
    ///
    /// 空集合表示只使用所有后端版本都支持的基础列。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// 网页语言信息
        const LANGUAGES = 1 << 0;
        /// 根页面/子页面层级
        const PAGE_HIERARCHY = 1 << 1;
    }
}

/// 后端错误的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    Conflict,
    NotFound,
    SchemaMismatch,
    Other,
}

/// 提供者错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Backend fault {code}: {message}")]
    Fault { code: i32, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed record {id}: {detail}")]
    Malformed { id: String, detail: String },
}

impl ProviderError {
    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        ProviderError::Fault {
            code,
            message: message.into(),
        }
    }

    /// 按后端错误码分类
    pub fn classify(&self) -> FaultClass {
        match self {
            ProviderError::Fault { code, .. } => match *code {
                FAULT_CONCURRENCY_VERSION_MISMATCH => FaultClass::Conflict,
                FAULT_OBJECT_DOES_NOT_EXIST => FaultClass::NotFound,
                FAULT_QUERY_ATTRIBUTE_MISSING => FaultClass::SchemaMismatch,
                _ => FaultClass::Other,
            },
            _ => FaultClass::Other,
        }
    }
}

/// 记录提供者 trait
///
/// # 职责
/// - 批量读取一种记录类型，按显示顺序预先排好序
/// - 执行条件/强制写入，并读取写入后的并发令牌
/// - 只读取单个片段的最新内容
///
/// 所有方法都在后台线程上调用，因此要求 `Send + Sync`。
pub trait ItemProvider: Send + Sync {
    /// 该提供者负责的记录类型
    fn kind(&self) -> ItemKind;

    /// 提供者希望使用的可选能力
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// 读取全部记录
    ///
    /// # 参数
    /// * `capabilities` - 本次查询允许使用的可选能力
    fn fetch_all(&self, capabilities: Capabilities) -> Result<Vec<ItemRecord>, ProviderError>;

    /// 写入脏片段
    ///
    /// `request.expected_token` 为 `Some` 时，远端令牌不一致必须以
    /// 版本冲突错误码失败；为 `None` 时无条件覆盖。
    fn update(&self, request: &CommitRequest) -> Result<(), ProviderError>;

    /// 读取记录当前的并发令牌
    fn fetch_token(&self, id: &ItemId) -> Result<ConcurrencyToken, ProviderError>;

    /// 两阶段写入：先写入，再读取写入后的令牌
    fn write(&self, request: &CommitRequest) -> Result<ConcurrencyToken, ProviderError> {
        self.update(request)?;
        self.fetch_token(&request.item)
    }

    /// 只读取一个片段的内容及当前令牌
    fn read_fragment(
        &self,
        id: &ItemId,
        fragment: FragmentKind,
    ) -> Result<(String, ConcurrencyToken), ProviderError>;
}
