/// 提供者模块
///
/// 核心只通过 `ItemProvider` 接口访问后端，每种记录类型一个提供者。
/// 遵循依赖倒置原则，后端结构与协议细节全部留在提供者内部。
///
/// # 架构设计
///
/// - **traits**: 提供者接口、错误码分类与能力协商标志
/// - **set**: 按记录类型注册提供者
/// - **store**: 内置的 JSON 快照后端（命令行与测试使用）
///
/// # 使用示例
///
/// ```rust,ignore
/// use portal_code_editor::provider::{PortalStore, ProviderSet};
///
/// let store = Arc::new(PortalStore::open(Path::new("portal.json"), &config.store)?);
/// let providers = ProviderSet::for_store(store);
/// ```
pub mod traits;
pub mod set;
pub mod store;

// === 导出 trait 定义 ===
pub use traits::{
    Capabilities, FaultClass, ItemProvider, ProviderError, FAULT_CONCURRENCY_VERSION_MISMATCH,
    FAULT_OBJECT_DOES_NOT_EXIST, FAULT_QUERY_ATTRIBUTE_MISSING,
};

// === 导出默认实现 ===
pub use set::ProviderSet;
pub use store::{PortalSnapshot, PortalStore, StoreOp, StoreProvider, StoredRecord};
