/// 编辑器层模块
///
/// 该模块提供有状态的编辑接口：片段编辑、变更通知、批量提交与刷新。
/// 遵循"修改-提交分离"原则，所有修改仅在内存中进行，需要显式提交。
///
/// # 架构设计
///
/// - **tracker**: 变更追踪，按 片段 → 条目 → 全局 的顺序同步通知订阅者
/// - **summary**: 待提交摘要（状态栏文本）
/// - **workspace**: 工作集协调器，串联加载、编辑、提交、刷新与搜索
///
/// # 使用示例
///
/// ```rust,ignore
/// use portal_code_editor::{EditorConfig, ProviderSet, Workspace};
///
/// let mut workspace = Workspace::load(providers, EditorConfig::default())?;
/// workspace.edit(&id, FragmentKind::Style, "body { margin: 0; }")?;
/// println!("{}", workspace.pending_summary());
///
/// let outcomes = workspace.commit_all(false).await;
/// ```
pub mod tracker;
pub mod summary;
pub mod workspace;

// === 导出公共接口 ===
pub use summary::PendingSummary;
pub use tracker::{
    ChangeCause, ChangeTracker, FragmentStateChanged, ItemStateChanged, SubscriptionId,
};
pub use workspace::Workspace;
