/// 同步模块
///
/// 乐观并发的提交协议：条件写入（或强制覆盖）后读取新的并发令牌，
/// 按后端错误码把失败归类为冲突、删除或传输错误。
///
/// - **protocol**: 单个条目的同步提交/刷新
/// - **controller**: 后台提交、按条目串行化与状态机
/// - **error**: 提交/刷新错误分类
pub mod error;
pub mod protocol;
pub mod controller;

pub use controller::{CommitController, CommitOutcome, CommitState};
pub use error::{CommitError, RefreshError};
