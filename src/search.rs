/// 搜索模块
///
/// 按名称（可选按代码内容）过滤层级索引。每次输入都会启动新的后台过滤，
/// 之前未完成的过滤先被取消；过期结果通过代数计数丢弃。
///
/// - **filter**: 查询与匹配规则
/// - **engine**: 防抖、取消与结果投递
pub mod filter;
pub mod engine;

pub use filter::{SearchFilter, SearchQuery};
pub use engine::{SearchCompletion, SearchEngine, SearchView};
