/// 后台任务派发
///
/// 后端 IO 与搜索过滤都在后台执行；优先使用当前 tokio 运行时，
/// 不在运行时内调用时退回到共享的多线程运行时。

use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

/// 后台任务类别（用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskClass {
    /// 提交、刷新等后端调用
    Io,
    /// 搜索过滤与索引重建
    Search,
}

impl TaskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClass::Io => "io",
            TaskClass::Search => "search",
        }
    }
}

fn runtime_handle() -> tokio::runtime::Handle {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return handle;
    }

    static SHARED_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    let runtime = SHARED_RT.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .thread_name("portal-worker")
            .build()
            .expect("failed to build portal worker runtime")
    });
    runtime.handle().clone()
}

/// 派发异步任务
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tracing::trace!(worker_class = class.as_str(), "worker.spawn");
    runtime_handle().spawn(fut)
}

/// 派发阻塞任务
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tracing::trace!(worker_class = class.as_str(), "worker.spawn_blocking");
    runtime_handle().spawn_blocking(f)
}
