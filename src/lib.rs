pub mod fragment;
pub mod item;
pub mod utils;
pub mod config;
pub mod provider;
pub mod loader;
pub mod index;
pub mod search;
pub mod sync;
pub mod editor;
pub mod worker;

// 重新导出主要结构
pub use config::{EditorConfig, SearchConfig, StoreConfig};
pub use editor::{
    ChangeCause, FragmentStateChanged, ItemStateChanged, PendingSummary, SubscriptionId, Workspace,
};
pub use fragment::{CodeFragment, DirtyState, FragmentKind, StateChange};
pub use index::{build_index, HierarchyIndex};
pub use item::{
    CommitReport, CommitRequest, ConcurrencyToken, EditableItem, ItemId, ItemKind, ItemRecord,
    PageInfo, SiteRef,
};
pub use loader::load_items;
pub use provider::{ItemProvider, PortalStore, ProviderError, ProviderSet};
pub use search::{SearchFilter, SearchQuery, SearchView};
pub use sync::{CommitError, CommitOutcome, CommitState, RefreshError};
pub use utils::PortalError;

// 常量定义
pub const SNAPSHOT_EXTENSIONS: &[&str] = &["json"];
