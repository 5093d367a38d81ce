use std::collections::BTreeSet;

use crate::utils::plural;

/// 待提交摘要
///
/// 显示层的状态栏文本，例如 "2 items with pending changes on 1 site"。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PendingSummary {
    /// 有未提交修改的条目数
    pub items: usize,
    /// 涉及的不同站点数
    pub sites: usize,
}

impl PendingSummary {
    /// 由待提交条目所在的站点 id 计算摘要（每个条目一项）
    pub fn from_sites<'a>(sites: impl Iterator<Item = &'a str>) -> Self {
        let mut items = 0;
        let mut distinct = BTreeSet::new();
        for site in sites {
            items += 1;
            distinct.insert(site);
        }
        Self {
            items,
            sites: distinct.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }
}

impl std::fmt::Display for PendingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("No pending changes");
        }
        write!(
            f,
            "{} item{} with pending changes on {} site{}",
            self.items,
            plural(self.items),
            self.sites,
            plural(self.sites)
        )
    }
}
