/// 层级索引
///
/// 把扁平的条目集合分组为 站点 → 记录类型 → 条目 → 片段 的树。
/// 每次都从完整集合整体重建，从不增量修补。

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::fragment::FragmentKind;
use crate::item::{EditableItem, ItemId, ItemKind, SiteRef};
use crate::search::SearchFilter;

/// 层级索引（只读投影）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HierarchyIndex {
    pub sites: Vec<SiteNode>,
}

/// 站点节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteNode {
    pub site: SiteRef,
    pub groups: Vec<KindGroup>,
}

/// 类型分组节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindGroup {
    pub kind: ItemKind,
    pub label: &'static str,
    pub items: Vec<ItemNode>,
}

/// 条目节点
///
/// 单片段条目直接代表该片段（`fragment` 为 `Some`，无子节点）；
/// 多片段条目每个片段一个子节点。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemNode {
    pub item: ItemId,
    pub label: String,
    pub fragment: Option<FragmentKind>,
    pub children: Vec<FragmentNode>,
}

/// 片段节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentNode {
    pub item: ItemId,
    pub fragment: FragmentKind,
    pub label: &'static str,
}

impl HierarchyIndex {
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// 遍历全部条目节点（按显示顺序）
    pub fn items(&self) -> impl Iterator<Item = &ItemNode> {
        self.sites
            .iter()
            .flat_map(|s| s.groups.iter())
            .flat_map(|g| g.items.iter())
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items().any(|node| &node.item == id)
    }

    /// 条目所在路径：(站点 id, 类型)
    pub fn path_of(&self, id: &ItemId) -> Option<(&str, ItemKind)> {
        self.sites.iter().find_map(|site| {
            site.groups.iter().find_map(|group| {
                group
                    .items
                    .iter()
                    .any(|node| &node.item == id)
                    .then_some((site.site.id.as_str(), group.kind))
            })
        })
    }
}

impl ItemNode {
    fn from_item(item: &EditableItem) -> Self {
        let fragments = item.fragments();
        if let [single] = fragments {
            return Self {
                item: item.id().clone(),
                label: item.name().to_string(),
                fragment: Some(single.kind()),
                children: Vec::new(),
            };
        }

        Self {
            item: item.id().clone(),
            label: item.name().to_string(),
            fragment: None,
            children: fragments
                .iter()
                .map(|f| FragmentNode {
                    item: item.id().clone(),
                    fragment: f.kind(),
                    label: f.kind().label(),
                })
                .collect(),
        }
    }
}

/// 构建层级索引（纯函数）
///
/// 单趟按 (站点 id, 类型) 分组；站点与分组按首次出现的顺序排列，
/// 组内保持输入顺序。提供过滤器时，未匹配的条目被排除，空分组不会出现。
pub fn build_index(items: &[EditableItem], filter: Option<&SearchFilter>) -> HierarchyIndex {
    let matched: Vec<&EditableItem> = match filter {
        Some(filter) => items.iter().filter(|item| filter.matches(item)).collect(),
        None => items.iter().collect(),
    };
    group(&matched)
}

/// 可取消的构建
///
/// 匹配阶段按 `chunk_size` 分批并行执行，批与批之间检查取消标记；
/// 被取消时返回 `None`，不产生任何部分结果。
pub fn build_index_cancellable(
    items: &[EditableItem],
    filter: Option<&SearchFilter>,
    cancel: &CancellationToken,
    chunk_size: usize,
) -> Option<HierarchyIndex> {
    use rayon::prelude::*;

    let chunk_size = chunk_size.max(1);
    let mut matched: Vec<&EditableItem> = Vec::with_capacity(items.len());

    for chunk in items.chunks(chunk_size) {
        if cancel.is_cancelled() {
            return None;
        }
        match filter {
            Some(filter) => {
                let hits: Vec<&EditableItem> = chunk
                    .par_iter()
                    .filter(|item| filter.matches(item))
                    .collect();
                matched.extend(hits);
            }
            None => matched.extend(chunk.iter()),
        }
    }

    if cancel.is_cancelled() {
        return None;
    }
    Some(group(&matched))
}

fn group(items: &[&EditableItem]) -> HierarchyIndex {
    let mut sites: Vec<SiteNode> = Vec::new();

    for item in items {
        let site_pos = match sites.iter().position(|s| s.site.id == item.site().id) {
            Some(pos) => pos,
            None => {
                sites.push(SiteNode {
                    site: item.site().clone(),
                    groups: Vec::new(),
                });
                sites.len() - 1
            }
        };
        let site = &mut sites[site_pos];

        let group_pos = match site.groups.iter().position(|g| g.kind == item.kind()) {
            Some(pos) => pos,
            None => {
                site.groups.push(KindGroup {
                    kind: item.kind(),
                    label: item.kind().group_label(),
                    items: Vec::new(),
                });
                site.groups.len() - 1
            }
        };

        site.groups[group_pos].items.push(ItemNode::from_item(item));
    }

    HierarchyIndex { sites }
}

impl std::fmt::Display for HierarchyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for site in &self.sites {
            writeln!(f, "{}", site.site.name)?;
            for group in &site.groups {
                writeln!(f, "  {}", group.label)?;
                for node in &group.items {
                    writeln!(f, "    {} [{}]", node.label, node.item)?;
                    for child in &node.children {
                        writeln!(f, "      {}", child.label)?;
                    }
                }
            }
        }
        Ok(())
    }
}
