use serde::{Deserialize, Serialize};

use crate::item::EditableItem;
use crate::utils::contains_ignore_case;

/// 搜索请求：查询文本 + 是否搜索代码内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub search_content: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, search_content: bool) -> Self {
        Self {
            text: text.into(),
            search_content,
        }
    }

    /// 空查询表示不过滤
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn filter(&self) -> Option<SearchFilter> {
        SearchFilter::new(&self.text, self.search_content)
    }
}

/// 已编译的过滤条件（查询文本已转小写）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    needle: String,
    search_content: bool,
}

impl SearchFilter {
    /// 查询为空时返回 `None`
    pub fn new(query: &str, search_content: bool) -> Option<Self> {
        if query.is_empty() {
            return None;
        }
        Some(Self {
            needle: query.to_lowercase(),
            search_content,
        })
    }

    /// 名称包含查询，或（开启内容搜索时）任一片段内容包含查询
    pub fn matches(&self, item: &EditableItem) -> bool {
        if contains_ignore_case(item.name(), &self.needle) {
            return true;
        }
        self.search_content
            && item
                .fragments()
                .iter()
                .any(|f| contains_ignore_case(f.content(), &self.needle))
    }
}
