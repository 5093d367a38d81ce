/// 条目加载器
///
/// 从全部提供者批量读取条目，保持提供者给出的顺序，
/// 并在旧版后端上协商可选能力。

use crate::item::EditableItem;
use crate::provider::{Capabilities, FaultClass, ItemProvider, ProviderSet};
use crate::utils::PortalError;

/// 批量加载条目
///
/// 按注册顺序依次调用提供者，每个提供者的结果顺序原样保留。
///
/// # 错误
/// - 提供者失败时返回 `PortalError::Provider`，整个加载失败
/// - 记录数据不合法时返回 `InvariantViolation`，不会静默跳过
pub fn load_items(providers: &ProviderSet) -> Result<Vec<EditableItem>, PortalError> {
    let mut items = Vec::new();

    for provider in providers.iter() {
        let loaded = load_from(provider.as_ref())?;
        tracing::info!(kind = %provider.kind(), count = loaded.len(), "items loaded");
        items.extend(loaded);
    }

    Ok(items)
}

/// 从单个提供者加载
///
/// 先使用提供者声明的能力查询；后端以结构不匹配拒绝时，
/// 降级为基础列集合再查询一次。
pub fn load_from(provider: &dyn ItemProvider) -> Result<Vec<EditableItem>, PortalError> {
    let kind = provider.kind();
    let requested = provider.capabilities();

    let records = match provider.fetch_all(requested) {
        Ok(records) => records,
        Err(e) if e.classify() == FaultClass::SchemaMismatch && !requested.is_empty() => {
            tracing::warn!(
                %kind,
                error = %e,
                "backend rejected optional columns, falling back to baseline schema"
            );
            provider
                .fetch_all(Capabilities::empty())
                .map_err(|source| PortalError::Provider {
                    kind,
                    operation: "fetch",
                    source,
                })?
        }
        Err(source) => {
            return Err(PortalError::Provider {
                kind,
                operation: "fetch",
                source,
            })
        }
    };

    records
        .into_iter()
        .map(|record| {
            if record.kind != kind {
                return Err(PortalError::InvariantViolation {
                    operation: "load",
                    detail: format!(
                        "provider for {} returned {} record {}",
                        kind, record.kind, record.id
                    ),
                });
            }
            EditableItem::from_record(record)
        })
        .collect()
}
