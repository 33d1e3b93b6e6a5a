//! # FlashContainer：Cookie 中的序列化单元
//!
//! ## 核心意图（Why）
//! - 一个容器即一次往返所携带的全部 Flash 状态：有序的键值条目加上有效性标记；
//! - `valid = false` 表示“不是真实的 Flash 状态”（Cookie 缺失、损坏或违反结构约束），读取时一律视为空。
//!
//! ## 行为契约（What）
//! - [`decode`] 永不失败：任何解析或校验错误都以 `debug!` 记录并回退为 [`FlashContainer::invalid`]；
//! - [`encode`] 产出紧凑 JSON，条目顺序即插入顺序。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{error::DecodeError, key_path::KeyPath};

/// 单个 Flash 条目。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlashValue {
    pub key: KeyPath,
    pub value: Value,
}

impl FlashValue {
    pub fn new(key: KeyPath, value: Value) -> Self {
        Self { key, value }
    }
}

/// Flash 状态容器。
///
/// # 教案式说明
/// - **意图 (Why)**：同一类型既承载“本次请求可读”的 current，也承载“下一次请求可读”的 next；
/// - **契约 (What)**：
///   - `values` 保持插入顺序，序列化前后不变；
///   - `valid` 为 `false` 时 `values` 恒为空（解码阶段强制清空），保证无效容器不会泄露残留条目；
/// - **风险 (Trade-offs)**：`value` 使用 `serde_json::Value`，对 Flash 值的形态不做约束，
///   体积控制交由调用方。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlashContainer {
    pub values: Vec<FlashValue>,
    pub valid: bool,
}

impl FlashContainer {
    /// 空且无效的容器：无 Cookie、Cookie 损坏以及 next 的初始状态。
    pub fn invalid() -> Self {
        Self::default()
    }

    /// 读取视图：无效容器对外表现为空。
    pub fn readable(&self) -> &[FlashValue] {
        if self.valid { self.values.as_slice() } else { &[] }
    }

    pub fn is_empty(&self) -> bool {
        self.readable().is_empty()
    }

    fn validate(self) -> Result<Self, DecodeError> {
        if let Some(index) = self.values.iter().position(|entry| entry.key.is_empty()) {
            return Err(DecodeError::Schema {
                detail: format!("entry #{index} has an empty key path"),
            });
        }
        Ok(self)
    }
}

fn try_decode(raw: &str) -> Result<FlashContainer, DecodeError> {
    let container: FlashContainer = serde_json::from_str(raw)?;
    container.validate()
}

/// 由 Cookie 值还原容器，任何失败都回退为无效容器。
pub fn decode(raw: &str) -> FlashContainer {
    match try_decode(raw) {
        Ok(container) if container.valid => container,
        Ok(_) => FlashContainer::invalid(),
        Err(err) => {
            debug!(error = %err, "discarding malformed flash cookie");
            FlashContainer::invalid()
        }
    }
}

/// 将容器编码为 Cookie 值（未做百分号编码，由 Cookie 层负责）。
pub fn encode(container: &FlashContainer) -> String {
    // 容器只含字符串键与 `Value`，序列化不会失败；保底返回无效容器的编码。
    serde_json::to_string(container)
        .unwrap_or_else(|_| String::from(r#"{"values":[],"valid":false}"#))
}
