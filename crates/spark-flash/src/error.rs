//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 区分两类截然不同的失败：调用方误用（在请求作用域之外访问 Flash）与持久化状态损坏（Cookie 无法解析）；
//! - 前者必须显式暴露给调用方，后者只在内部记录日志并回退为空容器，绝不向业务代码传播。
//!
//! ## 设计要求（What）
//! - 对外错误统一为 [`FlashError`]，派生 `thiserror::Error`，可直接交给 `anyhow` 等上层框架；
//! - [`DecodeError`] 仅在 crate 内部使用，描述 Cookie 解码失败的原因，供 `debug!` 日志输出；
//! - “未找到值 / 没有旧输入 / 过滤器无命中” 均以 `Option` 或空集合表达，不属于错误。

use thiserror::Error;

/// spark-flash 对外暴露的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“集成方式错误”与“用户输入问题”彻底分开。只有真正的 API 误用才会返回错误，
///   因此调用方看到 [`FlashError`] 时即可判定是装配问题而非数据问题。
/// - **契约 (What)**：
///   - [`FlashError::OutsideScope`]：在未绑定 [`RequestFlash`](crate::scope::RequestFlash) 的执行流中调用了便捷 API；
///   - [`FlashError::FormBody`]：异步收集表单请求体失败，仅由 [`read_urlencoded`](crate::form::read_urlencoded) 返回。
/// - **风险 (Trade-offs)**：`FormBody` 只保留字符串化的底层错误，丢弃了原始错误类型，换取错误类型不携带泛型参数。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum FlashError {
    /// 当前执行流没有绑定请求级 Flash 存储。
    #[error("flash store accessed outside an active request scope")]
    OutsideScope,

    /// 读取表单请求体失败。
    #[error("failed to collect form body: {detail}")]
    FormBody { detail: String },
}

/// Cookie 中持久化的 Flash 状态无法还原。
///
/// - **意图 (Why)**：记录回退原因，便于排查客户端篡改或版本不兼容；
/// - **契约 (What)**：该错误永远不会越过 [`container::decode`](crate::container::decode) 的边界。
#[derive(Debug, Error)]
pub(crate) enum DecodeError {
    #[error("flash cookie is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("flash cookie violates schema: {detail}")]
    Schema { detail: String },
}
