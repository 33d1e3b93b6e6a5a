//! # 请求作用域：把 FlashStore 绑定到请求的逻辑调用链
//!
//! ## 核心意图（Why）
//! - 处理器深处的代码需要读写 Flash，但不应为此在每个函数签名里层层传递存储；
//! - 多个请求在同一线程上交错执行（每个 `.await` 都是潜在的切换点），绑定必须跟随逻辑调用链而非物理线程，
//!   否则交错的请求会互相看到对方的存储。
//!
//! ## 实现策略（How）
//! - 采用 `tokio::task_local!`：[`run`] 在 Future 每次被 poll 时把绑定换入、poll 结束时换出，
//!   因此绑定穿越任意多次挂起/恢复依然只对本 Future 可见；
//! - [`RequestFlash`] 同时以请求扩展（`http::Extensions`）的形式下发，偏好显式上下文对象的代码可以直接提取。
//!
//! ## 契约（What）
//! - 绑定之外调用任意便捷函数都返回 [`FlashError::OutsideScope`]；
//! - `tokio::spawn` 出的新任务不会继承绑定，需要时请在新任务内再次调用 [`run`]。

use std::{fmt::Display, future::Future, sync::Arc};

use http::Request;
use http_body::Body;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::{
    container::FlashContainer,
    error::FlashError,
    form::{self, FormData},
    key_path::{Filter, KeyPath},
    store::{FlashStore, ReflashOptions},
};

tokio::task_local! {
    static ACTIVE_FLASH: RequestFlash;
}

/// 单请求 Flash 存储的共享句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：中间件与处理器需要访问同一个 [`FlashStore`]：前者负责构造与提交，后者负责读写；
/// - **契约 (What)**：
///   - 克隆句柄只增加引用计数，所有克隆指向同一存储；
///   - 互斥锁仅在同步代码段内持有，[`with`](Self::with) 的闭包无法跨越 `.await`；
/// - **风险 (Trade-offs)**：每个句柄只属于一个请求，锁不会出现跨请求竞争；使用 `parking_lot::Mutex`
///   只是为了让句柄满足 `Send + Sync`，从而可以放进请求扩展并在多线程运行时上调度。
#[derive(Clone, Debug)]
pub struct RequestFlash {
    inner: Arc<Mutex<FlashStore>>,
}

impl RequestFlash {
    pub fn new(store: FlashStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// 在持锁状态下访问存储。
    pub fn with<R>(&self, f: impl FnOnce(&mut FlashStore) -> R) -> R {
        f(&mut *self.inner.lock())
    }
}

/// 在 `handle` 绑定的作用域内驱动 `future`。
pub async fn run<F: Future>(handle: RequestFlash, future: F) -> F::Output {
    ACTIVE_FLASH.scope(handle, future).await
}

/// 当前作用域绑定的句柄。
pub fn current() -> Result<RequestFlash, FlashError> {
    ACTIVE_FLASH
        .try_with(RequestFlash::clone)
        .map_err(|_| FlashError::OutsideScope)
}

/// 当前作用域绑定的句柄；未绑定时返回 `None`。
pub fn try_current() -> Option<RequestFlash> {
    current().ok()
}

fn with_current<R>(f: impl FnOnce(&mut FlashStore) -> R) -> Result<R, FlashError> {
    Ok(current()?.with(f))
}

/// 见 [`FlashStore::flash`]。
pub fn flash(key: impl Into<KeyPath>, value: impl Serialize) -> Result<(), FlashError> {
    with_current(|store| store.flash(key, value))
}

/// 见 [`FlashStore::flash_inputs`]。
pub fn flash_inputs(form: &FormData) -> Result<(), FlashError> {
    with_current(|store| store.flash_inputs(form))
}

/// 读取请求体中的表单并快照到 `["inputs"]`，返回解析结果供处理器继续使用。
///
/// - **契约 (What)**：先确认作用域已绑定再消费请求体；支持的表单类型见 [`form::read_form`]，
///   文件片段保留在返回值中，但不会进入快照；
/// - 读取请求体期间不持有存储锁。
pub async fn capture_inputs<B>(req: Request<B>) -> Result<FormData, FlashError>
where
    B: Body,
    B::Error: Display,
{
    let handle = current()?;
    let (parts, body) = req.into_parts();
    let form = form::read_form(&parts.headers, body).await?;
    handle.with(|store| store.flash_inputs(&form));
    Ok(form)
}

/// 见 [`FlashStore::contents`]。
pub fn contents() -> Result<FlashContainer, FlashError> {
    with_current(|store| store.contents())
}

/// 见 [`FlashStore::get`]。
pub fn get(filter: impl Into<Filter>) -> Result<Vec<Value>, FlashError> {
    with_current(|store| store.get(filter))
}

/// 见 [`FlashStore::get_inputs`]。
pub fn get_inputs() -> Result<Option<FormData>, FlashError> {
    with_current(|store| store.get_inputs())
}

/// 见 [`FlashStore::reflash`]。
pub fn reflash(options: ReflashOptions) -> Result<(), FlashError> {
    with_current(|store| store.reflash(options))
}

/// 见 [`FlashStore::old`]。
pub fn old(name: &str) -> Result<Option<String>, FlashError> {
    with_current(|store| store.old(name))
}

/// 见 [`FlashStore::old_all`]。
pub fn old_all(name: &str) -> Result<Option<Vec<String>>, FlashError> {
    with_current(|store| store.old_all(name))
}

/// 见 [`FlashStore::old_checked`]。
pub fn old_checked(name: &str) -> Result<Option<bool>, FlashError> {
    with_current(|store| store.old_checked(name))
}

/// 见 [`FlashStore::old_selected`]。
pub fn old_selected(name: &str, value: &str) -> Result<Option<bool>, FlashError> {
    with_current(|store| store.old_selected(name, value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::FlashConfig;

    #[test]
    fn access_outside_scope_is_rejected() {
        assert_eq!(current().err(), Some(FlashError::OutsideScope));
        assert_eq!(flash("a", 1), Err(FlashError::OutsideScope));
        assert_eq!(old("name"), Err(FlashError::OutsideScope));
        assert!(try_current().is_none());
    }

    #[tokio::test]
    async fn capture_outside_scope_leaves_body_unread() {
        let req = Request::builder()
            .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(String::from("name=Alice"))
            .expect("请求应可构造");
        assert_eq!(capture_inputs(req).await, Err(FlashError::OutsideScope));
    }

    #[tokio::test]
    async fn binding_survives_suspension_points() {
        let handle = RequestFlash::new(FlashStore::empty(FlashConfig::default()));
        run(handle.clone(), async {
            flash("before", 1).expect("作用域内应可写入");
            tokio::task::yield_now().await;
            flash("after", 2).expect("挂起恢复后绑定仍然有效");
        })
        .await;

        let next = handle.with(|store| store.next().clone());
        assert_eq!(next.values.len(), 2);
        assert_eq!(next.values[1].value, json!(2));
        assert!(current().is_err(), "作用域结束后绑定应被解除");
    }
}
