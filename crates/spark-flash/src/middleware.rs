//! # FlashLayer：宿主框架的中间件契约
//!
//! ## 核心意图（Why）
//! - 把“构造存储 → 绑定作用域 → 运行处理器 → 自动续传 → 提交 Cookie”这一固定流程收敛到一个 `tower` 中间件，
//!   处理器只需调用 [`scope`](crate::scope) 中的便捷函数；
//!
//! ## 执行流程（How）
//! 1. 解析全部 `Cookie` 头构造 [`FlashStore`]，并把 Flash Cookie 从内层服务看到的 `Cookie` 头中剔除；
//!    只改写确实携带 Flash Cookie 的头，其余键值对逐字节保留，不做任何解码或重编码；
//! 2. 把 [`RequestFlash`] 放入请求扩展，并在 [`scope::run`] 中调用内层服务；
//! 3. 响应返回后，若开启 `auto_reflash` 且为 GET → 3xx，原样续传 current；
//! 4. 调用 `commit`，把 Cookie 增量逐条追加为 `Set-Cookie` 头。
//!
//! ## 风险提示（Trade-offs）
//! - 内层服务返回错误时仍会执行 `commit`，但没有响应可以携带 Cookie，错误原样向上传播；
//! - 响应 Future 在完成前被丢弃（请求取消）时，已排队的写入全部丢弃，不存在部分提交。

use std::{
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::future::BoxFuture;
use http::{HeaderValue, Method, Request, Response, header};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::{
    config::FlashConfig,
    scope::{self, RequestFlash},
    store::FlashStore,
};

/// 为内层服务装配 Flash 处理流程的 `tower::Layer`。
#[derive(Clone, Debug, Default)]
pub struct FlashLayer {
    config: Arc<FlashConfig>,
}

impl FlashLayer {
    pub fn new(config: FlashConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &FlashConfig {
        &self.config
    }
}

impl<S> Layer<S> for FlashLayer {
    type Service = FlashService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FlashService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// [`FlashLayer`] 产出的服务。
///
/// # 教案式说明
/// - **契约 (What)**：对任意 `http` 请求/响应体类型透明；每次调用创建独立的 [`FlashStore`]，
///   绝不在请求之间共享；
/// - **执行 (How)**：沿用 `tower` 常见的“克隆后替换”模式，让已经 `poll_ready` 的实例处理本次请求。
#[derive(Clone, Debug)]
pub struct FlashService<S> {
    inner: S,
    config: Arc<FlashConfig>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for FlashService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let store =
                FlashStore::from_cookie_headers((*config).clone(), req.headers().get_all(header::COOKIE));
            strip_flash_cookie(&mut req, &config.cookie_name);

            let flash = RequestFlash::new(store);
            req.extensions_mut().insert(flash.clone());
            let is_get = req.method() == Method::GET;

            let result = scope::run(flash.clone(), async move { inner.call(req).await }).await;

            match result {
                Ok(mut response) => {
                    let set_cookies = flash.with(|store| {
                        if config.auto_reflash && is_get && response.status().is_redirection() {
                            debug!(status = %response.status(), "auto-reflashing across redirect");
                            store.reflash_all();
                        }
                        store.commit();
                        store
                            .cookie_delta()
                            .map(|cookie| cookie.encoded().to_string())
                            .collect::<Vec<_>>()
                    });
                    for value in set_cookies {
                        match HeaderValue::try_from(value) {
                            Ok(value) => {
                                response.headers_mut().append(header::SET_COOKIE, value);
                            }
                            Err(err) => warn!(error = %err, "dropping unencodable set-cookie value"),
                        }
                    }
                    Ok(response)
                }
                Err(err) => {
                    let committed = flash.with(FlashStore::commit);
                    warn!(committed, "inner service failed; flash cookie cannot be attached to a response");
                    Err(err)
                }
            }
        })
    }
}

fn strip_flash_cookie<B>(req: &mut Request<B>, cookie_name: &str) {
    let headers = req.headers_mut();
    let mut changed = false;
    let mut kept = Vec::new();
    for value in headers.get_all(header::COOKIE) {
        match remove_cookie_pair(value, cookie_name) {
            Some(rest) => {
                changed = true;
                kept.extend(rest);
            }
            None => kept.push(value.clone()),
        }
    }
    if !changed {
        return;
    }
    headers.remove(header::COOKIE);
    for value in kept {
        headers.append(header::COOKIE, value);
    }
}

/// 从单个 `Cookie` 头中剔除名为 `name` 的键值对，其余片段按原始字节保留。
///
/// - **契约 (What)**：返回 `None` 表示该头不含目标 Cookie，调用方应原样保留；
///   `Some(None)` 表示剔除后没有剩余片段，整个头应被移除。
fn remove_cookie_pair(value: &HeaderValue, name: &str) -> Option<Option<HeaderValue>> {
    let mut removed = false;
    let mut rest: Vec<&[u8]> = Vec::new();
    for pair in value.as_bytes().split(|byte| *byte == b';') {
        let pair = pair.trim_ascii();
        if pair.is_empty() {
            continue;
        }
        let pair_name = pair
            .split(|byte| *byte == b'=')
            .next()
            .unwrap_or_default()
            .trim_ascii();
        if pair_name == name.as_bytes() {
            removed = true;
        } else {
            rest.push(pair);
        }
    }
    if !removed {
        return None;
    }
    if rest.is_empty() {
        return Some(None);
    }
    match HeaderValue::from_bytes(&rest.join(&b"; "[..])) {
        Ok(value) => Some(Some(value)),
        Err(err) => {
            // 片段取自合法头值，只有拼接后才可能出错；此时保留原头。
            warn!(error = %err, "keeping cookie header that cannot be re-assembled");
            Some(Some(value.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(raw: &[u8]) -> Option<Option<Vec<u8>>> {
        let value = HeaderValue::from_bytes(raw).expect("测试头值应合法");
        remove_cookie_pair(&value, "flash").map(|rest| rest.map(|value| value.as_bytes().to_vec()))
    }

    #[test]
    fn header_without_flash_cookie_is_left_alone() {
        assert_eq!(strip(b"sid=YWJj=="), None);
        assert_eq!(strip(b"flashy=1; xflash=2"), None);
    }

    #[test]
    fn only_flash_pair_is_removed() {
        assert_eq!(
            strip(b"sid=YWJj+ZGVm/Zw==; flash=%7B%7D;pref={\"a\":1}; tok=100%"),
            Some(Some(b"sid=YWJj+ZGVm/Zw==; pref={\"a\":1}; tok=100%".to_vec()))
        );
        assert_eq!(strip(b"flash=%7B%7D"), Some(None));
        assert_eq!(strip(b" flash = x ; x=\xff"), Some(Some(b"x=\xff".to_vec())));
    }
}
