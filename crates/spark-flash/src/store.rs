//! # FlashStore：单请求的读写双容器
//!
//! ## 核心意图（Why）
//! - 每个请求拥有一个 `FlashStore`：`current` 是上一轮写下、本轮只读的状态；`next` 是本轮累积、
//!   下一轮才可读的预写状态；
//! - 所有读取都只触达 `current`，所有写入都只触达 `next`，因此同一请求内“先写后读”读到的是上一轮的值，
//!   而不会读到自己刚写入的值。
//!
//! ## 生命周期（How）
//! 1. 构造时从请求 Cookie 解码 `current`，并立即把该 Cookie 从请求视图中移除、在响应增量中排入删除；
//! 2. 处理器通过 [`flash`](FlashStore::flash)、[`flash_inputs`](FlashStore::flash_inputs)、
//!    [`reflash`](FlashStore::reflash) 累积 `next`；
//! 3. 请求结束时 [`commit`](FlashStore::commit)：仅当 `next.valid` 为真才写出新 Cookie；
//!    否则响应中只剩删除旧 Cookie 的指令。
//!
//! ## 风险提示（Trade-offs）
//! - 未调用 `commit` 会丢失 `next`，这是可接受的失败模式：请求被取消时不存在部分提交；
//! - 存储本身不做跨请求同步，跨请求共享同一实例属于误用。

use cookie::{Cookie, CookieJar};
use http::HeaderValue;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{
    config::FlashConfig,
    container::{self, FlashContainer, FlashValue},
    form::{self, FormData, SerializedForm},
    key_path::{self, EXT_NAMESPACE, Filter, INPUTS_NAMESPACE, KeyPath},
};

/// [`FlashStore::reflash`] 的参数。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `append`（默认 `true`）：与已排队的 `next.values` 合并；为 `false` 时替换之；
///   - `pick`：仅保留命中的键，空过滤器表示不限制；
///   - `omit`：剔除命中的键，空过滤器表示不剔除；
///   - 先 pick 后 omit：条目需“通过 pick（若有）且不命中 omit（若有）”才会被续传。
/// - pick/omit 的路径都是用户键，匹配前会自动加上 `ext` 命名空间。
#[derive(Clone, Debug)]
pub struct ReflashOptions {
    pub append: bool,
    pub pick: Option<Filter>,
    pub omit: Option<Filter>,
}

impl Default for ReflashOptions {
    fn default() -> Self {
        Self {
            append: true,
            pick: None,
            omit: None,
        }
    }
}

impl ReflashOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn pick(mut self, filter: impl Into<Filter>) -> Self {
        self.pick = Some(filter.into());
        self
    }

    pub fn omit(mut self, filter: impl Into<Filter>) -> Self {
        self.omit = Some(filter.into());
        self
    }
}

/// 单请求 Flash 存储。
///
/// # 教案式说明
/// - **意图 (Why)**：以 Cookie 而非服务端会话承载一次往返的 Flash 消息与表单回填数据；
/// - **契约 (What)**：
///   - `current` 在构造后不再改变；
///   - `next` 初始为 `{ valid: false, values: [] }`，任意写操作会把它标记为有效；
///   - `jar` 持有请求 Cookie 的原始集合与本次响应的增量（删除旧值 / 写入新值）；
///   - `commit` 至多写出一次。
/// - **风险 (Trade-offs)**：Cookie 体积受浏览器限制（通常 4KB），存储不做截断或分片。
#[derive(Debug)]
pub struct FlashStore {
    config: FlashConfig,
    current: FlashContainer,
    next: FlashContainer,
    jar: CookieJar,
    committed: bool,
}

impl FlashStore {
    /// 以已有的 CookieJar（其 original 集合即请求 Cookie）构造存储。
    ///
    /// - **后置条件**：若 jar 中存在 Flash Cookie，它会从请求视图中移除，并在增量中排入删除指令。
    pub fn from_jar(config: FlashConfig, mut jar: CookieJar) -> Self {
        let raw = jar
            .get(&config.cookie_name)
            .map(|cookie| cookie.value().to_owned());
        let current = match raw {
            Some(raw) => {
                let current = container::decode(&raw);
                trace!(
                    cookie = %config.cookie_name,
                    entries = current.values.len(),
                    valid = current.valid,
                    "loaded flash cookie"
                );
                jar.remove(config.removal_cookie());
                current
            }
            None => FlashContainer::invalid(),
        };
        Self {
            config,
            current,
            next: FlashContainer::invalid(),
            jar,
            committed: false,
        }
    }

    /// 由请求中的全部 `Cookie` 头构造存储。
    ///
    /// - **契约 (What)**：逐个键值对解析，非 UTF-8 或无法解析的片段只影响自身，不会连带丢弃同一头中的其他 Cookie。
    pub fn from_cookie_headers<'a, I>(config: FlashConfig, headers: I) -> Self
    where
        I: IntoIterator<Item = &'a HeaderValue>,
    {
        let mut jar = CookieJar::new();
        for header in headers {
            for pair in header.as_bytes().split(|byte| *byte == b';') {
                let Ok(pair) = std::str::from_utf8(pair.trim_ascii()) else {
                    debug!("skipping non-utf8 cookie pair");
                    continue;
                };
                if pair.is_empty() {
                    continue;
                }
                match Cookie::parse_encoded(pair.to_owned()) {
                    Ok(cookie) => jar.add_original(cookie),
                    Err(err) => debug!(error = %err, "skipping unparsable cookie pair"),
                }
            }
        }
        Self::from_jar(config, jar)
    }

    /// 没有任何请求 Cookie 的存储。
    pub fn empty(config: FlashConfig) -> Self {
        Self::from_jar(config, CookieJar::new())
    }

    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// 本请求可读的状态。
    pub fn current(&self) -> &FlashContainer {
        &self.current
    }

    /// 已排队、将写入下一请求的状态。
    pub fn next(&self) -> &FlashContainer {
        &self.next
    }

    pub fn committed(&self) -> bool {
        self.committed
    }

    /// 在 `ext` 命名空间下追加一个 Flash 条目，并标记 `next` 有效。
    ///
    /// - **契约 (What)**：不触及 `current`；值序列化失败时降级为 `null`（记录 `warn!`），不返回错误；
    ///   空键路径无法被任何过滤器寻址，直接忽略并记录 `warn!`。
    pub fn flash(&mut self, key: impl Into<KeyPath>, value: impl Serialize) {
        let key = key.into();
        if key.is_empty() {
            warn!("ignoring flash with an empty key path");
            return;
        }
        let value = serde_json::to_value(value).unwrap_or_else(|err| {
            warn!(error = %err, key = ?key.segments(), "flash value is not JSON-representable; storing null");
            Value::Null
        });
        self.push_next(FlashValue::new(key.prefixed(EXT_NAMESPACE), value));
    }

    /// 将表单文本字段快照到 `["inputs"]` 条目。
    ///
    /// - **契约 (What)**：文件上传被丢弃；重复调用会追加第二个 `inputs` 条目，读取方只认第一个。
    pub fn flash_inputs(&mut self, form: &FormData) {
        let snapshot = form::serialize(form);
        let value = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
        self.push_next(FlashValue::new(KeyPath::from(INPUTS_NAMESPACE), value));
    }

    fn push_next(&mut self, entry: FlashValue) {
        self.next.values.push(entry);
        self.next.valid = true;
    }

    /// 读取上一请求快照的表单；没有先前提交时返回 `None`。
    pub fn get_inputs(&self) -> Option<FormData> {
        let entry = self
            .current
            .readable()
            .iter()
            .find(|entry| entry.key.is_exactly(&[INPUTS_NAMESPACE]))?;
        match serde_json::from_value::<SerializedForm>(entry.value.clone()) {
            Ok(snapshot) => Some(form::deserialize(&snapshot)),
            Err(err) => {
                debug!(error = %err, "ignoring malformed inputs snapshot");
                None
            }
        }
    }

    /// 完整的 current 容器（诊断与列举用途）。
    pub fn contents(&self) -> FlashContainer {
        self.current.clone()
    }

    /// 返回用户键命中 `filter` 前缀的全部值，保持原有顺序；无命中时为空。
    pub fn get(&self, filter: impl Into<Filter>) -> Vec<Value> {
        let filters = key_path::namespaced(filter.into().normalize(), EXT_NAMESPACE);
        self.current
            .readable()
            .iter()
            .filter(|entry| key_path::matches(&entry.key, &filters))
            .map(|entry| entry.value.clone())
            .collect()
    }

    /// 第一个命中的值。
    pub fn get_first(&self, filter: impl Into<Filter>) -> Option<Value> {
        self.get(filter).into_iter().next()
    }

    /// 把 current 中经 pick/omit 过滤后的条目续传到 next。
    ///
    /// # 教案式说明
    /// - **契约 (What)**：
    ///   - `append = true`：追加到已排队条目之后，`next.valid |= current.valid`；
    ///   - `append = false`：`next` 被替换为 `{ values: 幸存条目, valid: current.valid }`；
    ///   - 未给出 pick 时，`inputs` 快照也会被续传；给出 pick 时只可能命中 `ext` 下的用户键。
    /// - **执行 (How)**：先归一化并加命名空间，再逐条判定，幸存者保持 current 中的相对顺序。
    pub fn reflash(&mut self, options: ReflashOptions) {
        let pick = key_path::namespaced(
            key_path::normalize_filters(options.pick.as_ref()),
            EXT_NAMESPACE,
        );
        let omit = key_path::namespaced(
            key_path::normalize_filters(options.omit.as_ref()),
            EXT_NAMESPACE,
        );
        let survivors = self.current.readable().iter().filter(|entry| {
            (pick.is_empty() || key_path::matches(&entry.key, &pick))
                && (omit.is_empty() || !key_path::matches(&entry.key, &omit))
        });

        if options.append {
            self.next.values.extend(survivors.cloned());
            self.next.valid |= self.current.valid;
        } else {
            self.next = FlashContainer {
                values: survivors.cloned().collect(),
                valid: self.current.valid,
            };
        }
    }

    /// 原样续传整个 current，供自动续传策略使用。
    pub fn reflash_all(&mut self) {
        self.reflash(ReflashOptions::default());
    }

    /// 上一次提交中 `name` 的第一个文本值。
    pub fn old(&self, name: &str) -> Option<String> {
        self.get_inputs()?.get(name).map(str::to_owned)
    }

    /// 上一次提交中 `name` 的全部文本值；没有先前提交时返回 `None`。
    pub fn old_all(&self, name: &str) -> Option<Vec<String>> {
        let inputs = self.get_inputs()?;
        Some(inputs.get_all(name).into_iter().map(str::to_owned).collect())
    }

    /// 复选框是否在上一次提交中被勾选。
    ///
    /// - **契约 (What)**：`None` 表示没有可比较的先前提交，由调用方决定默认勾选状态；
    ///   `Some(false)` 表示有先前提交但未包含该字段。
    pub fn old_checked(&self, name: &str) -> Option<bool> {
        self.get_inputs().map(|inputs| inputs.contains(name))
    }

    /// 下拉/单选项 `value` 是否在上一次提交的 `name` 中被选中；语义同 [`old_checked`](Self::old_checked)。
    pub fn old_selected(&self, name: &str, value: &str) -> Option<bool> {
        self.get_inputs()
            .map(|inputs| inputs.get_all(name).contains(&value))
    }

    /// 将 next 写入响应 Cookie 增量。
    ///
    /// - **契约 (What)**：`next.valid` 为假时不改变响应状态（旧 Cookie 的删除指令保持不变）；
    ///   为真时写入且仅写入一个 Cookie 值；重复调用为空操作。返回本次调用是否写出了 Cookie。
    pub fn commit(&mut self) -> bool {
        if self.committed || !self.next.valid {
            return false;
        }
        let encoded = container::encode(&self.next);
        trace!(
            cookie = %self.config.cookie_name,
            entries = self.next.values.len(),
            bytes = encoded.len(),
            "committing flash cookie"
        );
        self.jar.add(self.config.build_cookie(encoded));
        self.committed = true;
        true
    }

    /// 需要写入响应 `Set-Cookie` 的 Cookie（删除旧值或写入新值）。
    pub fn cookie_delta(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.jar.delta()
    }
}
