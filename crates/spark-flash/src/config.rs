//! # FlashConfig：中间件配置
//!
//! ## 核心意图（Why）
//! - 把 Cookie 名称、属性与自动续传策略外部化，宿主可以直接把本结构嵌入自身的 TOML/JSON 配置；
//! - 所有字段均有默认值（`#[serde(default)]`），空配置段即得到约定俗成的行为。

use std::borrow::Cow;

use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

/// 默认 Cookie 名称。
pub const DEFAULT_COOKIE_NAME: &str = "flash";

/// Cookie `SameSite` 属性的可序列化镜像。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    #[default]
    Lax,
    None,
}

impl From<SameSitePolicy> for SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::None => SameSite::None,
        }
    }
}

/// Flash 中间件配置。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `cookie_name`：读写同一个 Cookie，默认 [`DEFAULT_COOKIE_NAME`]；
///   - `auto_reflash`：GET 请求得到 3xx 响应时是否原样续传 current，默认开启；
///   - `cookie_path` / `http_only` / `secure` / `same_site`：写出 Cookie 时附带的属性，
///     删除旧 Cookie 时同样使用 `cookie_path`，确保浏览器能匹配到原 Cookie。
/// - **风险 (Trade-offs)**：Cookie 内容是明文，`http_only` 只能阻止脚本读取，不能阻止用户篡改；
///   不要在 Flash 中放置任何需要保密或需要防篡改的数据。
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashConfig {
    pub cookie_name: Cow<'static, str>,
    pub auto_reflash: bool,
    pub cookie_path: Cow<'static, str>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSitePolicy,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            cookie_name: Cow::Borrowed(DEFAULT_COOKIE_NAME),
            auto_reflash: true,
            cookie_path: Cow::Borrowed("/"),
            http_only: true,
            secure: false,
            same_site: SameSitePolicy::Lax,
        }
    }
}

impl FlashConfig {
    pub fn with_cookie_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_auto_reflash(mut self, enabled: bool) -> Self {
        self.auto_reflash = enabled;
        self
    }

    pub fn with_cookie_path(mut self, path: impl Into<Cow<'static, str>>) -> Self {
        self.cookie_path = path.into();
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSitePolicy) -> Self {
        self.same_site = same_site;
        self
    }

    /// 按配置属性构造携带 `value` 的 Flash Cookie。
    pub fn build_cookie(&self, value: impl Into<Cow<'static, str>>) -> Cookie<'static> {
        Cookie::build((self.cookie_name.to_string(), value.into()))
            .path(self.cookie_path.to_string())
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site.into())
            .build()
    }

    /// 用于删除旧 Cookie 的模板，名称与路径需与写入时一致。
    pub(crate) fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.cookie_name.to_string(), ""))
            .path(self.cookie_path.to_string())
            .build()
    }
}
