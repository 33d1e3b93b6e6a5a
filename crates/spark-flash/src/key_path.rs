//! # 键路径与前缀过滤
//!
//! ## 核心意图（Why）
//! - Flash 值以分段键路径寻址，例如 `["form", "errors", "email"]`；调用方按前缀选择需要读取或续传（reflash）的子集；
//! - 分段逐位比较而非字符串前缀比较，保证 `["a", "b"]` 与 `["a", "bc"]` 永远不会因前缀而互相命中。
//!
//! ## 行为契约（What）
//! - [`Filter`] 是多态过滤参数（单段、单条多段路径、路径列表）的唯一标签化表示；
//! - [`normalize_filters`] 总是产出“路径列表”，空输入产出空列表，表示“无约束”；
//! - [`matches`] 在任意一条过滤路径是键的前缀时返回 `true`。
//!
//! ## 命名空间（Where）
//! - 用户键统一存放于 [`EXT_NAMESPACE`] 之下，表单快照独占 [`INPUTS_NAMESPACE`]，两者互不遮蔽。

use serde::{Deserialize, Serialize};

/// 用户 Flash 键的保留顶层段。
pub const EXT_NAMESPACE: &str = "ext";

/// 表单输入快照的保留顶层段。
pub const INPUTS_NAMESPACE: &str = "inputs";

/// 分段键路径。
///
/// # 教案式说明
/// - **意图 (Why)**：把层级键建模为有序段序列，前缀判定按段进行；
/// - **契约 (What)**：持久化形式为 JSON 字符串数组；从 Cookie 解码后由
///   [`container::decode`](crate::container::decode) 校验非空；
/// - **风险 (Trade-offs)**：每段都是独立 `String`，短键也会产生多次分配，Flash 数据量极小，可以接受。
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// 在路径最前面插入保留命名空间段。
    pub fn prefixed(&self, namespace: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.push(namespace.to_owned());
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }

    /// `prefix` 是否为 `self` 的逐段前缀。
    ///
    /// - **契约 (What)**：`prefix` 比 `self` 长或在任一位置分歧时返回 `false`；空前缀恒为真。
    pub fn starts_with(&self, prefix: &[String]) -> bool {
        prefix.len() <= self.0.len() && self.0.iter().zip(prefix).all(|(seg, want)| seg == want)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn is_exactly(&self, segments: &[&str]) -> bool {
        self.0.len() == segments.len() && self.0.iter().zip(segments).all(|(a, b)| a == b)
    }
}

impl From<&str> for KeyPath {
    fn from(segment: &str) -> Self {
        Self(vec![segment.to_owned()])
    }
}

impl From<String> for KeyPath {
    fn from(segment: String) -> Self {
        Self(vec![segment])
    }
}

impl<const N: usize> From<[&str; N]> for KeyPath {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(segments: Vec<&str>) -> Self {
        Self::new(segments)
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

/// 多态过滤参数的标签化表示。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方可以传入单个段、单条多段路径，或者若干路径组成的列表；
///   所有形态都先归一为 [`Filter`]，再由 [`Filter::normalize`] 统一展开，避免在每个调用点做分支判断。
/// - **契约 (What)**：
///   - `Segment("a")` 等价于路径 `["a"]`；
///   - `Path(["a", "b"])` 表示一条两段路径，空 `Path` 不贡献任何路径；
///   - `Many([...])` 递归展开，每个元素独立成为一条或多条路径。
/// - **风险 (Trade-offs)**：`From<Vec<&str>>` 被解释为“一条多段路径”而不是“多个单段路径”，
///   需要后者时请使用 `Vec<Vec<&str>>` 或显式构造 `Many`。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Filter {
    Segment(String),
    Path(Vec<String>),
    Many(Vec<Filter>),
}

impl Filter {
    /// 展开为规范形态：路径列表。
    pub fn normalize(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        self.collect_into(&mut paths);
        paths
    }

    fn collect_into(&self, paths: &mut Vec<Vec<String>>) {
        match self {
            Filter::Segment(segment) => paths.push(vec![segment.clone()]),
            Filter::Path(segments) if segments.is_empty() => {}
            Filter::Path(segments) => paths.push(segments.clone()),
            Filter::Many(filters) => {
                for filter in filters {
                    filter.collect_into(paths);
                }
            }
        }
    }
}

impl From<&str> for Filter {
    fn from(segment: &str) -> Self {
        Filter::Segment(segment.to_owned())
    }
}

impl From<String> for Filter {
    fn from(segment: String) -> Self {
        Filter::Segment(segment)
    }
}

impl<const N: usize> From<[&str; N]> for Filter {
    fn from(segments: [&str; N]) -> Self {
        Filter::Path(segments.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl From<Vec<&str>> for Filter {
    fn from(segments: Vec<&str>) -> Self {
        Filter::Path(segments.into_iter().map(str::to_owned).collect())
    }
}

impl From<Vec<String>> for Filter {
    fn from(segments: Vec<String>) -> Self {
        Filter::Path(segments)
    }
}

impl From<Vec<Vec<&str>>> for Filter {
    fn from(paths: Vec<Vec<&str>>) -> Self {
        Filter::Many(paths.into_iter().map(Filter::from).collect())
    }
}

impl From<Vec<Vec<String>>> for Filter {
    fn from(paths: Vec<Vec<String>>) -> Self {
        Filter::Many(paths.into_iter().map(Filter::Path).collect())
    }
}

impl From<Vec<Filter>> for Filter {
    fn from(filters: Vec<Filter>) -> Self {
        Filter::Many(filters)
    }
}

impl From<&KeyPath> for Filter {
    fn from(path: &KeyPath) -> Self {
        Filter::Path(path.segments().to_vec())
    }
}

/// 将可选过滤参数展开为路径列表；`None` 与空过滤器都得到空列表。
pub fn normalize_filters(filter: Option<&Filter>) -> Vec<Vec<String>> {
    filter.map(Filter::normalize).unwrap_or_default()
}

/// 为每条已归一的过滤路径加上命名空间前缀。
pub(crate) fn namespaced(paths: Vec<Vec<String>>, namespace: &str) -> Vec<Vec<String>> {
    paths
        .into_iter()
        .map(|mut path| {
            path.insert(0, namespace.to_owned());
            path
        })
        .collect()
}

/// 任意一条过滤路径是 `key` 的前缀时返回 `true`。
///
/// - **契约 (What)**：`filters` 为空时返回 `false`；“空列表表示无约束”的语义由调用方
///   （例如 [`FlashStore::reflash`](crate::store::FlashStore::reflash) 的 pick/omit 规则）负责解释。
pub fn matches(key: &KeyPath, filters: &[Vec<String>]) -> bool {
    filters.iter().any(|filter| key.starts_with(filter))
}
