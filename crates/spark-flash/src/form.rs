//! # 表单快照编解码
//!
//! ## 核心意图（Why）
//! - 表单回填（old input）需要把上一次提交的表单写进 Cookie，而表单天然是“同名多值 + 可能夹带文件”的结构；
//! - 本模块在 [`FormData`] 与可 JSON 序列化的 [`SerializedForm`] 之间做可逆转换，仅保留文本字段。
//!
//! ## 行为契约（What）
//! - [`serialize`]：按提交顺序遍历条目，跳过文件上传，同名条目按原始顺序归并；
//! - [`deserialize`]：逆变换，按名称出现顺序逐一追加文本值；
//! - [`read_form`]：按 `Content-Type` 把请求体收集为 [`FormData`]，支持 urlencoded 与 multipart；
//! - 往返律：`deserialize(serialize(x))` 与 `x` 的文本条目逐名称、逐值、按序相等。
//!
//! ## 风险提示（Trade-offs）
//! - 文件上传会被静默丢弃，这是有意的限制：Cookie 容量有限且二进制内容不可回填到表单；
//! - 不同名称之间的交错顺序不会保留（`a, b, a` 还原为 `a, a, b`），`get`/`get_all` 的观测结果不受影响。

use std::{convert::Infallible, fmt};

use bytes::Bytes;
use http::{HeaderMap, header};
use http_body::Body;
use http_body_util::BodyExt;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};
use tracing::debug;

use crate::error::FlashError;

const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// 文件上传片段。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FilePart {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// 表单条目的值。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FormValue {
    Text(String),
    File(FilePart),
}

impl FormValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(text) => Some(text),
            FormValue::File(_) => None,
        }
    }
}

/// 一次表单提交：按提交顺序排列的 `(名称, 值)` 序列。
///
/// # 教案式说明
/// - **意图 (Why)**：复刻浏览器 `FormData` 的观测语义，既能表达同名多值（复选框组、多选下拉框），
///   也能容纳文件上传条目；
/// - **契约 (What)**：
///   - [`get`](Self::get) 返回该名称的第一个文本值；
///   - [`get_all`](Self::get_all) 按提交顺序返回全部文本值；
///   - [`contains`](Self::contains) 对任意类型条目都成立，用于判定复选框是否被提交。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FormData {
    entries: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries
            .push((name.into(), FormValue::Text(value.into())));
    }

    pub fn append_file(&mut self, name: impl Into<String>, file: FilePart) {
        self.entries.push((name.into(), FormValue::File(file)));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(entry, _)| entry == name)
            .find_map(|(_, value)| value.as_text())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(entry, _)| entry == name)
            .filter_map(|(_, value)| value.as_text())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(entry, _)| entry == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// 仅包含文本条目的视图，保持提交顺序。
    pub fn text_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(name, value)| value.as_text().map(|text| (name.as_str(), text)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for FormData
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut form = FormData::new();
        for (name, value) in iter {
            form.append(name, value);
        }
        form
    }
}

/// 可写入 Cookie 的表单快照：`名称 -> 有序字符串列表`，名称按首次出现排序。
///
/// - **契约 (What)**：JSON 形式为对象，成员顺序即名称首次出现顺序；解码时若出现重复名称，值按文档顺序追加。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SerializedForm {
    fields: Vec<(String, Vec<String>)>,
}

impl SerializedForm {
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn push(&mut self, name: String, value: String) {
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, values)) => values.push(value),
            None => self.fields.push((name, vec![value])),
        }
    }
}

impl Serialize for SerializedForm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, values) in &self.fields {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SerializedForm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = SerializedForm;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to string lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut form = SerializedForm::default();
                while let Some((name, values)) = access.next_entry::<String, Vec<String>>()? {
                    for value in values {
                        form.push(name.clone(), value);
                    }
                    // 空列表也要保留名称，避免丢失“字段存在但无值”的信息。
                    if form.get(&name).is_none() {
                        form.fields.push((name, Vec::new()));
                    }
                }
                Ok(form)
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// 将表单转换为可序列化快照，丢弃文件条目。
pub fn serialize(form: &FormData) -> SerializedForm {
    let mut out = SerializedForm::default();
    for (name, value) in form.text_entries() {
        out.push(name.to_owned(), value.to_owned());
    }
    out
}

/// 由快照还原表单。
pub fn deserialize(snapshot: &SerializedForm) -> FormData {
    let mut form = FormData::new();
    for (name, values) in &snapshot.fields {
        for value in values {
            form.append(name.clone(), value.clone());
        }
    }
    form
}

/// 解析 `application/x-www-form-urlencoded` 负载。
pub fn parse_urlencoded(payload: &[u8]) -> FormData {
    form_urlencoded::parse(payload)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect()
}

/// 解析 `multipart/form-data` 负载；带文件名的片段保留为 [`FormValue::File`]，无名片段被跳过。
pub async fn parse_multipart(
    payload: Bytes,
    boundary: impl Into<String>,
) -> Result<FormData, FlashError> {
    let stream = futures_util::stream::iter([Ok::<_, Infallible>(payload)]);
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form = FormData::new();
    while let Some(field) = multipart.next_field().await.map_err(form_body)? {
        let Some(name) = field.name().map(str::to_owned) else {
            debug!("skipping unnamed multipart field");
            continue;
        };
        match field.file_name().map(str::to_owned) {
            Some(file_name) => {
                let content_type = field.content_type().map(ToString::to_string);
                let bytes = field.bytes().await.map_err(form_body)?;
                form.append_file(
                    name,
                    FilePart {
                        file_name: Some(file_name),
                        content_type,
                        bytes,
                    },
                );
            }
            None => {
                let text = field.text().await.map_err(form_body)?;
                form.append(name, text);
            }
        }
    }
    Ok(form)
}

/// 异步收集请求体并按 urlencoded 表单解析。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方已经确定负载是 urlencoded 时使用；按请求头分派请使用 [`read_form`]；
/// - **契约 (What)**：请求体读取失败时返回 [`FlashError::FormBody`]，不解析部分数据；
/// - **风险 (Trade-offs)**：会把整个请求体缓冲到内存，调用方应在上游限制表单大小。
pub async fn read_urlencoded<B>(body: B) -> Result<FormData, FlashError>
where
    B: Body,
    B::Error: fmt::Display,
{
    Ok(parse_urlencoded(&collect(body).await?))
}

/// 按 `Content-Type` 收集请求体为 [`FormData`]。
///
/// # 教案式说明
/// - **意图 (Why)**：请求体归处理器所有，中间件无法替它读取；处理器把请求头与请求体交给本函数，
///   随后把结果交给 [`flash_inputs`](crate::scope::flash_inputs)，或直接使用
///   [`capture_inputs`](crate::scope::capture_inputs) 一步完成；
/// - **契约 (What)**：
///   - `application/x-www-form-urlencoded` 交给 [`parse_urlencoded`]；
///   - `multipart/form-data` 交给 `multer`，文件片段成为 [`FormValue::File`]；
///   - 缺失、非 ASCII 或其他类型的 `Content-Type` 返回 [`FlashError::FormBody`]，不做猜测。
/// - **风险 (Trade-offs)**：整个请求体会先缓冲到内存。
pub async fn read_form<B>(headers: &HeaderMap, body: B) -> Result<FormData, FlashError>
where
    B: Body,
    B::Error: fmt::Display,
{
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| FlashError::FormBody {
            detail: "missing or non-ascii content-type".to_owned(),
        })?;
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case(URLENCODED) {
        read_urlencoded(body).await
    } else if essence.eq_ignore_ascii_case(MULTIPART) {
        let boundary = multer::parse_boundary(content_type).map_err(form_body)?;
        parse_multipart(collect(body).await?, boundary).await
    } else {
        Err(FlashError::FormBody {
            detail: format!("unsupported content-type `{essence}`"),
        })
    }
}

async fn collect<B>(body: B) -> Result<Bytes, FlashError>
where
    B: Body,
    B::Error: fmt::Display,
{
    let collected = body.collect().await.map_err(form_body)?;
    Ok(collected.to_bytes())
}

fn form_body(err: impl fmt::Display) -> FlashError {
    FlashError::FormBody {
        detail: err.to_string(),
    }
}
