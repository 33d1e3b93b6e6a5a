//! 键路径、表单编解码与续传过滤的性质验证
//!
//! # 教案级注释概览
//! - **核心目标 (Why)**：用 Proptest 随机输入覆盖三条代数性质：
//!   1. 表单往返：仅含文本字段时 `deserialize(serialize(x))` 逐名称、逐值、按序还原；文件条目从两侧同时剔除；
//!   2. 前缀判定：`matches(k, [f])` 当且仅当 `f` 为 `k` 的逐段前缀；
//!   3. pick/omit 优先级：条目幸存当且仅当（pick 为空或命中 pick）且（omit 为空或不命中 omit）。
//! - **设计手法 (How)**：段取自很小的字母表，保证随机生成的路径之间经常共享前缀，从而覆盖命中分支。

use std::collections::BTreeSet;

use bytes::Bytes;
use proptest::prelude::*;
use serde_json::json;
use spark_flash::{
    FilePart, FlashConfig, FlashStore, FormData, KeyPath, ReflashOptions,
    container::{self, FlashContainer, FlashValue},
    form,
    key_path::{self, EXT_NAMESPACE, Filter},
};

fn segment() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "bc", "form", "errors"]).prop_map(str::to_owned)
}

fn path(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..=max)
}

#[derive(Clone, Debug)]
enum Entry {
    Text(String, String),
    File(String),
}

fn entry() -> impl Strategy<Value = Entry> {
    let name = prop::sample::select(vec!["name", "tags", "email", "avatar"]).prop_map(str::to_owned);
    prop_oneof![
        4 => (name.clone(), "[a-z ]{0,6}").prop_map(|(n, v)| Entry::Text(n, v)),
        1 => name.prop_map(Entry::File),
    ]
}

fn is_prefix(prefix: &[String], key: &[String]) -> bool {
    prefix.len() <= key.len() && prefix.iter().zip(key).all(|(a, b)| a == b)
}

proptest! {
    #[test]
    fn form_round_trip_preserves_text_fields(entries in prop::collection::vec(entry(), 0..12)) {
        let mut submitted = FormData::new();
        for entry in &entries {
            match entry {
                Entry::Text(name, value) => submitted.append(name.clone(), value.clone()),
                Entry::File(name) => submitted.append_file(name.clone(), FilePart {
                    file_name: Some("upload.bin".to_owned()),
                    content_type: None,
                    bytes: Bytes::from_static(b"\0\x01"),
                }),
            }
        }

        let snapshot = form::serialize(&submitted);
        let json = serde_json::to_string(&snapshot).expect("快照应可序列化");
        let decoded: form::SerializedForm = serde_json::from_str(&json).expect("快照应可反序列化");
        let restored = form::deserialize(&decoded);

        let names: BTreeSet<&str> = submitted.iter().map(|(name, _)| name).collect();
        for name in names {
            prop_assert_eq!(restored.get_all(name), submitted.get_all(name));
        }
        prop_assert_eq!(restored.len(), submitted.text_entries().count());
    }

    #[test]
    fn matches_iff_filter_is_prefix(key in path(4), filter in path(5)) {
        let stored = KeyPath::from(key.clone());
        let expected = is_prefix(&filter, &key);
        prop_assert_eq!(key_path::matches(&stored, std::slice::from_ref(&filter)), expected);
        if filter.len() > key.len() {
            prop_assert!(!key_path::matches(&stored, &[filter]));
        }
    }

    #[test]
    fn reflash_respects_pick_then_omit(
        keys in prop::collection::vec(path(3), 0..8),
        picks in prop::collection::vec(path(2), 0..3),
        omits in prop::collection::vec(path(2), 0..3),
    ) {
        let values: Vec<FlashValue> = keys
            .iter()
            .enumerate()
            .map(|(index, key)| {
                FlashValue::new(KeyPath::from(key.clone()).prefixed(EXT_NAMESPACE), json!(index))
            })
            .collect();
        let current = FlashContainer { values: values.clone(), valid: true };

        let config = FlashConfig::default();
        let mut jar = cookie::CookieJar::new();
        jar.add_original(config.build_cookie(container::encode(&current)));
        let mut store = FlashStore::from_jar(config, jar);

        let mut options = ReflashOptions::new();
        if !picks.is_empty() {
            options = options.pick(Filter::from(picks.clone()));
        }
        if !omits.is_empty() {
            options = options.omit(Filter::from(omits.clone()));
        }
        store.reflash(options);

        let expected: Vec<FlashValue> = keys
            .iter()
            .zip(values)
            .filter(|(key, _)| {
                (picks.is_empty() || picks.iter().any(|p| is_prefix(p, key)))
                    && (omits.is_empty() || !omits.iter().any(|o| is_prefix(o, key)))
            })
            .map(|(_, value)| value)
            .collect();
        prop_assert_eq!(&store.next().values, &expected);
        prop_assert!(store.next().valid);
    }
}
