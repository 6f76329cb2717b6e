//! 余额与余额谓词
//!
//! `Balance` 是账户上的具体余额；`BalanceFilter` 是所有字段均可选的余额谓词，
//! 既用于把触发器与动作关联起来，也用于按谓词生成具体余额。

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriggerError};
use crate::field::{leaf, FieldAccess, FieldValue};

/// 字符串集合，值为 false 表示取反（`!` 前缀）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringMap(BTreeMap<String, bool>);

impl StringMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, included: bool) {
        self.0.insert(key.into(), included);
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.0.get(key).copied()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 包含判断：`other` 中每个键在本集合中都必须是正向包含
    pub fn includes(&self, other: &StringMap) -> bool {
        if self.len() < other.len() {
            return false;
        }
        other.0.keys().all(|key| self.get(key) == Some(true))
    }

    /// 键集合相等判断（忽略取反标记）
    pub fn same_keys(&self, other: &StringMap) -> bool {
        self.len() == other.len() && self.0.keys().all(|key| other.has_key(key))
    }
}

impl FromStr for StringMap {
    type Err = std::convert::Infallible;

    /// 解析 `DST1;!DST2` 形式的字符串
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut map = StringMap::new();
        for item in s.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            match item.strip_prefix('!') {
                Some(key) => map.insert(key, false),
                None => map.insert(item, true),
            }
        }
        Ok(map)
    }
}

impl<S: Into<String>> FromIterator<S> for StringMap {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(|k| (k.into(), true)).collect())
    }
}

impl FieldAccess for StringMap {
    fn field_as_value(&self, path: &[&str]) -> Result<FieldValue> {
        match path {
            [key] => self
                .get(key)
                .map(FieldValue::Bool)
                .ok_or_else(|| TriggerError::FieldNotFound((*key).to_string())),
            _ => Err(TriggerError::FieldNotFound(path.join("."))),
        }
    }
}

/// 账户余额
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Balance {
    pub uuid: String,
    #[serde(rename = "ID")]
    pub id: String,
    pub value: f64,
    pub expiration_date: Option<DateTime<Utc>>,
    pub weight: f64,
    #[serde(rename = "DestinationIDs")]
    pub destination_ids: StringMap,
    pub rating_subject: String,
    pub categories: StringMap,
    pub shared_groups: StringMap,
    #[serde(rename = "TimingIDs")]
    pub timing_ids: StringMap,
    pub disabled: bool,
    pub blocker: bool,
    /// 本进程内是否被修改过，阈值检查只关注被修改的余额
    #[serde(skip)]
    dirty: bool,
}

impl Balance {
    pub fn new(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value,
            ..Default::default()
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration_date = Some(expiration);
        self
    }

    pub fn with_destinations(mut self, destinations: StringMap) -> Self {
        self.destination_ids = destinations;
        self
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 清除修改标记（持久化快照不携带该标记）
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
        self.dirty = true;
    }

    pub fn add_value(&mut self, amount: f64) {
        self.set_value(self.value + amount);
    }

    pub fn is_expired_at(&self, t: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp < t)
    }

    /// 宽松匹配：目的地/类别/时段使用包含语义
    pub fn matches_filter(&self, filter: &BalanceFilter, skip_ids: bool, skip_expiry: bool) -> bool {
        if !skip_ids {
            if let Some(uuid) = filter.uuid.as_deref().filter(|s| !s.is_empty()) {
                return self.uuid == uuid;
            }
            if let Some(id) = filter.id.as_deref().filter(|s| !s.is_empty()) {
                return self.id == id;
            }
        }
        if !skip_expiry && filter.expiration_date.is_some() && self.expiration_date != filter.expiration_date
        {
            return false;
        }
        filter.weight.is_none_or(|w| self.weight == w)
            && filter.blocker.is_none_or(|b| self.blocker == b)
            && filter.disabled.is_none_or(|d| self.disabled == d)
            && filter
                .destination_ids
                .as_ref()
                .is_none_or(|m| self.destination_ids.includes(m))
            && filter
                .categories
                .as_ref()
                .is_none_or(|m| self.categories.includes(m))
            && filter
                .timing_ids
                .as_ref()
                .is_none_or(|m| self.timing_ids.includes(m))
            && filter
                .shared_groups
                .as_ref()
                .is_none_or(|m| self.shared_groups.same_keys(m))
            && filter
                .rating_subject
                .as_deref()
                .is_none_or(|s| self.rating_subject == s)
    }

    /// 严格匹配：所有集合字段要求键集合相等
    pub fn hard_matches_filter(&self, filter: &BalanceFilter, skip_ids: bool) -> bool {
        if !skip_ids {
            if let Some(uuid) = filter.uuid.as_deref().filter(|s| !s.is_empty()) {
                return self.uuid == uuid;
            }
            if let Some(id) = filter.id.as_deref().filter(|s| !s.is_empty()) {
                return self.id == id;
            }
        }
        filter
            .expiration_date
            .is_none_or(|exp| self.expiration_date == Some(exp))
            && filter.weight.is_none_or(|w| self.weight == w)
            && filter.blocker.is_none_or(|b| self.blocker == b)
            && filter.disabled.is_none_or(|d| self.disabled == d)
            && filter
                .destination_ids
                .as_ref()
                .is_none_or(|m| self.destination_ids.same_keys(m))
            && filter
                .categories
                .as_ref()
                .is_none_or(|m| self.categories.same_keys(m))
            && filter
                .timing_ids
                .as_ref()
                .is_none_or(|m| self.timing_ids.same_keys(m))
            && filter
                .shared_groups
                .as_ref()
                .is_none_or(|m| self.shared_groups.same_keys(m))
            && filter
                .rating_subject
                .as_deref()
                .is_none_or(|s| self.rating_subject == s)
    }
}

/// 余额谓词
///
/// 未设置（`None`）的字段不参与匹配。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BalanceFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub balance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(rename = "DestinationIDs", skip_serializing_if = "Option::is_none")]
    pub destination_ids: Option<StringMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<StringMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_groups: Option<StringMap>,
    #[serde(rename = "TimingIDs", skip_serializing_if = "Option::is_none")]
    pub timing_ids: Option<StringMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<bool>,
}

impl BalanceFilter {
    /// 创建指定余额类型的谓词
    pub fn of_type(balance_type: impl Into<String>) -> Self {
        Self {
            balance_type: Some(balance_type.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_destinations(mut self, destinations: StringMap) -> Self {
        self.destination_ids = Some(destinations);
        self
    }

    pub fn with_shared_groups(mut self, groups: StringMap) -> Self {
        self.shared_groups = Some(groups);
        self
    }

    /// 余额类型，未设置时为空串
    pub fn type_name(&self) -> &str {
        self.balance_type.as_deref().unwrap_or_default()
    }

    /// 按谓词生成具体余额，未设置的字段取零值
    pub fn create_balance(&self) -> Balance {
        Balance {
            uuid: self.uuid.clone().unwrap_or_default(),
            id: self.id.clone().unwrap_or_default(),
            value: self.value.unwrap_or_default(),
            expiration_date: self.expiration_date,
            weight: self.weight.unwrap_or_default(),
            destination_ids: self.destination_ids.clone().unwrap_or_default(),
            rating_subject: self.rating_subject.clone().unwrap_or_default(),
            categories: self.categories.clone().unwrap_or_default(),
            shared_groups: self.shared_groups.clone().unwrap_or_default(),
            timing_ids: self.timing_ids.clone().unwrap_or_default(),
            disabled: self.disabled.unwrap_or_default(),
            blocker: self.blocker.unwrap_or_default(),
            dirty: false,
        }
    }
}

/// 余额谓词的可访问字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BalanceField {
    Uuid,
    Id,
    Type,
    Value,
    ExpirationDate,
    Weight,
    DestinationIds,
    RatingSubject,
    Categories,
    SharedGroups,
    TimingIds,
    Disabled,
    Blocker,
}

impl FromStr for BalanceField {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "Uuid" => Self::Uuid,
            "ID" => Self::Id,
            "Type" => Self::Type,
            "Value" => Self::Value,
            "ExpirationDate" => Self::ExpirationDate,
            "Weight" => Self::Weight,
            "DestinationIDs" => Self::DestinationIds,
            "RatingSubject" => Self::RatingSubject,
            "Categories" => Self::Categories,
            "SharedGroups" => Self::SharedGroups,
            "TimingIDs" => Self::TimingIds,
            "Disabled" => Self::Disabled,
            "Blocker" => Self::Blocker,
            other => return Err(TriggerError::FieldNotFound(other.to_string())),
        })
    }
}

fn opt_string(value: &Option<String>) -> FieldValue {
    value.clone().map_or(FieldValue::Null, FieldValue::String)
}

fn string_map(map: &Option<StringMap>, rest: &[&str]) -> Result<FieldValue> {
    match (map, rest) {
        (None, []) => Ok(FieldValue::Null),
        (Some(m), []) => Ok(FieldValue::StringMap(m.clone())),
        (Some(m), rest) => m.field_as_value(rest),
        (None, rest) => Err(TriggerError::FieldNotFound(rest.join("."))),
    }
}

impl FieldAccess for BalanceFilter {
    fn field_as_value(&self, path: &[&str]) -> Result<FieldValue> {
        let Some(first) = path.first() else {
            return Err(TriggerError::FieldNotFound(String::new()));
        };
        match first.parse::<BalanceField>()? {
            BalanceField::Uuid => leaf(path, || opt_string(&self.uuid)),
            BalanceField::Id => leaf(path, || opt_string(&self.id)),
            BalanceField::Type => leaf(path, || opt_string(&self.balance_type)),
            BalanceField::Value => leaf(path, || self.value.map_or(FieldValue::Null, FieldValue::Float)),
            BalanceField::ExpirationDate => leaf(path, || self.expiration_date.into()),
            BalanceField::Weight => leaf(path, || self.weight.map_or(FieldValue::Null, FieldValue::Float)),
            BalanceField::DestinationIds => string_map(&self.destination_ids, &path[1..]),
            BalanceField::RatingSubject => leaf(path, || opt_string(&self.rating_subject)),
            BalanceField::Categories => string_map(&self.categories, &path[1..]),
            BalanceField::SharedGroups => string_map(&self.shared_groups, &path[1..]),
            BalanceField::TimingIds => string_map(&self.timing_ids, &path[1..]),
            BalanceField::Disabled => leaf(path, || self.disabled.map_or(FieldValue::Null, FieldValue::Bool)),
            BalanceField::Blocker => leaf(path, || self.blocker.map_or(FieldValue::Null, FieldValue::Bool)),
        }
    }
}
