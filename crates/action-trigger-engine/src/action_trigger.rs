//! 动作触发器
//!
//! 单个阈值规则，绑定一个动作列表，并携带重复触发与节流状态。
//! 触发器只在调用方持有所属账户独占锁期间被读取或修改。

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::balance::{Balance, BalanceFilter};
use crate::error::{Result, TriggerError};
use crate::field::{leaf, FieldAccess, FieldValue};
use crate::timeparse::duration_serde;

/// 阈值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ThresholdType {
    #[serde(rename = "*min_event_counter")]
    MinEventCounter,
    #[serde(rename = "*max_event_counter")]
    MaxEventCounter,
    #[serde(rename = "*min_balance_counter")]
    MinBalanceCounter,
    #[serde(rename = "*max_balance_counter")]
    MaxBalanceCounter,
    #[default]
    #[serde(rename = "*min_balance")]
    MinBalance,
    #[serde(rename = "*max_balance")]
    MaxBalance,
    #[serde(rename = "*balance_expired")]
    BalanceExpired,
}

impl ThresholdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinEventCounter => "*min_event_counter",
            Self::MaxEventCounter => "*max_event_counter",
            Self::MinBalanceCounter => "*min_balance_counter",
            Self::MaxBalanceCounter => "*max_balance_counter",
            Self::MinBalance => "*min_balance",
            Self::MaxBalance => "*max_balance",
            Self::BalanceExpired => "*balance_expired",
        }
    }

    /// 计数器类阈值由上游维护
    pub fn is_counter(&self) -> bool {
        matches!(
            self,
            Self::MinEventCounter
                | Self::MaxEventCounter
                | Self::MinBalanceCounter
                | Self::MaxBalanceCounter
        )
    }
}

impl fmt::Display for ThresholdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdType {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "*min_event_counter" => Self::MinEventCounter,
            "*max_event_counter" => Self::MaxEventCounter,
            "*min_balance_counter" => Self::MinBalanceCounter,
            "*max_balance_counter" => Self::MaxBalanceCounter,
            "*min_balance" => Self::MinBalance,
            "*max_balance" => Self::MaxBalance,
            "*balance_expired" => Self::BalanceExpired,
            other => return Err(TriggerError::UnknownThresholdType(other.to_string())),
        })
    }
}

/// 动作触发器
///
/// `(id, unique_id)` 在同一账户的触发器集合内唯一标识一个触发器。
/// `executed && !recurrent` 表示触发器已永久失效。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ActionTrigger {
    /// 分组 ID，同一规则集生成的触发器共享
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
    pub threshold_type: ThresholdType,
    pub threshold_value: f64,
    /// 触发后是否重新布防
    pub recurrent: bool,
    /// 重复触发的最小间隔
    #[serde(with = "duration_serde")]
    pub min_sleep: Duration,
    pub expiration_date: Option<DateTime<Utc>>,
    pub activation_date: Option<DateTime<Utc>>,
    pub balance: BalanceFilter,
    pub weight: f64,
    #[serde(rename = "ActionsID")]
    pub actions_id: String,
    /// 统计类触发器的最小排队数量，由调用方检查
    pub min_queued_items: i64,
    pub executed: bool,
    pub last_execution_time: Option<DateTime<Utc>>,
}

impl ActionTrigger {
    pub fn new(
        id: impl Into<String>,
        unique_id: impl Into<String>,
        threshold_type: ThresholdType,
        actions_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            unique_id: unique_id.into(),
            threshold_type,
            actions_id: actions_id.into(),
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, value: f64) -> Self {
        self.threshold_value = value;
        self
    }

    pub fn with_balance(mut self, balance: BalanceFilter) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn recurrent(mut self, min_sleep: Duration) -> Self {
        self.recurrent = true;
        self.min_sleep = min_sleep;
        self
    }

    /// 激活时间未设置，或 `t` 晚于激活时间
    pub fn is_active(&self, t: DateTime<Utc>) -> bool {
        self.activation_date.is_none_or(|activation| t > activation)
    }

    /// 设置了过期时间且 `t` 晚于过期时间
    pub fn is_expired(&self, t: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|expiration| t > expiration)
    }

    /// 仅按 `(id, unique_id)` 判断是否为同一触发器
    pub fn equals(&self, other: &ActionTrigger) -> bool {
        self.id == other.id && self.unique_id == other.unique_id
    }

    /// 已触发且不会重新布防
    pub fn is_spent(&self) -> bool {
        self.executed && !self.recurrent
    }

    /// 按谓词生成余额，余额 ID 固定为 `unique_id`
    pub fn create_balance(&self) -> Balance {
        let mut balance = self.balance.create_balance();
        balance.id = self.unique_id.clone();
        balance
    }

    /// 判断动作是否归属于该触发器
    pub fn matches(&self, action: Option<&Action>) -> bool {
        let Some(action) = action else {
            return true;
        };
        let Some(action_balance) = action.balance.as_ref() else {
            return true;
        };

        if action_balance.balance_type.is_some()
            && action_balance.type_name() != self.balance.type_name()
        {
            return false;
        }

        let params = action.match_parameters();
        if !params.group_id.is_empty() {
            return params.group_id == self.id;
        }
        if !params.unique_id.is_empty() {
            return params.unique_id == self.unique_id;
        }
        if !params.threshold_type.is_empty() && params.threshold_type != self.threshold_type.as_str() {
            return false;
        }

        self.create_balance()
            .matches_filter(action_balance, false, false)
    }
}

impl fmt::Display for ActionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_json::to_string(self).map_err(|_| fmt::Error)?)
    }
}

/// 触发器的可访问字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerField {
    Id,
    UniqueId,
    ThresholdType,
    ThresholdValue,
    Recurrent,
    MinSleep,
    ExpirationDate,
    ActivationDate,
    Balance,
    Weight,
    ActionsId,
    MinQueuedItems,
    Executed,
    LastExecutionTime,
}

impl FromStr for TriggerField {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "ID" => Self::Id,
            "UniqueID" => Self::UniqueId,
            "ThresholdType" => Self::ThresholdType,
            "ThresholdValue" => Self::ThresholdValue,
            "Recurrent" => Self::Recurrent,
            "MinSleep" => Self::MinSleep,
            "ExpirationDate" => Self::ExpirationDate,
            "ActivationDate" => Self::ActivationDate,
            "Balance" => Self::Balance,
            "Weight" => Self::Weight,
            "ActionsID" => Self::ActionsId,
            "MinQueuedItems" => Self::MinQueuedItems,
            "Executed" => Self::Executed,
            "LastExecutionTime" => Self::LastExecutionTime,
            other => return Err(TriggerError::FieldNotFound(other.to_string())),
        })
    }
}

impl FieldAccess for ActionTrigger {
    fn field_as_value(&self, path: &[&str]) -> Result<FieldValue> {
        let Some(first) = path.first() else {
            return Err(TriggerError::FieldNotFound(String::new()));
        };
        match first.parse::<TriggerField>()? {
            TriggerField::Id => leaf(path, || FieldValue::String(self.id.clone())),
            TriggerField::UniqueId => leaf(path, || FieldValue::String(self.unique_id.clone())),
            TriggerField::ThresholdType => leaf(path, || {
                FieldValue::String(self.threshold_type.as_str().to_string())
            }),
            TriggerField::ThresholdValue => leaf(path, || FieldValue::Float(self.threshold_value)),
            TriggerField::Recurrent => leaf(path, || FieldValue::Bool(self.recurrent)),
            TriggerField::MinSleep => leaf(path, || FieldValue::Duration(self.min_sleep)),
            TriggerField::ExpirationDate => leaf(path, || self.expiration_date.into()),
            TriggerField::ActivationDate => leaf(path, || self.activation_date.into()),
            TriggerField::Balance if path.len() == 1 => {
                Ok(FieldValue::Balance(Box::new(self.balance.clone())))
            }
            TriggerField::Balance => self.balance.field_as_value(&path[1..]),
            TriggerField::Weight => leaf(path, || FieldValue::Float(self.weight)),
            TriggerField::ActionsId => leaf(path, || FieldValue::String(self.actions_id.clone())),
            TriggerField::MinQueuedItems => leaf(path, || FieldValue::Int(self.min_queued_items)),
            TriggerField::Executed => leaf(path, || FieldValue::Bool(self.executed)),
            TriggerField::LastExecutionTime => leaf(path, || self.last_execution_time.into()),
        }
    }
}

/// 触发器集合，按权重降序排列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionTriggers(Vec<ActionTrigger>);

impl ActionTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swap(&mut self, i: usize, j: usize) {
        self.0.swap(i, j);
    }

    /// 排序比较：下标顺序反转，使权重高的排在前面
    pub fn less(&self, i: usize, j: usize) -> bool {
        self.0[j].weight < self.0[i].weight
    }

    /// 稳定排序，权重相同时保持原有相对顺序
    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    }

    /// 按 `(id, unique_id)` 查找
    pub fn find(&self, other: &ActionTrigger) -> Option<&ActionTrigger> {
        self.0.iter().find(|t| t.equals(other))
    }

    pub fn position(&self, id: &str, unique_id: &str) -> Option<usize> {
        self.0
            .iter()
            .position(|t| t.id == id && t.unique_id == unique_id)
    }

    /// 深拷贝集合，未初始化（`None`）的集合拷贝后仍为 `None`
    pub fn clone_set(set: Option<&ActionTriggers>) -> Option<ActionTriggers> {
        set.cloned()
    }

    pub fn into_inner(self) -> Vec<ActionTrigger> {
        self.0
    }
}

impl Deref for ActionTriggers {
    type Target = Vec<ActionTrigger>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ActionTriggers {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<ActionTrigger>> for ActionTriggers {
    fn from(triggers: Vec<ActionTrigger>) -> Self {
        Self(triggers)
    }
}

impl FromIterator<ActionTrigger> for ActionTriggers {
    fn from_iter<I: IntoIterator<Item = ActionTrigger>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ActionTriggers {
    type Item = &'a ActionTrigger;
    type IntoIter = std::slice::Iter<'a, ActionTrigger>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a mut ActionTriggers {
    type Item = &'a mut ActionTrigger;
    type IntoIter = std::slice::IterMut<'a, ActionTrigger>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter_mut()
    }
}
