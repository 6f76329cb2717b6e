//! 动作描述
//!
//! 同一 `id` 下的多个动作组成一个动作列表，按权重从高到低依次执行。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::balance::BalanceFilter;

/// 内置动作类型
pub mod types {
    pub const LOG: &str = "*log";
    pub const TOPUP: &str = "*topup";
    pub const TOPUP_RESET: &str = "*topup_reset";
    pub const DEBIT: &str = "*debit";
    pub const DEBIT_RESET: &str = "*debit_reset";
    pub const ENABLE_ACCOUNT: &str = "*enable_account";
    pub const DISABLE_ACCOUNT: &str = "*disable_account";
    pub const ALLOW_NEGATIVE: &str = "*allow_negative";
    pub const DENY_NEGATIVE: &str = "*deny_negative";
    pub const RESET_TRIGGERS: &str = "*reset_triggers";
    pub const SET_RECURRENT: &str = "*set_recurrent";
    pub const UNSET_RECURRENT: &str = "*unset_recurrent";
    pub const REMOVE_ACCOUNT: &str = "*remove_account";
}

/// 动作描述
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Action {
    /// 动作列表 ID，可带租户前缀（`tenant:id`）
    pub id: String,
    pub action_type: String,
    /// JSON 编码的辅助参数（GroupID / UniqueID / ThresholdType）
    pub extra_parameters: String,
    pub filters: Vec<String>,
    pub expiration_string: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<BalanceFilter>,
}

impl Action {
    pub fn new(id: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action_type: action_type.into(),
            ..Default::default()
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_balance(mut self, balance: BalanceFilter) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn with_extra_parameters(mut self, params: impl Into<String>) -> Self {
        self.extra_parameters = params.into();
        self
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expiration(mut self, expiration: impl Into<String>) -> Self {
        self.expiration_string = expiration.into();
        self
    }

    /// 解析辅助参数，格式错误时返回全空参数
    pub fn match_parameters(&self) -> MatchParameters {
        if self.extra_parameters.is_empty() {
            return MatchParameters::default();
        }
        match serde_json::from_str::<serde_json::Value>(&self.extra_parameters) {
            Ok(serde_json::Value::Object(map)) => {
                let mut params = MatchParameters::default();
                for (key, value) in map {
                    let Some(value) = value.as_str() else {
                        continue;
                    };
                    let slot = match key.to_ascii_lowercase().as_str() {
                        "groupid" => &mut params.group_id,
                        "uniqueid" => &mut params.unique_id,
                        "thresholdtype" => &mut params.threshold_type,
                        _ => continue,
                    };
                    *slot = value.to_string();
                }
                params
            }
            Ok(_) => MatchParameters::default(),
            Err(e) => {
                debug!(action_id = %self.id, error = %e, "忽略无法解析的辅助参数");
                MatchParameters::default()
            }
        }
    }
}

/// 触发器匹配用的辅助参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchParameters {
    pub group_id: String,
    pub unique_id: String,
    pub threshold_type: String,
}

/// 按权重降序稳定排序
pub fn sort_actions(actions: &mut [Action]) {
    actions.sort_by(|a, b| b.weight.total_cmp(&a.weight));
}
