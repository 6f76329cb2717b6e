//! 账户模型
//!
//! 账户持有按类型分组的余额与一组动作触发器。所有修改都要求调用方
//! 持有该账户的独占锁（见 [`crate::locks::AccountLocks`]）。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::Action;
use crate::action_trigger::{ActionTrigger, ActionTriggers, ThresholdType};
use crate::balance::{Balance, BalanceFilter};
use crate::engine::{AccountState, BatchOutcome, TriggerEngine};
use crate::error::{Result, TriggerError};

/// 计费账户
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Account {
    /// `tenant:account`
    #[serde(rename = "ID")]
    pub id: String,
    /// 余额类型 -> 余额列表
    pub balance_map: BTreeMap<String, Vec<Balance>>,
    pub action_triggers: ActionTriggers,
    pub allow_negative: bool,
    pub disabled: bool,
    pub update_time: Option<DateTime<Utc>>,
}

/// 一次账户级触发器检查的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerRun {
    /// 执行过的触发器次数
    pub fired: usize,
    /// 账户已被删除动作移除
    pub removed: bool,
    /// 清理掉的过期余额与触发器数量
    pub cleaned: usize,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_balance(mut self, balance_type: impl Into<String>, balance: Balance) -> Self {
        self.balance_map
            .entry(balance_type.into())
            .or_default()
            .push(balance);
        self
    }

    pub fn with_trigger(mut self, trigger: ActionTrigger) -> Self {
        self.action_triggers.push(trigger);
        self
    }

    /// ID 中的租户部分，没有租户前缀时返回 None
    pub fn tenant(&self) -> Option<&str> {
        self.id.split_once(':').map(|(tenant, _)| tenant)
    }

    pub(crate) fn state(&self) -> AccountState<'_> {
        AccountState {
            id: &self.id,
            disabled: self.disabled,
        }
    }

    pub fn balances(&self, balance_type: &str) -> &[Balance] {
        self.balance_map
            .get(balance_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn balance_by_id(&self, balance_type: &str, id: &str) -> Option<&Balance> {
        self.balances(balance_type).iter().find(|b| b.id == id)
    }

    /// 指定类型所有余额之和
    pub fn total_value(&self, balance_type: &str) -> f64 {
        self.balances(balance_type).iter().map(|b| b.value).sum()
    }

    /// 按谓词调整余额：匹配的余额加上 `amount`，没有匹配时新建余额
    ///
    /// `reset` 为 true 时先把匹配的余额清零。
    pub fn apply_balance_change(
        &mut self,
        filter: &BalanceFilter,
        amount: f64,
        reset: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let balance_type = filter
            .balance_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TriggerError::action_failed("balance", "余额谓词缺少类型"))?;

        let balances = self.balance_map.entry(balance_type.to_string()).or_default();
        let mut found = false;
        for balance in balances.iter_mut() {
            if balance.is_expired_at(now) || !balance.matches_filter(filter, false, false) {
                continue;
            }
            if reset {
                balance.set_value(0.0);
            }
            balance.add_value(amount);
            found = true;
        }

        if !found {
            let mut created = filter.create_balance();
            created.uuid = Uuid::new_v4().to_string();
            created.set_value(amount);
            debug!(account_id = %self.id, balance_type, uuid = %created.uuid, "新建余额");
            balances.push(created);
        }
        Ok(())
    }

    /// 重置匹配动作的触发器
    pub fn reset_action_triggers(&mut self, action: Option<&Action>) {
        for trigger in self.action_triggers.iter_mut() {
            if trigger.matches(action) {
                trigger.executed = false;
            }
        }
    }

    /// 设置匹配动作的触发器是否重复触发
    pub fn set_recurrent(&mut self, action: Option<&Action>, recurrent: bool) {
        for trigger in self.action_triggers.iter_mut() {
            if trigger.matches(action) {
                trigger.recurrent = recurrent;
            }
        }
    }

    /// 清除所有余额的修改标记
    pub fn mark_clean(&mut self) {
        self.balance_map
            .values_mut()
            .flatten()
            .for_each(Balance::mark_clean);
    }

    /// 删除过期余额与过期触发器，返回删除的数量
    pub fn clean_expired(&mut self, now: DateTime<Utc>, remove_balances: bool) -> usize {
        let mut removed = 0;
        if remove_balances {
            for balances in self.balance_map.values_mut() {
                let before = balances.len();
                balances.retain(|b| !b.is_expired_at(now));
                removed += before - balances.len();
            }
        }
        let before = self.action_triggers.len();
        self.action_triggers.retain(|t| !t.is_expired(now));
        removed + before - self.action_triggers.len()
    }

    /// 检查余额阈值并执行满足条件的触发器
    ///
    /// 跳过已过期、未激活、已触发或与 `action` 不匹配的触发器。计数器类阈值
    /// 由上游维护，这里不处理。只检查被修改过的余额（`*balance_expired` 除外），
    /// 且余额必须严格匹配触发器的余额谓词。
    pub fn execute_action_triggers(
        &mut self,
        action: Option<&Action>,
        engine: &TriggerEngine,
    ) -> Result<TriggerRun> {
        let now = engine.now();
        let mut run = TriggerRun::default();
        self.action_triggers.sort();

        let mut idx = 0;
        while idx < self.action_triggers.len() {
            let trigger = &self.action_triggers[idx];
            let eligible = !trigger.is_expired(now)
                && trigger.is_active(now)
                && !trigger.executed
                && !trigger.threshold_type.is_counter()
                && trigger.matches(action);
            if !eligible {
                idx += 1;
                continue;
            }

            let balance_type = trigger.balance.type_name().to_string();
            let count = self.balances(&balance_type).len();
            for j in 0..count {
                let Some(trigger) = self.action_triggers.get(idx) else {
                    break;
                };
                if trigger.is_spent() {
                    break;
                }
                let Some(balance) = self.balances(&balance_type).get(j) else {
                    break;
                };
                if !threshold_reached(trigger, balance, now) {
                    continue;
                }

                let trigger_key = format!("{}:{}", trigger.id, trigger.unique_id);
                match self.fire_trigger(idx, engine) {
                    Ok(Some(outcome)) => {
                        run.fired += 1;
                        if outcome.removal_fired {
                            info!(account_id = %self.id, trigger = %trigger_key, "账户已被删除，停止检查触发器");
                            run.removed = true;
                            return Ok(run);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(account_id = %self.id, trigger = %trigger_key, error = %e, "触发器执行失败");
                        break;
                    }
                }
            }
            idx += 1;
        }

        run.cleaned = self.clean_expired(now, engine.remove_expired_balances());
        Ok(run)
    }

    /// 执行第 `idx` 个触发器，触发器被节流时返回 None
    fn fire_trigger(&mut self, idx: usize, engine: &TriggerEngine) -> Result<Option<BatchOutcome>> {
        let state = AccountState {
            id: &self.id,
            disabled: self.disabled,
        };
        let trigger = &mut self.action_triggers[idx];
        let (id, unique_id) = (trigger.id.clone(), trigger.unique_id.clone());
        let Some(batch) = trigger.begin(Some(state), engine)? else {
            return Ok(None);
        };

        let result = batch.run(Some(&mut *self), engine);

        // 动作可能修改了触发器集合，按 ID 重新定位
        let position = match self.action_triggers.get(idx) {
            Some(t) if t.id == id && t.unique_id == unique_id => Some(idx),
            _ => self.action_triggers.position(&id, &unique_id),
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(p) = position {
                    self.action_triggers[p].abort();
                }
                return Err(e);
            }
        };
        if let Some(p) = position {
            self.action_triggers[p].finish(&outcome);
        }
        engine.persist_after(Some(&*self), &outcome)?;
        Ok(Some(outcome))
    }
}

/// 余额是否达到触发器阈值
fn threshold_reached(trigger: &ActionTrigger, balance: &Balance, now: DateTime<Utc>) -> bool {
    if !balance.is_dirty() && trigger.threshold_type != ThresholdType::BalanceExpired {
        return false;
    }
    if !balance.hard_matches_filter(&trigger.balance, false) {
        return false;
    }
    match trigger.threshold_type {
        ThresholdType::MaxBalance => balance.value >= trigger.threshold_value,
        ThresholdType::MinBalance => balance.value <= trigger.threshold_value,
        ThresholdType::BalanceExpired => balance.is_expired_at(now),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::types;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn account() -> Account {
        Account::new("cgrates.org:1001")
            .with_balance("*monetary", Balance::new("main", 10.0))
            .with_trigger(
                ActionTrigger::new("T1", "u1", ThresholdType::MinBalance, "ACT_LOG")
                    .with_balance(BalanceFilter::of_type("*monetary")),
            )
    }

    #[test]
    fn test_tenant() {
        assert_eq!(account().tenant(), Some("cgrates.org"));
        assert_eq!(Account::new("1001").tenant(), None);
    }

    #[test]
    fn test_apply_balance_change_updates_matching() {
        let mut acc = account();
        let filter = BalanceFilter::of_type("*monetary").with_id("main");
        acc.apply_balance_change(&filter, -4.0, false, now()).unwrap();
        let main = acc.balance_by_id("*monetary", "main").unwrap();
        assert_eq!(main.value, 6.0);
        assert!(main.is_dirty());

        acc.apply_balance_change(&filter, 2.0, true, now()).unwrap();
        assert_eq!(acc.total_value("*monetary"), 2.0);
    }

    #[test]
    fn test_apply_balance_change_creates_missing() {
        let mut acc = account();
        let filter = BalanceFilter::of_type("*voice").with_id("minutes");
        acc.apply_balance_change(&filter, 60.0, false, now()).unwrap();
        let created = acc.balance_by_id("*voice", "minutes").unwrap();
        assert_eq!(created.value, 60.0);
        assert!(!created.uuid.is_empty());
    }

    #[test]
    fn test_apply_balance_change_requires_type() {
        let mut acc = account();
        assert!(matches!(
            acc.apply_balance_change(&BalanceFilter::default(), 1.0, false, now()),
            Err(TriggerError::ActionFailed { .. })
        ));
    }

    #[test]
    fn test_reset_and_set_recurrent() {
        let mut acc = account();
        acc.action_triggers[0].executed = true;

        let other_group = Action::new("ACT", types::RESET_TRIGGERS)
            .with_balance(BalanceFilter::default())
            .with_extra_parameters(r#"{"GroupID":"T2"}"#);
        acc.reset_action_triggers(Some(&other_group));
        assert!(acc.action_triggers[0].executed);

        acc.reset_action_triggers(None);
        assert!(!acc.action_triggers[0].executed);

        acc.set_recurrent(None, true);
        assert!(acc.action_triggers[0].recurrent);
    }

    #[test]
    fn test_clean_expired() {
        let mut acc = account()
            .with_balance("*monetary", Balance::new("old", 1.0).with_expiration(now() - TimeDelta::days(1)));
        let mut expired = ActionTrigger::new("T9", "u9", ThresholdType::MaxBalance, "ACT");
        expired.expiration_date = Some(now() - TimeDelta::hours(1));
        acc.action_triggers.push(expired);

        assert_eq!(acc.clean_expired(now(), false), 1);
        assert_eq!(acc.balances("*monetary").len(), 2);
        assert_eq!(acc.clean_expired(now(), true), 1);
        assert_eq!(acc.balances("*monetary").len(), 1);
    }

    #[test]
    fn test_threshold_reached() {
        let trigger = ActionTrigger::new("T1", "u1", ThresholdType::MinBalance, "ACT")
            .with_threshold(5.0)
            .with_balance(BalanceFilter::of_type("*monetary"));
        let mut balance = Balance::new("main", 4.0);
        assert!(!threshold_reached(&trigger, &balance, now()), "未修改的余额不检查");

        balance.set_value(4.0);
        assert!(threshold_reached(&trigger, &balance, now()));
        balance.set_value(6.0);
        assert!(!threshold_reached(&trigger, &balance, now()));

        let max = ActionTrigger {
            threshold_type: ThresholdType::MaxBalance,
            ..trigger.clone()
        };
        assert!(threshold_reached(&max, &balance, now()));

        let expired_trigger = ActionTrigger {
            threshold_type: ThresholdType::BalanceExpired,
            ..trigger
        };
        let old = Balance::new("old", 1.0).with_expiration(now() - TimeDelta::seconds(1));
        assert!(threshold_reached(&expired_trigger, &old, now()));
    }

    #[test]
    fn test_account_serde() {
        let acc: Account = serde_json::from_str(
            r#"{"ID":"cgrates.org:1001","BalanceMap":{"*monetary":[{"ID":"main","Value":10}]},
                "ActionTriggers":[{"ID":"T1","UniqueID":"u1","ThresholdType":"*min_balance",
                "ThresholdValue":2,"Balance":{"Type":"*monetary"},"ActionsID":"ACT_TOPUP"}]}"#,
        )
        .unwrap();
        assert_eq!(acc.total_value("*monetary"), 10.0);
        assert_eq!(acc.action_triggers.len(), 1);
        assert!(!acc.disabled);
    }
}
