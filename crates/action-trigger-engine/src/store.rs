//! 动作与账户存储
//!
//! 引擎只通过 `ActionStore` / `AccountStore` 两个接口访问存储。
//! `InMemoryDataManager` 使用 DashMap 实现这两个接口，并支持从 JSON
//! 资费方案加载数据。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::account::Account;
use crate::action::Action;
use crate::error::{Result, TriggerError};
use crate::filters::FilterProfile;

/// 动作列表存储
#[cfg_attr(test, mockall::automock)]
pub trait ActionStore: Send + Sync {
    /// 按 ID 读取动作列表，返回私有副本；不存在时返回 NotFound
    fn get_actions(&self, actions_id: &str) -> Result<Vec<Action>>;
}

/// 账户存储
#[cfg_attr(test, mockall::automock)]
pub trait AccountStore: Send + Sync {
    fn get_account(&self, account_id: &str) -> Result<Account>;

    /// 保存完整的账户快照
    fn set_account(&self, account: &Account) -> Result<()>;

    fn remove_account(&self, account_id: &str) -> Result<()>;
}

/// JSON 资费方案
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TariffPlan {
    /// 动作列表 ID -> 动作
    #[serde(alias = "actions")]
    pub actions: HashMap<String, Vec<Action>>,
    #[serde(alias = "accounts")]
    pub accounts: Vec<Account>,
    #[serde(alias = "filters")]
    pub filters: Vec<FilterProfile>,
}

impl TariffPlan {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// 内存数据管理器
#[derive(Clone, Default)]
pub struct InMemoryDataManager {
    actions: Arc<DashMap<String, Vec<Action>>>,
    accounts: Arc<DashMap<String, Account>>,
    /// 账户持久化次数
    set_account_calls: Arc<AtomicUsize>,
}

impl InMemoryDataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从资费方案加载动作与账户，返回加载的账户 ID
    #[instrument(skip(self, plan))]
    pub fn load_tariff_plan(&self, plan: &TariffPlan) -> Vec<String> {
        for (id, actions) in &plan.actions {
            self.set_actions(id, actions.clone());
        }
        let account_ids: Vec<String> = plan.accounts.iter().map(|a| a.id.clone()).collect();
        for account in &plan.accounts {
            self.accounts.insert(account.id.clone(), account.clone());
        }
        info!(
            actions = plan.actions.len(),
            accounts = account_ids.len(),
            "资费方案已加载"
        );
        account_ids
    }

    /// 保存动作列表
    pub fn set_actions(&self, actions_id: &str, actions: Vec<Action>) {
        debug!(actions_id, count = actions.len(), "保存动作列表");
        self.actions.insert(actions_id.to_string(), actions);
    }

    /// 删除动作列表
    #[instrument(skip(self))]
    pub fn remove_actions(&self, actions_id: &str) -> Result<()> {
        if self.actions.remove(actions_id).is_some() {
            info!("动作列表已删除: {}", actions_id);
            Ok(())
        } else {
            warn!("删除不存在的动作列表: {}", actions_id);
            Err(TriggerError::not_found("ActionList", actions_id))
        }
    }

    pub fn contains_account(&self, account_id: &str) -> bool {
        self.accounts.contains_key(account_id)
    }

    /// 所有账户 ID（排序后）
    pub fn account_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.accounts.iter().map(|a| a.key().clone()).collect();
        ids.sort();
        ids
    }

    /// `set_account` 被调用的次数
    pub fn set_account_calls(&self) -> usize {
        self.set_account_calls.load(Ordering::Relaxed)
    }
}

impl ActionStore for InMemoryDataManager {
    fn get_actions(&self, actions_id: &str) -> Result<Vec<Action>> {
        self.actions
            .get(actions_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| TriggerError::not_found("ActionList", actions_id))
    }
}

impl AccountStore for InMemoryDataManager {
    fn get_account(&self, account_id: &str) -> Result<Account> {
        self.accounts
            .get(account_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| TriggerError::not_found("Account", account_id))
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    fn set_account(&self, account: &Account) -> Result<()> {
        self.set_account_calls.fetch_add(1, Ordering::Relaxed);
        let mut snapshot = account.clone();
        snapshot.mark_clean();
        self.accounts.insert(account.id.clone(), snapshot);
        debug!("账户已保存");
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove_account(&self, account_id: &str) -> Result<()> {
        if self.accounts.remove(account_id).is_some() {
            info!("账户已删除: {}", account_id);
            Ok(())
        } else {
            warn!("删除不存在的账户: {}", account_id);
            Err(TriggerError::not_found("Account", account_id))
        }
    }
}
