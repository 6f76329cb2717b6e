//! 账户状态处理器

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::require_account;
use crate::account::Account;
use crate::action::{types, Action};
use crate::error::{Result, TriggerError};
use crate::filters::FilterEvaluator;
use crate::registry::ActionHandler;
use crate::store::AccountStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountFlag {
    Disabled(bool),
    AllowNegative(bool),
}

/// 修改账户开关（禁用、允许透支）
#[derive(Debug, Clone, Copy)]
pub struct AccountFlagHandler {
    action_type: &'static str,
    flag: AccountFlag,
}

impl AccountFlagHandler {
    pub fn enable_account() -> Self {
        Self {
            action_type: types::ENABLE_ACCOUNT,
            flag: AccountFlag::Disabled(false),
        }
    }

    pub fn disable_account() -> Self {
        Self {
            action_type: types::DISABLE_ACCOUNT,
            flag: AccountFlag::Disabled(true),
        }
    }

    pub fn allow_negative() -> Self {
        Self {
            action_type: types::ALLOW_NEGATIVE,
            flag: AccountFlag::AllowNegative(true),
        }
    }

    pub fn deny_negative() -> Self {
        Self {
            action_type: types::DENY_NEGATIVE,
            flag: AccountFlag::AllowNegative(false),
        }
    }
}

impl ActionHandler for AccountFlagHandler {
    fn action_type(&self) -> &str {
        self.action_type
    }

    fn description(&self) -> &str {
        "修改账户开关"
    }

    fn execute(
        &self,
        account: Option<&mut Account>,
        _action: &Action,
        _siblings: &[Action],
        _filters: &dyn FilterEvaluator,
        _extra: Option<&Value>,
    ) -> Result<()> {
        let account = require_account(account, self.action_type)?;
        match self.flag {
            AccountFlag::Disabled(disabled) => account.disabled = disabled,
            AccountFlag::AllowNegative(allow) => account.allow_negative = allow,
        }
        Ok(())
    }
}

/// 删除账户
///
/// 账户为空时从动作的辅助参数中读取账户 ID。删除后引擎不再持久化该账户。
pub struct RemoveAccountHandler {
    accounts: Arc<dyn AccountStore>,
}

impl RemoveAccountHandler {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }
}

impl ActionHandler for RemoveAccountHandler {
    fn action_type(&self) -> &str {
        types::REMOVE_ACCOUNT
    }

    fn description(&self) -> &str {
        "删除账户"
    }

    fn execute(
        &self,
        account: Option<&mut Account>,
        action: &Action,
        _siblings: &[Action],
        _filters: &dyn FilterEvaluator,
        _extra: Option<&Value>,
    ) -> Result<()> {
        let account_id = match account {
            Some(account) => account.id.clone(),
            None => action.extra_parameters.trim().to_string(),
        };
        if account_id.is_empty() {
            return Err(TriggerError::action_failed(types::REMOVE_ACCOUNT, "缺少账户 ID"));
        }
        self.accounts.remove_account(&account_id)?;
        info!(account_id = %account_id, "账户已删除");
        Ok(())
    }
}
