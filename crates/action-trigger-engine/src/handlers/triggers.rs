//! 触发器管理处理器
//!
//! 只修改触发器状态，不会在处理器内部再次执行触发器。

use serde_json::Value;

use super::require_account;
use crate::account::Account;
use crate::action::{types, Action};
use crate::error::Result;
use crate::filters::FilterEvaluator;
use crate::registry::ActionHandler;

/// 重置匹配动作的触发器
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetTriggersHandler;

impl ActionHandler for ResetTriggersHandler {
    fn action_type(&self) -> &str {
        types::RESET_TRIGGERS
    }

    fn description(&self) -> &str {
        "重置触发器"
    }

    fn execute(
        &self,
        account: Option<&mut Account>,
        action: &Action,
        _siblings: &[Action],
        _filters: &dyn FilterEvaluator,
        _extra: Option<&Value>,
    ) -> Result<()> {
        require_account(account, types::RESET_TRIGGERS)?.reset_action_triggers(Some(action));
        Ok(())
    }
}

/// 设置或取消匹配触发器的重复触发
#[derive(Debug, Clone, Copy)]
pub struct SetRecurrentHandler {
    recurrent: bool,
}

impl SetRecurrentHandler {
    pub fn set() -> Self {
        Self { recurrent: true }
    }

    pub fn unset() -> Self {
        Self { recurrent: false }
    }
}

impl ActionHandler for SetRecurrentHandler {
    fn action_type(&self) -> &str {
        if self.recurrent {
            types::SET_RECURRENT
        } else {
            types::UNSET_RECURRENT
        }
    }

    fn execute(
        &self,
        account: Option<&mut Account>,
        action: &Action,
        _siblings: &[Action],
        _filters: &dyn FilterEvaluator,
        _extra: Option<&Value>,
    ) -> Result<()> {
        require_account(account, self.action_type())?.set_recurrent(Some(action), self.recurrent);
        Ok(())
    }
}
