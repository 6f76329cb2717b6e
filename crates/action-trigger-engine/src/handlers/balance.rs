//! 余额调整处理器

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::require_account;
use crate::account::Account;
use crate::action::{types, Action};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TriggerError};
use crate::filters::FilterEvaluator;
use crate::registry::ActionHandler;

/// 充值与扣减
///
/// 按动作的余额谓词匹配账户余额并调整数值，没有匹配的余额时新建一条。
pub struct BalanceChangeHandler {
    action_type: &'static str,
    /// 充值为正，扣减为负
    sign: f64,
    reset: bool,
    clock: Arc<dyn Clock>,
}

impl BalanceChangeHandler {
    fn new(action_type: &'static str, sign: f64, reset: bool) -> Self {
        Self {
            action_type,
            sign,
            reset,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn topup() -> Self {
        Self::new(types::TOPUP, 1.0, false)
    }

    pub fn topup_reset() -> Self {
        Self::new(types::TOPUP_RESET, 1.0, true)
    }

    pub fn debit() -> Self {
        Self::new(types::DEBIT, -1.0, false)
    }

    pub fn debit_reset() -> Self {
        Self::new(types::DEBIT_RESET, -1.0, true)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl ActionHandler for BalanceChangeHandler {
    fn action_type(&self) -> &str {
        self.action_type
    }

    fn description(&self) -> &str {
        "调整账户余额"
    }

    fn execute(
        &self,
        account: Option<&mut Account>,
        action: &Action,
        _siblings: &[Action],
        _filters: &dyn FilterEvaluator,
        _extra: Option<&Value>,
    ) -> Result<()> {
        let account = require_account(account, self.action_type)?;
        let filter = action
            .balance
            .as_ref()
            .ok_or_else(|| TriggerError::action_failed(self.action_type, "缺少余额谓词"))?;
        let amount = self.sign * filter.value.unwrap_or_default();

        debug!(
            account_id = %account.id,
            action_type = self.action_type,
            balance_type = filter.type_name(),
            amount,
            "调整余额"
        );
        account.apply_balance_change(filter, amount, self.reset, self.clock.now())
    }
}
