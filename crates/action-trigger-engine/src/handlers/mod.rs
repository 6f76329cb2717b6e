//! 内置动作处理器

mod account;
mod balance;
mod log;
mod triggers;

pub use account::{AccountFlagHandler, RemoveAccountHandler};
pub use balance::BalanceChangeHandler;
pub use log::LogHandler;
pub use triggers::{ResetTriggersHandler, SetRecurrentHandler};

use crate::account::Account;
use crate::error::{Result, TriggerError};

/// 需要账户的动作在账户为空时失败
fn require_account<'a>(account: Option<&'a mut Account>, action_type: &str) -> Result<&'a mut Account> {
    account.ok_or_else(|| TriggerError::action_failed(action_type, "账户为空"))
}
