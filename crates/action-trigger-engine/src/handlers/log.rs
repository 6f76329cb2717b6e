use serde_json::Value;
use tracing::info;

use crate::account::Account;
use crate::action::{types, Action};
use crate::error::Result;
use crate::filters::FilterEvaluator;
use crate::registry::ActionHandler;

/// 以结构化日志输出账户快照
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

impl ActionHandler for LogHandler {
    fn action_type(&self) -> &str {
        types::LOG
    }

    fn description(&self) -> &str {
        "记录账户快照"
    }

    fn execute(
        &self,
        account: Option<&mut Account>,
        action: &Action,
        _siblings: &[Action],
        _filters: &dyn FilterEvaluator,
        extra: Option<&Value>,
    ) -> Result<()> {
        let snapshot = match account {
            Some(account) => serde_json::to_string(&*account)?,
            None => String::new(),
        };
        info!(
            action_id = %action.id,
            extra = ?extra,
            account = %snapshot,
            "触发器动作日志"
        );
        Ok(())
    }
}
