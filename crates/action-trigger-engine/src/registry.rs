//! 动作处理器注册表
//!
//! 以动作类型标签为 key 管理所有 `ActionHandler` 实例，进程启动时构建，
//! 运行期只读，查找无需加锁。
//!
//! ## 使用示例
//!
//! ```ignore
//! use trigger_engine::registry::ActionRegistry;
//! use std::sync::Arc;
//!
//! let mut registry = ActionRegistry::with_defaults(accounts.clone(), Arc::new(SystemClock));
//! registry.register(Arc::new(MyNotifyHandler::default()));
//!
//! let handler = registry.resolve("*notify").unwrap();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::account::Account;
use crate::action::Action;
use crate::clock::Clock;
use crate::error::Result;
use crate::filters::FilterEvaluator;
use crate::handlers::{
    AccountFlagHandler, BalanceChangeHandler, LogHandler, RemoveAccountHandler,
    ResetTriggersHandler, SetRecurrentHandler,
};
use crate::store::AccountStore;

/// 动作处理器
///
/// 每种动作类型对应一个实现。处理器在调用方持有账户锁期间同步执行，
/// 应当快速返回。
pub trait ActionHandler: Send + Sync {
    /// 处理的动作类型标签，如 `*topup`
    fn action_type(&self) -> &str;

    /// 处理器描述
    fn description(&self) -> &str {
        ""
    }

    /// 执行动作
    ///
    /// # 参数
    /// - `account`: 目标账户，可能为空
    /// - `action`: 当前动作
    /// - `siblings`: 同一动作列表中的全部动作
    /// - `filters`: 过滤器评估器
    /// - `extra`: 附加的追踪上下文
    fn execute(
        &self,
        account: Option<&mut Account>,
        action: &Action,
        siblings: &[Action],
        filters: &dyn FilterEvaluator,
        extra: Option<&Value>,
    ) -> Result<()>;
}

/// 动作处理器注册表
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// 注册一个处理器，相同类型的处理器会被替换
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> &mut Self {
        let action_type = handler.action_type().to_string();
        debug!(
            action_type = %action_type,
            description = handler.description(),
            "注册动作处理器"
        );
        self.handlers.insert(action_type, handler);
        self
    }

    /// 查找处理器，None 表示该类型没有注册
    pub fn resolve(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_type).cloned()
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// 已注册的动作类型（排序后）
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 创建包含全部内置处理器的注册表
    ///
    /// 账户删除处理器需要账户存储；余额处理器与引擎共用同一时钟判断余额是否过期。
    pub fn with_defaults(accounts: Arc<dyn AccountStore>, clock: Arc<dyn Clock>) -> Self {
        let mut registry = Self::new();

        info!("初始化内置动作处理器");

        registry
            .register(Arc::new(LogHandler))
            .register(Arc::new(BalanceChangeHandler::topup().with_clock(clock.clone())))
            .register(Arc::new(BalanceChangeHandler::topup_reset().with_clock(clock.clone())))
            .register(Arc::new(BalanceChangeHandler::debit().with_clock(clock.clone())))
            .register(Arc::new(BalanceChangeHandler::debit_reset().with_clock(clock)))
            .register(Arc::new(AccountFlagHandler::enable_account()))
            .register(Arc::new(AccountFlagHandler::disable_account()))
            .register(Arc::new(AccountFlagHandler::allow_negative()))
            .register(Arc::new(AccountFlagHandler::deny_negative()))
            .register(Arc::new(ResetTriggersHandler))
            .register(Arc::new(SetRecurrentHandler::set()))
            .register(Arc::new(SetRecurrentHandler::unset()))
            .register(Arc::new(RemoveAccountHandler::new(accounts)));

        info!(
            handler_count = registry.len(),
            types = ?registry.registered_types(),
            "内置动作处理器初始化完成"
        );

        registry
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::types;
    use crate::clock::SystemClock;
    use crate::store::InMemoryDataManager;

    /// 测试用处理器
    struct NoopHandler {
        action_type: &'static str,
    }

    impl ActionHandler for NoopHandler {
        fn action_type(&self) -> &str {
            self.action_type
        }

        fn description(&self) -> &str {
            "no-op"
        }

        fn execute(
            &self,
            _account: Option<&mut Account>,
            _action: &Action,
            _siblings: &[Action],
            _filters: &dyn FilterEvaluator,
            _extra: Option<&Value>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_new() {
        let registry = ActionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.resolve(types::LOG).is_none());
    }

    #[test]
    fn test_registry_register_and_resolve() {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(NoopHandler { action_type: "*notify" }));

        assert!(registry.contains("*notify"));
        assert!(!registry.contains(types::LOG));
        let handler = registry.resolve("*notify").unwrap();
        assert_eq!(handler.action_type(), "*notify");
        assert_eq!(handler.description(), "no-op");
    }

    #[test]
    fn test_registry_chain_register() {
        let mut registry = ActionRegistry::new();
        registry
            .register(Arc::new(NoopHandler { action_type: "*a" }))
            .register(Arc::new(NoopHandler { action_type: "*b" }));
        assert_eq!(registry.registered_types(), ["*a", "*b"]);
    }

    #[test]
    fn test_registry_replace_handler() {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(NoopHandler { action_type: "*a" }));
        registry.register(Arc::new(NoopHandler { action_type: "*a" }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry =
            ActionRegistry::with_defaults(Arc::new(InMemoryDataManager::new()), Arc::new(SystemClock));
        for action_type in [
            types::LOG,
            types::TOPUP,
            types::TOPUP_RESET,
            types::DEBIT,
            types::DEBIT_RESET,
            types::ENABLE_ACCOUNT,
            types::DISABLE_ACCOUNT,
            types::ALLOW_NEGATIVE,
            types::DENY_NEGATIVE,
            types::RESET_TRIGGERS,
            types::SET_RECURRENT,
            types::UNSET_RECURRENT,
            types::REMOVE_ACCOUNT,
        ] {
            assert!(registry.contains(action_type), "{action_type}");
        }
        assert_eq!(registry.len(), 13);
    }
}
