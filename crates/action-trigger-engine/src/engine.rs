//! 触发器执行引擎
//!
//! 执行分为三个阶段：
//! 1. `ActionTrigger::begin`：节流检查、记录执行时间、禁用账户检查、读取并排序动作列表、预置已执行标记
//! 2. `PreparedBatch::run`：按顺序评估过滤器并调用动作处理器
//! 3. `ActionTrigger::finish`：根据执行结果修正已执行标记，随后由 `TriggerEngine::persist_after` 持久化账户
//!
//! 分阶段是为了让账户自身持有的触发器也能在执行期间把账户交给动作处理器修改。
//! 所有阶段都要求调用方持有账户的独占锁：`&mut Account` 参数即是进程内的持锁证明，
//! 跨线程共享账户时通过 [`AccountLocks`] 获取锁（见 [`TriggerEngine::process_account`] 与
//! [`TriggerEngine::update_account`]）。

use std::sync::Arc;
use std::time::Instant;

use charging_shared::config::AppConfig;
use charging_shared::observability::metrics::{record_action_execution, record_trigger_execution};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::account::{Account, TriggerRun};
use crate::action::{sort_actions, types, Action};
use crate::action_trigger::ActionTrigger;
use crate::balance::BalanceFilter;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TriggerError};
use crate::filters::{DataContext, FilterEvaluator};
use crate::locks::AccountLocks;
use crate::registry::ActionRegistry;
use crate::store::{AccountStore, ActionStore};
use crate::timeparse::{parse_time_detect_layout, Timezone};

const OUTCOME_THROTTLED: &str = "throttled";
const OUTCOME_DISABLED: &str = "account_disabled";
const OUTCOME_LOAD_FAILED: &str = "load_failed";
const OUTCOME_FILTER_ERROR: &str = "filter_error";
const OUTCOME_ABANDONED: &str = "abandoned";
const OUTCOME_REMOVED: &str = "account_removed";
const OUTCOME_COMPLETED: &str = "completed";

/// 执行所需的账户状态
#[derive(Debug, Clone, Copy)]
pub struct AccountState<'a> {
    pub id: &'a str,
    pub disabled: bool,
}

/// 一批动作的执行结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// 因动作类型未注册或处理器失败而中止
    pub abandoned: bool,
    /// 执行过账户删除动作
    pub removal_fired: bool,
    /// 成功执行的动作数
    pub executed_actions: usize,
}

impl BatchOutcome {
    fn metric_label(&self) -> &'static str {
        if self.abandoned {
            OUTCOME_ABANDONED
        } else if self.removal_fired {
            OUTCOME_REMOVED
        } else {
            OUTCOME_COMPLETED
        }
    }
}

/// 已加载并排序、等待执行的动作列表
#[derive(Debug)]
pub struct PreparedBatch {
    trigger_id: String,
    unique_id: String,
    actions: Vec<Action>,
    started: Instant,
}

/// 触发器执行引擎
///
/// 持有执行所需的全部协作方。构建后只读，可通过 `Arc` 在线程间共享。
pub struct TriggerEngine {
    actions: Arc<dyn ActionStore>,
    accounts: Arc<dyn AccountStore>,
    registry: Arc<ActionRegistry>,
    filters: Arc<dyn FilterEvaluator>,
    clock: Arc<dyn Clock>,
    locks: AccountLocks,
    timezone: Timezone,
    default_tenant: String,
    persist_accounts: bool,
    remove_expired_balances: bool,
}

impl TriggerEngine {
    pub fn new(
        actions: Arc<dyn ActionStore>,
        accounts: Arc<dyn AccountStore>,
        registry: Arc<ActionRegistry>,
        filters: Arc<dyn FilterEvaluator>,
    ) -> Self {
        Self {
            actions,
            accounts,
            registry,
            filters,
            clock: Arc::new(SystemClock),
            locks: AccountLocks::new(),
            timezone: Timezone::Local,
            default_tenant: "cgrates.org".to_string(),
            persist_accounts: true,
            remove_expired_balances: true,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timezone(mut self, timezone: Timezone) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_default_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.default_tenant = tenant.into();
        self
    }

    pub fn with_persist_accounts(mut self, persist: bool) -> Self {
        self.persist_accounts = persist;
        self
    }

    /// 应用配置中的时区、默认租户与持久化选项
    pub fn with_config(mut self, config: &AppConfig) -> Result<Self> {
        self.timezone = config.general.default_timezone.parse()?;
        self.default_tenant = config.general.default_tenant.clone();
        self.persist_accounts = config.engine.persist_accounts;
        self.remove_expired_balances = config.engine.remove_expired_balances;
        Ok(self)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn timezone(&self) -> &Timezone {
        &self.timezone
    }

    pub fn default_tenant(&self) -> &str {
        &self.default_tenant
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn filters(&self) -> &dyn FilterEvaluator {
        self.filters.as_ref()
    }

    pub fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    pub fn remove_expired_balances(&self) -> bool {
        self.remove_expired_balances
    }

    /// 动作 ID 中的租户，没有前缀时使用默认租户
    pub fn tenant_of<'a>(&'a self, action_id: &'a str) -> &'a str {
        action_id
            .split_once(':')
            .map(|(tenant, _)| tenant)
            .filter(|tenant| !tenant.is_empty())
            .unwrap_or(&self.default_tenant)
    }

    /// 批次干净完成且账户未被删除时持久化账户
    pub fn persist_after(&self, account: Option<&Account>, outcome: &BatchOutcome) -> Result<()> {
        if outcome.abandoned || outcome.removal_fired || !self.persist_accounts {
            return Ok(());
        }
        let Some(account) = account else {
            return Ok(());
        };
        self.accounts.set_account(account).inspect_err(|e| {
            error!(account_id = %account.id, error = %e, "保存账户失败");
        })
    }

    /// 在账户锁内加载账户并检查其触发器
    ///
    /// 从存储加载的账户不带修改标记，因此这里只会触发 `*balance_expired`
    /// 类阈值并清理过期数据；余额变动请走 [`TriggerEngine::update_account`]。
    #[instrument(skip(self, action))]
    pub fn process_account(&self, account_id: &str, action: Option<&Action>) -> Result<TriggerRun> {
        self.run_locked(account_id, action, |_| Ok(false))
    }

    /// 在账户锁内修改账户，随后检查其触发器并保存账户
    ///
    /// `update` 返回错误时账户保持原样，不检查触发器也不保存。
    #[instrument(skip(self, action, update))]
    pub fn update_account<F>(
        &self,
        account_id: &str,
        action: Option<&Action>,
        update: F,
    ) -> Result<TriggerRun>
    where
        F: FnOnce(&mut Account) -> Result<()>,
    {
        self.run_locked(account_id, action, |account| update(account).map(|()| true))
    }

    fn run_locked<F>(&self, account_id: &str, action: Option<&Action>, update: F) -> Result<TriggerRun>
    where
        F: FnOnce(&mut Account) -> Result<bool>,
    {
        self.locks.with_lock(account_id, || {
            let mut account = self.accounts.get_account(account_id)?;
            let changed = update(&mut account)?;
            let run = account.execute_action_triggers(action, self)?;
            if (changed || run.cleaned > 0) && !run.removed && self.persist_accounts {
                self.accounts.set_account(&account)?;
            }
            debug!(fired = run.fired, cleaned = run.cleaned, removed = run.removed, "账户触发器检查完成");
            Ok(run)
        })
    }
}

impl ActionTrigger {
    /// 重复触发器距上次执行不足 `min_sleep`
    fn is_throttled(&self, now: DateTime<Utc>) -> bool {
        if !self.recurrent {
            return false;
        }
        let Some(last) = self.last_execution_time else {
            return false;
        };
        match TimeDelta::from_std(self.min_sleep) {
            Ok(min_sleep) => now.signed_duration_since(last) < min_sleep,
            Err(_) => true,
        }
    }

    /// 执行第一阶段
    ///
    /// 返回 `None` 表示触发器处于节流期，没有任何副作用。
    pub fn begin(
        &mut self,
        account: Option<AccountState<'_>>,
        engine: &TriggerEngine,
    ) -> Result<Option<PreparedBatch>> {
        let started = Instant::now();
        let now = engine.now();

        if self.is_throttled(now) {
            debug!(trigger_id = %self.id, unique_id = %self.unique_id, "触发器处于节流期，跳过");
            record_trigger_execution(OUTCOME_THROTTLED, started.elapsed().as_secs_f64());
            return Ok(None);
        }

        // 记录的是执行尝试而非成功
        self.last_execution_time = Some(self.last_execution_time.map_or(now, |last| last.max(now)));

        if let Some(account) = account.filter(|a| a.disabled) {
            warn!(account_id = %account.id, trigger_id = %self.id, "账户已禁用，拒绝执行触发器");
            record_trigger_execution(OUTCOME_DISABLED, started.elapsed().as_secs_f64());
            return Err(TriggerError::AccountDisabled {
                account_id: account.id.to_string(),
            });
        }

        let mut actions = match engine.actions.get_actions(&self.actions_id) {
            Ok(actions) => actions,
            Err(e) => {
                error!(actions_id = %self.actions_id, error = %e, "读取动作列表失败");
                record_trigger_execution(OUTCOME_LOAD_FAILED, started.elapsed().as_secs_f64());
                return Err(e);
            }
        };
        sort_actions(&mut actions);

        self.executed = true;
        Ok(Some(PreparedBatch {
            trigger_id: self.id.clone(),
            unique_id: self.unique_id.clone(),
            actions,
            started,
        }))
    }

    /// 执行第三阶段：中止的批次与重复触发器都会重新布防
    pub fn finish(&mut self, outcome: &BatchOutcome) {
        if outcome.abandoned || self.recurrent {
            self.executed = false;
        }
    }

    /// 过滤器出错时撤销已执行标记
    pub fn abort(&mut self) {
        self.executed = false;
    }

    /// 执行触发器绑定的动作列表
    ///
    /// 调用方必须持有账户的独占锁。禁用账户、动作列表读取失败与过滤器错误
    /// 会返回错误；动作类型未注册或处理器失败只记录日志并中止剩余动作，
    /// 此时触发器重新布防且不持久化账户。
    pub fn execute(&mut self, mut account: Option<&mut Account>, engine: &TriggerEngine) -> Result<()> {
        let state = account.as_deref().map(Account::state);
        let Some(batch) = self.begin(state, engine)? else {
            return Ok(());
        };

        let outcome = match batch.run(account.as_deref_mut(), engine) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.abort();
                return Err(e);
            }
        };
        self.finish(&outcome);
        engine.persist_after(account.as_deref(), &outcome)
    }
}

impl PreparedBatch {
    /// 排序后的动作列表
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// 执行第二阶段：按顺序执行动作
    pub fn run(mut self, mut account: Option<&mut Account>, engine: &TriggerEngine) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for i in 0..self.actions.len() {
            let action = &self.actions[i];
            if !action.filters.is_empty() {
                let tenant = engine.tenant_of(&action.id);
                let data = DataContext::for_request(account.as_deref())?;
                match engine.filters.pass(tenant, &action.filters, &data) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(action_type = %action.action_type, "动作过滤器未通过，跳过");
                        continue;
                    }
                    Err(e) => {
                        error!(
                            trigger_id = %self.trigger_id,
                            action_type = %action.action_type,
                            error = %e,
                            "动作过滤器评估失败"
                        );
                        record_trigger_execution(OUTCOME_FILTER_ERROR, self.started.elapsed().as_secs_f64());
                        return Err(e);
                    }
                }
            }

            let action = &mut self.actions[i];
            let balance = action.balance.get_or_insert_with(BalanceFilter::default);
            match parse_time_detect_layout(&action.expiration_string, engine.timezone(), engine.now()) {
                Ok(Some(expiration)) => balance.expiration_date = Some(expiration),
                Ok(None) => {}
                Err(e) => {
                    debug!(expiration = %action.expiration_string, error = %e, "忽略无法解析的过期时间");
                }
            }

            let action = &self.actions[i];
            let Some(handler) = engine.registry.resolve(&action.action_type) else {
                error!(
                    trigger_id = %self.trigger_id,
                    action_type = %action.action_type,
                    "动作类型不可用，终止执行"
                );
                record_action_execution(&action.action_type, "unknown_type");
                outcome.abandoned = true;
                break;
            };

            if let Err(e) = handler.execute(
                account.as_deref_mut(),
                action,
                &self.actions,
                engine.filters.as_ref(),
                None,
            ) {
                error!(
                    trigger_id = %self.trigger_id,
                    action_type = %action.action_type,
                    error = %e,
                    "动作执行失败，终止执行"
                );
                record_action_execution(&action.action_type, "failed");
                outcome.abandoned = true;
                break;
            }
            record_action_execution(&action.action_type, "success");
            outcome.executed_actions += 1;

            if action.action_type == types::REMOVE_ACCOUNT {
                outcome.removal_fired = true;
            }
        }

        info!(
            trigger_id = %self.trigger_id,
            unique_id = %self.unique_id,
            executed_actions = outcome.executed_actions,
            abandoned = outcome.abandoned,
            removal_fired = outcome.removal_fired,
            "触发器执行完成"
        );
        record_trigger_execution(outcome.metric_label(), self.started.elapsed().as_secs_f64());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_trigger::ThresholdType;
    use crate::balance::Balance;
    use crate::clock::ManualClock;
    use crate::filters::MockFilterEvaluator;
    use crate::registry::ActionHandler;
    use crate::store::{MockAccountStore, MockActionStore};
    use chrono::TimeZone;
    use mockall::predicate::eq;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::time::Duration;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    /// 记录调用顺序的处理器
    struct RecordingHandler {
        action_type: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        seen: Arc<Mutex<Vec<Action>>>,
        fail: bool,
    }

    impl ActionHandler for RecordingHandler {
        fn action_type(&self) -> &str {
            self.action_type
        }

        fn execute(
            &self,
            account: Option<&mut Account>,
            action: &Action,
            siblings: &[Action],
            _filters: &dyn FilterEvaluator,
            extra: Option<&Value>,
        ) -> Result<()> {
            assert!(extra.is_none());
            assert!(!siblings.is_empty());
            self.calls.lock().push(action.id.clone());
            self.seen.lock().push(action.clone());
            if let Some(account) = account {
                account.update_time = Some(start());
            }
            if self.fail {
                return Err(TriggerError::action_failed(self.action_type, "boom"));
            }
            Ok(())
        }
    }

    struct Fixture {
        actions: MockActionStore,
        accounts: MockAccountStore,
        filters: MockFilterEvaluator,
        calls: Arc<Mutex<Vec<String>>>,
        seen: Arc<Mutex<Vec<Action>>>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                actions: MockActionStore::new(),
                accounts: MockAccountStore::new(),
                filters: MockFilterEvaluator::new(),
                calls: Arc::new(Mutex::new(Vec::new())),
                seen: Arc::new(Mutex::new(Vec::new())),
                clock: Arc::new(ManualClock::new(start())),
            }
        }

        fn with_actions(mut self, actions: Vec<Action>) -> Self {
            self.actions
                .expect_get_actions()
                .returning(move |_| Ok(actions.clone()));
            self
        }

        fn build(self) -> (TriggerEngine, Arc<Mutex<Vec<String>>>, Arc<ManualClock>) {
            let mut registry = ActionRegistry::new();
            registry
                .register(Arc::new(RecordingHandler {
                    action_type: "*record",
                    calls: Arc::clone(&self.calls),
                    seen: Arc::clone(&self.seen),
                    fail: false,
                }))
                .register(Arc::new(RecordingHandler {
                    action_type: "*fail",
                    calls: Arc::clone(&self.calls),
                    seen: Arc::clone(&self.seen),
                    fail: true,
                }));
            let engine = TriggerEngine::new(
                Arc::new(self.actions),
                Arc::new(self.accounts),
                Arc::new(registry),
                Arc::new(self.filters),
            )
            .with_clock(self.clock.clone())
            .with_timezone(Timezone::Utc);
            (engine, self.calls, self.clock)
        }
    }

    fn trigger() -> ActionTrigger {
        ActionTrigger::new("T1", "u1", ThresholdType::MinBalance, "ACT")
            .with_balance(BalanceFilter::of_type("*monetary"))
    }

    fn account() -> Account {
        Account::new("cgrates.org:1001").with_balance("*monetary", Balance::new("main", 1.0))
    }

    #[test]
    fn test_execute_runs_actions_by_weight_and_persists() {
        let mut fixture = Fixture::new().with_actions(vec![
            Action::new("low", "*record").with_weight(10.0),
            Action::new("high", "*record").with_weight(20.0),
        ]);
        fixture
            .accounts
            .expect_set_account()
            .times(1)
            .returning(|_| Ok(()));
        let (engine, calls, _) = fixture.build();

        let mut t = trigger();
        let mut acc = account();
        t.execute(Some(&mut acc), &engine).unwrap();

        assert_eq!(*calls.lock(), ["high", "low"]);
        assert!(t.executed);
        assert_eq!(t.last_execution_time, Some(start()));
        assert_eq!(acc.update_time, Some(start()));
    }

    #[test]
    fn test_disabled_account_is_rejected() {
        let mut fixture = Fixture::new();
        fixture.actions.expect_get_actions().never();
        fixture.accounts.expect_set_account().never();
        let (engine, calls, _) = fixture.build();

        let mut t = trigger();
        let mut acc = account();
        acc.disabled = true;
        let err = t.execute(Some(&mut acc), &engine).unwrap_err();

        assert!(matches!(err, TriggerError::AccountDisabled { account_id } if account_id == "cgrates.org:1001"));
        assert!(calls.lock().is_empty());
        assert!(!t.executed);
        assert_eq!(t.last_execution_time, Some(start()));
    }

    #[test]
    fn test_missing_action_list_is_returned() {
        let mut fixture = Fixture::new();
        fixture
            .actions
            .expect_get_actions()
            .with(eq("ACT"))
            .returning(|id| Err(TriggerError::not_found("ActionList", id)));
        fixture.accounts.expect_set_account().never();
        let (engine, _, _) = fixture.build();

        let mut t = trigger();
        let err = t.execute(Some(&mut account()), &engine).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(!t.executed);
    }

    #[test]
    fn test_recurrent_trigger_is_throttled() {
        let mut fixture = Fixture::new().with_actions(vec![Action::new("a", "*record")]);
        fixture.accounts.expect_set_account().times(2).returning(|_| Ok(()));
        let (engine, calls, clock) = fixture.build();

        let mut t = trigger().recurrent(Duration::from_secs(60));
        let mut acc = account();
        t.execute(Some(&mut acc), &engine).unwrap();
        assert!(!t.executed, "重复触发器执行后重新布防");

        clock.advance(TimeDelta::seconds(30));
        t.execute(Some(&mut acc), &engine).unwrap();
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(t.last_execution_time, Some(start()));

        clock.advance(TimeDelta::seconds(31));
        t.execute(Some(&mut acc), &engine).unwrap();
        assert_eq!(calls.lock().len(), 2);
        assert_eq!(t.last_execution_time, Some(start() + TimeDelta::seconds(61)));
    }

    #[test]
    fn test_last_execution_time_is_monotonic() {
        let mut fixture = Fixture::new().with_actions(vec![Action::new("a", "*record")]);
        fixture.accounts.expect_set_account().returning(|_| Ok(()));
        let (engine, _, clock) = fixture.build();

        let mut t = trigger();
        t.last_execution_time = Some(start() + TimeDelta::hours(1));
        clock.set(start());
        t.execute(Some(&mut account()), &engine).unwrap();
        assert_eq!(t.last_execution_time, Some(start() + TimeDelta::hours(1)));
    }

    #[test]
    fn test_handler_failure_abandons_batch() {
        let mut fixture = Fixture::new().with_actions(vec![
            Action::new("first", "*record").with_weight(30.0),
            Action::new("second", "*fail").with_weight(20.0),
            Action::new("third", "*record").with_weight(10.0),
        ]);
        fixture.accounts.expect_set_account().never();
        let (engine, calls, _) = fixture.build();

        let mut t = trigger();
        t.execute(Some(&mut account()), &engine).unwrap();

        assert_eq!(*calls.lock(), ["first", "second"]);
        // 中止的批次重新布防，允许调用方重试
        assert!(!t.executed);
    }

    #[test]
    fn test_filter_mismatch_skips_only_that_action() {
        let mut fixture = Fixture::new().with_actions(vec![
            Action::new("cgrates.org:skipped", "*record")
                .with_weight(20.0)
                .with_filters(["*string:~*req.ID:other"]),
            Action::new("kept", "*record").with_weight(10.0),
        ]);
        fixture
            .filters
            .expect_pass()
            .withf(|tenant, filters, data| {
                tenant == "cgrates.org"
                    && filters == ["*string:~*req.ID:other".to_string()]
                    && data.get_field("*req.ID").and_then(|v| v.as_str()) == Some("cgrates.org:1001")
            })
            .times(1)
            .returning(|_, _, _| Ok(false));
        fixture.accounts.expect_set_account().times(1).returning(|_| Ok(()));
        let (engine, calls, _) = fixture.build();

        let mut t = trigger();
        t.execute(Some(&mut account()), &engine).unwrap();
        assert_eq!(*calls.lock(), ["kept"]);
        assert!(t.executed);
    }

    #[test]
    fn test_filter_error_is_returned() {
        let mut fixture = Fixture::new().with_actions(vec![
            Action::new("filtered", "*record").with_filters(["FLTR_MISSING"]),
            Action::new("never", "*record"),
        ]);
        fixture
            .filters
            .expect_pass()
            .returning(|tenant, _, _| Err(TriggerError::FilterNotFound(format!("{}:FLTR_MISSING", tenant))));
        fixture.accounts.expect_set_account().never();
        let (engine, calls, _) = fixture.build();

        let mut t = trigger();
        let err = t.execute(Some(&mut account()), &engine).unwrap_err();
        assert!(matches!(err, TriggerError::FilterNotFound(id) if id == "cgrates.org:FLTR_MISSING"));
        assert!(calls.lock().is_empty());
        // 与中止的批次一致：过滤器出错时撤销锁存，修正过滤器后可以重试
        assert!(!t.executed);
    }

    #[test]
    fn test_process_account_without_changes_skips_persistence() {
        let mut fixture = Fixture::new();
        fixture
            .accounts
            .expect_get_account()
            .with(eq("cgrates.org:1001"))
            .returning(|_| Ok(account().with_trigger(trigger())));
        fixture.accounts.expect_set_account().never();
        let (engine, calls, _) = fixture.build();

        let run = engine.process_account("cgrates.org:1001", None).unwrap();
        assert_eq!(run, TriggerRun::default());
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_update_account_persists_change() {
        let mut fixture = Fixture::new();
        fixture
            .accounts
            .expect_get_account()
            .returning(|_| Ok(account().with_trigger(trigger())));
        fixture
            .accounts
            .expect_set_account()
            .withf(|a| a.total_value("*monetary") == 0.5)
            .times(1)
            .returning(|_| Ok(()));
        let (engine, calls, _) = fixture.build();

        let run = engine
            .update_account("cgrates.org:1001", None, |a| {
                a.apply_balance_change(&BalanceFilter::of_type("*monetary"), -0.5, false, start())
            })
            .unwrap();
        // 余额 0.5 仍高于阈值 0
        assert_eq!(run.fired, 0);
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_expiration_string_is_applied() {
        let mut fixture = Fixture::new().with_actions(vec![
            Action::new("dated", "*record")
                .with_weight(30.0)
                .with_expiration("2030-01-01T00:00:00Z"),
            Action::new("relative", "*record")
                .with_weight(20.0)
                .with_balance(BalanceFilter::of_type("*voice"))
                .with_expiration("+1h"),
            Action::new("unlimited", "*record")
                .with_weight(10.0)
                .with_expiration("*unlimited"),
        ]);
        fixture.accounts.expect_set_account().never();
        let seen = Arc::clone(&fixture.seen);
        let (engine, _, _) = fixture.build();

        let mut t = trigger();
        let batch = t.begin(None, &engine).unwrap().unwrap();
        assert!(batch.actions()[0].balance.is_none());
        let outcome = batch.run(None, &engine).unwrap();
        assert_eq!(outcome.executed_actions, 3);

        let seen = seen.lock();
        let dated = seen[0].balance.as_ref().unwrap();
        assert_eq!(dated.expiration_date, Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
        let relative = seen[1].balance.as_ref().unwrap();
        assert_eq!(relative.balance_type.as_deref(), Some("*voice"));
        assert_eq!(relative.expiration_date, Some(start() + TimeDelta::hours(1)));
        assert_eq!(seen[2].balance, Some(BalanceFilter::default()));
    }

    #[test]
    fn test_execute_without_account_skips_persistence() {
        let mut fixture = Fixture::new().with_actions(vec![Action::new("a", "*record")]);
        fixture.accounts.expect_set_account().never();
        let (engine, calls, _) = fixture.build();

        let mut t = trigger();
        t.execute(None, &engine).unwrap();
        assert_eq!(calls.lock().len(), 1);
        assert!(t.executed);
    }

    #[test]
    fn test_tenant_of() {
        let (engine, _, _) = Fixture::new().build();
        assert_eq!(engine.tenant_of("itsyscom.com:ACT"), "itsyscom.com");
        assert_eq!(engine.tenant_of("ACT"), "cgrates.org");
        assert_eq!(engine.tenant_of(":ACT"), "cgrates.org");
    }

    #[test]
    fn test_with_config() {
        let (engine, _, _) = Fixture::new().build();
        let mut config = AppConfig::default();
        config.general.default_timezone = "+02:00".to_string();
        config.general.default_tenant = "itsyscom.com".to_string();
        config.engine.persist_accounts = false;

        let engine = engine.with_config(&config).unwrap();
        assert_eq!(engine.default_tenant(), "itsyscom.com");
        assert_eq!(engine.timezone(), &"+02:00".parse::<Timezone>().unwrap());

        config.general.default_timezone = "Europe/Berlin".to_string();
        let (engine, _, _) = Fixture::new().build();
        let engine = engine.with_config(&config).unwrap();
        assert_eq!(engine.timezone().to_string(), "Europe/Berlin");

        config.general.default_timezone = "Nowhere/Else".to_string();
        let (engine, _, _) = Fixture::new().build();
        assert!(matches!(
            engine.with_config(&config),
            Err(TriggerError::InvalidTimezone(_))
        ));
    }
}
