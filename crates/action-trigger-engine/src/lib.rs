//! 动作触发器引擎
//!
//! 账户余额越过阈值时执行预定义的动作列表：
//! - 触发器节流、锁存与重复触发
//! - 按权重排序的动作执行与过滤器评估
//! - 按动作类型注册的可扩展处理器
//! - 账户级并发控制

pub mod account;
pub mod action;
pub mod action_trigger;
pub mod balance;
pub mod clock;
pub mod engine;
pub mod error;
pub mod field;
pub mod filters;
pub mod handlers;
pub mod locks;
pub mod registry;
pub mod store;
pub mod timeparse;

pub use account::{Account, TriggerRun};
pub use action::{Action, MatchParameters};
pub use action_trigger::{ActionTrigger, ActionTriggers, ThresholdType};
pub use balance::{Balance, BalanceFilter, StringMap};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{BatchOutcome, PreparedBatch, TriggerEngine};
pub use error::{Result, TriggerError};
pub use field::{FieldAccess, FieldValue};
pub use registry::{ActionHandler, ActionRegistry};
pub use store::{AccountStore, ActionStore, InMemoryDataManager, TariffPlan};
pub use timeparse::Timezone;
