//! 账户级互斥锁
//!
//! 触发器执行要求调用方持有账户的独占锁。不同账户的锁相互独立，
//! 因此多个账户可以完全并行处理。

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

/// 按账户 ID 管理的锁表
#[derive(Debug, Default, Clone)]
pub struct AccountLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, account_id: &str) -> Arc<Mutex<()>> {
        // 先查后插，避免在已存在时分配 key
        if let Some(lock) = self.locks.get(account_id) {
            return Arc::clone(lock.value());
        }
        Arc::clone(
            self.locks
                .entry(account_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// 在持有账户锁期间执行闭包
    pub fn with_lock<R>(&self, account_id: &str, f: impl FnOnce() -> R) -> R {
        let lock = self.lock_for(account_id);
        let _guard = lock.lock();
        trace!(account_id, "已获取账户锁");
        f()
    }

    /// 当前账户锁是否被占用
    pub fn is_locked(&self, account_id: &str) -> bool {
        self.locks
            .get(account_id)
            .is_some_and(|lock| lock.is_locked())
    }

    /// 已创建的锁数量
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
