//! 动作触发器引擎命令行入口
//!
//! 读取 JSON 资费方案，逐个账户检查触发器并输出执行摘要。

use std::sync::Arc;

use anyhow::{Context, Result};
use charging_shared::{config::AppConfig, observability};
use tracing::{info, warn};

use trigger_engine::{
    filters::InlineFilterEvaluator, AccountStore, ActionRegistry, InMemoryDataManager, SystemClock,
    TariffPlan, TriggerEngine,
};

fn main() -> Result<()> {
    // 1. 加载配置，失败时使用默认值
    let config = AppConfig::load("action-trigger-engine").unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    // 2. 初始化可观测性
    let _guard = observability::init(&config.observability_config())?;
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 读取资费方案
    let path = std::env::args()
        .nth(1)
        .context("usage: trigger-engine <tariff-plan.json>")?;
    let json = std::fs::read_to_string(&path).with_context(|| format!("读取资费方案失败: {}", path))?;
    let plan = TariffPlan::from_json(&json)?;

    // 4. 加载数据与过滤器
    let store = Arc::new(InMemoryDataManager::new());
    let account_ids = store.load_tariff_plan(&plan);

    let filters = Arc::new(InlineFilterEvaluator::new());
    for profile in &plan.filters {
        filters.register_profile(profile)?;
    }

    // 5. 构建引擎
    let clock = Arc::new(SystemClock);
    let registry = Arc::new(ActionRegistry::with_defaults(store.clone(), clock.clone()));
    let engine = TriggerEngine::new(store.clone(), store.clone(), registry, filters)
        .with_clock(clock)
        .with_config(&config)?;
    info!(
        timezone = %engine.timezone(),
        tenant = engine.default_tenant(),
        "Trigger engine initialized"
    );

    // 6. 逐个账户检查到期类触发器并清理过期数据
    let (mut fired, mut removed, mut failed) = (0, 0, 0);
    for account_id in &account_ids {
        match engine.process_account(account_id, None) {
            Ok(run) => {
                fired += run.fired;
                removed += usize::from(run.removed);
            }
            Err(e) => {
                failed += 1;
                warn!(account_id = %account_id, error = %e, "账户触发器检查失败");
            }
        }
    }

    info!(
        accounts = account_ids.len(),
        fired,
        removed,
        failed,
        persisted = store.set_account_calls(),
        "触发器检查完成"
    );

    for account_id in store.account_ids() {
        let account = store.get_account(&account_id)?;
        println!("{}", serde_json::to_string(&account)?);
    }
    Ok(())
}
