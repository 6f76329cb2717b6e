//! 触发器引擎性能基准测试
//!
//! 测试覆盖：
//! - 动作匹配
//! - 触发器集合排序
//! - 账户级触发器检查

use std::hint::black_box;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use trigger_engine::{
    action::types, filters::InlineFilterEvaluator, Account, AccountStore, Action, ActionRegistry,
    ActionTrigger, ActionTriggers, Balance, BalanceFilter, InMemoryDataManager, ManualClock,
    ThresholdType, Timezone, TriggerEngine,
};

/// 创建指定数量、权重交错的触发器集合
fn create_triggers(count: usize) -> ActionTriggers {
    (0..count)
        .map(|i| {
            ActionTrigger::new(format!("T{}", i % 10), format!("u{}", i), ThresholdType::MinBalance, "ACT")
                .with_weight(((i * 7) % 13) as f64)
                .with_balance(BalanceFilter::of_type("*monetary"))
        })
        .collect()
}

fn bench_match(c: &mut Criterion) {
    let trigger = ActionTrigger::new("G1", "u1", ThresholdType::MinBalance, "ACT")
        .with_balance(BalanceFilter::of_type("*monetary").with_weight(10.0));

    let by_group = Action::new("ACT", types::RESET_TRIGGERS)
        .with_balance(BalanceFilter::default())
        .with_extra_parameters(r#"{"GroupID":"G1"}"#);
    let by_balance = Action::new("ACT", types::RESET_TRIGGERS)
        .with_balance(BalanceFilter::of_type("*monetary").with_weight(10.0));

    let mut group = c.benchmark_group("match");
    group.bench_function("group_id", |b| {
        b.iter(|| black_box(trigger.matches(black_box(Some(&by_group)))))
    });
    group.bench_function("balance_predicate", |b| {
        b.iter(|| black_box(trigger.matches(black_box(Some(&by_balance)))))
    });
    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort");
    for count in [10usize, 100, 1000] {
        let triggers = create_triggers(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &triggers, |b, triggers| {
            b.iter(|| {
                let mut set = triggers.clone();
                set.sort();
                black_box(set)
            })
        });
    }
    group.finish();
}

fn bench_process_account(c: &mut Criterion) {
    let store = Arc::new(InMemoryDataManager::new());
    store.set_actions(
        "ACT",
        vec![Action::new("ACT", types::LOG), Action::new("ACT", types::ALLOW_NEGATIVE)],
    );
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    let registry = Arc::new(ActionRegistry::with_defaults(store.clone(), clock.clone()));
    let engine = TriggerEngine::new(
        store.clone(),
        store.clone(),
        registry,
        Arc::new(InlineFilterEvaluator::new()),
    )
    .with_clock(clock)
    .with_timezone(Timezone::Utc)
    .with_persist_accounts(false);

    let mut group = c.benchmark_group("process_account");
    for count in [1usize, 10, 50] {
        let mut account = Account::new("cgrates.org:bench").with_balance("*monetary", Balance::new("main", 10.0));
        account.action_triggers = create_triggers(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &account, |b, account| {
            b.iter(|| {
                store.set_account(account).unwrap_or_default();
                black_box(
                    engine
                        .update_account(&account.id, None, |a| {
                            a.balance_map.entry("*monetary".to_string()).or_default()[0].set_value(0.0);
                            Ok(())
                        })
                        .unwrap_or_default(),
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_match, bench_sort, bench_process_account);
criterion_main!(benches);
