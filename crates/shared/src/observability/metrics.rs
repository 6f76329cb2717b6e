//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    addr: SocketAddr,
}

impl MetricsHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// 初始化 Prometheus 指标导出
///
/// 导出器自带 HTTP 监听，在指定端口暴露 `/metrics`。
pub fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    register_common_metrics(&config.service_name);
    info!("Metrics exporter listening on {}", addr);

    Ok(MetricsHandle { addr })
}

/// 注册通用指标描述，出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "action_trigger_executions_total",
        "Total number of action trigger executions by outcome"
    );
    metrics::describe_counter!(
        "action_executions_total",
        "Total number of executed actions by type and outcome"
    );
    metrics::describe_histogram!(
        "action_trigger_execution_duration_seconds",
        "Action trigger execution duration in seconds"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 记录一次触发器执行
#[inline]
pub fn record_trigger_execution(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("action_trigger_executions_total", "outcome" => outcome).increment(1);
    metrics::histogram!(
        "action_trigger_execution_duration_seconds",
        "outcome" => outcome
    )
    .record(duration_secs);
}

/// 记录一次动作执行
#[inline]
pub fn record_action_execution(action_type: &str, outcome: &'static str) {
    metrics::counter!(
        "action_executions_total",
        "action_type" => action_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
