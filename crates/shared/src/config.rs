//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 通用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 账户 ID 不含租户前缀时使用的默认租户
    pub default_tenant: String,
    /// 时间解析使用的默认时区：`UTC`、`Local`、固定偏移（如 `+02:00`）或 IANA 时区名（如 `Europe/Berlin`）
    pub default_timezone: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_tenant: "cgrates.org".to_string(),
            default_timezone: "Local".to_string(),
        }
    }
}

/// 触发器引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 触发器执行完成后是否持久化账户
    pub persist_accounts: bool,
    /// 检查完触发器后是否一并清理已过期余额
    pub remove_expired_balances: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_accounts: true,
            remove_expired_balances: true,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub general: GeneralConfig,
    pub engine: EngineConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（CHARGING_ 前缀，如 CHARGING_GENERAL__DEFAULT_TIMEZONE -> general.default_timezone）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("CHARGING_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            // 字段名本身含下划线，层级之间使用双下划线分隔
            .add_source(
                Environment::with_prefix("CHARGING")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 注入服务名后的可观测性配置
    pub fn observability_config(&self) -> ObservabilityConfig {
        self.observability
            .clone()
            .with_service_name(&self.service_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.general.default_timezone, "Local");
        assert_eq!(config.general.default_tenant, "cgrates.org");
        assert!(config.engine.persist_accounts);
        assert!(!config.is_production());
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        // SAFETY: 测试环境中单线程设置，指向不存在的目录
        unsafe {
            std::env::set_var("CONFIG_DIR", "/nonexistent-charging-config");
        }
        let config = AppConfig::load("action-trigger-engine").unwrap();
        unsafe {
            std::env::remove_var("CONFIG_DIR");
        }

        assert_eq!(config.service_name, "action-trigger-engine");
        assert_eq!(config.general.default_tenant, "cgrates.org");
        assert!(config.engine.persist_accounts);
    }

    #[test]
    fn test_observability_config_carries_service_name() {
        let config = AppConfig {
            service_name: "trigger-engine".to_string(),
            ..Default::default()
        };
        assert_eq!(config.observability_config().service_name, "trigger-engine");
    }
}
