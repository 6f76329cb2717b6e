//! 触发器引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("账户 {account_id} 已禁用，无法执行触发器动作")]
    AccountDisabled { account_id: String },

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: &'static str, id: String },

    #[error("字段不存在: {0}")]
    FieldNotFound(String),

    #[error("未知的阈值类型: {0}")]
    UnknownThresholdType(String),

    #[error("过滤器未找到: {0}")]
    FilterNotFound(String),

    #[error("过滤器解析失败: {0}")]
    FilterParse(String),

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("时间解析失败: {0}")]
    TimeParse(String),

    #[error("无效的时区: {0}")]
    InvalidTimezone(String),

    #[error("动作执行失败: {action_type} - {message}")]
    ActionFailed {
        action_type: String,
        message: String,
    },

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TriggerError>;

impl TriggerError {
    /// 构造记录未找到错误
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// 构造动作执行失败错误
    pub fn action_failed(action_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActionFailed {
            action_type: action_type.into(),
            message: message.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountDisabled { .. } => "ACCOUNT_DISABLED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::FieldNotFound(_) => "FIELD_NOT_FOUND",
            Self::UnknownThresholdType(_) => "UNKNOWN_THRESHOLD_TYPE",
            Self::FilterNotFound(_) => "FILTER_NOT_FOUND",
            Self::FilterParse(_) => "FILTER_PARSE_ERROR",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::TimeParse(_) => "TIME_PARSE_ERROR",
            Self::InvalidTimezone(_) => "INVALID_TIMEZONE",
            Self::ActionFailed { .. } => "ACTION_FAILED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 引擎本身从不重试，调用方可据此决定是否重新执行
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
