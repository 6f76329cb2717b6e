//! 字段路径访问
//!
//! 通过点号分隔的路径（如 `Balance.Type`）读取实体字段，
//! 供过滤器表达式与管理接口按名称访问触发器属性。

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::balance::{BalanceFilter, StringMap};
use crate::error::{Result, TriggerError};

/// 字段值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 未设置的可选字段
    Null,
    String(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    Duration(Duration),
    Time(DateTime<Utc>),
    StringMap(StringMap),
    Balance(Box<BalanceFilter>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Option<DateTime<Utc>>> for FieldValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Null, Self::Time)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::String(s) => f.write_str(s),
            Self::Float(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Duration(d) => f.write_str(&format_duration(*d)),
            Self::Time(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::StringMap(m) => f.write_str(&serde_json::to_string(m).unwrap_or_default()),
            Self::Balance(b) => f.write_str(&serde_json::to_string(b).unwrap_or_default()),
        }
    }
}

/// 按路径访问字段
pub trait FieldAccess {
    /// 解析路径并返回字段值
    fn field_as_value(&self, path: &[&str]) -> Result<FieldValue>;

    /// 返回字段值的字符串形式
    fn field_as_string(&self, path: &[&str]) -> Result<String> {
        self.field_as_value(path).map(|v| v.to_string())
    }

    /// 以点号分隔的路径访问字段
    fn field_by_path(&self, path: &str) -> Result<FieldValue> {
        let parts: Vec<&str> = path.split('.').collect();
        self.field_as_value(&parts)
    }
}

/// 空接收者（未初始化的实体）一律视为字段不存在
impl<T: FieldAccess> FieldAccess for Option<T> {
    fn field_as_value(&self, path: &[&str]) -> Result<FieldValue> {
        match self {
            Some(inner) => inner.field_as_value(path),
            None => Err(TriggerError::FieldNotFound(path.join("."))),
        }
    }
}

impl<T: FieldAccess> FieldAccess for &T {
    fn field_as_value(&self, path: &[&str]) -> Result<FieldValue> {
        (**self).field_as_value(path)
    }
}

/// 叶子字段：路径必须恰好只剩一段
pub(crate) fn leaf(path: &[&str], value: impl FnOnce() -> FieldValue) -> Result<FieldValue> {
    if path.len() != 1 {
        return Err(TriggerError::FieldNotFound(path.join(".")));
    }
    Ok(value())
}

/// 以 `1h2m3s` 风格格式化时长
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    let total = d.as_secs();
    let nanos = d.subsec_nanos();
    if total == 0 {
        return if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}µs", nanos / 1_000)
        } else {
            format!("{}ns", nanos)
        };
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if nanos == 0 {
        out.push_str(&format!("{}s", seconds));
    } else {
        let frac = format!("{:09}", nanos);
        out.push_str(&format!("{}.{}s", seconds, frac.trim_end_matches('0')));
    }
    out
}
