//! 条件评估器
//!
//! 对单个字段值执行过滤器比较，数值与时间值都支持大小比较。

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::kinds::FilterKind;
use crate::error::{Result, TriggerError};

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件，任一期望值满足即通过
    ///
    /// # Arguments
    /// * `field_value` - 从上下文中获取的字段值
    /// * `kind` - 过滤器类型
    /// * `expected` - 规则中定义的期望值列表
    pub fn evaluate(field_value: Option<&Value>, kind: FilterKind, expected: &[String]) -> Result<bool> {
        match kind {
            FilterKind::Exists => return Ok(!matches!(field_value, None | Some(Value::Null))),
            FilterKind::Empty => return Ok(Self::is_empty(field_value)),
            _ => {}
        }

        // 字段不存在时比较类操作一律不通过
        let Some(field_value) = field_value else {
            return Ok(false);
        };

        for value in expected {
            let passed = match kind {
                FilterKind::String => Self::eq(field_value, value),
                FilterKind::Prefix => Self::as_string(field_value).starts_with(value.as_str()),
                FilterKind::Suffix => Self::as_string(field_value).ends_with(value.as_str()),
                FilterKind::Gt => Self::compare(field_value, value, |o| o.is_gt())?,
                FilterKind::Gte => Self::compare(field_value, value, |o| o.is_ge())?,
                FilterKind::Lt => Self::compare(field_value, value, |o| o.is_lt())?,
                FilterKind::Lte => Self::compare(field_value, value, |o| o.is_le())?,
                FilterKind::Exists | FilterKind::Empty => unreachable!(),
            };
            if passed {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 判断值是否为空
    fn is_empty(value: Option<&Value>) -> bool {
        match value {
            None => true,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(arr)) => arr.is_empty(),
            Some(Value::Object(obj)) => obj.is_empty(),
            _ => false,
        }
    }

    /// 相等比较，数值统一转为浮点数（10 == 10.0）
    fn eq(field: &Value, expected: &str) -> bool {
        if let (Some(f1), Ok(f2)) = (Self::as_f64(field), expected.parse::<f64>()) {
            return (f1 - f2).abs() < f64::EPSILON;
        }
        Self::as_string(field) == expected
    }

    /// 数值或时间比较
    fn compare<F>(field: &Value, expected: &str, cmp: F) -> Result<bool>
    where
        F: Fn(std::cmp::Ordering) -> bool,
    {
        if let (Some(f1), Ok(f2)) = (Self::as_f64(field), expected.parse::<f64>()) {
            return Ok(f1.partial_cmp(&f2).is_some_and(cmp));
        }
        if let (Some(t1), Some(t2)) = (Self::as_time(field), Self::parse_time(expected)) {
            return Ok(cmp(t1.cmp(&t2)));
        }
        Err(TriggerError::TypeMismatch {
            expected: format!("number or datetime ({})", expected),
            actual: Self::type_name(field).to_string(),
        })
    }

    fn as_time(value: &Value) -> Option<DateTime<Utc>> {
        value.as_str().and_then(Self::parse_time)
    }

    fn parse_time(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// 尝试将 Value 转换为 f64
    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn as_string(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// 获取值的类型名称
    fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}
