//! 动作过滤器
//!
//! 动作可以携带过滤器列表，执行前按账户数据评估，不通过时跳过该动作。

mod evaluator;
mod inline;
mod kinds;

pub use evaluator::ConditionEvaluator;
pub use inline::{FilterProfile, InlineFilterEvaluator};
pub use kinds::{FilterKind, FilterRule};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// 请求命名空间，账户数据挂在该键下
pub const REQ: &str = "*req";

/// 过滤器评估器
#[cfg_attr(test, mockall::automock)]
pub trait FilterEvaluator: Send + Sync {
    /// 所有过滤器均通过时返回 true
    fn pass(&self, tenant: &str, filters: &[String], data: &DataContext) -> Result<bool>;
}

/// 过滤器评估的数据上下文
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataContext {
    data: Map<String, Value>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在指定命名空间下挂载数据
    pub fn with(mut self, namespace: &str, value: Value) -> Self {
        self.data.insert(namespace.to_string(), value);
        self
    }

    /// 以请求命名空间挂载可序列化的实体
    pub fn for_request<T: Serialize>(entity: Option<&T>) -> Result<Self> {
        let value = match entity {
            Some(entity) => serde_json::to_value(entity)?,
            None => Value::Null,
        };
        Ok(Self::new().with(REQ, value))
    }

    /// 获取字段值（点号分隔路径，数字段用于数组下标，如 `*req.BalanceMap.*monetary.0.Value`）
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;

        for part in parts {
            match current {
                Value::Object(map) => {
                    current = map.get(part)?;
                }
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_field() {
        let ctx = DataContext::new().with(
            REQ,
            json!({
                "ID": "cgrates.org:1001",
                "BalanceMap": {"*monetary": [{"Value": 10.5}]}
            }),
        );

        assert_eq!(ctx.get_field("*req.ID"), Some(&json!("cgrates.org:1001")));
        assert_eq!(
            ctx.get_field("*req.BalanceMap.*monetary.0.Value"),
            Some(&json!(10.5))
        );
        assert_eq!(ctx.get_field("*req.BalanceMap.*voice"), None);
        assert_eq!(ctx.get_field("*opts.ID"), None);
    }

    #[test]
    fn test_for_request_without_entity() {
        let ctx = DataContext::for_request::<Value>(None).unwrap();
        assert_eq!(ctx.get_field(REQ), Some(&Value::Null));
        assert_eq!(ctx.get_field("*req.ID"), None);
    }
}
