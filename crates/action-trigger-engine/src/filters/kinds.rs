//! 内联过滤器规则
//!
//! 语法为 `*kind:~*req.Path:value1;value2`，`~` 前缀表示从数据上下文取值。

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TriggerError};

/// 过滤器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    // 字符串匹配
    String,
    Prefix,
    Suffix,

    // 数值或时间比较
    Gt,
    Gte,
    Lt,
    Lte,

    // 存在性检查
    Exists,
    Empty,
}

impl FilterKind {
    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "string" => Self::String,
            "prefix" => Self::Prefix,
            "suffix" => Self::Suffix,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "exists" => Self::Exists,
            "empty" => Self::Empty,
            _ => return None,
        })
    }

    /// 是否需要比较值
    pub fn needs_values(&self) -> bool {
        !matches!(self, Self::Exists | Self::Empty)
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "*string",
            Self::Prefix => "*prefix",
            Self::Suffix => "*suffix",
            Self::Gt => "*gt",
            Self::Gte => "*gte",
            Self::Lt => "*lt",
            Self::Lte => "*lte",
            Self::Exists => "*exists",
            Self::Empty => "*empty",
        };
        write!(f, "{}", s)
    }
}

/// 单条内联过滤规则
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    pub kind: FilterKind,
    /// `*not` 前缀取反
    pub negated: bool,
    /// 数据路径（不含 `~`）
    pub element: String,
    pub values: Vec<String>,
}

impl FilterRule {
    /// 是否为内联规则（而非过滤器档案 ID）
    pub fn is_inline(s: &str) -> bool {
        s.starts_with('*')
    }
}

impl FromStr for FilterRule {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let (Some(tag), Some(element)) = (parts.next(), parts.next()) else {
            return Err(TriggerError::FilterParse(s.to_string()));
        };
        let values = parts.next().unwrap_or_default();

        let tag = tag
            .strip_prefix('*')
            .ok_or_else(|| TriggerError::FilterParse(s.to_string()))?;
        let (negated, tag) = match tag.strip_prefix("not") {
            Some(rest) => (true, rest),
            None => (false, tag),
        };
        let kind = FilterKind::from_tag(tag)
            .ok_or_else(|| TriggerError::FilterParse(format!("未知的过滤器类型: {}", s)))?;

        let element = element
            .strip_prefix('~')
            .ok_or_else(|| TriggerError::FilterParse(format!("过滤字段必须以 ~ 开头: {}", s)))?;
        if element.is_empty() {
            return Err(TriggerError::FilterParse(s.to_string()));
        }

        let values: Vec<String> = values
            .split(';')
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if kind.needs_values() && values.is_empty() {
            return Err(TriggerError::FilterParse(format!("缺少比较值: {}", s)));
        }

        Ok(Self {
            kind,
            negated,
            element: element.to_string(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule() {
        let rule: FilterRule = "*string:~*req.ID:cgrates.org:1001;cgrates.org:1002"
            .parse()
            .unwrap();
        assert_eq!(rule.kind, FilterKind::String);
        assert!(!rule.negated);
        assert_eq!(rule.element, "*req.ID");
        assert_eq!(rule.values, ["cgrates.org:1001", "cgrates.org:1002"]);
    }

    #[test]
    fn test_parse_negated_rule() {
        let rule: FilterRule = "*notexists:~*req.Disabled:".parse().unwrap();
        assert_eq!(rule.kind, FilterKind::Exists);
        assert!(rule.negated);
        assert!(rule.values.is_empty());

        let rule: FilterRule = "*notgte:~*req.Value:5".parse().unwrap();
        assert_eq!(rule.kind, FilterKind::Gte);
        assert!(rule.negated);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["*string", "*bogus:~*req.ID:1", "*string:*req.ID:1", "*gt:~*req.Value:", "string:~*req.ID:1"] {
            assert!(
                matches!(bad.parse::<FilterRule>(), Err(TriggerError::FilterParse(_))),
                "{bad}"
            );
        }
    }
}
