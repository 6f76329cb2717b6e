//! 内联过滤器评估
//!
//! 过滤器条目以 `*` 开头时按内联规则解析，否则视为过滤器档案 ID，
//! 在 `tenant:id` 档案表中查找。

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::evaluator::ConditionEvaluator;
use super::kinds::FilterRule;
use super::{DataContext, FilterEvaluator};
use crate::error::{Result, TriggerError};

/// 过滤器档案：一组必须全部通过的内联规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterProfile {
    pub tenant: String,
    #[serde(rename = "ID")]
    pub id: String,
    pub rules: Vec<String>,
}

impl FilterProfile {
    pub fn tenant_id(&self) -> String {
        format!("{}:{}", self.tenant, self.id)
    }
}

/// 内联过滤器评估器
#[derive(Clone, Default)]
pub struct InlineFilterEvaluator {
    profiles: Arc<DashMap<String, Vec<FilterRule>>>,
}

impl InlineFilterEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册过滤器档案，规则在注册时解析
    #[instrument(skip(self, profile), fields(profile = %profile.tenant_id()))]
    pub fn register_profile(&self, profile: &FilterProfile) -> Result<()> {
        let rules = profile
            .rules
            .iter()
            .map(|r| r.parse::<FilterRule>())
            .collect::<Result<Vec<_>>>()?;
        self.profiles.insert(profile.tenant_id(), rules);
        info!("过滤器档案已注册");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    fn check_rule(rule: &FilterRule, data: &DataContext) -> Result<bool> {
        let field = data.get_field(&rule.element);
        let passed = ConditionEvaluator::evaluate(field, rule.kind, &rule.values)?;
        Ok(passed != rule.negated)
    }
}

impl FilterEvaluator for InlineFilterEvaluator {
    fn pass(&self, tenant: &str, filters: &[String], data: &DataContext) -> Result<bool> {
        for filter in filters {
            let passed = if FilterRule::is_inline(filter) {
                Self::check_rule(&filter.parse()?, data)?
            } else {
                let key = format!("{}:{}", tenant, filter);
                let rules = self
                    .profiles
                    .get(&key)
                    .ok_or_else(|| TriggerError::FilterNotFound(key.clone()))?;
                let mut all = true;
                for rule in rules.iter() {
                    if !Self::check_rule(rule, data)? {
                        all = false;
                        break;
                    }
                }
                all
            };
            if !passed {
                debug!(tenant, filter = %filter, "过滤器未通过");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
