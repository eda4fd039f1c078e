//! Declarative validation rules over resolved values.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::models::{Action, ActionInput, ActionProcessingContext, ActionType, RuleCheck, ValidationRule};
use crate::resolver::resolve;
use crate::{ActionError, ActionProcessor};

/// Evaluates every rule and fails with the full list of violations.
#[derive(Debug, Default)]
pub struct ValidateRulesProcessor;

impl ValidateRulesProcessor {
    fn check(rule: &ValidationRule, value: Option<&str>) -> Result<(), String> {
        let name = &rule.name;
        match (&rule.check, value) {
            (RuleCheck::Required, Some(v)) if !v.trim().is_empty() => Ok(()),
            (RuleCheck::Required, _) => Err(format!("{name}: value is required")),
            (_, None) => Err(format!("{name}: value could not be resolved ({})", rule.value)),
            (RuleCheck::Equals { expected }, Some(v)) if v == expected => Ok(()),
            (RuleCheck::Equals { expected }, Some(v)) => {
                Err(format!("{name}: expected '{expected}', got '{v}'"))
            }
            (RuleCheck::MinLength { min }, Some(v)) if v.chars().count() >= *min => Ok(()),
            (RuleCheck::MinLength { min }, Some(_)) => {
                Err(format!("{name}: shorter than {min} characters"))
            }
            (RuleCheck::MaxLength { max }, Some(v)) if v.chars().count() <= *max => Ok(()),
            (RuleCheck::MaxLength { max }, Some(_)) => {
                Err(format!("{name}: longer than {max} characters"))
            }
            (RuleCheck::OneOf { allowed }, Some(v)) if allowed.iter().any(|a| a == v) => Ok(()),
            (RuleCheck::OneOf { allowed }, Some(v)) => {
                Err(format!("{name}: '{v}' is not one of [{}]", allowed.join(", ")))
            }
            (RuleCheck::IsJson, Some(v)) => serde_json::from_str::<serde_json::Value>(v)
                .map(|_| ())
                .map_err(|e| format!("{name}: not valid JSON ({e})")),
        }
    }
}

#[async_trait]
impl ActionProcessor for ValidateRulesProcessor {
    fn action_type(&self) -> ActionType {
        ActionType::ValidateRules
    }

    async fn process(&self, action: &Action, ctx: &ActionProcessingContext) -> Result<String, ActionError> {
        let ActionInput::ValidateRules(input) = &action.input else {
            return Err(super::unexpected_input(ActionType::ValidateRules, action));
        };

        let violations: Vec<String> = input
            .rules
            .iter()
            .filter_map(|rule| Self::check(rule, resolve(&rule.value, ctx).as_deref()).err())
            .collect();

        debug!(action_id = %action.id, rules = input.rules.len(), violations = violations.len(), "rules evaluated");

        if !violations.is_empty() {
            return Err(ActionError::InvalidInput(format!(
                "validation failed: {}",
                violations.join("; ")
            )));
        }

        Ok(json!({ "valid": true, "rules": input.rules.len() }).to_string())
    }
}
