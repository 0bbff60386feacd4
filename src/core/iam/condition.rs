//! Condition evaluation for policy rules
//!
//! A condition is a predicate over (principal, resource attributes). Each
//! predicate kind is one variant of [`Condition`] with its own arm in
//! [`Condition::evaluate`]; the engine only ever calls `evaluate`, so new
//! kinds never touch the matching loop.
//!
//! Source form:
//!
//! ```json
//! { "left": "resource.attr.author_id", "op": "equals", "right": "principal.id" }
//! { "left": "resource.attr.status", "op": "equals", "value": "published" }
//! ```

use crate::core::principal::{Principal, PrincipalField};
use crate::core::resource::{AttrValue, Attributes};
use crate::error::PolicyLoadError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Attribute names a condition may reference
const ATTRIBUTE_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Attribute holding the owning principal's id
pub const OWNER_ATTRIBUTE: &str = "author_id";

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
}

impl ConditionOperator {
    fn apply(&self, left: &str, right: &str) -> bool {
        match self {
            ConditionOperator::Equals => left == right,
            ConditionOperator::NotEquals => left != right,
        }
    }
}

impl FromStr for ConditionOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equals" | "eq" | "==" => Ok(ConditionOperator::Equals),
            "not_equals" | "ne" | "!=" => Ok(ConditionOperator::NotEquals),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionOperator::Equals => f.write_str("=="),
            ConditionOperator::NotEquals => f.write_str("!="),
        }
    }
}

/// A compiled predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Resource attribute compared with a principal field (ownership)
    AttributeMatchesPrincipal {
        attribute: String,
        operator: ConditionOperator,
        field: PrincipalField,
    },
    /// Resource attribute compared with a constant
    AttributeMatchesLiteral {
        attribute: String,
        operator: ConditionOperator,
        value: AttrValue,
    },
}

impl Condition {
    /// `resource.author_id == principal.id`
    pub fn owner() -> Self {
        Condition::AttributeMatchesPrincipal {
            attribute: OWNER_ATTRIBUTE.to_string(),
            operator: ConditionOperator::Equals,
            field: PrincipalField::Id,
        }
    }

    /// Evaluate against a principal and a resource snapshot
    ///
    /// A missing attribute never satisfies a condition, whatever the operator.
    pub fn evaluate(&self, principal: &Principal, attributes: &Attributes) -> bool {
        match self {
            Condition::AttributeMatchesPrincipal {
                attribute,
                operator,
                field,
            } => match attributes.get(attribute) {
                Some(value) => operator.apply(&value.canonical(), principal.field(*field)),
                None => false,
            },
            Condition::AttributeMatchesLiteral {
                attribute,
                operator,
                value,
            } => match attributes.get(attribute) {
                Some(actual) => operator.apply(&actual.canonical(), &value.canonical()),
                None => false,
            },
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::AttributeMatchesPrincipal {
                attribute,
                operator,
                field,
            } => write!(f, "resource.attr.{} {} {}", attribute, operator, field),
            Condition::AttributeMatchesLiteral {
                attribute,
                operator,
                value,
            } => write!(f, "resource.attr.{} {} {:?}", attribute, operator, value.canonical()),
        }
    }
}

/// A condition as written in the source document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    /// Resource attribute path, e.g. `resource.attr.author_id`
    pub left: String,

    #[serde(default = "default_operator")]
    pub op: String,

    /// Principal field path, e.g. `principal.id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,

    /// Constant to compare with instead of a principal field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AttrValue>,
}

fn default_operator() -> String {
    "equals".to_string()
}

impl ConditionConfig {
    /// Resolve operands and operator; any failure is a load-time error
    pub fn compile(&self, resource_type: &str, index: usize) -> Result<Condition, PolicyLoadError> {
        let unresolvable = |operand: &str| PolicyLoadError::UnresolvableOperand {
            resource_type: resource_type.to_string(),
            index,
            operand: operand.to_string(),
        };

        let operator = self
            .op
            .parse::<ConditionOperator>()
            .map_err(|token| PolicyLoadError::UnknownOperator {
                resource_type: resource_type.to_string(),
                index,
                token,
            })?;

        let attribute = attribute_name(&self.left).ok_or_else(|| unresolvable(&self.left))?;

        match (&self.right, &self.value) {
            (Some(right), None) => {
                let field = PrincipalField::from_path(right).ok_or_else(|| unresolvable(right))?;
                Ok(Condition::AttributeMatchesPrincipal {
                    attribute,
                    operator,
                    field,
                })
            }
            (None, Some(value)) => Ok(Condition::AttributeMatchesLiteral {
                attribute,
                operator,
                value: value.clone(),
            }),
            (Some(right), Some(_)) => Err(unresolvable(right)),
            (None, None) => Err(unresolvable("<missing right operand>")),
        }
    }
}

/// Compiled once per process
fn attribute_name_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(ATTRIBUTE_NAME_PATTERN).ok())
        .as_ref()
}

/// Extract the attribute name from `resource.attr.<name>` (or a bare name)
fn attribute_name(path: &str) -> Option<String> {
    let path = path.trim();
    let path = path.strip_prefix("request.").unwrap_or(path);
    let name = path.strip_prefix("resource.attr.").unwrap_or(path);

    if attribute_name_regex()?.is_match(name) {
        Some(name.to_string())
    } else {
        None
    }
}
