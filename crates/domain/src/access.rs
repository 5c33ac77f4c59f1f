use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use enrolia_core::{AppError, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Granularity of permitted operation for a resource-action pair.
///
/// `None` through `Full` form the ordinal merge ladder; `Custom` sits outside
/// the ladder and defers to its binding conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Explicitly no access.
    None,
    /// Read-only access.
    View,
    /// Read and update access.
    Edit,
    /// Read, update and delete access.
    Delete,
    /// Unconditional access, implies every other level.
    Full,
    /// Access gated by the binding's condition predicates.
    Custom,
}

impl AccessLevel {
    /// Returns the merge precedence rank of this level.
    ///
    /// A `Custom` binding outranks every unconditional level except `Full`,
    /// so the resolver tries its predicate before falling back.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::View => 1,
            Self::Edit => 2,
            Self::Delete => 3,
            Self::Custom => 4,
            Self::Full => 5,
        }
    }

    /// Returns whether this level grants any operation at all.
    #[must_use]
    pub fn grants_access(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Returns a stable storage value for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::View => "view",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Full => "full",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for AccessLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::None),
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "delete" => Ok(Self::Delete),
            "full" => Ok(Self::Full),
            "custom" => Ok(Self::Custom),
            _ => Err(AppError::Validation(format!(
                "unknown access level '{value}'"
            ))),
        }
    }
}

/// One condition predicate attached to a `Custom` binding.
///
/// The opaque variant preserves payloads written by older or external
/// tooling; it never matches, so unknown predicates fail closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessCondition {
    /// Requires a request attribute to equal a value.
    FieldEquals {
        /// Attribute name in the request context.
        field: String,
        /// Required value.
        value: Value,
    },
    /// Requires a request attribute to be one of a set of values.
    FieldInSet {
        /// Attribute name in the request context.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Requires the check to happen inside a UTC time window.
    TimeWindow {
        /// Inclusive window start.
        not_before: DateTime<Utc>,
        /// Inclusive window end.
        not_after: DateTime<Utc>,
    },
    /// Requires the requesting user to own the target resource.
    OwnerMatch,
    /// Unrecognized predicate payload, kept for forward compatibility.
    Opaque {
        /// Original predicate payload.
        payload: Value,
    },
}

impl AccessCondition {
    /// Evaluates this predicate against a request context.
    #[must_use]
    pub fn evaluate(&self, context: &ConditionContext) -> bool {
        match self {
            Self::FieldEquals { field, value } => context
                .attributes
                .get(field.as_str())
                .is_some_and(|actual| actual == value),
            Self::FieldInSet { field, values } => context
                .attributes
                .get(field.as_str())
                .is_some_and(|actual| values.iter().any(|candidate| candidate == actual)),
            Self::TimeWindow {
                not_before,
                not_after,
            } => context.now >= *not_before && context.now <= *not_after,
            Self::OwnerMatch => context
                .owner_id
                .is_some_and(|owner| owner == context.user_id),
            Self::Opaque { .. } => false,
        }
    }

    /// Evaluates a full predicate set; empty sets fail closed because a
    /// `Custom` binding without conditions is a misconfiguration.
    #[must_use]
    pub fn evaluate_all(conditions: &[Self], context: &ConditionContext) -> bool {
        !conditions.is_empty()
            && conditions
                .iter()
                .all(|condition| condition.evaluate(context))
    }
}

/// Caller-supplied context a `Custom` binding is evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionContext {
    /// User the permission check runs for.
    pub user_id: UserId,
    /// Owner of the target resource, when the caller resolved one.
    pub owner_id: Option<UserId>,
    /// Evaluation instant.
    pub now: DateTime<Utc>,
    /// Free-form request attributes referenced by field predicates.
    pub attributes: BTreeMap<String, Value>,
}

impl ConditionContext {
    /// Creates an attribute-less context for a user at the current instant.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            owner_id: None,
            now: Utc::now(),
            attributes: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use enrolia_core::UserId;
    use proptest::prelude::*;
    use serde_json::json;

    use super::{AccessCondition, AccessLevel, ConditionContext};

    fn context_with(field: &str, value: serde_json::Value) -> ConditionContext {
        ConditionContext {
            user_id: UserId::new(),
            owner_id: None,
            now: Utc::now(),
            attributes: BTreeMap::from([(field.to_owned(), value)]),
        }
    }

    #[test]
    fn full_outranks_every_other_level() {
        for level in [
            AccessLevel::None,
            AccessLevel::View,
            AccessLevel::Edit,
            AccessLevel::Delete,
            AccessLevel::Custom,
        ] {
            assert!(AccessLevel::Full.rank() > level.rank());
        }
    }

    #[test]
    fn field_equals_matches_exact_value() {
        let condition = AccessCondition::FieldEquals {
            field: "status".to_owned(),
            value: json!("open"),
        };

        assert!(condition.evaluate(&context_with("status", json!("open"))));
        assert!(!condition.evaluate(&context_with("status", json!("closed"))));
        assert!(!condition.evaluate(&context_with("stage", json!("open"))));
    }

    #[test]
    fn time_window_is_inclusive() {
        let now = Utc::now();
        let condition = AccessCondition::TimeWindow {
            not_before: now - Duration::hours(1),
            not_after: now + Duration::hours(1),
        };
        let context = ConditionContext::for_user(UserId::new());

        assert!(condition.evaluate(&context));
    }

    #[test]
    fn owner_match_requires_resolved_owner() {
        let user_id = UserId::new();
        let mut context = ConditionContext::for_user(user_id);

        assert!(!AccessCondition::OwnerMatch.evaluate(&context));

        context.owner_id = Some(user_id);
        assert!(AccessCondition::OwnerMatch.evaluate(&context));

        context.owner_id = Some(UserId::new());
        assert!(!AccessCondition::OwnerMatch.evaluate(&context));
    }

    #[test]
    fn opaque_payload_fails_closed() {
        let condition = AccessCondition::Opaque {
            payload: json!({"legacy": true}),
        };
        assert!(!condition.evaluate(&ConditionContext::for_user(UserId::new())));
    }

    #[test]
    fn empty_condition_set_fails_closed() {
        let context = ConditionContext::for_user(UserId::new());
        assert!(!AccessCondition::evaluate_all(&[], &context));
    }

    fn any_level() -> impl Strategy<Value = AccessLevel> {
        prop_oneof![
            Just(AccessLevel::None),
            Just(AccessLevel::View),
            Just(AccessLevel::Edit),
            Just(AccessLevel::Delete),
            Just(AccessLevel::Full),
            Just(AccessLevel::Custom),
        ]
    }

    proptest! {
        #[test]
        fn rank_is_a_total_order_over_distinct_levels(left in any_level(), right in any_level()) {
            if left != right {
                prop_assert_ne!(left.rank(), right.rank());
            } else {
                prop_assert_eq!(left.rank(), right.rank());
            }
        }
    }
}
