use std::fmt::{Display, Formatter};
use std::str::FromStr;

use enrolia_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::PermissionId;

/// Resource/action pair identifying one permission, e.g. `students:read`.
///
/// The catalog is tenant-extensible, so keys are validated strings rather
/// than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    resource: String,
    action: String,
}

impl PermissionKey {
    /// Creates a permission key from validated resource and action segments.
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> AppResult<Self> {
        let resource = validated_segment(resource.into(), "resource")?;
        let action = validated_segment(action.into(), "action")?;
        Ok(Self { resource, action })
    }

    /// Returns the resource segment.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the action segment.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_str()
    }

    /// Returns the stable `resource:action` storage slug.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

impl FromStr for PermissionKey {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (resource, action) = value.split_once(':').ok_or_else(|| {
            AppError::Validation(format!(
                "permission slug '{value}' must use the 'resource:action' form"
            ))
        })?;

        Self::new(resource, action)
    }
}

impl Display for PermissionKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.resource, self.action)
    }
}

fn validated_segment(value: String, label: &str) -> AppResult<String> {
    let value = value.trim().to_ascii_lowercase();
    if value.is_empty() {
        return Err(AppError::Validation(format!(
            "permission {label} must not be empty"
        )));
    }

    if !value
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || character == '_' || character == '-')
    {
        return Err(AppError::Validation(format!(
            "permission {label} '{value}' contains invalid characters"
        )));
    }

    Ok(value)
}

/// Catalog entry describing one permission known to the system.
///
/// The catalog is global: entries are shared by all agencies. Resource and
/// action are identity fields and never change after creation; category and
/// description are free to edit. System entries cannot be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    /// Stable catalog identifier.
    pub id: PermissionId,
    /// Resource/action identity of the entry.
    pub key: PermissionKey,
    /// Grouping label for admin UIs.
    pub category: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Marks a seeded entry protected from deletion and identity edits.
    pub is_system: bool,
}
