use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::normalize::{normalize_alias, normalize_number};

/// The two replenishable resource pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResourceKind {
    Alias,
    Number,
}

pub const ALL_RESOURCE_KINDS: [ResourceKind; 2] =
    [ResourceKind::Alias, ResourceKind::Number];

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Alias => "alias",
            ResourceKind::Number => "number",
        }
    }

    /// Comparison key for a value of this kind.
    pub fn normalize(&self, raw: &str) -> String {
        match self {
            ResourceKind::Alias => normalize_alias(raw),
            ResourceKind::Number => normalize_number(raw),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alias" | "aliases" | "username" | "usernames" => {
                Ok(ResourceKind::Alias)
            }
            "number" | "numbers" | "phone" => Ok(ResourceKind::Number),
            other => Err(ModelError::UnknownResourceKind(other.to_string())),
        }
    }
}
