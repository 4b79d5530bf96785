use std::str::FromStr;

use uuid::Uuid;

use crate::error::ModelError;

/// Platform id of the person asking for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RequesterId(pub i64);

impl RequesterId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RequesterId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for RequesterId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(RequesterId)
            .map_err(|_| ModelError::InvalidRequester(s.to_string()))
    }
}

impl std::fmt::Display for RequesterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier attached to every issued value so it can be cleared precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IssuedItemId(pub Uuid);

impl Default for IssuedItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl IssuedItemId {
    pub fn new() -> Self {
        IssuedItemId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for IssuedItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
