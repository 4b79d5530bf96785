//! Priority preemption overlay.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rota_model::normalize_owner;

use crate::error::{EngineError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub owner: String,
    pub remaining: u32,
    /// Disable the owner once `remaining` reaches zero.
    #[serde(default)]
    pub stop_after: bool,
}

/// What serving one value to an owner did to its priority entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityConsumption {
    /// Owner holds no priority; rotation advances normally.
    NotHeld,
    /// Owner keeps its slot for the next request.
    Holding { remaining: u32 },
    /// Entry was spent and deleted on this serve.
    Exhausted { stop_after: bool },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityOverlay {
    entries: BTreeMap<String, PriorityEntry>,
}

impl PriorityOverlay {
    pub fn set(&mut self, owner: &str, remaining: u32, stop_after: bool) -> Result<()> {
        if remaining == 0 {
            return Err(EngineError::InvalidInput(
                "priority count must be greater than zero".into(),
            ));
        }
        let key = normalize_owner(owner);
        self.entries.insert(
            key.clone(),
            PriorityEntry {
                owner: key,
                remaining,
                stop_after,
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, owner: &str) -> Option<PriorityEntry> {
        self.entries.remove(&normalize_owner(owner))
    }

    pub fn get(&self, owner: &str) -> Option<&PriorityEntry> {
        self.entries.get(&normalize_owner(owner))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PriorityEntry> {
        self.entries.values()
    }

    /// Record one value served to `owner`.
    pub fn consume(&mut self, owner: &str) -> PriorityConsumption {
        let key = normalize_owner(owner);
        let Some(entry) = self.entries.get_mut(&key) else {
            return PriorityConsumption::NotHeld;
        };
        entry.remaining = entry.remaining.saturating_sub(1);
        if entry.remaining > 0 {
            return PriorityConsumption::Holding {
                remaining: entry.remaining,
            };
        }
        let stop_after = entry.stop_after;
        self.entries.remove(&key);
        PriorityConsumption::Exhausted { stop_after }
    }

    /// Drop entries whose owner is no longer in the directory.
    pub fn retain_owners<F>(&mut self, mut exists: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| exists(key));
        before - self.entries.len()
    }
}
