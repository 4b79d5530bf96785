//! The authoritative list of owners and their inventory.
//!
//! Every mutation goes through [`Directory::apply`]; callers are expected to
//! rebuild the pools afterwards (see [`crate::rebuild`]).

use serde::{Deserialize, Serialize};

use rota_model::{
    DirectoryEntry, OwnerGroup, ResourceKind, normalize_owner,
};

use crate::error::{EngineError, Result};

pub const DIRECTORY_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    #[serde(default = "Directory::current_schema")]
    pub schema_version: u32,
    /// Bumped on every applied edit; change feeds compare it to detect edits
    /// made by other writers.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub owners: Vec<OwnerGroup>,
}

/// A single directory mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DirectoryEdit {
    AddOwner {
        name: String,
        #[serde(default)]
        forward_target: Option<i64>,
    },
    RemoveOwner {
        name: String,
    },
    SetOwnerDisabled {
        name: String,
        disabled: bool,
    },
    SetForwardTarget {
        name: String,
        target: Option<i64>,
    },
    AddEntry {
        owner: String,
        kind: ResourceKind,
        value: String,
    },
    RemoveEntry {
        owner: String,
        kind: ResourceKind,
        value: String,
    },
    SetEntryDisabled {
        owner: String,
        kind: ResourceKind,
        value: String,
        disabled: bool,
    },
}

impl DirectoryEdit {
    pub fn owner_name(&self) -> &str {
        match self {
            DirectoryEdit::AddOwner { name, .. }
            | DirectoryEdit::RemoveOwner { name }
            | DirectoryEdit::SetOwnerDisabled { name, .. }
            | DirectoryEdit::SetForwardTarget { name, .. } => name,
            DirectoryEdit::AddEntry { owner, .. }
            | DirectoryEdit::RemoveEntry { owner, .. }
            | DirectoryEdit::SetEntryDisabled { owner, .. } => owner,
        }
    }
}

impl Directory {
    const fn current_schema() -> u32 {
        DIRECTORY_SCHEMA_VERSION
    }

    pub fn new(owners: Vec<OwnerGroup>) -> Self {
        Self {
            schema_version: DIRECTORY_SCHEMA_VERSION,
            revision: 0,
            owners,
        }
    }

    /// Decode a stored blob, upgrading older layouts.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut directory: Directory = serde_json::from_slice(bytes)?;
        if directory.schema_version > DIRECTORY_SCHEMA_VERSION {
            return Err(EngineError::Persistence(format!(
                "directory schema {} is newer than supported {}",
                directory.schema_version, DIRECTORY_SCHEMA_VERSION
            )));
        }
        directory.schema_version = DIRECTORY_SCHEMA_VERSION;
        Ok(directory)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn owner(&self, name: &str) -> Option<&OwnerGroup> {
        self.owners.iter().find(|owner| owner.is_named(name))
    }

    fn owner_mut(&mut self, name: &str) -> Result<&mut OwnerGroup> {
        self.owners
            .iter_mut()
            .find(|owner| owner.is_named(name))
            .ok_or_else(|| EngineError::owner_not_found(name))
    }

    /// Owner holding `value` in the `kind` inventory, disabled or not.
    pub fn owner_of(&self, kind: ResourceKind, value: &str) -> Option<&OwnerGroup> {
        self.owners
            .iter()
            .find(|owner| owner.find_entry(kind, value).is_some())
    }

    pub fn owner_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.owners.iter().map(OwnerGroup::key)
    }

    /// Apply one edit. The revision only moves when the edit succeeds.
    pub fn apply(&mut self, edit: &DirectoryEdit) -> Result<()> {
        match edit {
            DirectoryEdit::AddOwner {
                name,
                forward_target,
            } => {
                if normalize_owner(name).is_empty() {
                    return Err(EngineError::InvalidInput(
                        "owner name is empty".into(),
                    ));
                }
                if self.owner(name).is_some() {
                    return Err(EngineError::AlreadyExists {
                        what: "owner",
                        name: name.clone(),
                    });
                }
                let mut group = OwnerGroup::new(name.trim());
                group.forward_target = *forward_target;
                self.owners.push(group);
            }
            DirectoryEdit::RemoveOwner { name } => {
                let before = self.owners.len();
                self.owners.retain(|owner| !owner.is_named(name));
                if self.owners.len() == before {
                    return Err(EngineError::owner_not_found(name));
                }
            }
            DirectoryEdit::SetOwnerDisabled { name, disabled } => {
                self.owner_mut(name)?.disabled = *disabled;
            }
            DirectoryEdit::SetForwardTarget { name, target } => {
                self.owner_mut(name)?.forward_target = *target;
            }
            DirectoryEdit::AddEntry { owner, kind, value } => {
                if kind.normalize(value).is_empty() {
                    return Err(EngineError::InvalidInput(format!(
                        "{kind} value {value:?} is empty after normalization"
                    )));
                }
                if let Some(holder) = self.owner_of(*kind, value) {
                    return Err(EngineError::AlreadyExists {
                        what: "entry",
                        name: format!("{value} (held by {})", holder.name),
                    });
                }
                self.owner_mut(owner)?
                    .entries_of_mut(*kind)
                    .push(DirectoryEntry::new(value.trim()));
            }
            DirectoryEdit::RemoveEntry { owner, kind, value } => {
                let entries = self.owner_mut(owner)?.entries_of_mut(*kind);
                let before = entries.len();
                entries.retain(|entry| !entry.matches(*kind, value));
                if entries.len() == before {
                    return Err(EngineError::entry_not_found(value));
                }
            }
            DirectoryEdit::SetEntryDisabled {
                owner,
                kind,
                value,
                disabled,
            } => {
                let entry = self
                    .owner_mut(owner)?
                    .entries_of_mut(*kind)
                    .iter_mut()
                    .find(|entry| entry.matches(*kind, value))
                    .ok_or_else(|| EngineError::entry_not_found(value))?;
                entry.disabled = *disabled;
            }
        }
        self.revision = self.revision.wrapping_add(1);
        Ok(())
    }
}
