use crate::normalize::normalize_owner;
use crate::resource::ResourceKind;

/// A single alias or number contributed by an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirectoryEntry {
    pub value: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub disabled: bool,
}

pub type AliasEntry = DirectoryEntry;
pub type NumberEntry = DirectoryEntry;

impl DirectoryEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            disabled: false,
        }
    }

    pub fn matches(&self, kind: ResourceKind, raw: &str) -> bool {
        kind.normalize(&self.value) == kind.normalize(raw)
    }
}

/// An owner and the inventory it contributes to both pools.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OwnerGroup {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub disabled: bool,
    /// Chat that should receive notifications on the owner's behalf.
    #[cfg_attr(feature = "serde", serde(default))]
    pub forward_target: Option<i64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub entries: Vec<AliasEntry>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub numbers: Vec<NumberEntry>,
}

impl OwnerGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            forward_target: None,
            entries: Vec::new(),
            numbers: Vec::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .extend(aliases.into_iter().map(DirectoryEntry::new));
        self
    }

    pub fn with_numbers<I, S>(mut self, numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numbers
            .extend(numbers.into_iter().map(DirectoryEntry::new));
        self
    }

    pub fn key(&self) -> String {
        normalize_owner(&self.name)
    }

    pub fn is_named(&self, raw: &str) -> bool {
        self.key() == normalize_owner(raw)
    }

    pub fn entries_of(&self, kind: ResourceKind) -> &[DirectoryEntry] {
        match kind {
            ResourceKind::Alias => &self.entries,
            ResourceKind::Number => &self.numbers,
        }
    }

    pub fn entries_of_mut(
        &mut self,
        kind: ResourceKind,
    ) -> &mut Vec<DirectoryEntry> {
        match kind {
            ResourceKind::Alias => &mut self.entries,
            ResourceKind::Number => &mut self.numbers,
        }
    }

    /// Values of `kind` that may be handed out, in directory order.
    pub fn usable_values(
        &self,
        kind: ResourceKind,
    ) -> impl Iterator<Item = &str> + '_ {
        self.entries_of(kind)
            .iter()
            .filter(|entry| !entry.disabled)
            .map(|entry| entry.value.as_str())
    }

    pub fn find_entry(
        &self,
        kind: ResourceKind,
        raw: &str,
    ) -> Option<&DirectoryEntry> {
        self.entries_of(kind)
            .iter()
            .find(|entry| entry.matches(kind, raw))
    }
}
