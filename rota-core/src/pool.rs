//! Rotation pools derived from the directory.
//!
//! A pool is a pure projection: ordered owner blocks holding usable values.
//! It carries no identity beyond order and is replaced wholesale on every
//! rebuild.

use serde::Serialize;

use rota_model::ResourceKind;

use crate::directory::Directory;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolBlock {
    /// Normalized owner key.
    pub owner: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Pool {
    pub blocks: Vec<PoolBlock>,
}

impl Pool {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn owner_order(&self) -> Vec<String> {
        self.blocks.iter().map(|block| block.owner.clone()).collect()
    }

    pub fn position(&self, owner: &str) -> Option<usize> {
        self.blocks.iter().position(|block| block.owner == owner)
    }

    pub fn block(&self, owner: &str) -> Option<&PoolBlock> {
        self.blocks.iter().find(|block| block.owner == owner)
    }

    pub fn value_count(&self) -> usize {
        self.blocks.iter().map(|block| block.values.len()).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Pools {
    pub alias: Pool,
    pub number: Pool,
}

impl Pools {
    pub fn get(&self, kind: ResourceKind) -> &Pool {
        match kind {
            ResourceKind::Alias => &self.alias,
            ResourceKind::Number => &self.number,
        }
    }
}

/// Build both pools from a directory snapshot.
///
/// Owners keep directory order. Disabled owners are skipped with all their
/// entries, disabled entries are skipped individually, and an owner left with
/// no usable entries for a pool does not appear in that pool.
pub fn build_pools(directory: &Directory) -> Pools {
    Pools {
        alias: build_pool(directory, ResourceKind::Alias),
        number: build_pool(directory, ResourceKind::Number),
    }
}

fn build_pool(directory: &Directory, kind: ResourceKind) -> Pool {
    let blocks = directory
        .owners
        .iter()
        .filter(|owner| !owner.disabled)
        .filter_map(|owner| {
            let values: Vec<String> =
                owner.usable_values(kind).map(str::to_string).collect();
            (!values.is_empty()).then(|| PoolBlock {
                owner: owner.key(),
                values,
            })
        })
        .collect();
    Pool { blocks }
}
