//! Round-robin selection with priority preemption.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::pool::Pool;
use crate::priority::{PriorityConsumption, PriorityOverlay};

/// Cursor pair for one pool.
///
/// `owner_cursor` resolves modulo the pool length and every
/// `entry_cursor[owner]` resolves modulo that owner's entry count; both are
/// clamped rather than trusted after loads and rebuilds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationState {
    pub owner_cursor: usize,
    pub entry_cursor: BTreeMap<String, usize>,
    /// Full cycles through the pool. Observability only.
    pub rounds: u64,
}

/// A value picked by [`select_next`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub owner: String,
    pub value: String,
    pub block_index: usize,
    pub priority: PriorityConsumption,
}

impl RotationState {
    /// Bring both cursors back in range for `pool` and forget owners that
    /// are no longer part of it.
    pub fn clamp_to(&mut self, pool: &Pool) {
        if pool.is_empty() {
            self.owner_cursor = 0;
            self.entry_cursor.clear();
            return;
        }
        self.owner_cursor %= pool.len();
        self.entry_cursor.retain(|owner, cursor| match pool.block(owner) {
            Some(block) if !block.values.is_empty() => {
                *cursor %= block.values.len();
                true
            }
            _ => false,
        });
    }

    pub fn current_owner<'a>(&self, pool: &'a Pool) -> Option<&'a str> {
        if pool.is_empty() {
            return None;
        }
        pool.blocks
            .get(self.owner_cursor % pool.len())
            .map(|block| block.owner.as_str())
    }
}

/// Pick the next value from `pool`.
///
/// Blocks are scanned cyclically from the owner cursor. Within a block the
/// entry cursor picks the candidate; candidates rejected by `is_blocked` are
/// probed past until the owner's entries are exhausted, then the scan moves
/// on. An owner holding priority keeps the owner cursor until its entry is
/// spent. Returns `None` when no block yields a value.
pub fn select_next<F>(
    pool: &Pool,
    rotation: &mut RotationState,
    priority: &mut PriorityOverlay,
    mut is_blocked: F,
) -> Option<Selection>
where
    F: FnMut(&str, &str) -> bool,
{
    let owners = pool.len();
    if owners == 0 {
        return None;
    }
    let start = rotation.owner_cursor % owners;

    for step in 0..owners {
        let index = (start + step) % owners;
        let block = &pool.blocks[index];
        let count = block.values.len();
        if count == 0 {
            continue;
        }

        let base = rotation
            .entry_cursor
            .get(&block.owner)
            .copied()
            .unwrap_or(0)
            % count;
        let Some(entry) = (0..count)
            .map(|probe| (base + probe) % count)
            .find(|&candidate| !is_blocked(&block.owner, &block.values[candidate]))
        else {
            trace!(owner = %block.owner, "every candidate blocked; moving on");
            continue;
        };

        rotation
            .entry_cursor
            .insert(block.owner.clone(), (entry + 1) % count);

        let consumption = priority.consume(&block.owner);
        match consumption {
            PriorityConsumption::Holding { .. } => {
                rotation.owner_cursor = index;
            }
            PriorityConsumption::NotHeld
            | PriorityConsumption::Exhausted { .. } => {
                let next = (index + 1) % owners;
                if next == 0 {
                    rotation.rounds = rotation.rounds.wrapping_add(1);
                }
                rotation.owner_cursor = next;
            }
        }

        return Some(Selection {
            owner: block.owner.clone(),
            value: block.values[entry].clone(),
            block_index: index,
            priority: consumption,
        });
    }

    rotation.owner_cursor = start;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolBlock;

    fn pool(layout: &[(&str, &[&str])]) -> Pool {
        Pool {
            blocks: layout
                .iter()
                .map(|(owner, values)| PoolBlock {
                    owner: owner.to_string(),
                    values: values.iter().map(|v| v.to_string()).collect(),
                })
                .collect(),
        }
    }

    fn owners_served(
        pool: &Pool,
        rotation: &mut RotationState,
        priority: &mut PriorityOverlay,
        calls: usize,
    ) -> Vec<String> {
        (0..calls)
            .filter_map(|_| select_next(pool, rotation, priority, |_, _| false))
            .map(|selection| selection.owner)
            .collect()
    }

    #[test]
    fn cycles_owners_in_order() {
        let pool = pool(&[("a", &["a1"]), ("b", &["b1"]), ("c", &["c1"])]);
        let mut rotation = RotationState::default();
        let mut priority = PriorityOverlay::default();

        let served = owners_served(&pool, &mut rotation, &mut priority, 7);
        assert_eq!(served, ["a", "b", "c", "a", "b", "c", "a"]);
        assert_eq!(rotation.rounds, 2);
    }

    #[test]
    fn entries_rotate_within_an_owner() {
        let pool = pool(&[("a", &["a1", "a2"]), ("b", &["b1"])]);
        let mut rotation = RotationState::default();
        let mut priority = PriorityOverlay::default();

        let values: Vec<_> = (0..4)
            .filter_map(|_| {
                select_next(&pool, &mut rotation, &mut priority, |_, _| false)
            })
            .map(|selection| selection.value)
            .collect();
        assert_eq!(values, ["a1", "b1", "a2", "b1"]);
    }

    #[test]
    fn priority_owner_holds_the_cursor_until_spent() {
        let pool = pool(&[("a", &["a1"]), ("b", &["b1"]), ("c", &["c1"])]);
        let mut rotation = RotationState::default();
        let mut priority = PriorityOverlay::default();
        priority.set("b", 2, false).unwrap();

        let served = owners_served(&pool, &mut rotation, &mut priority, 5);
        assert_eq!(served, ["a", "b", "b", "c", "a"]);
        assert!(priority.is_empty());
    }

    #[test]
    fn blocked_candidates_are_probed_then_owner_skipped() {
        let pool = pool(&[("a", &["a1"]), ("b", &["b1", "b2"]), ("c", &["c1"])]);
        let mut rotation = RotationState::default();
        let mut priority = PriorityOverlay::default();

        // b1 exhausted: b serves b2 instead.
        select_next(&pool, &mut rotation, &mut priority, |_, _| false);
        let pick = select_next(&pool, &mut rotation, &mut priority, |_, v| v == "b1")
            .unwrap();
        assert_eq!(pick.value, "b2");

        // Everything of b exhausted: c is served from b's slot.
        rotation.owner_cursor = 1;
        let pick = select_next(&pool, &mut rotation, &mut priority, |owner, _| {
            owner == "b"
        })
        .unwrap();
        assert_eq!(pick.owner, "c");
        assert_eq!(rotation.owner_cursor, 0);
    }

    #[test]
    fn exhausted_pool_leaves_cursor_untouched() {
        let pool = pool(&[("a", &["a1"]), ("b", &["b1"])]);
        let mut rotation = RotationState {
            owner_cursor: 1,
            ..RotationState::default()
        };
        let mut priority = PriorityOverlay::default();

        assert!(select_next(&pool, &mut rotation, &mut priority, |_, _| true).is_none());
        assert_eq!(rotation.owner_cursor, 1);
        assert!(rotation.entry_cursor.is_empty());
    }

    #[test]
    fn clamp_heals_out_of_range_cursors() {
        let pool = pool(&[("a", &["a1", "a2"]), ("b", &["b1"])]);
        let mut rotation = RotationState {
            owner_cursor: 7,
            entry_cursor: BTreeMap::from([
                ("a".to_string(), 5),
                ("gone".to_string(), 1),
            ]),
            rounds: 0,
        };
        rotation.clamp_to(&pool);
        assert_eq!(rotation.owner_cursor, 1);
        assert_eq!(rotation.entry_cursor.get("a"), Some(&1));
        assert!(!rotation.entry_cursor.contains_key("gone"));
    }
}
