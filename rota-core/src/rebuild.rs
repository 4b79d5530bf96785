//! Pool rebuilds that keep the rotation where it was.

use serde::Serialize;
use tracing::debug;

use crate::directory::Directory;
use crate::pool::{Pool, Pools, build_pools};
use crate::rotation::RotationState;

/// Outcome of a rebuild, kept for logging and status reporting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub alias_owners: usize,
    pub number_owners: usize,
    pub dropped_cursors: usize,
}

/// Rebuild both pools from `directory` and remap each rotation onto the new
/// shape.
pub fn rebuild_preserving_rotation(
    directory: &Directory,
    previous: &Pools,
    alias_rotation: &mut RotationState,
    number_rotation: &mut RotationState,
) -> (Pools, RebuildReport) {
    let pools = build_pools(directory);
    let mut dropped = 0;
    dropped += remap_rotation(&previous.alias, &pools.alias, alias_rotation);
    dropped += remap_rotation(&previous.number, &pools.number, number_rotation);

    let report = RebuildReport {
        alias_owners: pools.alias.len(),
        number_owners: pools.number.len(),
        dropped_cursors: dropped,
    };
    debug!(
        alias_owners = report.alias_owners,
        number_owners = report.number_owners,
        dropped_cursors = dropped,
        "pools rebuilt"
    );
    (pools, report)
}

/// Point `rotation` at the same owner in `new`, or the nearest survivor
/// after it in the old cyclic order. Returns how many entry cursors were
/// dropped.
pub fn remap_rotation(old: &Pool, new: &Pool, rotation: &mut RotationState) -> usize {
    rotation.owner_cursor = remapped_cursor(old, new, rotation.owner_cursor);

    let before = rotation.entry_cursor.len();
    rotation.clamp_to(new);
    before - rotation.entry_cursor.len()
}

fn remapped_cursor(old: &Pool, new: &Pool, cursor: usize) -> usize {
    if old.is_empty() || new.is_empty() {
        return 0;
    }
    let start = cursor % old.len();
    (0..old.len())
        .map(|step| &old.blocks[(start + step) % old.len()].owner)
        .find_map(|owner| new.position(owner))
        .unwrap_or(0)
}
