//! The engine-state aggregate persisted as one blob.

use serde::{Deserialize, Serialize};
use tracing::warn;

use rota_model::ResourceKind;

use crate::error::{EngineError, Result};
use crate::escalation::EscalationState;
use crate::pool::Pools;
use crate::priority::PriorityOverlay;
use crate::rotation::RotationState;

pub const ENGINE_STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineState {
    pub schema_version: u32,
    pub alias_rotation: RotationState,
    pub number_rotation: RotationState,
    pub priority: PriorityOverlay,
    pub escalation: EscalationState,
    /// Current short window. Window counters are keyed by it, so bumping
    /// it opens a fresh window.
    pub window_epoch: u64,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            schema_version: ENGINE_STATE_SCHEMA_VERSION,
            alias_rotation: RotationState::default(),
            number_rotation: RotationState::default(),
            priority: PriorityOverlay::default(),
            escalation: EscalationState::default(),
            window_epoch: 0,
        }
    }
}

impl EngineState {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut state: EngineState = serde_json::from_slice(bytes)?;
        if state.schema_version > ENGINE_STATE_SCHEMA_VERSION {
            return Err(EngineError::Persistence(format!(
                "engine state schema {} is newer than supported {}",
                state.schema_version, ENGINE_STATE_SCHEMA_VERSION
            )));
        }
        state.schema_version = ENGINE_STATE_SCHEMA_VERSION;
        Ok(state)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn rotation(&self, kind: ResourceKind) -> &RotationState {
        match kind {
            ResourceKind::Alias => &self.alias_rotation,
            ResourceKind::Number => &self.number_rotation,
        }
    }

    pub fn rotation_mut(&mut self, kind: ResourceKind) -> &mut RotationState {
        match kind {
            ResourceKind::Alias => &mut self.alias_rotation,
            ResourceKind::Number => &mut self.number_rotation,
        }
    }

    /// The two pieces a selection mutates, borrowed together.
    pub fn selection_parts(
        &mut self,
        kind: ResourceKind,
    ) -> (&mut RotationState, &mut PriorityOverlay) {
        let rotation = match kind {
            ResourceKind::Alias => &mut self.alias_rotation,
            ResourceKind::Number => &mut self.number_rotation,
        };
        (rotation, &mut self.priority)
    }

    /// Clamp cursors that a stale or hand-edited blob left out of range.
    pub fn heal(&mut self, pools: &Pools) {
        for kind in [ResourceKind::Alias, ResourceKind::Number] {
            let pool = pools.get(kind);
            let rotation = self.rotation_mut(kind);
            let out_of_range = !pool.is_empty() && rotation.owner_cursor >= pool.len();
            rotation.clamp_to(pool);
            if out_of_range {
                warn!(kind = ?kind, "owner cursor out of range; clamped");
            }
        }
    }
}
