//! Core value types shared across rota crates.
#![allow(missing_docs)]

pub mod delivery;
pub mod directory;
pub mod error;
pub mod ids;
pub mod normalize;
pub mod resource;

// Intentionally curated re-exports for downstream consumers.
pub use delivery::DeliveryContext;
pub use directory::{AliasEntry, DirectoryEntry, NumberEntry, OwnerGroup};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{IssuedItemId, RequesterId};
pub use normalize::{normalize_alias, normalize_number, normalize_owner};
pub use resource::ResourceKind;
