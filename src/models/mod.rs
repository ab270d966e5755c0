//! Persisted entity records.
//!
//! Every record is keyed by its own id in the storage of its type and points at its parent
//! by id. Child id lists are kept on the parent and mirror storage existence.
mod call;
mod sfu;

pub use call::*;
pub use sfu::*;


use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use crate::time::Timestamp;

/// Common view over persisted records used by reconciliation and eviction.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Storage key of this record
    fn id(&self) -> &str;

    /// Storage key of the owning record, `None` for roots
    fn parent_id(&self) -> Option<&str>;

    /// Last time the record was seen in a snapshot
    fn touched(&self) -> Option<Timestamp>;

    /// Marks the record as seen at `now`. `touched` never moves backwards.
    fn touch(
        &mut self,
        now: Timestamp,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Pushes `id` into a child list unless it is already present. Returns `false` on duplicates.
pub(crate) fn push_unique(
    ids: &mut Vec<String>,
    id: &str,
) -> bool {
    if ids.iter().any(|existing| existing == id) {
        return false;
    }
    ids.push(id.to_string());
    true
}

/// Removes `id` from a child list. Returns `false` when it was not listed.
pub(crate) fn remove_id(
    ids: &mut Vec<String>,
    id: &str,
) -> bool {
    let before = ids.len();
    ids.retain(|existing| existing != id);
    before != ids.len()
}

/// Whether the parent of `entry` is one of `ids`
pub(crate) fn parent_in<E: Entity>(
    entry: &E,
    ids: &HashSet<String>,
) -> bool {
    entry.parent_id().is_some_and(|parent| ids.contains(parent))
}

pub(crate) fn advance_touched(
    touched: &mut Option<Timestamp>,
    now: Timestamp,
) {
    *touched = Some(touched.map_or(now, |prev| prev.max(now)));
}

macro_rules! impl_entity {
    ($ty:ty, $id:ident, $parent:ident) => {
        impl $crate::models::Entity for $ty {
            fn id(&self) -> &str {
                &self.$id
            }

            fn parent_id(&self) -> Option<&str> {
                Some(&self.$parent)
            }

            fn touched(&self) -> Option<$crate::time::Timestamp> {
                self.touched
            }

            fn touch(
                &mut self,
                now: $crate::time::Timestamp,
            ) {
                $crate::models::advance_touched(&mut self.touched, now);
            }
        }
    };
}
pub(crate) use impl_entity;
