//! Contains common, primitive types and a prelude for easy importing.
//!
//! This module defines the identifiers used across the engine contract: the
//! identity of an engine instance (local or remote worker) and the keys handed
//! out for scheduled tasks.

use slotmap::new_key_type;
use std::fmt;
use uuid::Uuid;

/// A prelude module for convenient importing of the most common fuzzmon types.
///
/// # Example
/// ```
/// use fuzzmon::common::prelude::*;
/// ```
pub mod prelude {
    pub use super::{InstanceId, TaskId};
    pub use crate::config::FuzzerConfig;
    pub use crate::engine::FuzzEngine;
}

new_key_type! {
    /// Uniquely identifies a recurring task registered with `schedule_task`.
    ///
    /// Keys are never reused, so a stale `TaskId` cannot cancel a newer task.
    pub struct TaskId;
}

/// Identifies one engine instance.
///
/// Every engine, local or a remote worker feeding logs back to it, carries a
/// random v4 UUID. Log lines that originate elsewhere are tagged with the
/// [`short`](InstanceId::short) form of the sender's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Generates a fresh, random instance id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The first hyphen-separated group of the UUID (8 hex digits).
    pub fn short(&self) -> String {
        let full = self.0.to_string();
        match full.split_once('-') {
            Some((head, _)) => head.to_string(),
            None => full,
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_first_uuid_group() {
        let id = InstanceId(Uuid::parse_str("1b4e28ba-2fa1-11d2-883f-0016d3cca427").unwrap());
        assert_eq!(id.short(), "1b4e28ba");
        assert!(id.to_string().starts_with(&id.short()));
        assert!(id.short().len() < id.to_string().len());
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(InstanceId::random(), InstanceId::random());
    }
}
