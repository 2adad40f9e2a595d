//! Identifiers for blockers and organizational entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a blocker moving through the resolution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockerId(Ulid);

impl BlockerId {
    /// Generate a new BlockerId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for BlockerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BlockerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for BlockerId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Declares a string-backed identifier for entities owned by external systems
/// (task trackers, HR directories, chat workspaces).
macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

external_id!(
    /// Identifier of a task in the dependency graph.
    TaskId
);

external_id!(
    /// Identifier of an employee (reporter, resolver, manager).
    EmployeeId
);

external_id!(
    /// Identifier of a project.
    ProjectId
);

external_id!(
    /// Identifier of a communication channel (e.g. `slack`, `email`, `sms`).
    ChannelId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocker_id_round_trips_through_display() {
        let id = BlockerId::new();
        let parsed: BlockerId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_external_ids_serialize_transparently() {
        let id = TaskId::new("T-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"T-42\"");
        assert_eq!(id.as_str(), "T-42");
    }
}
