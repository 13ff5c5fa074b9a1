use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

macro_rules! id_newtype {
    ($name:ident, $err:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(DomainError::$err(raw));
                }
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Generate a fresh, opaque identity suitable for use as an
            /// IaaS idempotency token.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

id_newtype!(NodeId, InvalidNodeId);
id_newtype!(LaunchId, InvalidLaunchId);
id_newtype!(DomainId, InvalidDomainId);
id_newtype!(DefinitionId, InvalidDefinitionId);

/// An IaaS back-end identity (what the spec calls "site"). Nodes are grouped
/// by site for batched `list_nodes`/`create_node` calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Site(pub String);

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_id() {
        assert!(NodeId::new("").is_err());
        assert!(NodeId::new("   ").is_err());
        assert!(NodeId::new("n-1").is_ok());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(NodeId::generate(), NodeId::generate());
    }
}
