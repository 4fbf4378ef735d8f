use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Width of a derived id in hex characters, matching a dash-less UUID.
const DERIVED_ID_LEN: usize = 32;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let short = self.0.get(..8).unwrap_or(&self.0);
                write!(f, "{}({})", stringify!($name), short)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(EntityId);
string_id!(SpaceId);
string_id!(TripleId);

impl EntityId {
    /// Fresh id for a locally created entity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl TripleId {
    /// Stable identity of the fact `(space, entity, attribute)`.
    ///
    /// Every replica computes the same id for the same triple position, which is
    /// what lets a remote triple be matched against its local edit.
    pub fn derive(space_id: &SpaceId, entity_id: &EntityId, attribute_id: &EntityId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(space_id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(entity_id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(attribute_id.as_str().as_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex.as_str()[..DERIVED_ID_LEN].to_string())
    }

    /// Id for a new empty triple. Not derived, so two blank rows on the same
    /// entity stay distinguishable until an attribute is chosen.
    pub fn unique() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }
}
