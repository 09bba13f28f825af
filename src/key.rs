//! # Composite Identity Keys
//!
//! Every addressable thing in the testkit, hosted entities, mock doubles,
//! stored state rows, and stream channels, is identified by an [`EntityKey`]:
//! a primary identifier plus an optional string discriminator.
//!
//! A key plays two roles:
//!
//! - **Storage identity**: two keys are equal iff both components compare
//!   equal. Registries use this for duplicate detection.
//! - **Match pattern**: a key whose fields are unspecified acts as a wildcard
//!   when used as a dispatch-rule pattern. See [`EntityKey::matches`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The primary-identifier value space.
///
/// Mirrors the key flavors the host runtime addresses entities by. Storage and
/// stream doubles reuse `Str` for plain string record ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyId {
    Uuid(Uuid),
    Long(i64),
    Str(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Uuid(id) => write!(f, "{id}"),
            KeyId::Long(id) => write!(f, "{id}"),
            KeyId::Str(id) => write!(f, "{id}"),
        }
    }
}

impl From<Uuid> for KeyId {
    fn from(id: Uuid) -> Self {
        KeyId::Uuid(id)
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        KeyId::Long(id)
    }
}

impl From<&str> for KeyId {
    fn from(id: &str) -> Self {
        KeyId::Str(id.to_string())
    }
}

impl From<String> for KeyId {
    fn from(id: String) -> Self {
        KeyId::Str(id)
    }
}

/// Composite key: `(primary identifier, optional secondary discriminator)`.
///
/// `None` fields are wildcards when the key is used as a pattern. A fully
/// unspecified key ([`EntityKey::any`]) matches every request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    primary: Option<KeyId>,
    secondary: Option<String>,
}

impl EntityKey {
    /// A key with no specified fields; matches anything as a pattern.
    pub fn any() -> Self {
        Self::default()
    }

    /// A key with only the primary identifier specified.
    pub fn primary(id: impl Into<KeyId>) -> Self {
        Self {
            primary: Some(id.into()),
            secondary: None,
        }
    }

    /// A key with both the primary identifier and the secondary discriminator.
    pub fn compound(id: impl Into<KeyId>, secondary: impl Into<String>) -> Self {
        Self {
            primary: Some(id.into()),
            secondary: Some(secondary.into()),
        }
    }

    /// A pattern that leaves the primary wildcard but pins the secondary.
    pub fn any_with_secondary(secondary: impl Into<String>) -> Self {
        Self {
            primary: None,
            secondary: Some(secondary.into()),
        }
    }

    pub fn primary_id(&self) -> Option<&KeyId> {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&str> {
        self.secondary.as_deref()
    }

    /// Whether this key, read as a pattern, accepts `other`.
    ///
    /// Every specified field must equal the corresponding field of `other`;
    /// unspecified fields accept any value, including an absent one.
    pub fn matches(&self, other: &EntityKey) -> bool {
        let primary_ok = match &self.primary {
            Some(id) => other.primary.as_ref() == Some(id),
            None => true,
        };
        let secondary_ok = match &self.secondary {
            Some(s) => other.secondary.as_deref() == Some(s.as_str()),
            None => true,
        };
        primary_ok && secondary_ok
    }

    /// Number of specified fields. Dispatch resolution prefers the most
    /// specific matching pattern.
    pub fn specificity(&self) -> u8 {
        self.primary.is_some() as u8 + self.secondary.is_some() as u8
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.primary {
            Some(id) => write!(f, "{id}")?,
            None => write!(f, "*")?,
        }
        if let Some(secondary) = &self.secondary {
            write!(f, "+{secondary}")?;
        }
        Ok(())
    }
}

impl From<Uuid> for EntityKey {
    fn from(id: Uuid) -> Self {
        EntityKey::primary(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_requires_both_components() {
        let id = Uuid::new_v4();
        assert_eq!(EntityKey::primary(id), EntityKey::primary(id));
        assert_ne!(EntityKey::primary(id), EntityKey::compound(id, "a"));
        assert_ne!(EntityKey::compound(id, "a"), EntityKey::compound(id, "b"));
    }

    #[test]
    fn wildcard_fields_match_any_request() {
        let id = Uuid::new_v4();
        let pattern = EntityKey::primary(id);
        assert!(pattern.matches(&EntityKey::primary(id)));
        assert!(pattern.matches(&EntityKey::compound(id, "shard-7")));
        assert!(!pattern.matches(&EntityKey::primary(Uuid::new_v4())));

        assert!(EntityKey::any().matches(&EntityKey::primary(id)));
        assert!(EntityKey::any().matches(&EntityKey::any()));
    }

    #[test]
    fn specified_secondary_must_match_exactly() {
        let id = Uuid::new_v4();
        let pattern = EntityKey::compound(id, "orders");
        assert!(pattern.matches(&EntityKey::compound(id, "orders")));
        assert!(!pattern.matches(&EntityKey::compound(id, "users")));
        assert!(!pattern.matches(&EntityKey::primary(id)));
    }

    #[test]
    fn specificity_orders_patterns() {
        let id = Uuid::new_v4();
        assert_eq!(EntityKey::any().specificity(), 0);
        assert_eq!(EntityKey::primary(id).specificity(), 1);
        assert_eq!(EntityKey::any_with_secondary("s").specificity(), 1);
        assert_eq!(EntityKey::compound(id, "s").specificity(), 2);
    }

    #[test]
    fn display_is_canonical() {
        let id: Uuid = "11111111-1111-1111-1111-111111111111".parse().unwrap();
        assert_eq!(EntityKey::primary(id).to_string(), id.to_string());
        assert_eq!(
            EntityKey::compound(id, "orders").to_string(),
            format!("{id}+orders")
        );
        assert_eq!(EntityKey::any().to_string(), "*");
        assert_eq!(EntityKey::primary(42i64).to_string(), "42");
    }
}
