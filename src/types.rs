//! NewType wrappers for identifiers passed between the gateway layers.
//!
//! These keep principal ids, record keys and credential digests from being
//! mixed up with each other or with free-form strings from requests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// Identity of an authenticated user as issued by the identity provider
    /// (the token `sub` claim). Authority profiles reference it as `user_id`.
    PrincipalId
);

newtype_string!(
    /// Key of a stored record. Generated as a UUID v4 on insert and exposed
    /// to clients as the `id` field.
    RecordKey
);

newtype_string!(
    /// Hex SHA-256 digest of a session credential.
    ///
    /// Revocations are stored by digest so raw tokens never reach the store.
    SessionDigest
);

impl RecordKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newtype_roundtrip() {
        let id = PrincipalId::new("7f9c");
        assert_eq!(id.as_str(), "7f9c");
        assert_eq!(id.to_string(), "7f9c");
        assert_eq!(id.clone().into_inner(), "7f9c".to_string());
        assert_eq!(PrincipalId::from("7f9c"), id);
    }

    #[test]
    fn test_record_key_generate_is_unique() {
        let a = RecordKey::generate();
        let b = RecordKey::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_newtype_serializes_transparently() {
        let key = RecordKey::new("abc");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc\"");
    }
}
