//! Branded ID newtypes for type safety.
//!
//! Each identity in the gateway has its own newtype wrapper around `String`,
//! so a bot ID can never be passed where an operator ID is expected.
//!
//! Bot and operator IDs come from the outside world (persisted records, JWT
//! claims) and are constructed from strings; connection IDs are generated
//! locally as UUID v7 (time-ordered).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
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

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of a tenant bot. Primary key of the session registry.
    BotId
}

branded_id! {
    /// Identifier of a human operator (the `sub` claim of a verified
    /// credential). Keys the active-connection and admission maps.
    OperatorId
}

branded_id! {
    /// Identifier of a single realtime transport connection.
    ConnectionId
}

impl ConnectionId {
    /// Generate a new random connection ID (UUID v7, time-ordered).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_string_roundtrip() {
        let id = BotId::from_string("bot_1".into());
        assert_eq!(id.as_str(), "bot_1");
        assert_eq!(id.into_inner(), "bot_1");
    }

    #[test]
    fn display_matches_inner() {
        let id = OperatorId::from("op_9");
        assert_eq!(id.to_string(), "op_9");
    }

    #[test]
    fn serde_transparent() {
        let id = BotId::from("bot_7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"bot_7\"");
        let back: BotId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ids_are_distinct_types() {
        // Compiles only because both sides are BotId; the point of the
        // newtypes is that BotId == OperatorId would not compile.
        assert_eq!(BotId::from("x"), BotId::from("x"));
        assert_ne!(BotId::from("x"), BotId::from("y"));
    }

    #[test]
    fn generated_connection_ids_are_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
    }

    #[test]
    fn deref_as_str() {
        let id = OperatorId::from("op_1");
        fn takes_str(s: &str) -> usize {
            s.len()
        }
        assert_eq!(takes_str(&id), 4);
        assert_eq!(id.as_ref(), "op_1");
    }

    #[test]
    fn usable_as_hash_key() {
        let mut map = std::collections::HashMap::new();
        let _ = map.insert(BotId::from("bot_1"), 1);
        assert_eq!(map.get(&BotId::from("bot_1")), Some(&1));
    }
}
