//! Logical identities of the two parties in a conversation.
//!
//! Both are opaque strings: a `UserId` is stable per browser/session, an
//! `OwnerId` names one business account.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of an end user (one per browser session).
    UserId
);

string_id!(
    /// Identifier of a business owner account.
    OwnerId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let user = UserId::from("u-42");
        assert_eq!(serde_json::to_string(&user).unwrap(), "\"u-42\"");
        let owner: OwnerId = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(owner.as_str(), "acme");
    }
}
