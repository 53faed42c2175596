use serde::{Deserialize, Serialize};

/// Declares a string-backed external identifier.
///
/// External identifiers are assigned by the producing system and are
/// distinct from whatever key a storage engine uses internally.
macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from its external representation.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is blank.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
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

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

external_id!(
    /// Stable external identifier of a product (e.g. `p1001`).
    ProductId
);

external_id!(
    /// Stable external identifier of an order.
    OrderId
);

external_id!(
    /// Stable external identifier of a customer.
    CustomerId
);

external_id!(
    /// Identifier of a product category.
    CategoryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = ProductId::new("p1001");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1001\"");

        let parsed: OrderId = serde_json::from_str("\"o2001\"").unwrap();
        assert_eq!(parsed.as_str(), "o2001");
    }

    #[test]
    fn blank_ids_are_detected() {
        assert!(CustomerId::new("  ").is_blank());
        assert!(!CustomerId::new("c3001").is_blank());
    }

    #[test]
    fn display_is_the_raw_value() {
        assert_eq!(CategoryId::from("c100").to_string(), "c100");
    }
}
