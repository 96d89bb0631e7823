//! SQL identifier allowlist.
//!
//! Table and column names cannot be bound as parameters, so any statement built
//! from names must go through [`Identifier`]. Construction enforces
//! `[A-Za-z0-9_]+`; rendering always double-quotes the name so mixed-case catalog
//! names are addressed exactly.

use crate::error::{CoreError, Result};
use std::fmt;

/// Maximum identifier length `PostgreSQL` keeps (`NAMEDATALEN - 1`).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A table or column name that passed the allowlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Validate a raw name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] if the name is empty, longer than
    /// [`MAX_IDENTIFIER_LEN`], or contains anything outside `[A-Za-z0-9_]`.
    pub fn parse(raw: &str) -> Result<Self> {
        if is_valid_identifier(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::InvalidIdentifier(raw.to_string()))
        }
    }

    /// The bare name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as it should appear in SQL text.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether `raw` matches `[A-Za-z0-9_]+` and fits in a `PostgreSQL` name.
#[must_use]
pub fn is_valid_identifier(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_IDENTIFIER_LEN
        && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_plain_names() {
        for name in ["installations", "franchisee_id", "Stock2", "_x"] {
            assert!(Identifier::parse(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn rejects_injection_attempts() {
        for name in [
            "",
            "invoices; DROP TABLE invoices",
            "a\"b",
            "a.b",
            "name--",
            "space name",
            "naïve",
        ] {
            assert_eq!(
                Identifier::parse(name),
                Err(CoreError::InvalidIdentifier(name.to_string()))
            );
        }
    }

    #[test]
    fn rejects_overlong_names() {
        let name = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(Identifier::parse(&name).is_err());
        assert!(Identifier::parse(&name[..MAX_IDENTIFIER_LEN]).is_ok());
    }

    #[test]
    fn quotes_for_sql() {
        let id = Identifier::parse("Inventory_Stock").unwrap();
        assert_eq!(id.quoted(), "\"Inventory_Stock\"");
        assert_eq!(id.to_string(), "Inventory_Stock");
    }

    proptest! {
        #[test]
        fn allowlisted_names_always_parse(name in "[A-Za-z0-9_]{1,63}") {
            prop_assert!(Identifier::parse(&name).is_ok());
        }

        #[test]
        fn names_with_foreign_characters_never_parse(
            prefix in "[A-Za-z0-9_]{0,10}",
            bad in "[^A-Za-z0-9_]",
            suffix in "[A-Za-z0-9_]{0,10}",
        ) {
            let name = format!("{prefix}{bad}{suffix}");
            prop_assert!(Identifier::parse(&name).is_err());
        }

        #[test]
        fn quoted_output_never_contains_inner_quotes(name in "[A-Za-z0-9_]{1,63}") {
            let quoted = Identifier::parse(&name).unwrap().quoted();
            prop_assert_eq!(quoted.matches('"').count(), 2);
        }
    }
}
