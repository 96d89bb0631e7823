//! Per-franchise document numbering.
//!
//! Each invoice gets two identifiers derived from one per-franchise sequence:
//!
//! ```text
//! invoice number   {FranchiseeCode}/{SEQ:04}/{MMYY}     MAXTT-DEMO-001/0007/0325
//! customer code    {FranchiseeCode}-{SEQ:04}            MAXTT-DEMO-001-0007
//! ```
//!
//! The next sequence is one more than the highest sequence found in either form
//! among the franchise's existing invoices. The allocator in `stockgate-postgres`
//! serializes this read-then-write per franchise with an advisory lock keyed by
//! [`advisory_lock_key`] and relies on unique constraints plus a bounded retry
//! loop for correctness.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Highest sequence that still renders in four digits.
pub const MAX_SEQUENCE: u32 = 9999;

/// Default number of insert attempts before allocation gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[allow(clippy::expect_used)] // Literal pattern, covered by tests
static INVOICE_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(\d+)/\d{4}$").expect("invoice pattern compiles"));

#[allow(clippy::expect_used)] // Literal pattern, covered by tests
static CUSTOMER_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-(\d+)$").expect("customer pattern compiles"));

/// The pair of identifiers issued for one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentNumbers {
    /// Sequence both identifiers were rendered from
    pub sequence: u32,
    /// `{code}/{seq:04}/{MMYY}`
    pub invoice_number: String,
    /// `{code}-{seq:04}`
    pub customer_code: String,
}

impl DocumentNumbers {
    /// Render both identifiers for `sequence` at allocation time `at`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SequenceOverflow`] if `sequence` is zero or above
    /// [`MAX_SEQUENCE`].
    pub fn render(franchisee_code: &str, sequence: u32, at: DateTime<Utc>) -> Result<Self> {
        if sequence == 0 || sequence > MAX_SEQUENCE {
            return Err(CoreError::SequenceOverflow {
                franchisee_code: franchisee_code.to_string(),
                sequence,
            });
        }
        Ok(Self {
            sequence,
            invoice_number: format!("{franchisee_code}/{sequence:04}/{}", at.format("%m%y")),
            customer_code: format!("{franchisee_code}-{sequence:04}"),
        })
    }
}

/// Extract the sequence from an invoice number issued to `franchisee_code`.
#[must_use]
pub fn parse_invoice_sequence(franchisee_code: &str, invoice_number: &str) -> Option<u32> {
    let tail = invoice_number.strip_prefix(franchisee_code)?;
    INVOICE_TAIL.captures(tail)?.get(1)?.as_str().parse().ok()
}

/// Extract the sequence from a customer code issued to `franchisee_code`.
#[must_use]
pub fn parse_customer_sequence(franchisee_code: &str, customer_code: &str) -> Option<u32> {
    let tail = customer_code.strip_prefix(franchisee_code)?;
    CUSTOMER_TAIL.captures(tail)?.get(1)?.as_str().parse().ok()
}

/// Next sequence given the franchise's existing identifiers.
///
/// Identifiers that do not follow the format are ignored.
#[must_use]
pub fn next_sequence<'a, I, C>(franchisee_code: &str, invoice_numbers: I, customer_codes: C) -> u32
where
    I: IntoIterator<Item = &'a str>,
    C: IntoIterator<Item = &'a str>,
{
    let from_invoices = invoice_numbers
        .into_iter()
        .filter_map(|n| parse_invoice_sequence(franchisee_code, n));
    let from_customers = customer_codes
        .into_iter()
        .filter_map(|c| parse_customer_sequence(franchisee_code, c));

    from_invoices
        .chain(from_customers)
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

/// Stable 64-bit advisory lock key for a franchise code.
///
/// The key is the first eight bytes of `SHA-256("invoice-sequence:" + code)`, so it
/// is identical across processes and releases.
#[must_use]
pub fn advisory_lock_key(franchisee_code: &str) -> i64 {
    let digest = Sha256::new()
        .chain_update(b"invoice-sequence:")
        .chain_update(franchisee_code.as_bytes())
        .finalize();
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const CODE: &str = "MAXTT-DEMO-001";

    fn march_2025() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn renders_bit_exact_formats() {
        let numbers = DocumentNumbers::render(CODE, 7, march_2025()).unwrap();
        assert_eq!(numbers.invoice_number, "MAXTT-DEMO-001/0007/0325");
        assert_eq!(numbers.customer_code, "MAXTT-DEMO-001-0007");

        let december = Utc.with_ymd_and_hms(2030, 12, 1, 0, 0, 0).unwrap();
        let numbers = DocumentNumbers::render("F1", 1234, december).unwrap();
        assert_eq!(numbers.invoice_number, "F1/1234/1230");
        assert_eq!(numbers.customer_code, "F1-1234");
    }

    #[test]
    fn refuses_to_widen_past_four_digits() {
        assert_eq!(
            DocumentNumbers::render(CODE, 10_000, march_2025()),
            Err(CoreError::SequenceOverflow {
                franchisee_code: CODE.into(),
                sequence: 10_000
            })
        );
        assert!(DocumentNumbers::render(CODE, 0, march_2025()).is_err());
    }

    #[test]
    fn parses_both_forms() {
        assert_eq!(parse_invoice_sequence(CODE, "MAXTT-DEMO-001/0042/0125"), Some(42));
        assert_eq!(parse_customer_sequence(CODE, "MAXTT-DEMO-001-0042"), Some(42));
    }

    #[test]
    fn ignores_foreign_and_malformed_identifiers() {
        assert_eq!(parse_invoice_sequence(CODE, "OTHER/0042/0125"), None);
        assert_eq!(parse_invoice_sequence(CODE, "MAXTT-DEMO-001/00x2/0125"), None);
        assert_eq!(parse_invoice_sequence(CODE, "MAXTT-DEMO-001/0042"), None);
        assert_eq!(parse_customer_sequence(CODE, "MAXTT-DEMO-001-"), None);
        assert_eq!(parse_customer_sequence(CODE, "MAXTT-DEMO-0010042"), None);
        // A longer code sharing the prefix must not be read as ours.
        assert_eq!(parse_customer_sequence("MAXTT", "MAXTT-DEMO-0001"), None);
    }

    #[test]
    fn next_sequence_takes_max_across_both_columns() {
        let invoices = ["MAXTT-DEMO-001/0003/0125", "MAXTT-DEMO-001/0009/0225"];
        let customers = ["MAXTT-DEMO-001-0011", "garbage"];
        assert_eq!(next_sequence(CODE, invoices, customers), 12);
    }

    #[test]
    fn next_sequence_starts_at_one() {
        assert_eq!(next_sequence(CODE, [], []), 1);
        assert_eq!(next_sequence(CODE, ["legacy-0001"], ["INV 7"]), 1);
    }

    #[test]
    fn lock_keys_are_stable_and_distinct() {
        assert_eq!(advisory_lock_key(CODE), advisory_lock_key(CODE));
        assert_ne!(advisory_lock_key(CODE), advisory_lock_key("MAXTT-DEMO-002"));
    }

    proptest! {
        #[test]
        fn rendered_numbers_parse_back(
            code in "[A-Z]{2,6}(-[A-Z0-9]{1,4}){0,2}",
            sequence in 1_u32..=MAX_SEQUENCE,
        ) {
            let numbers = DocumentNumbers::render(&code, sequence, march_2025()).unwrap();
            prop_assert_eq!(parse_invoice_sequence(&code, &numbers.invoice_number), Some(sequence));
            prop_assert_eq!(parse_customer_sequence(&code, &numbers.customer_code), Some(sequence));
            prop_assert_eq!(numbers.customer_code.len(), code.len() + 5);
        }

        #[test]
        fn next_sequence_exceeds_every_existing(seqs in proptest::collection::vec(1_u32..=MAX_SEQUENCE, 0..20)) {
            let rendered: Vec<DocumentNumbers> = seqs
                .iter()
                .map(|s| DocumentNumbers::render(CODE, *s, march_2025()).unwrap())
                .collect();
            let next = next_sequence(
                CODE,
                rendered.iter().map(|n| n.invoice_number.as_str()),
                rendered.iter().map(|n| n.customer_code.as_str()),
            );
            prop_assert!(seqs.iter().all(|s| next > *s));
        }
    }
}
