//! # Stockgate Core
//!
//! Domain types and pure rules for franchise stock gating and per-franchise
//! document sequencing.
//!
//! Nothing in this crate performs I/O. The `stockgate-postgres` crate wires these
//! rules into database transactions; this crate only decides *what* is legal:
//!
//! - **Installations**: the `Started → Completed | Cancelled` state machine and the
//!   stock threshold that gates `start`
//! - **Inventory mapping**: how the franchise ↔ stock table is recognised from
//!   catalog metadata
//! - **Sequences**: rendering and parsing invoice numbers and customer codes
//! - **Schema**: candidate rows and the identifier allowlist used whenever a
//!   statement is assembled from names
//!
//! ## Example
//!
//! ```
//! use stockgate_core::sequence::DocumentNumbers;
//! use chrono::{TimeZone, Utc};
//!
//! let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
//! let numbers = DocumentNumbers::render("MAXTT-DEMO-001", 7, at).unwrap();
//! assert_eq!(numbers.invoice_number, "MAXTT-DEMO-001/0007/0325");
//! assert_eq!(numbers.customer_code, "MAXTT-DEMO-001-0007");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod identifier;
pub mod installation;
pub mod inventory;
pub mod invoice;
pub mod schema;
pub mod sequence;

pub use clock::{Clock, SystemClock};
pub use error::{CoreError, ErrorKind, Result};
pub use identifier::Identifier;
pub use installation::{
    CompletedInstallation, Installation, InstallationId, InstallationStatus,
    StartedInstallation, StockThreshold, MIN_STOCK_THRESHOLD,
};
pub use inventory::{Deduction, InventoryMapping};
pub use invoice::{Invoice, InvoiceDraft};
pub use schema::{CandidateRow, ColumnValue};
pub use sequence::DocumentNumbers;
