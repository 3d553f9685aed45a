//! Core lending logic, independent of any transport layer.
//!
//! Operations take a `DatabaseConnection` plus whatever collaborators they need
//! (checkout provider, notifier) and return the crate-wide [`crate::errors::Result`].

/// Book catalogue management
pub mod book;
/// Borrowing lifecycle: borrow, return, fees
pub mod borrowing;
/// Inventory ledger: atomic reserve and release of copies
pub mod inventory;
/// Overdue scanning and its periodic schedule
pub mod overdue;
/// Payment obligations and checkout reconciliation
pub mod payment;

pub use borrowing::{Borrower, BorrowingFilter, NewBorrowing, ReturnedBorrowing};
pub use overdue::ScanReport;
pub use payment::{FineOutcome, Settlement};
