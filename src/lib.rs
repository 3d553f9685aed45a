//! `library-lending` - borrowing, inventory and payment core for a lending library
//!
//! Books have a finite number of copies. Users borrow a copy against an expected return
//! date and pay a rental fee through an external checkout; late returns accrue a fine.
//! Lifecycle events are announced through a fire-and-forget notification channel, and a
//! periodic sweep reminds about borrowings that are due.

// Deny the most critical lints that could lead to bugs or security issues
#![deny(
    unsafe_code,
    unsafe_op_in_unsafe_fn,
    unreachable_code,
    unreachable_patterns,
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
)]
// Warn on things that should be fixed but aren't necessarily bugs
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::dbg_macro,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::semicolon_if_nothing_returned,
    clippy::wildcard_imports,
    future_incompatible,
    rust_2018_idioms,
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
)]

/// Configuration management for database and application settings
pub mod config;
/// Core business logic - inventory, borrowing, payment and overdue operations
pub mod core;
/// SeaORM entity definitions for database tables
pub mod entities;
/// Unified error types and result handling
pub mod errors;
/// External collaborators - checkout provider and notification sinks
pub mod integrations;

#[cfg(test)]
pub mod test_utils;
