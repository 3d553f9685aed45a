//! Unified error type for the lending core.
//!
//! Domain rejections (inventory, borrowing state, payment state) are ordinary variants
//! next to infrastructure failures, so every operation returns the same [`Result`].

use chrono::NaiveDate;
use sea_orm::DbErr;
use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// No copies of the book are left to lend
    #[error("No copies of book {book_id} are available")]
    InsufficientInventory {
        /// Book that ran out of copies
        book_id: i64,
    },

    /// The user already holds an open borrowing of this book
    #[error("User {user_id} already has an open borrowing of book {book_id}")]
    DuplicateActiveBorrowing {
        /// Borrowing user
        user_id: String,
        /// Book being borrowed
        book_id: i64,
    },

    /// The user has an unsettled payment on some borrowing
    #[error("User {user_id} has pending payments")]
    PendingPaymentBlock {
        /// Blocked user
        user_id: String,
    },

    /// Expected return date lies in the past
    #[error("Expected return date {expected} is before {today}")]
    InvalidDate {
        /// Requested return date
        expected: NaiveDate,
        /// Date of the request
        today: NaiveDate,
    },

    /// The borrowing was returned already
    #[error("Borrowing {borrowing_id} was already returned")]
    AlreadyReturned {
        /// Closed borrowing
        borrowing_id: i64,
    },

    /// The payment is settled and cannot be re-initiated or cancelled
    #[error("Payment {payment_id} is already paid")]
    AlreadyPaid {
        /// Settled payment
        payment_id: i64,
    },

    /// The checkout provider did not report the session as paid
    #[error("Payment {payment_id} was not confirmed by the checkout provider")]
    PaymentNotConfirmed {
        /// Payment still pending
        payment_id: i64,
    },

    /// A referenced book, borrowing or payment does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record (`"book"`, `"borrowing"`, `"payment"`)
        entity: &'static str,
        /// Missing identifier
        id: i64,
    },

    /// Input rejected before reaching storage
    #[error("Validation error: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
    },

    /// The checkout provider failed or timed out
    #[error("Checkout provider unavailable: {message}")]
    CheckoutUnavailable {
        /// Provider failure description
        message: String,
    },

    /// A notification sink failed to deliver a message
    #[error("Notification delivery failed: {message}")]
    Notification {
        /// Sink failure description
        message: String,
    },

    /// Configuration file or environment is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// Storage failure
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Filesystem failure, e.g. reading the config file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required environment variable missing or not unicode
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    pub(crate) const fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Caller-facing rejection reason. Never carries identifiers or internal detail.
    #[must_use]
    pub const fn rejection_reason(&self) -> &'static str {
        match self {
            Self::InsufficientInventory { .. } => "Book is not available for borrowing.",
            Self::DuplicateActiveBorrowing { .. } => "You already borrowed this book.",
            Self::PendingPaymentBlock { .. } => {
                "You are not allowed to borrow new books due to pending payments."
            }
            Self::InvalidDate { .. } => "Expected return date cannot be in the past.",
            Self::AlreadyReturned { .. } => "Book has already been returned.",
            Self::AlreadyPaid { .. } => "Payment has already been settled.",
            Self::PaymentNotConfirmed { .. } => "Payment was not confirmed.",
            Self::NotFound { .. } => "Not found.",
            Self::Validation { .. } => "Invalid input.",
            Self::CheckoutUnavailable { .. } => "Payment service is unavailable, try again later.",
            Self::Notification { .. }
            | Self::Config { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::EnvVar(_) => "Internal error.",
        }
    }

    /// Whether the transport should report this as a state conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::InsufficientInventory { .. }
                | Self::DuplicateActiveBorrowing { .. }
                | Self::PendingPaymentBlock { .. }
                | Self::AlreadyReturned { .. }
                | Self::AlreadyPaid { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
