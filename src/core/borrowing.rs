//! Borrowing state machine - lending a copy and taking it back.
//!
//! A borrowing is `OPEN` until its `actual_return_date` is set and `RETURNED` afterwards,
//! with no way back. Creating a borrowing reserves a copy and opens the rental payment in
//! one transaction; returning it releases the copy and settles any late fine in another.
//! Notifications are queued only after the transaction has committed.

use crate::{
    core::{
        inventory,
        payment::{self, FineOutcome},
    },
    entities::{
        Book, Borrowing, Patron, PaymentKind, borrowing, patron, payment as payment_entity,
    },
    errors::{Error, Result},
    integrations::Notifier,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*,
    sea_query::{Expr, OnConflict},
};
use tracing::{info, instrument};

/// Late days are charged at this multiple of the daily fee.
pub const LATE_FINE_MULTIPLIER: i64 = 2;

/// The user on whose behalf an operation runs, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Borrower {
    /// Opaque user reference
    pub id: String,
    /// Email-like display label
    pub label: String,
}

impl Borrower {
    /// Builds a borrower from the identity provider's reference and display label.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Result of a successful borrow: the open borrowing and the rental payment the user
/// should check out next.
#[derive(Debug, Clone)]
pub struct NewBorrowing {
    /// The open borrowing as stored
    pub borrowing: borrowing::Model,
    /// Pending rental payment for the planned period
    pub rental_payment: payment_entity::Model,
}

/// Result of a successful return.
#[derive(Debug, Clone)]
pub struct ReturnedBorrowing {
    /// The closed borrowing
    pub borrowing: borrowing::Model,
    /// How a late fine was recorded, if any
    pub fine: FineOutcome,
}

/// Filter for [`list_borrowings`]. Leaving `user_id` empty lists every user's borrowings.
#[derive(Debug, Clone, Default)]
pub struct BorrowingFilter {
    /// Only this user's borrowings
    pub user_id: Option<String>,
    /// `Some(true)` for open borrowings only, `Some(false)` for returned only
    pub is_active: Option<bool>,
}

fn amount_out_of_range(what: &str) -> Error {
    Error::Validation {
        message: format!("{what} is out of range"),
    }
}

/// Fee for the planned borrowing period, charging at least one day.
///
/// # Errors
/// `Validation` when the fee does not fit a `Decimal`.
pub fn rental_fee(
    daily_fee: Decimal,
    borrow_date: NaiveDate,
    expected_return_date: NaiveDate,
) -> Result<Decimal> {
    let days = (expected_return_date - borrow_date).num_days().max(1);
    daily_fee
        .checked_mul(Decimal::from(days))
        .ok_or_else(|| amount_out_of_range("Rental fee"))
}

/// Fine for returning on `actual_return_date`, or `None` when the book is not late.
///
/// # Errors
/// `Validation` when the fine does not fit a `Decimal`.
pub fn late_fine(
    daily_fee: Decimal,
    expected_return_date: NaiveDate,
    actual_return_date: NaiveDate,
) -> Result<Option<Decimal>> {
    let days_late = (actual_return_date - expected_return_date).num_days();
    if days_late <= 0 {
        return Ok(None);
    }
    days_late
        .checked_mul(LATE_FINE_MULTIPLIER)
        .and_then(|days| daily_fee.checked_mul(Decimal::from(days)))
        .map(Some)
        .ok_or_else(|| amount_out_of_range("Late fine"))
}

async fn ensure_pending_at_most<C>(db: &C, user_id: &str, allowed: u64) -> Result<()>
where
    C: ConnectionTrait,
{
    if payment::count_pending_payments(db, user_id).await? > allowed {
        return Err(Error::PendingPaymentBlock {
            user_id: user_id.to_string(),
        });
    }
    Ok(())
}

/// Registers the user if needed and locks their patron row for the rest of `txn`.
///
/// Every borrow by the same user takes this lock first, so their pending-payment and
/// duplicate checks run one at a time. On `SQLite` the upsert is the first write of the
/// transaction and takes the database write lock up front.
async fn lock_patron<C>(txn: &C, user: &Borrower) -> Result<()>
where
    C: ConnectionTrait,
{
    Patron::insert(patron::ActiveModel {
        user_id: Set(user.id.clone()),
        label: Set(user.label.clone()),
    })
    .on_conflict(OnConflict::column(patron::Column::UserId).do_nothing().to_owned())
    .exec_without_returning(txn)
    .await?;

    Patron::find_by_id(user.id.clone())
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| Error::Validation {
            message: format!("patron {} could not be registered", user.id),
        })?;
    Ok(())
}

async fn has_open_borrowing<C>(db: &C, user_id: &str, book_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let open = Borrowing::find()
        .filter(borrowing::Column::UserId.eq(user_id))
        .filter(borrowing::Column::BookId.eq(book_id))
        .filter(borrowing::Column::ActualReturnDate.is_null())
        .one(db)
        .await?;
    Ok(open.is_some())
}

/// Lends one copy of `book_id` to `user` until `expected_return_date`.
///
/// Checks, in order: the return date is not in the past, the book exists, the user has
/// no pending payment anywhere, the user holds no open borrowing of the same book, and a
/// copy is on the shelf. The borrowing row, the inventory decrement and the rental
/// payment commit together; the "borrowing created" notification is queued afterwards.
///
/// The user's patron row is locked before any check, and the pending count is checked
/// again before commit, so concurrent borrows by one user leave at most one rental
/// pending.
///
/// # Errors
/// `InvalidDate`, `NotFound`, `PendingPaymentBlock`, `DuplicateActiveBorrowing`,
/// `InsufficientInventory`, or a database error. Nothing is persisted on error.
#[instrument(skip(db, notifier, user), fields(user = %user.id))]
pub async fn create_borrowing(
    db: &DatabaseConnection,
    notifier: &Notifier,
    user: &Borrower,
    book_id: i64,
    expected_return_date: NaiveDate,
    today: NaiveDate,
) -> Result<NewBorrowing> {
    if expected_return_date < today {
        return Err(Error::InvalidDate {
            expected: expected_return_date,
            today,
        });
    }

    let txn = db.begin().await?;
    lock_patron(&txn, user).await?;

    let book = Book::find_by_id(book_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("book", book_id))?;

    ensure_pending_at_most(&txn, &user.id, 0).await?;

    if has_open_borrowing(&txn, &user.id, book_id).await? {
        return Err(Error::DuplicateActiveBorrowing {
            user_id: user.id.clone(),
            book_id,
        });
    }

    inventory::reserve(&txn, book_id).await?;

    let borrowing = borrowing::ActiveModel {
        book_id: Set(book_id),
        user_id: Set(user.id.clone()),
        user_label: Set(user.label.clone()),
        borrow_date: Set(today),
        expected_return_date: Set(expected_return_date),
        actual_return_date: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let amount = rental_fee(book.daily_fee, today, expected_return_date)?;
    let rental_payment =
        payment::create_payment(&txn, borrowing.id, PaymentKind::Rental, amount).await?;

    // Only the rental just opened may be pending; otherwise dropping `txn` rolls back.
    ensure_pending_at_most(&txn, &user.id, 1).await?;

    txn.commit().await?;

    info!(
        "Created borrowing {} of book {} until {}, rental payment {} for {}",
        borrowing.id, book_id, expected_return_date, rental_payment.id, amount
    );
    notifier.notify(format!(
        "New borrowing created:\nUser: {}\nBook: {}",
        user.label, book.title
    ));

    Ok(NewBorrowing {
        borrowing,
        rental_payment,
    })
}

/// Closes an open borrowing on `today`.
///
/// Sets the return date exactly once, puts the copy back, and if the book is late either
/// folds the fine into the still-pending rental payment or opens a separate fine payment
/// (see [`payment::apply_fine`]). All of it commits in one transaction.
///
/// # Errors
/// `NotFound`, `AlreadyReturned` (state unchanged), or a database error.
#[instrument(skip(db))]
pub async fn return_borrowing(
    db: &DatabaseConnection,
    borrowing_id: i64,
    today: NaiveDate,
) -> Result<ReturnedBorrowing> {
    let txn = db.begin().await?;

    let existing = Borrowing::find_by_id(borrowing_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("borrowing", borrowing_id))?;

    if !existing.is_open() {
        return Err(Error::AlreadyReturned { borrowing_id });
    }

    // Conditional on the return date still being unset, so it is written at most once.
    let closed = Borrowing::update_many()
        .col_expr(borrowing::Column::ActualReturnDate, Expr::value(today))
        .filter(borrowing::Column::Id.eq(borrowing_id))
        .filter(borrowing::Column::ActualReturnDate.is_null())
        .exec(&txn)
        .await?;
    if closed.rows_affected == 0 {
        return Err(Error::AlreadyReturned { borrowing_id });
    }

    inventory::release(&txn, existing.book_id).await?;

    let book = Book::find_by_id(existing.book_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("book", existing.book_id))?;

    let fine = match late_fine(book.daily_fee, existing.expected_return_date, today)? {
        Some(amount) => payment::apply_fine(&txn, borrowing_id, amount).await?,
        None => FineOutcome::OnTime,
    };

    txn.commit().await?;

    info!(
        "Returned borrowing {} of book {} on {} ({:?})",
        borrowing_id, existing.book_id, today, fine
    );

    let borrowing = borrowing::Model {
        actual_return_date: Some(today),
        ..existing
    };
    Ok(ReturnedBorrowing { borrowing, fine })
}

/// Finds a borrowing by ID.
pub async fn get_borrowing(db: &DatabaseConnection, borrowing_id: i64) -> Result<borrowing::Model> {
    Borrowing::find_by_id(borrowing_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("borrowing", borrowing_id))
}

/// Lists borrowings matching `filter`, newest first.
pub async fn list_borrowings(
    db: &DatabaseConnection,
    filter: &BorrowingFilter,
) -> Result<Vec<borrowing::Model>> {
    let mut query = Borrowing::find();
    if let Some(user_id) = &filter.user_id {
        query = query.filter(borrowing::Column::UserId.eq(user_id.as_str()));
    }
    match filter.is_active {
        Some(true) => query = query.filter(borrowing::Column::ActualReturnDate.is_null()),
        Some(false) => query = query.filter(borrowing::Column::ActualReturnDate.is_not_null()),
        None => {}
    }
    query
        .order_by_desc(borrowing::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
