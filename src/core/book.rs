//! Book catalogue - admin-side management of lendable titles.
//!
//! Inventory is set once at creation and afterwards only moves through the inventory
//! ledger or an explicit [`restock`]. Deleting a book removes its borrowings and their
//! payments in the same transaction.

use crate::{
    core::inventory,
    entities::{Book, Borrowing, Cover, Payment, book, borrowing, payment},
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// Fields an admin may change on an existing book. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct BookUpdate {
    /// New title
    pub title: Option<String>,
    /// New author
    pub author: Option<String>,
    /// New cover type
    pub cover: Option<Cover>,
    /// New daily fee, must be positive
    pub daily_fee: Option<Decimal>,
}

fn validate_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation {
            message: format!("Book {field} cannot be empty"),
        });
    }
    Ok(())
}

fn validate_fee(daily_fee: Decimal) -> Result<()> {
    if daily_fee <= Decimal::ZERO {
        return Err(Error::Validation {
            message: format!("Daily fee must be positive, got {daily_fee}"),
        });
    }
    Ok(())
}

/// Adds a new title to the catalogue.
pub async fn create_book(
    db: &DatabaseConnection,
    title: String,
    author: String,
    cover: Cover,
    inventory: i32,
    daily_fee: Decimal,
) -> Result<book::Model> {
    validate_text("title", &title)?;
    validate_text("author", &author)?;
    validate_fee(daily_fee)?;
    if inventory < 0 {
        return Err(Error::Validation {
            message: format!("Inventory cannot be negative, got {inventory}"),
        });
    }

    let book = book::ActiveModel {
        title: Set(title.trim().to_string()),
        author: Set(author.trim().to_string()),
        cover: Set(cover),
        inventory: Set(inventory),
        daily_fee: Set(daily_fee),
        ..Default::default()
    };

    let result = book.insert(db).await?;
    info!("Created book {} '{}'", result.id, result.title);
    Ok(result)
}

/// Finds a book by ID.
pub async fn get_book(db: &DatabaseConnection, book_id: i64) -> Result<book::Model> {
    Book::find_by_id(book_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("book", book_id))
}

/// Lists every book ordered by title.
pub async fn list_books(db: &DatabaseConnection) -> Result<Vec<book::Model>> {
    Book::find()
        .order_by_asc(book::Column::Title)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies a partial update to a book's descriptive fields and fee.
pub async fn update_book(
    db: &DatabaseConnection,
    book_id: i64,
    update: BookUpdate,
) -> Result<book::Model> {
    let existing = get_book(db, book_id).await?;
    let mut active: book::ActiveModel = existing.into();

    if let Some(title) = update.title {
        validate_text("title", &title)?;
        active.title = Set(title.trim().to_string());
    }
    if let Some(author) = update.author {
        validate_text("author", &author)?;
        active.author = Set(author.trim().to_string());
    }
    if let Some(cover) = update.cover {
        active.cover = Set(cover);
    }
    if let Some(daily_fee) = update.daily_fee {
        validate_fee(daily_fee)?;
        active.daily_fee = Set(daily_fee);
    }

    active.update(db).await.map_err(Into::into)
}

/// Adds `copies` new copies of a book to the shelf.
pub async fn restock(db: &DatabaseConnection, book_id: i64, copies: i32) -> Result<book::Model> {
    if copies <= 0 {
        return Err(Error::Validation {
            message: format!("Restock count must be positive, got {copies}"),
        });
    }
    inventory::adjust(db, book_id, copies).await?;
    info!("Restocked book {} with {} copies", book_id, copies);
    get_book(db, book_id).await
}

/// Deletes a book along with all of its borrowings and their payments.
#[instrument(skip(db))]
pub async fn delete_book(db: &DatabaseConnection, book_id: i64) -> Result<()> {
    let txn = db.begin().await?;

    Book::find_by_id(book_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("book", book_id))?;

    let borrowing_ids: Vec<i64> = Borrowing::find()
        .select_only()
        .column(borrowing::Column::Id)
        .filter(borrowing::Column::BookId.eq(book_id))
        .into_tuple()
        .all(&txn)
        .await?;

    let payments = Payment::delete_many()
        .filter(payment::Column::BorrowingId.is_in(borrowing_ids))
        .exec(&txn)
        .await?;
    let borrowings = Borrowing::delete_many()
        .filter(borrowing::Column::BookId.eq(book_id))
        .exec(&txn)
        .await?;
    Book::delete_by_id(book_id).exec(&txn).await?;

    txn.commit().await?;
    info!(
        "Deleted book {} with {} borrowings and {} payments",
        book_id, borrowings.rows_affected, payments.rows_affected
    );
    Ok(())
}
