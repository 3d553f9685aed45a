//! Inventory ledger - per-book available copy counts.
//!
//! Both operations are single conditional `UPDATE` statements evaluated by the database,
//! never a read-modify-write in application code, so concurrent borrowers of the last copy
//! cannot both succeed. Callers pass the open transaction of the surrounding borrow or
//! return so the count changes together with the borrowing row.

use crate::{
    entities::{Book, book},
    errors::{Error, Result},
};
use sea_orm::{prelude::*, sea_query::Expr};
use tracing::debug;

/// Takes one copy of `book_id` off the shelf.
///
/// Runs `UPDATE books SET inventory = inventory - 1 WHERE id = ? AND inventory > 0`.
///
/// # Errors
/// * `Error::InsufficientInventory` - no copies left, inventory unchanged
/// * `Error::NotFound` - no such book
pub async fn reserve<C>(db: &C, book_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let updated = Book::update_many()
        .col_expr(
            book::Column::Inventory,
            Expr::col(book::Column::Inventory).sub(1),
        )
        .filter(book::Column::Id.eq(book_id))
        .filter(book::Column::Inventory.gt(0))
        .exec(db)
        .await?;

    if updated.rows_affected == 0 {
        return match Book::find_by_id(book_id).one(db).await? {
            Some(_) => Err(Error::InsufficientInventory { book_id }),
            None => Err(Error::not_found("book", book_id)),
        };
    }

    debug!("Reserved one copy of book {}", book_id);
    Ok(())
}

/// Puts one copy of `book_id` back on the shelf.
///
/// Must be called exactly once for each successful [`reserve`].
pub async fn release<C>(db: &C, book_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    adjust(db, book_id, 1).await?;
    debug!("Released one copy of book {}", book_id);
    Ok(())
}

/// Atomically adds `delta` copies to `book_id`.
pub(crate) async fn adjust<C>(db: &C, book_id: i64, delta: i32) -> Result<()>
where
    C: ConnectionTrait,
{
    let updated = Book::update_many()
        .col_expr(
            book::Column::Inventory,
            Expr::col(book::Column::Inventory).add(delta),
        )
        .filter(book::Column::Id.eq(book_id))
        .exec(db)
        .await?;

    if updated.rows_affected == 0 {
        return Err(Error::not_found("book", book_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_reserve_decrements_inventory() -> Result<()> {
        let db = setup_test_db().await?;
        let book = create_custom_book(&db, "Dune", 2, 2).await?;

        reserve(&db, book.id).await?;

        let stored = Book::find_by_id(book.id).one(&db).await?.unwrap();
        assert_eq!(stored.inventory, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reserve_empty_shelf_leaves_inventory_unchanged() -> Result<()> {
        let db = setup_test_db().await?;
        let book = create_custom_book(&db, "Dune", 0, 2).await?;

        let result = reserve(&db, book.id).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientInventory { book_id }) if book_id == book.id
        ));

        let stored = Book::find_by_id(book.id).one(&db).await?.unwrap();
        assert_eq!(stored.inventory, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_reserve_unknown_book() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([Vec::<book::Model>::new()])
            .into_connection();

        let result = reserve(&db, 999).await;
        assert!(matches!(
            result,
            Err(Error::NotFound { entity: "book", id: 999 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_release_increments_inventory() -> Result<()> {
        let db = setup_test_db().await?;
        let book = create_custom_book(&db, "Dune", 1, 2).await?;

        reserve(&db, book.id).await?;
        release(&db, book.id).await?;

        let stored = Book::find_by_id(book.id).one(&db).await?.unwrap();
        assert_eq!(stored.inventory, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_release_unknown_book() -> Result<()> {
        let db = setup_test_db().await?;
        let result = release(&db, 42).await;
        assert!(matches!(result, Err(Error::NotFound { entity: "book", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_inventory_never_negative_under_repeated_reserves() -> Result<()> {
        let db = setup_test_db().await?;
        let book = create_custom_book(&db, "Dune", 3, 2).await?;

        let mut reserved = 0;
        for _ in 0..5 {
            if reserve(&db, book.id).await.is_ok() {
                reserved += 1;
            }
        }

        let stored = Book::find_by_id(book.id).one(&db).await?.unwrap();
        assert_eq!(reserved, 3);
        assert_eq!(stored.inventory, 0);
        Ok(())
    }
}
