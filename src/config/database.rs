//! Database configuration module.
//!
//! Handles the `SQLite` connection and table creation using `SeaORM`. Tables are generated
//! from the entity definitions with `Schema::create_table_from_entity`, so the schema always
//! matches the Rust structs.
//!
//! The storage adapter owns referential cleanup: rows are removed explicitly in
//! `core::book::delete_book` rather than through database-level cascades.

use crate::entities::{Book, Borrowing, Patron, Payment};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/library.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or the default
/// local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(get_database_url()).await.map_err(Into::into)
}

/// Creates the books, borrowings, payments and patrons tables if they do not exist yet.
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<()> {
    create_table(db, Book).await?;
    create_table(db, Borrowing).await?;
    create_table(db, Payment).await?;
    create_table(db, Patron).await?;
    Ok(())
}

async fn create_table<C: ConnectionTrait, E: EntityTrait>(db: &C, entity: E) -> Result<()> {
    let builder = db.get_database_backend();
    let mut statement = Schema::new(builder).create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}
