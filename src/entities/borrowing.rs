//! Borrowing entity - One user holding one copy of a book over a date range.
//!
//! A borrowing is open while `actual_return_date` is `None` and closed once it is set.
//! `book_id`, `user_id` and `borrow_date` never change after insert.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Borrowing database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "borrowings")]
pub struct Model {
    /// Unique identifier for the borrowing
    #[sea_orm(primary_key)]
    pub id: i64,
    /// ID of the borrowed book
    pub book_id: i64,
    /// Opaque user reference from the identity provider
    pub user_id: String,
    /// Display label for the user (usually an email address)
    pub user_label: String,
    /// Day the copy left the shelf
    pub borrow_date: Date,
    /// Day the copy is due back
    pub expected_return_date: Date,
    /// Set exactly once, when the book comes back
    pub actual_return_date: Option<Date>,
}

impl Model {
    /// Whether the book is still out.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.actual_return_date.is_none()
    }
}

/// Defines relationships between Borrowing and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each borrowing belongs to one book
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id"
    )]
    Book,
    /// One borrowing has many payments
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
