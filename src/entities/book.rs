//! Book entity - A lendable title with a finite number of copies.
//!
//! `inventory` counts copies currently on the shelf. It is only changed through the
//! atomic updates in `core::inventory` (and `core::book::restock`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Physical cover format
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(4))")]
pub enum Cover {
    /// Hardcover
    #[sea_orm(string_value = "HARD")]
    Hard,
    /// Softcover
    #[sea_orm(string_value = "SOFT")]
    Soft,
}

/// Book database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "books")]
pub struct Model {
    /// Unique identifier for the book
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Book title
    pub title: String,
    /// Author name
    pub author: String,
    /// Hard or soft cover
    pub cover: Cover,
    /// Copies available for lending, never negative
    pub inventory: i32,
    /// Rental price per day
    pub daily_fee: Decimal,
}

/// Defines relationships between Book and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One book has many borrowings
    #[sea_orm(has_many = "super::borrowing::Entity")]
    Borrowings,
}

impl Related<super::borrowing::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Borrowings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
