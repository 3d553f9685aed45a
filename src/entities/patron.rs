//! Patron entity - One row per user who ever borrowed.
//!
//! The row is upserted and locked at the start of every borrow, which serializes a
//! user's concurrent borrows so the pending-payment check cannot be raced.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Patron database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "patrons")]
pub struct Model {
    /// Opaque user reference from the identity provider
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Display label seen on the first borrow
    pub label: String,
}

/// Patrons have no modelled relations; borrowings reference users by `user_id` only
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
