//! Payment entity - A money obligation attached to a borrowing.
//!
//! Rental payments are created with the borrowing, fine payments on late return.
//! `session_url` and `session_id` reference the external checkout session and are
//! always written together. When a late fine raises the amount of a pending rental, the
//! session opened for the old amount moves to the `superseded_*` columns together with the
//! amount it covers, so a payment the user already made is still recognised.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Settlement state of a payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
pub enum PaymentStatus {
    /// Awaiting checkout
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Confirmed by the checkout provider
    #[sea_orm(string_value = "PAID")]
    Paid,
}

/// What the payment is for
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
pub enum PaymentKind {
    /// Fee for the planned borrowing period
    #[sea_orm(string_value = "RENTAL")]
    Rental,
    /// Penalty for a late return
    #[sea_orm(string_value = "FINE")]
    Fine,
}

/// Payment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// ID of the borrowing this payment belongs to
    pub borrowing_id: i64,
    /// Pending until confirmed by the checkout provider
    pub status: PaymentStatus,
    /// Rental or fine
    pub kind: PaymentKind,
    /// Amount owed
    pub money_to_pay: Decimal,
    /// Checkout redirect URL, present once a session was created
    pub session_url: Option<String>,
    /// Checkout session identifier, present once a session was created
    pub session_id: Option<String>,
    /// Redirect URL of the session replaced by a fine top-up
    pub superseded_session_url: Option<String>,
    /// ID of the session replaced by a fine top-up
    pub superseded_session_id: Option<String>,
    /// Amount the superseded session was opened for
    pub superseded_amount: Option<Decimal>,
    /// When the payment was opened
    pub created_at: DateTimeUtc,
    /// Last amount, session or status change
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Whether the checkout provider confirmed this payment.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one borrowing
    #[sea_orm(
        belongs_to = "super::borrowing::Entity",
        from = "Column::BorrowingId",
        to = "super::borrowing::Column::Id"
    )]
    Borrowing,
}

impl Related<super::borrowing::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Borrowing.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
