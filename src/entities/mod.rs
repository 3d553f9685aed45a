//! Entity module - SeaORM entity definitions for the lending tables.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod book;
pub mod borrowing;
pub mod patron;
pub mod payment;

pub use book::{Column as BookColumn, Cover, Entity as Book, Model as BookModel};
pub use borrowing::{Column as BorrowingColumn, Entity as Borrowing, Model as BorrowingModel};
pub use patron::{Entity as Patron, Model as PatronModel};
pub use payment::{
    Column as PaymentColumn, Entity as Payment, Model as PaymentModel, PaymentKind,
    PaymentStatus,
};
