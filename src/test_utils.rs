//! Shared test utilities.
//!
//! Helpers for setting up an in-memory database, creating books and borrowings with
//! sensible defaults, and fakes for the external collaborators.

use crate::{
    config::CheckoutConfig,
    core::{
        book,
        borrowing::{self, Borrower, NewBorrowing},
    },
    entities::{self, Book, Cover, Payment, PaymentStatus, payment},
    errors::{Error, Result},
    integrations::{CheckoutProvider, CheckoutSession, Notifier, SessionRequest, SessionStatus},
};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, prelude::*, sea_query::Expr};
use std::{collections::HashMap, sync::Mutex, time::Duration};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database in `dir` with a two-connection pool, so two
/// transactions can be open at once. In-memory databases are limited to one connection.
pub async fn setup_shared_test_db(dir: &TempDir) -> Result<DatabaseConnection> {
    let path = dir.path().join("library.sqlite");
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options.max_connections(2).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Fixed "today" used by every test so date arithmetic is deterministic.
pub fn test_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default()
}

/// `date` plus `days`.
pub fn days_from(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(date)
}

/// A borrower whose label is `<name>@example.com`.
pub fn test_borrower(name: &str) -> Borrower {
    Borrower::new(name, format!("{name}@example.com"))
}

/// Creates a soft-cover book with the given inventory and whole-number daily fee.
pub async fn create_custom_book(
    db: &DatabaseConnection,
    title: &str,
    inventory: i32,
    daily_fee: i64,
) -> Result<entities::book::Model> {
    book::create_book(
        db,
        title.to_string(),
        "Test Author".to_string(),
        Cover::Soft,
        inventory,
        Decimal::from(daily_fee),
    )
    .await
}

/// Borrows `book_id` for `user` on [`test_today`], due back `days` later.
pub async fn borrow_for(
    db: &DatabaseConnection,
    notifier: &Notifier,
    user: &str,
    book_id: i64,
    days: u64,
) -> Result<NewBorrowing> {
    let today = test_today();
    borrowing::create_borrowing(
        db,
        notifier,
        &test_borrower(user),
        book_id,
        days_from(today, days),
        today,
    )
    .await
}

/// Marks a payment paid directly in storage, bypassing the checkout flow.
pub async fn settle(db: &DatabaseConnection, payment_id: i64) -> Result<()> {
    Payment::update_many()
        .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Paid))
        .filter(payment::Column::Id.eq(payment_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Current inventory of a book as stored.
pub async fn stored_inventory(db: &DatabaseConnection, book_id: i64) -> Result<i32> {
    Book::find_by_id(book_id)
        .one(db)
        .await?
        .map(|book| book.inventory)
        .ok_or_else(|| Error::not_found("book", book_id))
}

/// A notifier whose messages can be inspected with [`drain`].
pub fn test_notifier() -> (Notifier, UnboundedReceiver<String>) {
    Notifier::channel()
}

/// Takes every message queued so far.
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Checkout settings pointing at a test host with a short timeout.
pub fn test_checkout_config() -> CheckoutConfig {
    CheckoutConfig {
        callback_base_url: "https://library.test/api".to_string(),
        timeout_secs: 2,
    }
}

#[derive(Debug, Default, Clone, Copy)]
enum FakeMode {
    #[default]
    Normal,
    Failing,
    Slow(Duration),
}

#[derive(Debug, Default)]
struct FakeState {
    requests: Vec<SessionRequest>,
    /// session id -> paid
    sessions: HashMap<String, bool>,
}

/// In-memory checkout provider that records requests. Sessions start unpaid.
#[derive(Debug, Default)]
pub struct FakeCheckout {
    mode: FakeMode,
    state: Mutex<FakeState>,
}

impl FakeCheckout {
    /// A provider whose session creation always fails.
    pub fn failing() -> Self {
        Self {
            mode: FakeMode::Failing,
            ..Default::default()
        }
    }

    /// A provider that takes `delay` to create a session.
    pub fn slow(delay: Duration) -> Self {
        Self {
            mode: FakeMode::Slow(delay),
            ..Default::default()
        }
    }

    /// Every session request received so far, oldest first.
    pub fn requests(&self) -> Vec<SessionRequest> {
        self.state
            .lock()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }

    /// Marks every session created so far as paid.
    pub fn mark_all_paid(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.sessions.values_mut().for_each(|paid| *paid = true);
        }
    }
}

#[async_trait]
impl CheckoutProvider for FakeCheckout {
    async fn create_session(&self, request: SessionRequest) -> Result<CheckoutSession> {
        match self.mode {
            FakeMode::Failing => {
                return Err(Error::CheckoutUnavailable {
                    message: "provider offline".to_string(),
                });
            }
            FakeMode::Slow(delay) => tokio::time::sleep(delay).await,
            FakeMode::Normal => {}
        }

        let mut state = self.state.lock().map_err(|_| Error::CheckoutUnavailable {
            message: "fake state poisoned".to_string(),
        })?;
        let session_id = format!("cs_test_{}", state.requests.len() + 1);
        state.sessions.insert(session_id.clone(), false);
        state.requests.push(request);
        Ok(CheckoutSession {
            redirect_url: format!("https://checkout.test/pay/{session_id}"),
            session_id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus> {
        let state = self.state.lock().map_err(|_| Error::CheckoutUnavailable {
            message: "fake state poisoned".to_string(),
        })?;
        match state.sessions.get(session_id) {
            Some(true) => Ok(SessionStatus::Paid),
            Some(false) | None => Ok(SessionStatus::Unpaid),
        }
    }
}
