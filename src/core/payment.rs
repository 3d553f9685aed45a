//! Payment reconciliation - rental and fine obligations against external checkout.
//!
//! A payment moves from `PENDING` to `PAID` exactly once. Every status or session write is
//! a single conditional `UPDATE ... WHERE status = 'PENDING'`, so whichever caller flips
//! the row is the only one that emits the "payment settled" notification. Provider calls
//! happen before those writes and never inside a database transaction.
//!
//! Session writes and settlements are also conditional on the amount read before the
//! provider was asked, so a session can never settle an amount it was not opened for.

use crate::{
    config::CheckoutConfig,
    entities::{
        Book, Borrowing, Payment, PaymentKind, PaymentStatus, borrowing, payment,
    },
    errors::{Error, Result},
    integrations::{
        CheckoutProvider, Notifier, SessionRequest, SessionStatus, checkout::with_timeout,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{info, instrument, warn};

/// How a late fine was recorded on return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FineOutcome {
    /// Returned on or before the expected date
    OnTime,
    /// The unpaid rental payment was increased by the fine
    AddedToRental(payment::Model),
    /// The rental was already paid, so a separate fine payment was opened
    Created(payment::Model),
}

/// Result of [`finalize_success`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// This call moved the payment to `PAID`
    Settled(payment::Model),
    /// A session opened before a fine top-up was paid. The payment was settled for the
    /// amount that session covered and the rest moved to a new pending fine payment.
    SettledWithRemainder {
        /// The settled payment, now carrying the covered amount
        payment: payment::Model,
        /// Pending fine payment for the part the session did not cover
        remainder: payment::Model,
    },
    /// The payment was already `PAID`; nothing changed
    AlreadySettled(payment::Model),
}

impl Settlement {
    /// The payment this settlement is about, in its stored state after the call.
    #[must_use]
    pub const fn payment(&self) -> &payment::Model {
        match self {
            Self::Settled(payment)
            | Self::SettledWithRemainder { payment, .. }
            | Self::AlreadySettled(payment) => payment,
        }
    }
}

/// Inserts a new pending payment.
pub(crate) async fn create_payment<C>(
    db: &C,
    borrowing_id: i64,
    kind: PaymentKind,
    amount: Decimal,
) -> Result<payment::Model>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    payment::ActiveModel {
        borrowing_id: Set(borrowing_id),
        status: Set(PaymentStatus::Pending),
        kind: Set(kind),
        money_to_pay: Set(amount),
        session_url: Set(None),
        session_id: Set(None),
        superseded_session_url: Set(None),
        superseded_session_id: Set(None),
        superseded_amount: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Number of pending payments across the user's borrowings.
pub(crate) async fn count_pending_payments<C>(db: &C, user_id: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    Payment::find()
        .inner_join(Borrowing)
        .filter(borrowing::Column::UserId.eq(user_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Records a late fine for `borrowing_id` inside the caller's transaction.
///
/// If the rental payment is still pending, the fine is added to it in place. Its checkout
/// session was opened for the old amount, so it moves to the superseded columns along with
/// that amount and can still be honoured by [`finalize_success`]. Otherwise (the rental is
/// paid, or was settled concurrently) a separate `FINE` payment is opened.
pub(crate) async fn apply_fine<C>(db: &C, borrowing_id: i64, fine: Decimal) -> Result<FineOutcome>
where
    C: ConnectionTrait,
{
    let pending_rental = Payment::find()
        .filter(payment::Column::BorrowingId.eq(borrowing_id))
        .filter(payment::Column::Kind.eq(PaymentKind::Rental))
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .lock_exclusive()
        .one(db)
        .await?;

    if let Some(rental) = pending_rental {
        // Right-hand sides read the row as it was before this statement.
        let bumped = Payment::update_many()
            .col_expr(
                payment::Column::MoneyToPay,
                Expr::col(payment::Column::MoneyToPay).add(fine),
            )
            .col_expr(
                payment::Column::SupersededSessionUrl,
                Expr::col(payment::Column::SessionUrl).into(),
            )
            .col_expr(
                payment::Column::SupersededSessionId,
                Expr::col(payment::Column::SessionId).into(),
            )
            .col_expr(
                payment::Column::SupersededAmount,
                Expr::col(payment::Column::MoneyToPay).into(),
            )
            .col_expr(payment::Column::SessionUrl, Expr::value(Option::<String>::None))
            .col_expr(payment::Column::SessionId, Expr::value(Option::<String>::None))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::Id.eq(rental.id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .exec(db)
            .await?;

        if bumped.rows_affected == 1 {
            let updated = Payment::find_by_id(rental.id)
                .one(db)
                .await?
                .ok_or_else(|| Error::not_found("payment", rental.id))?;
            return Ok(FineOutcome::AddedToRental(updated));
        }
    }

    let created = create_payment(db, borrowing_id, PaymentKind::Fine, fine).await?;
    Ok(FineOutcome::Created(created))
}

/// Finds a payment by ID.
pub async fn get_payment(db: &DatabaseConnection, payment_id: i64) -> Result<payment::Model> {
    Payment::find_by_id(payment_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("payment", payment_id))
}

/// Lists payments, newest first. With `user_id` only payments on that user's borrowings
/// are returned; without it (staff view) every payment is.
pub async fn list_payments(
    db: &DatabaseConnection,
    user_id: Option<&str>,
) -> Result<Vec<payment::Model>> {
    let mut query = Payment::find();
    if let Some(user_id) = user_id {
        query = query
            .inner_join(Borrowing)
            .filter(borrowing::Column::UserId.eq(user_id));
    }
    query
        .order_by_desc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Pending payments across all of the user's borrowings.
pub async fn pending_payments_for_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<payment::Model>> {
    Payment::find()
        .inner_join(Borrowing)
        .filter(borrowing::Column::UserId.eq(user_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .order_by_asc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All payments attached to one borrowing, oldest first.
pub async fn payments_for_borrowing(
    db: &DatabaseConnection,
    borrowing_id: i64,
) -> Result<Vec<payment::Model>> {
    Payment::find()
        .filter(payment::Column::BorrowingId.eq(borrowing_id))
        .order_by_asc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn session_status(
    provider: &dyn CheckoutProvider,
    config: &CheckoutConfig,
    payment_id: i64,
    session_id: &str,
) -> Result<SessionStatus> {
    with_timeout(config.timeout(), provider.retrieve_session(session_id))
        .await
        .inspect_err(|e| warn!("Checkout lookup for payment {} failed: {}", payment_id, e))
}

fn settled_message(payment: &payment::Model) -> String {
    format!(
        "Payment #{} settled:\nBorrowing ID: {}\nAmount: {}",
        payment.id, payment.borrowing_id, payment.money_to_pay
    )
}

/// Honours a session that was replaced by a fine top-up, if the provider reports it paid.
///
/// In one transaction the payment is settled for the amount that session covered, with
/// the session restored as the payment's own, and a pending `FINE` payment is opened for
/// the rest. Returns `None` when there is no superseded session, it is unpaid, or another
/// caller reconciled it first while the payment is still pending.
async fn settle_superseded(
    db: &DatabaseConnection,
    provider: &dyn CheckoutProvider,
    config: &CheckoutConfig,
    notifier: &Notifier,
    payment: &payment::Model,
) -> Result<Option<Settlement>> {
    let (Some(session_id), Some(covered)) =
        (payment.superseded_session_id.clone(), payment.superseded_amount)
    else {
        return Ok(None);
    };

    let status = session_status(provider, config, payment.id, &session_id).await?;
    if status != SessionStatus::Paid {
        return Ok(None);
    }

    let remainder_amount = payment.money_to_pay.checked_sub(covered).ok_or_else(|| {
        Error::Validation {
            message: format!("payment {} remainder out of range", payment.id),
        }
    })?;

    let txn = db.begin().await?;
    let flipped = Payment::update_many()
        .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Paid))
        .col_expr(payment::Column::MoneyToPay, Expr::value(covered))
        .col_expr(
            payment::Column::SessionUrl,
            Expr::col(payment::Column::SupersededSessionUrl).into(),
        )
        .col_expr(
            payment::Column::SessionId,
            Expr::col(payment::Column::SupersededSessionId).into(),
        )
        .col_expr(
            payment::Column::SupersededSessionUrl,
            Expr::value(Option::<String>::None),
        )
        .col_expr(
            payment::Column::SupersededSessionId,
            Expr::value(Option::<String>::None),
        )
        .col_expr(
            payment::Column::SupersededAmount,
            Expr::value(Option::<Decimal>::None),
        )
        .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(payment::Column::Id.eq(payment.id))
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .filter(payment::Column::SupersededSessionId.eq(session_id.as_str()))
        .filter(payment::Column::MoneyToPay.eq(payment.money_to_pay))
        .exec(&txn)
        .await?;

    if flipped.rows_affected == 0 {
        txn.rollback().await?;
        let current = get_payment(db, payment.id).await?;
        return Ok(current.is_paid().then_some(Settlement::AlreadySettled(current)));
    }

    let remainder = if remainder_amount > Decimal::ZERO {
        let fine = PaymentKind::Fine;
        Some(create_payment(&txn, payment.borrowing_id, fine, remainder_amount).await?)
    } else {
        None
    };
    txn.commit().await?;

    let settled = get_payment(db, payment.id).await?;
    info!(
        "Payment {} settled for {} by superseded session {}",
        settled.id, covered, session_id
    );
    notifier.notify(settled_message(&settled));

    Ok(Some(match remainder {
        Some(remainder) => Settlement::SettledWithRemainder {
            payment: settled,
            remainder,
        },
        None => Settlement::Settled(settled),
    }))
}

/// Opens a checkout session for a pending payment and returns the redirect URL.
///
/// The session URL and ID are stored together in one statement, and only while the
/// payment is still pending at the amount the session was opened for. A provider failure
/// or timeout leaves the payment untouched. If a session replaced by a fine top-up turns
/// out to be paid, that payment is settled first (see [`finalize_success`]) instead of
/// charging the user again.
///
/// # Errors
/// * `AlreadyPaid` - the payment is settled, including by a superseded session just now;
///   any uncovered remainder is then a separate pending fine payment
/// * `CheckoutUnavailable` - the provider failed or timed out, or the amount changed
///   while the session was being opened; the caller may retry
/// * `NotFound`, or a database error
#[instrument(skip(db, provider, config, notifier))]
pub async fn initiate_checkout(
    db: &DatabaseConnection,
    provider: &dyn CheckoutProvider,
    config: &CheckoutConfig,
    notifier: &Notifier,
    payment_id: i64,
) -> Result<String> {
    let payment = get_payment(db, payment_id).await?;
    if payment.is_paid() {
        return Err(Error::AlreadyPaid { payment_id });
    }
    if settle_superseded(db, provider, config, notifier, &payment)
        .await?
        .is_some()
    {
        return Err(Error::AlreadyPaid { payment_id });
    }

    let (_, book) = Borrowing::find_by_id(payment.borrowing_id)
        .find_also_related(Book)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("borrowing", payment.borrowing_id))?;
    let item_name = book.map_or_else(
        || format!("Borrowing #{}", payment.borrowing_id),
        |book| book.title,
    );

    let request = SessionRequest {
        amount: payment.money_to_pay,
        item_name,
        success_url: config.success_url(payment_id),
        cancel_url: config.cancel_url(payment_id),
        payment_id,
    };
    let session = with_timeout(config.timeout(), provider.create_session(request))
        .await
        .inspect_err(|e| warn!("Checkout session for payment {} failed: {}", payment_id, e))?;

    let stored = Payment::update_many()
        .col_expr(
            payment::Column::SessionUrl,
            Expr::value(Some(session.redirect_url.clone())),
        )
        .col_expr(
            payment::Column::SessionId,
            Expr::value(Some(session.session_id.clone())),
        )
        .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(payment::Column::Id.eq(payment_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .filter(payment::Column::MoneyToPay.eq(payment.money_to_pay))
        .exec(db)
        .await?;
    if stored.rows_affected == 0 {
        let current = get_payment(db, payment_id).await?;
        if current.is_paid() {
            return Err(Error::AlreadyPaid { payment_id });
        }
        warn!(
            "Payment {} changed from {} to {} while session {} was opened, discarding it",
            payment_id, payment.money_to_pay, current.money_to_pay, session.session_id
        );
        return Err(Error::CheckoutUnavailable {
            message: format!("payment {payment_id} changed during checkout, try again"),
        });
    }

    info!(
        "Opened checkout session {} for payment {} ({})",
        session.session_id, payment_id, payment.money_to_pay
    );
    Ok(session.redirect_url)
}

/// Confirms a payment against its checkout session after the provider's success callback.
///
/// The current session is asked first. If it is missing or unpaid and a session replaced
/// by a fine top-up is paid, the payment settles for the amount that session covered and
/// the rest moves to a new pending fine payment ([`Settlement::SettledWithRemainder`]).
///
/// Safe to retry: an already paid payment is reported as [`Settlement::AlreadySettled`]
/// without asking the provider again or notifying a second time.
///
/// # Errors
/// * `PaymentNotConfirmed` - no paid session, or the session or amount changed since the
///   provider was asked; the payment stays pending
/// * `NotFound`, `CheckoutUnavailable`, or a database error
#[instrument(skip(db, provider, config, notifier))]
pub async fn finalize_success(
    db: &DatabaseConnection,
    provider: &dyn CheckoutProvider,
    config: &CheckoutConfig,
    notifier: &Notifier,
    payment_id: i64,
) -> Result<Settlement> {
    let payment = get_payment(db, payment_id).await?;
    if payment.is_paid() {
        return Ok(Settlement::AlreadySettled(payment));
    }

    if let Some(session_id) = payment.session_id.clone() {
        let status = session_status(provider, config, payment_id, &session_id).await?;
        if status == SessionStatus::Paid {
            return settle_current(db, notifier, &payment, &session_id).await;
        }
        info!("Session {} for payment {} is not paid", session_id, payment_id);
    }

    settle_superseded(db, provider, config, notifier, &payment)
        .await?
        .ok_or(Error::PaymentNotConfirmed { payment_id })
}

async fn settle_current(
    db: &DatabaseConnection,
    notifier: &Notifier,
    payment: &payment::Model,
    session_id: &str,
) -> Result<Settlement> {
    let payment_id = payment.id;
    let flipped = Payment::update_many()
        .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Paid))
        .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(payment::Column::Id.eq(payment_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .filter(payment::Column::SessionId.eq(session_id))
        .filter(payment::Column::MoneyToPay.eq(payment.money_to_pay))
        .exec(db)
        .await?;

    let current = get_payment(db, payment_id).await?;
    if flipped.rows_affected == 0 {
        return if current.is_paid() {
            Ok(Settlement::AlreadySettled(current))
        } else {
            Err(Error::PaymentNotConfirmed { payment_id })
        };
    }

    info!("Payment {} settled for {}", payment_id, current.money_to_pay);
    notifier.notify(settled_message(&current));
    Ok(Settlement::Settled(current))
}

/// Handles the provider's cancel callback. The obligation stays pending so the user can
/// start checkout again later.
///
/// # Errors
/// `AlreadyPaid` when the payment is settled, `NotFound`, or a database error.
pub async fn finalize_cancel(db: &DatabaseConnection, payment_id: i64) -> Result<payment::Model> {
    let payment = get_payment(db, payment_id).await?;
    if payment.is_paid() {
        return Err(Error::AlreadyPaid { payment_id });
    }
    info!("Checkout cancelled for payment {}, still pending", payment_id);
    Ok(payment)
}
