//! Checkout provider interface.
//!
//! A provider turns an amount into a hosted checkout session and later reports whether
//! that session was paid. Calls are blocking network round trips, so callers must not
//! hold a database transaction open across them.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::{future::Future, time::Duration};

/// Everything a provider needs to open a checkout session for one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Amount to charge, the payment's `money_to_pay`
    pub amount: Decimal,
    /// Line item shown to the payer, the book title
    pub item_name: String,
    /// Where the provider redirects after payment
    pub success_url: String,
    /// Where the provider redirects when the payer backs out
    pub cancel_url: String,
    /// Echoed back by the provider as session metadata
    pub payment_id: i64,
}

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Provider reference used to look the session up later
    pub session_id: String,
    /// Hosted checkout page for the payer
    pub redirect_url: String,
}

/// Terminal state reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The payer completed the checkout
    Paid,
    /// Anything short of paid: open, expired, failed
    Unpaid,
}

/// External hosted-checkout service.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Opens a checkout session for `request`.
    async fn create_session(&self, request: SessionRequest) -> Result<CheckoutSession>;

    /// Looks up the terminal status of an existing session.
    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus>;
}

/// Runs a provider call under `limit`, mapping both timeouts and provider failures to
/// [`Error::CheckoutUnavailable`].
pub(crate) async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Error::CheckoutUnavailable { message })) => {
            Err(Error::CheckoutUnavailable { message })
        }
        Ok(Err(e)) => Err(Error::CheckoutUnavailable {
            message: e.to_string(),
        }),
        Err(_) => Err(Error::CheckoutUnavailable {
            message: format!("provider did not answer within {limit:?}"),
        }),
    }
}
