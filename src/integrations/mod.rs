//! External collaborators - the checkout provider and notification channels.
//!
//! The core only sees the traits defined here. Concrete adapters receive their
//! credentials at construction time and never read process state on their own.

/// Checkout provider seam
pub mod checkout;
/// Discord notification sink
pub mod discord;
/// Fire-and-forget notification dispatch
pub mod notifier;

pub use checkout::{CheckoutProvider, CheckoutSession, SessionRequest, SessionStatus};
pub use discord::DiscordSink;
pub use notifier::{LogSink, NotificationSink, Notifier};
