//! Overdue scanner - periodic reminder sweep over open borrowings.
//!
//! A borrowing is due when it is still open and its expected return date is no later than
//! the day after the scan date. Each scan recomputes the set from current data and keeps no
//! memory between runs, so a borrowing that stays overdue is reported on every run.

use crate::{
    config::OverdueConfig,
    entities::{Book, Borrowing, book, borrowing},
    errors::{Error, Result},
    integrations::Notifier,
};
use chrono::{Days, Local, NaiveDate};
use sea_orm::{Paginator, PaginatorTrait, QueryOrder, SelectTwoModel, prelude::*};
use std::future::Future;
use tracing::{error, info, instrument};

/// Message sent when a scan finds nothing due.
pub const NOTHING_OVERDUE: &str = "No borrowings overdue today!";

/// Summary of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Date the scan treated as today
    pub as_of: NaiveDate,
    /// Number of due borrowings reported
    pub notified: u64,
}

/// Open borrowings due by the day after `as_of`, with their books, paged by `page_size`.
///
/// Pages are fetched lazily; calling this again starts a fresh pass over current data.
pub fn due_borrowings(
    db: &DatabaseConnection,
    as_of: NaiveDate,
    page_size: u64,
) -> Result<Paginator<'_, DatabaseConnection, SelectTwoModel<borrowing::Model, book::Model>>> {
    let cutoff = as_of
        .checked_add_days(Days::new(1))
        .ok_or_else(|| Error::Validation {
            message: format!("Scan date {as_of} is out of range"),
        })?;

    Ok(Borrowing::find()
        .find_also_related(Book)
        .filter(borrowing::Column::ActualReturnDate.is_null())
        .filter(borrowing::Column::ExpectedReturnDate.lte(cutoff))
        .order_by_asc(borrowing::Column::Id)
        .paginate(db, page_size.max(1)))
}

fn overdue_message(borrowing: &borrowing::Model, book: Option<&book::Model>) -> String {
    let title = book.map_or("<deleted book>", |book| book.title.as_str());
    format!(
        "Overdue borrowing:\nBorrowing ID: {}\nUser: {}\nBook: {}",
        borrowing.id, borrowing.user_label, title
    )
}

/// Sends one notification per due borrowing, or a single [`NOTHING_OVERDUE`] message.
#[instrument(skip(db, notifier))]
pub async fn scan_due(
    db: &DatabaseConnection,
    notifier: &Notifier,
    as_of: NaiveDate,
    page_size: u64,
) -> Result<ScanReport> {
    let mut pages = due_borrowings(db, as_of, page_size)?;
    let mut notified = 0;

    while let Some(page) = pages.fetch_and_next().await? {
        for (borrowing, book) in page {
            notifier.notify(overdue_message(&borrowing, book.as_ref()));
            notified += 1;
        }
    }

    if notified == 0 {
        notifier.notify(NOTHING_OVERDUE);
    }

    info!("Overdue scan as of {} reported {} borrowings", as_of, notified);
    Ok(ScanReport { as_of, notified })
}

/// Runs [`scan_due`] every `config.interval()` until `shutdown` resolves.
///
/// The first scan starts immediately. A failed scan is logged and the schedule continues.
pub async fn run_overdue_schedule<F>(
    db: &DatabaseConnection,
    notifier: &Notifier,
    config: &OverdueConfig,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(config.interval());
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Overdue schedule stopped");
                break;
            }
            _ = ticker.tick() => {
                let today = Local::now().date_naive();
                if let Err(e) = scan_due(db, notifier, today, config.page_size).await {
                    error!("Overdue scan failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::borrowing::return_borrowing;
    use crate::test_utils::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_scan_with_nothing_due() -> Result<()> {
        let db = setup_test_db().await?;
        let (notifier, mut rx) = test_notifier();
        let book = create_custom_book(&db, "Dune", 1, 2).await?;
        borrow_for(&db, &notifier, "alice", book.id, 14).await?;
        drain(&mut rx);

        let report = scan_due(&db, &notifier, test_today(), 10).await?;

        assert_eq!(report.notified, 0);
        assert_eq!(drain(&mut rx), vec![NOTHING_OVERDUE.to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_reports_due_today_and_tomorrow() -> Result<()> {
        let db = setup_test_db().await?;
        let (notifier, mut rx) = test_notifier();
        let dune = create_custom_book(&db, "Dune", 1, 2).await?;
        let emma = create_custom_book(&db, "Emma", 1, 2).await?;
        let ulysses = create_custom_book(&db, "Ulysses", 1, 2).await?;

        let due_tomorrow = borrow_for(&db, &notifier, "alice", dune.id, 1).await?;
        let due_today = borrow_for(&db, &notifier, "bob", emma.id, 0).await?;
        borrow_for(&db, &notifier, "carol", ulysses.id, 2).await?;
        drain(&mut rx);

        let report = scan_due(&db, &notifier, test_today(), 10).await?;

        assert_eq!(report.notified, 2);
        let messages = drain(&mut rx);
        assert_eq!(
            messages,
            vec![
                format!(
                    "Overdue borrowing:\nBorrowing ID: {}\nUser: alice@example.com\nBook: Dune",
                    due_tomorrow.borrowing.id
                ),
                format!(
                    "Overdue borrowing:\nBorrowing ID: {}\nUser: bob@example.com\nBook: Emma",
                    due_today.borrowing.id
                ),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_skips_returned_and_walks_all_pages() -> Result<()> {
        let db = setup_test_db().await?;
        let (notifier, mut rx) = test_notifier();
        let book = create_custom_book(&db, "Dune", 5, 2).await?;

        for user in ["u1", "u2", "u3", "u4"] {
            borrow_for(&db, &notifier, user, book.id, 0).await?;
        }
        let returned = borrow_for(&db, &notifier, "u5", book.id, 0).await?;
        return_borrowing(&db, returned.borrowing.id, test_today()).await?;
        drain(&mut rx);

        let report = scan_due(&db, &notifier, test_today(), 3).await?;
        assert_eq!(report.notified, 4);
        assert_eq!(drain(&mut rx).len(), 4);

        // Stateless between runs: a second scan reports the same borrowings again
        let again = scan_due(&db, &notifier, test_today(), 3).await?;
        assert_eq!(again.notified, 4);
        assert_eq!(drain(&mut rx).len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_schedule_scans_until_shutdown() -> Result<()> {
        let db = setup_test_db().await?;
        let (notifier, mut rx) = test_notifier();
        let config = OverdueConfig {
            interval_secs: 3600,
            page_size: 10,
        };

        run_overdue_schedule(
            &db,
            &notifier,
            &config,
            tokio::time::sleep(Duration::from_millis(200)),
        )
        .await;

        assert_eq!(drain(&mut rx), vec![NOTHING_OVERDUE.to_string()]);
        Ok(())
    }
}
