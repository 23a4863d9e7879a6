use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use log::{info, warn};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;

use crate::{
    BookStatus, LibraryContext, LibraryEvent, LoanData, LoanStatus, NewLoan, PrimaryKey, Store,
    StoreError, WaitlistView,
};

/// Arbitrates access to each book's single circulating copy.
///
/// Every decision about a book's loan state is made under that book's lock,
/// so a borrow, return, or promotion can never act on a stale read.
pub struct Circulation<S> {
    context: LibraryContext<S>,
    /// One lock per book, serializing the borrow/return/promote sequence
    locks: DashMap<PrimaryKey, Arc<Mutex<()>>>,
}

#[derive(Debug, Error)]
pub enum CirculationError {
    /// User already holds this book
    #[error("User already holds an active loan for this book")]
    AlreadyBorrowed,
    /// User is already queued for this book
    #[error("User is already waiting for this book")]
    AlreadyWaiting,
    /// The loan is not in the active state
    #[error("Loan is not active")]
    LoanNotActive,
    /// The book's lock could not be acquired in time; the caller may retry
    #[error("Timed out waiting for the book's circulation lock")]
    LockBusy,
    /// The book cannot be retired while someone holds it
    #[error("Book is currently on loan")]
    BookOnLoan,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<S> Circulation<S>
where
    S: Store,
{
    pub fn new(context: &LibraryContext<S>) -> Self {
        Self {
            context: context.clone(),
            locks: Default::default(),
        }
    }

    /// Acquires the book's circulation lock within the configured deadline
    async fn lock_book(
        &self,
        book_id: PrimaryKey,
    ) -> Result<OwnedMutexGuard<()>, CirculationError> {
        let lock = self.locks.entry(book_id).or_default().clone();

        timeout(self.context.config.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| CirculationError::LockBusy)
    }

    /// Requests a loan for a book.
    ///
    /// The loan comes back active if the copy is free, and waiting with the
    /// next queue rank otherwise.
    pub async fn request_loan(
        &self,
        book_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<LoanData, CirculationError> {
        let store = &self.context.store;

        store.user_by_id(user_id).await?;

        let _guard = self.lock_book(book_id).await?;

        let book = store.book_by_id(book_id).await?;
        let loans = store.loans_by_book(book_id).await?;

        if loans
            .iter()
            .any(|l| l.user_id == user_id && l.status == LoanStatus::Active)
        {
            return Err(CirculationError::AlreadyBorrowed);
        }
        if loans
            .iter()
            .any(|l| l.user_id == user_id && l.status == LoanStatus::Waiting)
        {
            return Err(CirculationError::AlreadyWaiting);
        }

        let held = loans.iter().any(|l| l.status == LoanStatus::Active);

        if !held {
            let loan = store
                .create_loan(NewLoan {
                    book_id,
                    user_id,
                    status: LoanStatus::Active,
                    priority: None,
                })
                .await?;

            if let Err(e) = store.set_book_status(book_id, BookStatus::Borrowed).await {
                // Leave no active loan behind if the projection write failed
                store.delete_loan(loan.id).await.ok();
                return Err(e.into());
            }

            info!("Book \"{}\" loaned to user {}", book.title, user_id);
            self.context
                .emit(LibraryEvent::LoanActivated { loan: loan.clone() });

            return Ok(loan);
        }

        // The copy is out, so the request queues up behind every current waiter
        let waiting: Vec<_> = loans
            .iter()
            .filter(|l| l.status == LoanStatus::Waiting)
            .collect();
        let next_priority = waiting.iter().filter_map(|l| l.priority).max().unwrap_or(0) + 1;
        let position = waiting.len() + 1;

        let loan = store
            .create_loan(NewLoan {
                book_id,
                user_id,
                status: LoanStatus::Waiting,
                priority: Some(next_priority),
            })
            .await?;

        info!(
            "User {} queued for book \"{}\" at position {}",
            user_id, book.title, position
        );
        self.context.emit(LibraryEvent::LoanQueued {
            loan: loan.clone(),
            position,
        });

        Ok(loan)
    }

    /// Returns an active loan, handing the book to the head of its waitlist.
    ///
    /// The return and the promotion happen under the book's lock as a single
    /// all-or-nothing step.
    pub async fn return_loan(&self, loan_id: PrimaryKey) -> Result<LoanData, CirculationError> {
        let store = &self.context.store;

        let loan = store.loan_by_id(loan_id).await?;

        if loan.status != LoanStatus::Active {
            return Err(CirculationError::LoanNotActive);
        }

        let _guard = self.lock_book(loan.book_id).await?;

        // Re-read under the lock so the state decision is never stale
        let loan = store.loan_by_id(loan_id).await?;
        if loan.status != LoanStatus::Active {
            return Err(CirculationError::LoanNotActive);
        }

        let returned = store
            .update_loan(LoanData {
                status: LoanStatus::Returned,
                return_date: Some(Utc::now()),
                ..loan.clone()
            })
            .await?;

        if let Err(e) = self.promote_next(loan.book_id).await {
            warn!(
                "Rolling back return of loan {} after a failed promotion",
                loan.id
            );
            store.update_loan(loan).await.ok();
            return Err(e);
        }

        info!("Loan {} returned for book {}", returned.id, returned.book_id);
        self.context.emit(LibraryEvent::LoanReturned {
            loan_id: returned.id,
            book_id: returned.book_id,
        });

        Ok(returned)
    }

    /// Hands the book to its next waiter, or parks it as available.
    /// Callers must hold the book's lock.
    async fn promote_next(&self, book_id: PrimaryKey) -> Result<(), CirculationError> {
        let store = &self.context.store;

        let mut waiting = store.waiting_loans_by_book(book_id).await?;
        sort_queue(&mut waiting);

        let Some(head) = waiting.into_iter().next() else {
            store
                .set_book_status(book_id, BookStatus::Available)
                .await?;
            return Ok(());
        };

        let promoted = store
            .update_loan(LoanData {
                status: LoanStatus::Active,
                loan_date: Utc::now(),
                priority: None,
                ..head.clone()
            })
            .await?;

        if let Err(e) = store.set_book_status(book_id, BookStatus::Borrowed).await {
            store.update_loan(head).await.ok();
            return Err(e.into());
        }

        info!(
            "Loan {} promoted to active for book {}",
            promoted.id, book_id
        );
        self.context
            .emit(LibraryEvent::LoanPromoted { loan: promoted });

        Ok(())
    }

    /// Returns the book's waiting loans in the order they will be served
    pub async fn loan_queue(&self, book_id: PrimaryKey) -> Result<Vec<LoanData>, CirculationError> {
        let store = &self.context.store;

        store.book_by_id(book_id).await?;

        let mut waiting = store.waiting_loans_by_book(book_id).await?;
        sort_queue(&mut waiting);

        Ok(waiting)
    }

    /// Returns the user's 1-based place in the book's queue, if they are in it
    pub async fn queue_position(
        &self,
        book_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<Option<usize>, CirculationError> {
        let queue = self.loan_queue(book_id).await?;

        Ok(queue
            .iter()
            .position(|l| l.user_id == user_id)
            .map(|index| index + 1))
    }

    /// Returns all of a user's loans, newest first, for history display
    pub async fn loans_for_user(
        &self,
        user_id: PrimaryKey,
    ) -> Result<Vec<LoanData>, CirculationError> {
        let store = &self.context.store;

        store.user_by_id(user_id).await?;

        let mut loans = store.loans_by_user(user_id).await?;
        loans.sort_by(|a, b| b.loan_date.cmp(&a.loan_date).then(b.id.cmp(&a.id)));

        Ok(loans)
    }

    pub async fn loan_by_id(&self, loan_id: PrimaryKey) -> Result<LoanData, CirculationError> {
        Ok(self.context.store.loan_by_id(loan_id).await?)
    }

    /// Returns the loan currently holding the book, if any
    pub async fn active_loan(
        &self,
        book_id: PrimaryKey,
    ) -> Result<Option<LoanData>, CirculationError> {
        Ok(self.context.store.active_loan_by_book(book_id).await?)
    }

    /// The waitlist-shaped view over a book's queue
    pub async fn waitlist_for_book(
        &self,
        book_id: PrimaryKey,
    ) -> Result<Vec<WaitlistView>, CirculationError> {
        let queue = self.loan_queue(book_id).await?;

        Ok(queue.iter().map(WaitlistView::from).collect())
    }

    /// All the queues a user currently sits in, oldest request first
    pub async fn waitlist_for_user(
        &self,
        user_id: PrimaryKey,
    ) -> Result<Vec<WaitlistView>, CirculationError> {
        let store = &self.context.store;

        store.user_by_id(user_id).await?;

        let mut waiting = store.waiting_loans_by_user(user_id).await?;
        waiting.sort_by(|a, b| a.loan_date.cmp(&b.loan_date).then(a.id.cmp(&b.id)));

        Ok(waiting.iter().map(WaitlistView::from).collect())
    }

    /// How many users are queued for the book
    pub async fn waitlist_count_for_book(
        &self,
        book_id: PrimaryKey,
    ) -> Result<usize, CirculationError> {
        Ok(self.loan_queue(book_id).await?.len())
    }

    /// How many queues the user currently sits in
    pub async fn waitlist_count_for_user(
        &self,
        user_id: PrimaryKey,
    ) -> Result<usize, CirculationError> {
        Ok(self.waitlist_for_user(user_id).await?.len())
    }

    /// Takes a book out of circulation, cancelling its waitlist.
    ///
    /// Refused while the book is on loan; the copy has to come back first.
    pub async fn retire_book(&self, book_id: PrimaryKey) -> Result<(), CirculationError> {
        let store = &self.context.store;

        let _guard = self.lock_book(book_id).await?;

        let book = store.book_by_id(book_id).await?;

        if store.active_loan_by_book(book_id).await?.is_some() {
            return Err(CirculationError::BookOnLoan);
        }

        let waiting = store.waiting_loans_by_book(book_id).await?;
        let cancelled_waiters = waiting.len();

        for loan in waiting {
            store.delete_loan(loan.id).await?;
        }
        for rating in store.ratings_by_book(book_id).await? {
            store.delete_rating(rating.id).await?;
        }

        store.delete_book(book_id).await?;

        info!(
            "Book \"{}\" retired, {} waiting loans cancelled",
            book.title, cancelled_waiters
        );
        self.context.emit(LibraryEvent::BookRetired {
            book_id,
            cancelled_waiters,
        });

        Ok(())
    }
}

/// Queue order: rank first, then request time, then id to make ties total
fn sort_queue(loans: &mut [LoanData]) {
    loans.sort_by(|a, b| {
        let rank_a = a.priority.unwrap_or(i32::MAX);
        let rank_b = b.priority.unwrap_or(i32::MAX);

        rank_a
            .cmp(&rank_b)
            .then(a.loan_date.cmp(&b.loan_date))
            .then(a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Config, MemoryStore, NewBook, NewUser, UserRole};
    use std::time::Duration;

    async fn seed_user(context: &LibraryContext<MemoryStore>, name: &str) -> PrimaryKey {
        context
            .store
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password: "opaque".to_string(),
                role: UserRole::Reader,
            })
            .await
            .expect("user is created")
            .id
    }

    async fn seed_book(context: &LibraryContext<MemoryStore>, title: &str) -> PrimaryKey {
        context
            .store
            .create_book(NewBook {
                title: title.to_string(),
                author: "Anonymous".to_string(),
                year: 2001,
                category: "Fiction".to_string(),
            })
            .await
            .expect("book is created")
            .id
    }

    #[tokio::test]
    async fn test_duplicate_requests_are_rejected() {
        let context = LibraryContext::mock();
        let circulation = Circulation::new(&context);

        let book = seed_book(&context, "Dubliners").await;
        let holder = seed_user(&context, "ada").await;
        let waiter = seed_user(&context, "brian").await;

        circulation.request_loan(book, holder).await.unwrap();
        circulation.request_loan(book, waiter).await.unwrap();

        assert!(matches!(
            circulation.request_loan(book, holder).await,
            Err(CirculationError::AlreadyBorrowed)
        ));
        assert!(matches!(
            circulation.request_loan(book, waiter).await,
            Err(CirculationError::AlreadyWaiting)
        ));
    }

    #[tokio::test]
    async fn test_unknown_book_or_user_is_not_found() {
        let context = LibraryContext::mock();
        let circulation = Circulation::new(&context);

        let user = seed_user(&context, "ada").await;
        let book = seed_book(&context, "Dubliners").await;

        assert!(matches!(
            circulation.request_loan(999, user).await,
            Err(CirculationError::Store(StoreError::NotFound { .. }))
        ));
        assert!(matches!(
            circulation.request_loan(book, 999).await,
            Err(CirculationError::Store(StoreError::NotFound { .. }))
        ));
        assert!(matches!(
            circulation.return_loan(999).await,
            Err(CirculationError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_double_return_is_an_error() {
        let context = LibraryContext::mock();
        let circulation = Circulation::new(&context);

        let book = seed_book(&context, "Dubliners").await;
        let user = seed_user(&context, "ada").await;

        let loan = circulation.request_loan(book, user).await.unwrap();
        circulation.return_loan(loan.id).await.unwrap();

        assert!(matches!(
            circulation.return_loan(loan.id).await,
            Err(CirculationError::LoanNotActive)
        ));
    }

    #[tokio::test]
    async fn test_waiters_promote_in_request_order() {
        let context = LibraryContext::mock();
        let circulation = Circulation::new(&context);

        let book = seed_book(&context, "Dubliners").await;
        let holder = seed_user(&context, "ada").await;
        let first = seed_user(&context, "brian").await;
        let second = seed_user(&context, "carol").await;
        let third = seed_user(&context, "dave").await;

        let loan = circulation.request_loan(book, holder).await.unwrap();
        circulation.request_loan(book, first).await.unwrap();
        circulation.request_loan(book, second).await.unwrap();
        circulation.request_loan(book, third).await.unwrap();

        assert_eq!(
            circulation.queue_position(book, third).await.unwrap(),
            Some(3)
        );

        circulation.return_loan(loan.id).await.unwrap();
        let active = circulation.active_loan(book).await.unwrap().unwrap();
        assert_eq!(active.user_id, first);
        assert_eq!(active.priority, None);

        circulation.return_loan(active.id).await.unwrap();
        let active = circulation.active_loan(book).await.unwrap().unwrap();
        assert_eq!(active.user_id, second);

        // Remaining waiter moved up
        assert_eq!(
            circulation.queue_position(book, third).await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_equal_ranks_fall_back_to_request_time() {
        let context = LibraryContext::mock();
        let circulation = Circulation::new(&context);

        let book = seed_book(&context, "Dubliners").await;
        let early = seed_user(&context, "ada").await;
        let late = seed_user(&context, "brian").await;

        // Inject two waiters sharing a rank; request times break the tie
        for user_id in [early, late] {
            context
                .store
                .create_loan(NewLoan {
                    book_id: book,
                    user_id,
                    status: LoanStatus::Waiting,
                    priority: Some(1),
                })
                .await
                .unwrap();
        }

        let queue = circulation.loan_queue(book).await.unwrap();
        assert_eq!(queue[0].user_id, early);
        assert_eq!(queue[1].user_id, late);
    }

    #[tokio::test]
    async fn test_at_most_one_active_loan_under_contention() {
        let context = LibraryContext::mock();
        let circulation = Arc::new(Circulation::new(&context));

        let book = seed_book(&context, "Dubliners").await;

        let mut users = Vec::new();
        for i in 0..8 {
            users.push(seed_user(&context, &format!("reader-{i}")).await);
        }

        let mut handles = Vec::new();
        for user in users {
            let circulation = circulation.clone();
            handles.push(tokio::spawn(async move {
                circulation.request_loan(book, user).await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loans = context.store.loans_by_book(book).await.unwrap();
        let active = loans
            .iter()
            .filter(|l| l.status == LoanStatus::Active)
            .count();
        let waiting = loans
            .iter()
            .filter(|l| l.status == LoanStatus::Waiting)
            .count();

        assert_eq!(active, 1, "exactly one loan may hold the copy");
        assert_eq!(waiting, 7);

        // Ranks are distinct, so the queue order is total
        let mut ranks: Vec<_> = loans.iter().filter_map(|l| l.priority).collect();
        ranks.sort_unstable();
        ranks.dedup();
        assert_eq!(ranks.len(), 7);
    }

    #[tokio::test]
    async fn test_contended_lock_times_out() {
        let config = Config {
            lock_timeout: Duration::from_millis(25),
            ..Default::default()
        };
        let context = LibraryContext::mock_with(config);
        let circulation = Circulation::new(&context);

        let book = seed_book(&context, "Dubliners").await;
        let user = seed_user(&context, "ada").await;

        let lock = circulation.locks.entry(book).or_default().clone();
        let _held = lock.lock_owned().await;

        assert!(matches!(
            circulation.request_loan(book, user).await,
            Err(CirculationError::LockBusy)
        ));
    }

    #[tokio::test]
    async fn test_retire_book_cancels_queue() {
        let context = LibraryContext::mock();
        let circulation = Circulation::new(&context);

        let book = seed_book(&context, "Dubliners").await;
        let holder = seed_user(&context, "ada").await;
        let waiter = seed_user(&context, "brian").await;

        let loan = circulation.request_loan(book, holder).await.unwrap();
        circulation.request_loan(book, waiter).await.unwrap();

        assert!(matches!(
            circulation.retire_book(book).await,
            Err(CirculationError::BookOnLoan)
        ));

        circulation.return_loan(loan.id).await.unwrap();

        // The waiter was promoted by the return, so the book is held again
        let promoted = circulation.active_loan(book).await.unwrap().unwrap();
        circulation.return_loan(promoted.id).await.unwrap();

        circulation.retire_book(book).await.unwrap();

        assert!(context.store.book_by_id(book).await.is_err());
        assert!(context
            .store
            .waiting_loans_by_book(book)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_waitlist_views_mirror_waiting_loans() {
        let context = LibraryContext::mock();
        let circulation = Circulation::new(&context);

        let book = seed_book(&context, "Dubliners").await;
        let holder = seed_user(&context, "ada").await;
        let waiter = seed_user(&context, "brian").await;

        circulation.request_loan(book, holder).await.unwrap();
        let waiting = circulation.request_loan(book, waiter).await.unwrap();

        let by_book = circulation.waitlist_for_book(book).await.unwrap();
        assert_eq!(by_book.len(), 1);
        assert_eq!(by_book[0].id, waiting.id);
        assert_eq!(by_book[0].priority, 1);
        assert_eq!(by_book[0].request_date, waiting.loan_date);

        let by_user = circulation.waitlist_for_user(waiter).await.unwrap();
        assert_eq!(by_user.len(), 1);
        assert_eq!(by_user[0].book_id, book);
    }
}
