use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use log::info;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;

use crate::{
    LibraryContext, LibraryEvent, NewRating, PrimaryKey, RatingData, Store, StoreError,
};

/// Keeps every book's average rating consistent with its live rating set.
pub struct Ratings<S> {
    context: LibraryContext<S>,
    /// Per-book lock guarding the average against concurrent rating writes.
    /// Independent of the circulation lock for the same book.
    locks: DashMap<PrimaryKey, Arc<Mutex<()>>>,
}

#[derive(Debug, Error)]
pub enum RatingError {
    /// Ratings are stars, one through five
    #[error("Rating {0} is outside the 1-5 scale")]
    OutOfRange(u8),
    /// The book's rating lock could not be acquired in time; the caller may retry
    #[error("Timed out waiting for the book's rating lock")]
    LockBusy,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Changes to an existing rating
#[derive(Debug)]
pub struct UpdatedRating {
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

impl<S> Ratings<S>
where
    S: Store,
{
    pub fn new(context: &LibraryContext<S>) -> Self {
        Self {
            context: context.clone(),
            locks: Default::default(),
        }
    }

    async fn lock_book(&self, book_id: PrimaryKey) -> Result<OwnedMutexGuard<()>, RatingError> {
        let lock = self.locks.entry(book_id).or_default().clone();

        timeout(self.context.config.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| RatingError::LockBusy)
    }

    /// Rates a book on behalf of a user.
    ///
    /// A second rating for the same pair is an edit of the first, so no
    /// duplicate rows can ever coexist for one (book, user).
    pub async fn rate(&self, new_rating: NewRating) -> Result<RatingData, RatingError> {
        check_scale(new_rating.rating)?;

        let store = &self.context.store;

        store.book_by_id(new_rating.book_id).await?;
        store.user_by_id(new_rating.user_id).await?;

        let _guard = self.lock_book(new_rating.book_id).await?;

        let existing = store
            .rating_by_book_and_user(new_rating.book_id, new_rating.user_id)
            .await?;

        let rating = match existing {
            Some(current) => {
                let prior = current.clone();
                let amended = store
                    .update_rating(RatingData {
                        rating: new_rating.rating,
                        comment: new_rating.comment,
                        date: Utc::now(),
                        ..current
                    })
                    .await?;

                if let Err(e) = self.recompute_average(amended.book_id).await {
                    store.update_rating(prior).await.ok();
                    return Err(e);
                }

                amended
            }
            None => {
                let created = store.create_rating(new_rating).await?;

                if let Err(e) = self.recompute_average(created.book_id).await {
                    store.delete_rating(created.id).await.ok();
                    return Err(e);
                }

                created
            }
        };

        Ok(rating)
    }

    /// Edits an existing rating
    pub async fn amend(
        &self,
        rating_id: PrimaryKey,
        updated: UpdatedRating,
    ) -> Result<RatingData, RatingError> {
        if let Some(value) = updated.rating {
            check_scale(value)?;
        }

        let store = &self.context.store;
        let current = store.rating_by_id(rating_id).await?;

        let _guard = self.lock_book(current.book_id).await?;

        let prior = current.clone();
        let amended = store
            .update_rating(RatingData {
                rating: updated.rating.unwrap_or(current.rating),
                comment: updated.comment.or(current.comment),
                date: Utc::now(),
                ..prior.clone()
            })
            .await?;

        if let Err(e) = self.recompute_average(amended.book_id).await {
            store.update_rating(prior).await.ok();
            return Err(e);
        }

        Ok(amended)
    }

    /// Removes a rating, folding the average back over what remains
    pub async fn retract(&self, rating_id: PrimaryKey) -> Result<(), RatingError> {
        let store = &self.context.store;
        let rating = store.rating_by_id(rating_id).await?;

        let _guard = self.lock_book(rating.book_id).await?;

        store.delete_rating(rating_id).await?;

        if let Err(e) = self.recompute_average(rating.book_id).await {
            store
                .create_rating(NewRating {
                    book_id: rating.book_id,
                    user_id: rating.user_id,
                    rating: rating.rating,
                    comment: rating.comment,
                })
                .await
                .ok();
            return Err(e);
        }

        Ok(())
    }

    pub async fn ratings_for_book(
        &self,
        book_id: PrimaryKey,
    ) -> Result<Vec<RatingData>, RatingError> {
        Ok(self.context.store.ratings_by_book(book_id).await?)
    }

    pub async fn ratings_for_user(
        &self,
        user_id: PrimaryKey,
    ) -> Result<Vec<RatingData>, RatingError> {
        Ok(self.context.store.ratings_by_user(user_id).await?)
    }

    /// Writes the mean of the book's ratings onto the book record.
    /// Callers must hold the book's rating lock.
    async fn recompute_average(&self, book_id: PrimaryKey) -> Result<(), RatingError> {
        let store = &self.context.store;

        let ratings = store.ratings_by_book(book_id).await?;

        let average = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().map(|r| r.rating as f32).sum::<f32>() / ratings.len() as f32
        };

        store.set_average_rating(book_id, average).await?;

        info!("Book {} average rating is now {:.2}", book_id, average);
        self.context
            .emit(LibraryEvent::RatingChanged { book_id, average });

        Ok(())
    }
}

fn check_scale(value: u8) -> Result<(), RatingError> {
    if !(1..=5).contains(&value) {
        return Err(RatingError::OutOfRange(value));
    }

    Ok(())
}
