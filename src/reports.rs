use std::collections::HashMap;

use serde::Serialize;

use crate::{BookData, LibraryContext, LoanStatus, PrimaryKey, Store, StoreError};

/// Read-only statistics over the store. Path and most-friends queries live on
/// the social graph engine; this facade holds no second copy of them.
pub struct Reports<S> {
    context: LibraryContext<S>,
}

/// A book ranked by how often it was rated
#[derive(Debug, Clone, Serialize)]
pub struct RatedBook {
    pub book: BookData,
    pub rating_count: usize,
}

/// A user's loan counts per lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoanStats {
    pub active: usize,
    pub waiting: usize,
    pub returned: usize,
}

impl<S> Reports<S>
where
    S: Store,
{
    pub fn new(context: &LibraryContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Books ranked by how often they were rated, not how well.
    /// Books nobody rated are left out.
    pub async fn most_rated_books(&self, limit: usize) -> Result<Vec<RatedBook>, StoreError> {
        let store = &self.context.store;

        let books = store.list_books().await?;

        let mut counts: HashMap<PrimaryKey, usize> = HashMap::new();
        for rating in store.list_ratings().await? {
            *counts.entry(rating.book_id).or_default() += 1;
        }

        let mut ranked: Vec<RatedBook> = books
            .into_iter()
            .filter_map(|book| {
                counts.get(&book.id).map(|&rating_count| RatedBook {
                    book,
                    rating_count,
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.rating_count
                .cmp(&a.rating_count)
                .then(a.book.id.cmp(&b.book.id))
        });
        ranked.truncate(limit);

        Ok(ranked)
    }

    /// Counts a user's loans per lifecycle state
    pub async fn user_loan_stats(&self, user_id: PrimaryKey) -> Result<LoanStats, StoreError> {
        let store = &self.context.store;

        store.user_by_id(user_id).await?;

        let mut stats = LoanStats::default();

        for loan in store.loans_by_user(user_id).await? {
            match loan.status {
                LoanStatus::Active => stats.active += 1,
                LoanStatus::Waiting => stats.waiting += 1,
                LoanStatus::Returned => stats.returned += 1,
            }
        }

        Ok(stats)
    }
}
