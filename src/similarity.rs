use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::{LibraryContext, PrimaryKey, Store, StoreError, UserData, UserRole};

/// The widest possible distance between two ratings on the 1-5 scale
const MAX_RATING_DIFF: f32 = 4.0;

/// Scores how closely two rating sets agree on commonly rated books.
///
/// The score is 1 minus the mean absolute rating difference, normalized by
/// the widest possible difference, and discounted proportionally while the
/// overlap is smaller than `full_confidence_overlap`. No overlap scores zero.
pub fn score(
    a: &HashMap<PrimaryKey, u8>,
    b: &HashMap<PrimaryKey, u8>,
    full_confidence_overlap: usize,
) -> f32 {
    let common: Vec<_> = a
        .iter()
        .filter_map(|(book_id, left)| b.get(book_id).map(|right| (*left, *right)))
        .collect();

    if common.is_empty() {
        return 0.0;
    }

    let total_diff: f32 = common
        .iter()
        .map(|(left, right)| (*left as f32 - *right as f32).abs())
        .sum();
    let avg_diff = total_diff / common.len() as f32;

    let agreement = 1.0 - avg_diff / MAX_RATING_DIFF;
    let confidence = (common.len() as f32 / full_confidence_overlap.max(1) as f32).min(1.0);

    agreement * confidence
}

/// A candidate friend ranked by taste similarity
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub user: UserData,
    pub score: f32,
    /// How many books both parties have rated
    pub common_books: usize,
}

/// The data behind the reader affinity visualization
#[derive(Debug, Clone, Serialize)]
pub struct AffinityGraph {
    pub nodes: Vec<AffinityNode>,
    pub edges: Vec<AffinityEdge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AffinityNode {
    pub user_id: PrimaryKey,
    /// How many ratings the user has submitted
    pub weight: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AffinityEdge {
    pub a: PrimaryKey,
    pub b: PrimaryKey,
    pub similarity: f32,
}

/// Quantifies how alike two users' tastes are from their overlapping rated
/// books, feeding both friend suggestions and the affinity graph.
pub struct Similarity<S> {
    context: LibraryContext<S>,
}

impl<S> Similarity<S>
where
    S: Store,
{
    pub fn new(context: &LibraryContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Scores the taste affinity between two users
    pub async fn between(&self, a: PrimaryKey, b: PrimaryKey) -> Result<f32, StoreError> {
        let store = &self.context.store;

        store.user_by_id(a).await?;
        store.user_by_id(b).await?;

        let left = self.rating_map(a).await?;
        let right = self.rating_map(b).await?;

        Ok(score(
            &left,
            &right,
            self.context.config.full_confidence_overlap,
        ))
    }

    /// Ranks non-friend readers by taste similarity to the given user.
    ///
    /// Users without any ratings can never appear, and candidates below the
    /// configured threshold are not admitted.
    pub async fn suggestions_for(&self, user_id: PrimaryKey) -> Result<Vec<Suggestion>, StoreError> {
        let store = &self.context.store;

        let subject = store.user_by_id(user_id).await?;
        let by_user = self.ratings_by_user().await?;

        let mine = match by_user.get(&subject.id) {
            Some(ratings) => ratings,
            None => return Ok(Vec::new()),
        };

        let mut suggestions = Vec::new();

        for user in store.list_users().await? {
            if user.id == subject.id
                || user.role != UserRole::Reader
                || subject.friends.contains(&user.id)
            {
                continue;
            }

            let Some(theirs) = by_user.get(&user.id) else {
                continue;
            };

            let common_books = theirs.keys().filter(|b| mine.contains_key(b)).count();
            let value = score(mine, theirs, self.context.config.full_confidence_overlap);

            if value >= self.context.config.suggestion_threshold {
                suggestions.push(Suggestion {
                    user,
                    score: value,
                    common_books,
                });
            }
        }

        suggestions.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(Ordering::Equal)
                .then(y.common_books.cmp(&x.common_books))
                .then(x.user.id.cmp(&y.user.id))
        });

        Ok(suggestions)
    }

    /// Builds the affinity graph at the configured default threshold
    pub async fn affinity_graph(&self) -> Result<AffinityGraph, StoreError> {
        self.affinity_graph_at(self.context.config.affinity_threshold)
            .await
    }

    /// Builds the affinity graph, admitting edges at or above the threshold.
    ///
    /// Nodes are users with at least one rating, weighted by how many; an
    /// unrated user can never carry an edge and is omitted.
    pub async fn affinity_graph_at(&self, threshold: f32) -> Result<AffinityGraph, StoreError> {
        let store = &self.context.store;

        let users = store.list_users().await?;
        let by_user = self.ratings_by_user().await?;

        let rated: Vec<&UserData> = users
            .iter()
            .filter(|u| by_user.contains_key(&u.id))
            .collect();

        let nodes = rated
            .iter()
            .map(|user| AffinityNode {
                user_id: user.id,
                weight: by_user[&user.id].len(),
            })
            .collect();

        let mut edges = Vec::new();

        for (index, a) in rated.iter().enumerate() {
            for b in rated.iter().skip(index + 1) {
                let similarity = score(
                    &by_user[&a.id],
                    &by_user[&b.id],
                    self.context.config.full_confidence_overlap,
                );

                if similarity >= threshold {
                    edges.push(AffinityEdge {
                        a: a.id,
                        b: b.id,
                        similarity,
                    });
                }
            }
        }

        Ok(AffinityGraph { nodes, edges })
    }

    async fn rating_map(&self, user_id: PrimaryKey) -> Result<HashMap<PrimaryKey, u8>, StoreError> {
        let ratings = self.context.store.ratings_by_user(user_id).await?;

        Ok(ratings.into_iter().map(|r| (r.book_id, r.rating)).collect())
    }

    /// Every user's ratings keyed by book, in one store read
    async fn ratings_by_user(
        &self,
    ) -> Result<HashMap<PrimaryKey, HashMap<PrimaryKey, u8>>, StoreError> {
        let mut by_user: HashMap<PrimaryKey, HashMap<PrimaryKey, u8>> = HashMap::new();

        for rating in self.context.store.list_ratings().await? {
            by_user
                .entry(rating.user_id)
                .or_default()
                .insert(rating.book_id, rating.rating);
        }

        Ok(by_user)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{MemoryStore, NewBook, NewRating, NewUser};

    fn ratings(pairs: &[(PrimaryKey, u8)]) -> HashMap<PrimaryKey, u8> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_score_is_symmetric() {
        let a = ratings(&[(1, 5), (2, 3), (3, 1), (4, 4)]);
        let b = ratings(&[(2, 4), (3, 2), (4, 4), (9, 1)]);

        assert_eq!(score(&a, &b, 3), score(&b, &a, 3));
    }

    #[test]
    fn test_score_stays_in_bounds() {
        let cases = [
            (ratings(&[(1, 1)]), ratings(&[(1, 5)])),
            (ratings(&[(1, 5), (2, 5), (3, 5)]), ratings(&[(1, 5), (2, 5), (3, 5)])),
            (ratings(&[(1, 2)]), ratings(&[(2, 4)])),
            (ratings(&[]), ratings(&[(1, 3)])),
        ];

        for (a, b) in &cases {
            let value = score(a, b, 3);
            assert!((0.0..=1.0).contains(&value), "score {value} out of bounds");
        }
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        let a = ratings(&[(1, 5), (2, 3)]);
        let b = ratings(&[(3, 5), (4, 3)]);

        assert_eq!(score(&a, &b, 3), 0.0);
        assert_eq!(score(&a, &ratings(&[]), 3), 0.0);
    }

    #[test]
    fn test_perfect_agreement_with_full_overlap() {
        let a = ratings(&[(1, 5), (2, 3), (3, 1)]);

        assert_eq!(score(&a, &a, 3), 1.0);
    }

    #[test]
    fn test_small_overlap_discounts_confidence() {
        // Perfect agreement on a single shared book
        let a = ratings(&[(1, 4)]);
        let b = ratings(&[(1, 4)]);

        let value = score(&a, &b, 3);
        assert!((value - 1.0 / 3.0).abs() < f32::EPSILON);

        // Two shared books, two thirds confidence
        let a = ratings(&[(1, 4), (2, 2)]);
        let b = ratings(&[(1, 4), (2, 2)]);

        let value = score(&a, &b, 3);
        assert!((value - 2.0 / 3.0).abs() < f32::EPSILON);
    }

    async fn seed_reader(context: &LibraryContext<MemoryStore>, name: &str) -> PrimaryKey {
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

    async fn seed_books(context: &LibraryContext<MemoryStore>, count: usize) -> Vec<PrimaryKey> {
        let mut ids = Vec::new();

        for index in 0..count {
            let book = context
                .store
                .create_book(NewBook {
                    title: format!("Book {index}"),
                    author: "Anonymous".to_string(),
                    year: 2001,
                    category: "Fiction".to_string(),
                })
                .await
                .expect("book is created");
            ids.push(book.id);
        }

        ids
    }

    async fn rate(
        context: &LibraryContext<MemoryStore>,
        user_id: PrimaryKey,
        book_id: PrimaryKey,
        value: u8,
    ) {
        context
            .store
            .create_rating(NewRating {
                book_id,
                user_id,
                rating: value,
                comment: None,
            })
            .await
            .expect("rating is created");
    }

    #[tokio::test]
    async fn test_suggestions_rank_and_filter() {
        let context = LibraryContext::mock();
        let similarity = Similarity::new(&context);

        let subject = seed_reader(&context, "ada").await;
        let twin = seed_reader(&context, "brian").await;
        let opposite = seed_reader(&context, "carol").await;
        let stranger = seed_reader(&context, "dave").await;
        let friend = seed_reader(&context, "erin").await;

        let books = seed_books(&context, 3).await;

        for &book in &books {
            rate(&context, subject, book, 5).await;
            rate(&context, twin, book, 5).await;
            rate(&context, opposite, book, 1).await;
            rate(&context, friend, book, 5).await;
        }

        // An existing friend is never suggested, however well they match
        context
            .store
            .add_friendship(subject, friend)
            .await
            .unwrap();

        let suggestions = similarity.suggestions_for(subject).await.unwrap();

        let ids: Vec<_> = suggestions.iter().map(|s| s.user.id).collect();
        assert_eq!(ids, vec![twin], "only the agreeing stranger qualifies");
        assert_eq!(suggestions[0].common_books, 3);
        assert!((suggestions[0].score - 1.0).abs() < f32::EPSILON);

        // A user with no ratings gets no suggestions at all
        assert!(similarity.suggestions_for(stranger).await.unwrap().is_empty());

        // The disagreeing reader fell below the admission threshold
        assert!(!ids.contains(&opposite));
    }

    #[tokio::test]
    async fn test_affinity_graph_edges_respect_threshold() {
        let context = LibraryContext::mock();
        let similarity = Similarity::new(&context);

        let ada = seed_reader(&context, "ada").await;
        let brian = seed_reader(&context, "brian").await;
        let carol = seed_reader(&context, "carol").await;
        let unrated = seed_reader(&context, "dave").await;

        let books = seed_books(&context, 3).await;

        for &book in &books {
            rate(&context, ada, book, 5).await;
            rate(&context, brian, book, 5).await;
            rate(&context, carol, book, 1).await;
        }

        let graph = similarity.affinity_graph_at(0.5).await.unwrap();

        assert_eq!(graph.nodes.len(), 3, "unrated users are omitted");
        assert!(graph.nodes.iter().all(|n| n.user_id != unrated));
        assert!(graph.nodes.iter().all(|n| n.weight == 3));

        assert_eq!(graph.edges.len(), 1);
        assert_eq!((graph.edges[0].a, graph.edges[0].b), (ada, brian));
        assert!((graph.edges[0].similarity - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_between_handles_unrated_users() {
        let context = LibraryContext::mock();
        let similarity = Similarity::new(&context);

        let ada = seed_reader(&context, "ada").await;
        let brian = seed_reader(&context, "brian").await;

        assert_eq!(similarity.between(ada, brian).await.unwrap(), 0.0);

        assert!(matches!(
            similarity.between(ada, 999).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
