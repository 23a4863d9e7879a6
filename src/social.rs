use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use log::info;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;

use crate::{LibraryContext, LibraryEvent, PrimaryKey, Store, StoreError, UserData};

/// Treats the users' friends lists as an undirected graph and answers
/// connectivity and ranking queries over it.
pub struct SocialGraph<S> {
    context: LibraryContext<S>,
    /// Per-user lock; both sides of a friendship mutation are held at once
    locks: DashMap<PrimaryKey, Arc<Mutex<()>>>,
}

#[derive(Debug, Error)]
pub enum SocialError {
    /// Users cannot befriend themselves
    #[error("Users cannot befriend themselves")]
    SelfFriendship,
    /// The user locks could not be acquired in time; the caller may retry
    #[error("Timed out waiting for the user locks")]
    LockBusy,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A user ranked by the size of their friends list
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedUser {
    pub user: UserData,
    pub friend_count: usize,
}

impl<S> SocialGraph<S>
where
    S: Store,
{
    pub fn new(context: &LibraryContext<S>) -> Self {
        Self {
            context: context.clone(),
            locks: Default::default(),
        }
    }

    async fn lock_user(&self, user_id: PrimaryKey) -> Result<OwnedMutexGuard<()>, SocialError> {
        let lock = self.locks.entry(user_id).or_default().clone();

        timeout(self.context.config.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| SocialError::LockBusy)
    }

    /// Locks both users, always in ascending id order so two symmetric calls
    /// can never deadlock each other
    async fn lock_pair(
        &self,
        a: PrimaryKey,
        b: PrimaryKey,
    ) -> Result<(OwnedMutexGuard<()>, OwnedMutexGuard<()>), SocialError> {
        let (first, second) = if a < b { (a, b) } else { (b, a) };

        let first = self.lock_user(first).await?;
        let second = self.lock_user(second).await?;

        Ok((first, second))
    }

    /// Makes two users friends of each other.
    ///
    /// Both adjacency lists are written in the same store transaction.
    /// Adding an existing friendship is a no-op.
    pub async fn add_friend(&self, a: PrimaryKey, b: PrimaryKey) -> Result<(), SocialError> {
        if a == b {
            return Err(SocialError::SelfFriendship);
        }

        let store = &self.context.store;
        let _guards = self.lock_pair(a, b).await?;

        let user_a = store.user_by_id(a).await?;
        store.user_by_id(b).await?;

        if user_a.friends.contains(&b) {
            return Ok(());
        }

        store.add_friendship(a, b).await?;

        info!("Users {} and {} are now friends", a, b);
        self.context.emit(LibraryEvent::FriendshipFormed { a, b });

        Ok(())
    }

    /// Dissolves a friendship on both sides. Removing one that doesn't exist
    /// is a no-op.
    pub async fn remove_friend(&self, a: PrimaryKey, b: PrimaryKey) -> Result<(), SocialError> {
        if a == b {
            return Err(SocialError::SelfFriendship);
        }

        let store = &self.context.store;
        let _guards = self.lock_pair(a, b).await?;

        let user_a = store.user_by_id(a).await?;
        store.user_by_id(b).await?;

        if !user_a.friends.contains(&b) {
            return Ok(());
        }

        store.remove_friendship(a, b).await?;

        info!("Users {} and {} are no longer friends", a, b);
        self.context.emit(LibraryEvent::FriendshipDissolved { a, b });

        Ok(())
    }

    /// Returns a user's friends in stored list order
    pub async fn friends_of(&self, user_id: PrimaryKey) -> Result<Vec<UserData>, SocialError> {
        let store = &self.context.store;

        let user = store.user_by_id(user_id).await?;
        let mut friends = Vec::with_capacity(user.friends.len());

        for friend_id in user.friends {
            friends.push(store.user_by_id(friend_id).await?);
        }

        Ok(friends)
    }

    /// Finds the fewest-hops friendship path between two users, endpoints
    /// included, or `None` when they are disconnected.
    ///
    /// Among equal-length paths the first one discovered wins; neighbors are
    /// visited in stored friends-list order.
    pub async fn shortest_path(
        &self,
        from: PrimaryKey,
        to: PrimaryKey,
    ) -> Result<Option<Vec<PrimaryKey>>, SocialError> {
        let store = &self.context.store;

        store.user_by_id(from).await?;
        store.user_by_id(to).await?;

        // A snapshot of the adjacency; analytics never take the engine locks
        let adjacency: HashMap<PrimaryKey, Vec<PrimaryKey>> = store
            .list_users()
            .await?
            .into_iter()
            .map(|u| (u.id, u.friends))
            .collect();

        Ok(breadth_first_path(&adjacency, from, to))
    }

    /// Ranks users by how many friends they have. Ties go to the
    /// earlier-registered user.
    pub async fn most_connected(&self, limit: usize) -> Result<Vec<ConnectedUser>, SocialError> {
        let mut users = self.context.store.list_users().await?;

        users.sort_by(|a, b| {
            b.friends
                .len()
                .cmp(&a.friends.len())
                .then(a.registration_date.cmp(&b.registration_date))
                .then(a.id.cmp(&b.id))
        });

        Ok(users
            .into_iter()
            .take(limit)
            .map(|user| {
                let friend_count = user.friends.len();
                ConnectedUser { user, friend_count }
            })
            .collect())
    }
}

fn breadth_first_path(
    adjacency: &HashMap<PrimaryKey, Vec<PrimaryKey>>,
    from: PrimaryKey,
    to: PrimaryKey,
) -> Option<Vec<PrimaryKey>> {
    if from == to {
        return Some(vec![from]);
    }

    let mut parents: HashMap<PrimaryKey, PrimaryKey> = HashMap::new();
    let mut visited: HashSet<PrimaryKey> = HashSet::from([from]);
    let mut frontier: VecDeque<PrimaryKey> = VecDeque::from([from]);

    while let Some(current) = frontier.pop_front() {
        let Some(neighbors) = adjacency.get(&current) else {
            continue;
        };

        for &next in neighbors {
            if !visited.insert(next) {
                continue;
            }

            parents.insert(next, current);

            if next == to {
                return Some(assemble_path(&parents, from, to));
            }

            frontier.push_back(next);
        }
    }

    None
}

fn assemble_path(
    parents: &HashMap<PrimaryKey, PrimaryKey>,
    from: PrimaryKey,
    to: PrimaryKey,
) -> Vec<PrimaryKey> {
    let mut path = vec![to];
    let mut current = to;

    while current != from {
        current = *parents
            .get(&current)
            .expect("every visited node has a recorded parent");
        path.push(current);
    }

    path.reverse();
    path
}
