use async_trait::async_trait;
use chrono::Utc;
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{
    BookData, BookStatus, LoanData, LoanStatus, MessageData, NewBook, NewLoan, NewMessage,
    NewRating, NewUser, PrimaryKey, RatingData, Result, Store, StoreError, StoreResult,
    UpdatedBook, UpdatedUser, UserData,
};

/// An in-memory store. Backs the test suite, and serves as the reference
/// semantics for the [Store] contract.
#[derive(Default)]
pub struct MemoryStore {
    sequence: AtomicCell<PrimaryKey>,

    users: DashMap<PrimaryKey, UserData>,
    books: DashMap<PrimaryKey, BookData>,
    loans: DashMap<PrimaryKey, LoanData>,
    ratings: DashMap<PrimaryKey, RatingData>,
    messages: DashMap<PrimaryKey, MessageData>,

    /// Serializes writes that touch more than one record
    multi_write: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    fn next_id(&self) -> PrimaryKey {
        self.sequence.fetch_add(1) + 1
    }

    fn ensure_distinct_username(&self, username: &str, own_id: PrimaryKey) -> Result<()> {
        let taken = self
            .users
            .iter()
            .any(|u| u.username == username && u.id != own_id);

        if taken {
            return Err(StoreError::Conflict {
                resource: "user",
                field: "username",
                value: username.to_string(),
            });
        }

        Ok(())
    }

    fn ensure_distinct_email(&self, email: &str, own_id: PrimaryKey) -> Result<()> {
        let taken = self.users.iter().any(|u| u.email == email && u.id != own_id);

        if taken {
            return Err(StoreError::Conflict {
                resource: "user",
                field: "email",
                value: email.to_string(),
            });
        }

        Ok(())
    }

    #[cfg(test)]
    pub fn set_registration_date(&self, user_id: PrimaryKey, date: chrono::DateTime<Utc>) {
        let mut user = self.users.get_mut(&user_id).expect("user exists");
        user.registration_date = date;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .get(&user_id)
            .map(|u| u.clone())
            .ok_or(StoreError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.clone())
            .ok_or(StoreError::NotFound {
                resource: "user",
                identifier: "username",
            })
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        self.users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.clone())
            .ok_or(StoreError::NotFound {
                resource: "user",
                identifier: "email",
            })
    }

    async fn list_users(&self) -> Result<Vec<UserData>> {
        // The map iterates in arbitrary order
        let mut users: Vec<_> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by_key(|u| u.id);

        Ok(users)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;
        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        let user = UserData {
            id: self.next_id(),
            username: new_user.username,
            email: new_user.email,
            password: new_user.password,
            role: new_user.role,
            registration_date: Utc::now(),
            friends: Vec::new(),
        };

        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let mut user = self.user_by_id(updated_user.id).await?;

        if let Some(username) = updated_user.username {
            self.ensure_distinct_username(&username, user.id)?;
            user.username = username;
        }
        if let Some(email) = updated_user.email {
            self.ensure_distinct_email(&email, user.id)?;
            user.email = email;
        }
        if let Some(password) = updated_user.password {
            user.password = password;
        }

        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        self.users
            .remove(&user_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn add_friendship(&self, a: PrimaryKey, b: PrimaryKey) -> Result<()> {
        let _guard = self.multi_write.lock();

        for id in [a, b] {
            if !self.users.contains_key(&id) {
                return Err(StoreError::NotFound {
                    resource: "user",
                    identifier: "id",
                });
            }
        }

        {
            let mut user = self.users.get_mut(&a).expect("user exists under write lock");
            if !user.friends.contains(&b) {
                user.friends.push(b);
            }
        }
        {
            let mut user = self.users.get_mut(&b).expect("user exists under write lock");
            if !user.friends.contains(&a) {
                user.friends.push(a);
            }
        }

        Ok(())
    }

    async fn remove_friendship(&self, a: PrimaryKey, b: PrimaryKey) -> Result<()> {
        let _guard = self.multi_write.lock();

        for id in [a, b] {
            if !self.users.contains_key(&id) {
                return Err(StoreError::NotFound {
                    resource: "user",
                    identifier: "id",
                });
            }
        }

        {
            let mut user = self.users.get_mut(&a).expect("user exists under write lock");
            user.friends.retain(|id| *id != b);
        }
        {
            let mut user = self.users.get_mut(&b).expect("user exists under write lock");
            user.friends.retain(|id| *id != a);
        }

        Ok(())
    }

    async fn book_by_id(&self, book_id: PrimaryKey) -> Result<BookData> {
        self.books
            .get(&book_id)
            .map(|b| b.clone())
            .ok_or(StoreError::NotFound {
                resource: "book",
                identifier: "id",
            })
    }

    async fn list_books(&self) -> Result<Vec<BookData>> {
        let mut books: Vec<_> = self.books.iter().map(|b| b.clone()).collect();
        books.sort_by_key(|b| b.id);

        Ok(books)
    }

    async fn create_book(&self, new_book: NewBook) -> Result<BookData> {
        let book = BookData {
            id: self.next_id(),
            title: new_book.title,
            author: new_book.author,
            year: new_book.year,
            category: new_book.category,
            status: BookStatus::Available,
            average_rating: 0.0,
        };

        self.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn update_book(&self, updated_book: UpdatedBook) -> Result<BookData> {
        let mut book = self.book_by_id(updated_book.id).await?;

        if let Some(title) = updated_book.title {
            book.title = title;
        }
        if let Some(author) = updated_book.author {
            book.author = author;
        }
        if let Some(year) = updated_book.year {
            book.year = year;
        }
        if let Some(category) = updated_book.category {
            book.category = category;
        }

        self.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn delete_book(&self, book_id: PrimaryKey) -> Result<()> {
        self.books
            .remove(&book_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                resource: "book",
                identifier: "id",
            })
    }

    async fn set_book_status(&self, book_id: PrimaryKey, status: BookStatus) -> Result<()> {
        let mut book = self.books.get_mut(&book_id).ok_or(StoreError::NotFound {
            resource: "book",
            identifier: "id",
        })?;

        book.status = status;
        Ok(())
    }

    async fn set_average_rating(&self, book_id: PrimaryKey, average: f32) -> Result<()> {
        let mut book = self.books.get_mut(&book_id).ok_or(StoreError::NotFound {
            resource: "book",
            identifier: "id",
        })?;

        book.average_rating = average;
        Ok(())
    }

    async fn loan_by_id(&self, loan_id: PrimaryKey) -> Result<LoanData> {
        self.loans
            .get(&loan_id)
            .map(|l| l.clone())
            .ok_or(StoreError::NotFound {
                resource: "loan",
                identifier: "id",
            })
    }

    async fn loans_by_user(&self, user_id: PrimaryKey) -> Result<Vec<LoanData>> {
        let mut loans: Vec<_> = self
            .loans
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.clone())
            .collect();
        loans.sort_by_key(|l| l.id);

        Ok(loans)
    }

    async fn loans_by_book(&self, book_id: PrimaryKey) -> Result<Vec<LoanData>> {
        let mut loans: Vec<_> = self
            .loans
            .iter()
            .filter(|l| l.book_id == book_id)
            .map(|l| l.clone())
            .collect();
        loans.sort_by_key(|l| l.id);

        Ok(loans)
    }

    async fn active_loan_by_book(&self, book_id: PrimaryKey) -> Result<Option<LoanData>> {
        Ok(self
            .loans
            .iter()
            .find(|l| l.book_id == book_id && l.status == LoanStatus::Active)
            .map(|l| l.clone()))
    }

    async fn waiting_loans_by_book(&self, book_id: PrimaryKey) -> Result<Vec<LoanData>> {
        let mut loans: Vec<_> = self
            .loans
            .iter()
            .filter(|l| l.book_id == book_id && l.status == LoanStatus::Waiting)
            .map(|l| l.clone())
            .collect();
        loans.sort_by_key(|l| l.id);

        Ok(loans)
    }

    async fn waiting_loans_by_user(&self, user_id: PrimaryKey) -> Result<Vec<LoanData>> {
        let mut loans: Vec<_> = self
            .loans
            .iter()
            .filter(|l| l.user_id == user_id && l.status == LoanStatus::Waiting)
            .map(|l| l.clone())
            .collect();
        loans.sort_by_key(|l| l.id);

        Ok(loans)
    }

    async fn create_loan(&self, new_loan: NewLoan) -> Result<LoanData> {
        let loan = LoanData {
            id: self.next_id(),
            book_id: new_loan.book_id,
            user_id: new_loan.user_id,
            loan_date: Utc::now(),
            return_date: None,
            status: new_loan.status,
            priority: new_loan.priority,
        };

        self.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn update_loan(&self, loan: LoanData) -> Result<LoanData> {
        self.loan_by_id(loan.id).await?;

        self.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn delete_loan(&self, loan_id: PrimaryKey) -> Result<()> {
        self.loans
            .remove(&loan_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                resource: "loan",
                identifier: "id",
            })
    }

    async fn rating_by_id(&self, rating_id: PrimaryKey) -> Result<RatingData> {
        self.ratings
            .get(&rating_id)
            .map(|r| r.clone())
            .ok_or(StoreError::NotFound {
                resource: "rating",
                identifier: "id",
            })
    }

    async fn rating_by_book_and_user(
        &self,
        book_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<Option<RatingData>> {
        Ok(self
            .ratings
            .iter()
            .find(|r| r.book_id == book_id && r.user_id == user_id)
            .map(|r| r.clone()))
    }

    async fn ratings_by_book(&self, book_id: PrimaryKey) -> Result<Vec<RatingData>> {
        let mut ratings: Vec<_> = self
            .ratings
            .iter()
            .filter(|r| r.book_id == book_id)
            .map(|r| r.clone())
            .collect();
        ratings.sort_by_key(|r| r.id);

        Ok(ratings)
    }

    async fn ratings_by_user(&self, user_id: PrimaryKey) -> Result<Vec<RatingData>> {
        let mut ratings: Vec<_> = self
            .ratings
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        ratings.sort_by_key(|r| r.id);

        Ok(ratings)
    }

    async fn list_ratings(&self) -> Result<Vec<RatingData>> {
        let mut ratings: Vec<_> = self.ratings.iter().map(|r| r.clone()).collect();
        ratings.sort_by_key(|r| r.id);

        Ok(ratings)
    }

    async fn create_rating(&self, new_rating: NewRating) -> Result<RatingData> {
        let existing = self
            .rating_by_book_and_user(new_rating.book_id, new_rating.user_id)
            .await?;

        if existing.is_some() {
            return Err(StoreError::Conflict {
                resource: "rating",
                field: "book and user",
                value: format!("{}/{}", new_rating.book_id, new_rating.user_id),
            });
        }

        let rating = RatingData {
            id: self.next_id(),
            book_id: new_rating.book_id,
            user_id: new_rating.user_id,
            rating: new_rating.rating,
            comment: new_rating.comment,
            date: Utc::now(),
        };

        self.ratings.insert(rating.id, rating.clone());
        Ok(rating)
    }

    async fn update_rating(&self, rating: RatingData) -> Result<RatingData> {
        self.rating_by_id(rating.id).await?;

        self.ratings.insert(rating.id, rating.clone());
        Ok(rating)
    }

    async fn delete_rating(&self, rating_id: PrimaryKey) -> Result<()> {
        self.ratings
            .remove(&rating_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                resource: "rating",
                identifier: "id",
            })
    }

    async fn message_by_id(&self, message_id: PrimaryKey) -> Result<MessageData> {
        self.messages
            .get(&message_id)
            .map(|m| m.clone())
            .ok_or(StoreError::NotFound {
                resource: "message",
                identifier: "id",
            })
    }

    async fn messages_by_receiver(&self, receiver_id: PrimaryKey) -> Result<Vec<MessageData>> {
        let mut messages: Vec<_> = self
            .messages
            .iter()
            .filter(|m| m.receiver_id == receiver_id)
            .map(|m| m.clone())
            .collect();
        messages.sort_by_key(|m| m.id);

        Ok(messages)
    }

    async fn messages_by_sender(&self, sender_id: PrimaryKey) -> Result<Vec<MessageData>> {
        let mut messages: Vec<_> = self
            .messages
            .iter()
            .filter(|m| m.sender_id == sender_id)
            .map(|m| m.clone())
            .collect();
        messages.sort_by_key(|m| m.id);

        Ok(messages)
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        let message = MessageData {
            id: self.next_id(),
            sender_id: new_message.sender_id,
            receiver_id: new_message.receiver_id,
            content: new_message.content,
            date: Utc::now(),
            read: false,
        };

        self.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn mark_message_read(&self, message_id: PrimaryKey) -> Result<MessageData> {
        let mut message = self
            .messages
            .get_mut(&message_id)
            .ok_or(StoreError::NotFound {
                resource: "message",
                identifier: "id",
            })?;

        message.read = true;
        Ok(message.clone())
    }

    async fn delete_message(&self, message_id: PrimaryKey) -> Result<()> {
        self.messages
            .remove(&message_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                resource: "message",
                identifier: "id",
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::UserRole;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password: "opaque".to_string(),
            role: UserRole::Reader,
        }
    }

    #[tokio::test]
    async fn test_user_uniqueness() {
        let store = MemoryStore::new();

        store.create_user(new_user("ada")).await.unwrap();

        let duplicate = store.create_user(new_user("ada")).await;
        assert!(
            matches!(duplicate, Err(StoreError::Conflict { field: "username", .. })),
            "duplicate username should conflict"
        );

        let mut clashing_email = new_user("lovelace");
        clashing_email.email = "ada@example.com".to_string();

        let duplicate = store.create_user(clashing_email).await;
        assert!(
            matches!(duplicate, Err(StoreError::Conflict { field: "email", .. })),
            "duplicate email should conflict"
        );
    }

    #[tokio::test]
    async fn test_update_user_rejects_taken_username() {
        let store = MemoryStore::new();

        let ada = store.create_user(new_user("ada")).await.unwrap();
        store.create_user(new_user("brian")).await.unwrap();

        let renamed = store
            .update_user(UpdatedUser {
                id: ada.id,
                username: Some("brian".to_string()),
                email: None,
                password: None,
            })
            .await;

        assert!(matches!(renamed, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let store = MemoryStore::new();

        assert!(matches!(
            store.user_by_id(42).await,
            Err(StoreError::NotFound { resource: "user", .. })
        ));
        assert!(matches!(
            store.book_by_id(42).await,
            Err(StoreError::NotFound { resource: "book", .. })
        ));
        assert!(matches!(
            store.delete_loan(42).await,
            Err(StoreError::NotFound { resource: "loan", .. })
        ));
    }

    #[tokio::test]
    async fn test_friendship_is_written_to_both_sides() {
        let store = MemoryStore::new();

        let a = store.create_user(new_user("ada")).await.unwrap();
        let b = store.create_user(new_user("brian")).await.unwrap();

        store.add_friendship(a.id, b.id).await.unwrap();

        assert_eq!(store.user_by_id(a.id).await.unwrap().friends, vec![b.id]);
        assert_eq!(store.user_by_id(b.id).await.unwrap().friends, vec![a.id]);

        // Re-adding must not duplicate entries
        store.add_friendship(a.id, b.id).await.unwrap();
        assert_eq!(store.user_by_id(a.id).await.unwrap().friends, vec![b.id]);

        store.remove_friendship(b.id, a.id).await.unwrap();
        assert!(store.user_by_id(a.id).await.unwrap().friends.is_empty());
        assert!(store.user_by_id(b.id).await.unwrap().friends.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rating_pair_conflicts() {
        let store = MemoryStore::new();

        let rating = NewRating {
            book_id: 1,
            user_id: 2,
            rating: 4,
            comment: None,
        };

        store.create_rating(rating).await.unwrap();

        let duplicate = store
            .create_rating(NewRating {
                book_id: 1,
                user_id: 2,
                rating: 5,
                comment: None,
            })
            .await;

        assert!(matches!(duplicate, Err(StoreError::Conflict { .. })));
    }
}
