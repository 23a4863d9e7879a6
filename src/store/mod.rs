use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An unknown or internal error happened with the backing store
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A record already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The record kind in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A record doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoStoreError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> StoreError;
    fn any(self) -> StoreError;
}

/// Helper trait to reduce boilerplate
pub trait StoreResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> StoreResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(StoreError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) => match e {
                StoreError::NotFound {
                    resource: _,
                    identifier: _,
                } => Ok(()),
                e => Err(e),
            },
        }
    }
}

/// Represents a type that can persist and fetch library records
#[async_trait]
pub trait Store
where
    Self: 'static + Send + Sync,
{
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn user_by_email(&self, email: &str) -> Result<UserData>;
    async fn list_users(&self) -> Result<Vec<UserData>>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData>;
    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()>;
    /// Records the friendship on both users' adjacency lists in one transaction
    async fn add_friendship(&self, a: PrimaryKey, b: PrimaryKey) -> Result<()>;
    /// Removes the friendship from both users' adjacency lists in one transaction
    async fn remove_friendship(&self, a: PrimaryKey, b: PrimaryKey) -> Result<()>;

    async fn book_by_id(&self, book_id: PrimaryKey) -> Result<BookData>;
    async fn list_books(&self) -> Result<Vec<BookData>>;
    async fn create_book(&self, new_book: NewBook) -> Result<BookData>;
    async fn update_book(&self, updated_book: UpdatedBook) -> Result<BookData>;
    async fn delete_book(&self, book_id: PrimaryKey) -> Result<()>;
    async fn set_book_status(&self, book_id: PrimaryKey, status: BookStatus) -> Result<()>;
    async fn set_average_rating(&self, book_id: PrimaryKey, average: f32) -> Result<()>;

    async fn loan_by_id(&self, loan_id: PrimaryKey) -> Result<LoanData>;
    async fn loans_by_user(&self, user_id: PrimaryKey) -> Result<Vec<LoanData>>;
    async fn loans_by_book(&self, book_id: PrimaryKey) -> Result<Vec<LoanData>>;
    async fn active_loan_by_book(&self, book_id: PrimaryKey) -> Result<Option<LoanData>>;
    async fn waiting_loans_by_book(&self, book_id: PrimaryKey) -> Result<Vec<LoanData>>;
    async fn waiting_loans_by_user(&self, user_id: PrimaryKey) -> Result<Vec<LoanData>>;
    async fn create_loan(&self, new_loan: NewLoan) -> Result<LoanData>;
    /// Replaces the stored loan matching `loan.id`
    async fn update_loan(&self, loan: LoanData) -> Result<LoanData>;
    async fn delete_loan(&self, loan_id: PrimaryKey) -> Result<()>;

    async fn rating_by_id(&self, rating_id: PrimaryKey) -> Result<RatingData>;
    async fn rating_by_book_and_user(
        &self,
        book_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<Option<RatingData>>;
    async fn ratings_by_book(&self, book_id: PrimaryKey) -> Result<Vec<RatingData>>;
    async fn ratings_by_user(&self, user_id: PrimaryKey) -> Result<Vec<RatingData>>;
    async fn list_ratings(&self) -> Result<Vec<RatingData>>;
    async fn create_rating(&self, new_rating: NewRating) -> Result<RatingData>;
    /// Replaces the stored rating matching `rating.id`
    async fn update_rating(&self, rating: RatingData) -> Result<RatingData>;
    async fn delete_rating(&self, rating_id: PrimaryKey) -> Result<()>;

    async fn message_by_id(&self, message_id: PrimaryKey) -> Result<MessageData>;
    async fn messages_by_receiver(&self, receiver_id: PrimaryKey) -> Result<Vec<MessageData>>;
    async fn messages_by_sender(&self, sender_id: PrimaryKey) -> Result<Vec<MessageData>>;
    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData>;
    async fn mark_message_read(&self, message_id: PrimaryKey) -> Result<MessageData>;
    async fn delete_message(&self, message_id: PrimaryKey) -> Result<()>;
}
