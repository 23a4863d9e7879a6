use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// The type used for primary keys in the store.
pub type PrimaryKey = i32;

/// A stored enum value that matches no known variant
#[derive(Debug, Error)]
#[error("unrecognized {kind} value: {value}")]
pub struct InvalidEnumValue {
    pub kind: &'static str,
    pub value: String,
}

/// The access level of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Reader,
    Admin,
}

/// A registered library member
#[derive(Debug, Clone, Serialize)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub email: String,
    /// The stored credential hash, never the plain text
    #[serde(skip_serializing)]
    pub password: String,
    pub role: UserRole,
    pub registration_date: DateTime<Utc>,
    /// Ids of befriended users. Kept symmetric by the social engine.
    pub friends: Vec<PrimaryKey>,
}

/// Whether a book's single circulating copy is out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookStatus {
    Available,
    Borrowed,
}

/// A catalogued book
#[derive(Debug, Clone, Serialize)]
pub struct BookData {
    pub id: PrimaryKey,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub category: String,
    /// Derived from the book's loans, set only by the circulation engine
    pub status: BookStatus,
    /// Derived from the book's ratings, set only by the rating engine
    pub average_rating: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    /// The user currently holds the book
    Active,
    /// The user is queued for the book
    Waiting,
    /// The loan has completed
    Returned,
}

/// A loan of a book's circulating copy, or a queued request for it
#[derive(Debug, Clone, Serialize)]
pub struct LoanData {
    pub id: PrimaryKey,
    pub book_id: PrimaryKey,
    pub user_id: PrimaryKey,
    /// When the loan was requested, or when it last became active
    pub loan_date: DateTime<Utc>,
    /// Set once, when the loan is returned
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    /// The queue rank while waiting, lower served first. `None` once active.
    pub priority: Option<i32>,
}

/// A user's one-through-five star verdict on a book
#[derive(Debug, Clone, Serialize)]
pub struct RatingData {
    pub id: PrimaryKey,
    pub book_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub rating: u8,
    pub comment: Option<String>,
    pub date: DateTime<Utc>,
}

/// A direct message between two users
#[derive(Debug, Clone, Serialize)]
pub struct MessageData {
    pub id: PrimaryKey,
    pub sender_id: PrimaryKey,
    pub receiver_id: PrimaryKey,
    pub content: String,
    pub date: DateTime<Utc>,
    /// Flipped only by the receiver's mark-as-read action
    pub read: bool,
}

/// The waitlist-shaped view over a waiting loan
#[derive(Debug, Clone, Serialize)]
pub struct WaitlistView {
    pub id: PrimaryKey,
    pub book_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub request_date: DateTime<Utc>,
    pub priority: i32,
}

impl From<&LoanData> for WaitlistView {
    fn from(loan: &LoanData) -> Self {
        Self {
            id: loan.id,
            book_id: loan.book_id,
            user_id: loan.user_id,
            request_date: loan.loan_date,
            priority: loan.priority.unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug)]
pub struct UpdatedUser {
    pub id: PrimaryKey,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub year: i32,
    pub category: String,
}

#[derive(Debug)]
pub struct UpdatedBook {
    pub id: PrimaryKey,
    pub title: Option<String>,
    pub author: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
}

#[derive(Debug)]
pub struct NewLoan {
    pub book_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub status: LoanStatus,
    pub priority: Option<i32>,
}

#[derive(Debug)]
pub struct NewRating {
    pub book_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub rating: u8,
    pub comment: Option<String>,
}

#[derive(Debug)]
pub struct NewMessage {
    pub sender_id: PrimaryKey,
    pub receiver_id: PrimaryKey,
    pub content: String,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "READER",
            Self::Admin => "ADMIN",
        }
    }
}

impl FromStr for UserRole {
    type Err = InvalidEnumValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "READER" => Ok(Self::Reader),
            "ADMIN" => Ok(Self::Admin),
            other => Err(InvalidEnumValue {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Borrowed => "BORROWED",
        }
    }
}

impl FromStr for BookStatus {
    type Err = InvalidEnumValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "AVAILABLE" => Ok(Self::Available),
            "BORROWED" => Ok(Self::Borrowed),
            other => Err(InvalidEnumValue {
                kind: "book status",
                value: other.to_string(),
            }),
        }
    }
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Waiting => "WAITING",
            Self::Returned => "RETURNED",
        }
    }
}

impl FromStr for LoanStatus {
    type Err = InvalidEnumValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "WAITING" => Ok(Self::Waiting),
            "RETURNED" => Ok(Self::Returned),
            other => Err(InvalidEnumValue {
                kind: "loan status",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_strings_round_trip() {
        for status in [LoanStatus::Active, LoanStatus::Waiting, LoanStatus::Returned] {
            assert_eq!(status.as_str().parse::<LoanStatus>().unwrap(), status);
        }

        assert!("LOST".parse::<LoanStatus>().is_err());
    }

    #[test]
    fn test_serialized_user_hides_credential() {
        let user = UserData {
            id: 1,
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "$argon2id$...".to_string(),
            role: UserRole::Reader,
            registration_date: Utc::now(),
            friends: vec![2, 3],
        };

        let value = serde_json::to_value(&user).unwrap();

        assert!(value.get("password").is_none(), "credential should not serialize");
        assert_eq!(value["role"], "READER");
    }
}
