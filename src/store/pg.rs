use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Error as SqlxError, Executor, FromRow, PgPool};

use super::{
    BookData, BookStatus, InvalidEnumValue, IntoStoreError, LoanData, MessageData, NewBook,
    NewLoan, NewMessage, NewRating, NewUser, PrimaryKey, RatingData, Result, Store, StoreError,
    StoreResult, UpdatedBook, UpdatedUser, UserData,
};

/// A postgres store implementation for biblios
pub struct PgStore {
    pool: PgPool,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        role TEXT NOT NULL,
        registration_date TIMESTAMPTZ NOT NULL DEFAULT now(),
        friends INT4[] NOT NULL DEFAULT '{}'
    );

    CREATE TABLE IF NOT EXISTS books (
        id SERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        author TEXT NOT NULL,
        year INT4 NOT NULL,
        category TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'AVAILABLE',
        average_rating REAL NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS loans (
        id SERIAL PRIMARY KEY,
        book_id INT4 NOT NULL,
        user_id INT4 NOT NULL,
        loan_date TIMESTAMPTZ NOT NULL DEFAULT now(),
        return_date TIMESTAMPTZ,
        status TEXT NOT NULL,
        priority INT4
    );

    CREATE TABLE IF NOT EXISTS ratings (
        id SERIAL PRIMARY KEY,
        book_id INT4 NOT NULL,
        user_id INT4 NOT NULL,
        rating INT2 NOT NULL,
        comment TEXT,
        date TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (book_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS messages (
        id SERIAL PRIMARY KEY,
        sender_id INT4 NOT NULL,
        receiver_id INT4 NOT NULL,
        content TEXT NOT NULL,
        date TIMESTAMPTZ NOT NULL DEFAULT now(),
        read BOOLEAN NOT NULL DEFAULT false
    );
";

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    email: String,
    password: String,
    role: String,
    registration_date: DateTime<Utc>,
    friends: Vec<PrimaryKey>,
}

#[derive(FromRow)]
struct BookRow {
    id: PrimaryKey,
    title: String,
    author: String,
    year: i32,
    category: String,
    status: String,
    average_rating: f32,
}

#[derive(FromRow)]
struct LoanRow {
    id: PrimaryKey,
    book_id: PrimaryKey,
    user_id: PrimaryKey,
    loan_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: String,
    priority: Option<i32>,
}

#[derive(FromRow)]
struct RatingRow {
    id: PrimaryKey,
    book_id: PrimaryKey,
    user_id: PrimaryKey,
    rating: i16,
    comment: Option<String>,
    date: DateTime<Utc>,
}

#[derive(FromRow)]
struct MessageRow {
    id: PrimaryKey,
    sender_id: PrimaryKey,
    receiver_id: PrimaryKey,
    content: String,
    date: DateTime<Utc>,
    read: bool,
}

fn corrupt(error: InvalidEnumValue) -> StoreError {
    StoreError::Internal(Box::new(error))
}

impl UserRow {
    fn into_data(self) -> Result<UserData> {
        Ok(UserData {
            id: self.id,
            username: self.username,
            email: self.email,
            password: self.password,
            role: self.role.parse().map_err(corrupt)?,
            registration_date: self.registration_date,
            friends: self.friends,
        })
    }
}

impl BookRow {
    fn into_data(self) -> Result<BookData> {
        Ok(BookData {
            id: self.id,
            title: self.title,
            author: self.author,
            year: self.year,
            category: self.category,
            status: self.status.parse().map_err(corrupt)?,
            average_rating: self.average_rating,
        })
    }
}

impl LoanRow {
    fn into_data(self) -> Result<LoanData> {
        Ok(LoanData {
            id: self.id,
            book_id: self.book_id,
            user_id: self.user_id,
            loan_date: self.loan_date,
            return_date: self.return_date,
            status: self.status.parse().map_err(corrupt)?,
            priority: self.priority,
        })
    }
}

impl RatingRow {
    fn into_data(self) -> RatingData {
        RatingData {
            id: self.id,
            book_id: self.book_id,
            user_id: self.user_id,
            rating: self.rating as u8,
            comment: self.comment,
            date: self.date,
        }
    }
}

impl MessageRow {
    fn into_data(self) -> MessageData {
        MessageData {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            date: self.date,
            read: self.read,
        }
    }
}

impl PgStore {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| StoreError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    /// Creates the schema if it doesn't exist yet
    pub async fn migrate(&self) -> Result<()> {
        self.pool.execute(SCHEMA).await.map_err(|e| e.any())?;

        Ok(())
    }

    async fn ensure_distinct_username(&self, username: &str, own_id: PrimaryKey) -> Result<()> {
        match self.user_by_username(username).await {
            Ok(existing) if existing.id != own_id => Err(StoreError::Conflict {
                resource: "user",
                field: "username",
                value: username.to_string(),
            }),
            Ok(_) => Ok(()),
            Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn ensure_distinct_email(&self, email: &str, own_id: PrimaryKey) -> Result<()> {
        match self.user_by_email(email).await {
            Ok(existing) if existing.id != own_id => Err(StoreError::Conflict {
                resource: "user",
                field: "email",
                value: email.to_string(),
            }),
            Ok(_) => Ok(()),
            Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))?
            .into_data()
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "username"))?
            .into_data()
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "email"))?
            .into_data()
    }

    async fn list_users(&self) -> Result<Vec<UserData>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(UserRow::into_data)
            .collect()
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;
        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, email, password, role) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(new_user.username)
        .bind(new_user.email)
        .bind(new_user.password)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_data()
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let user = self.user_by_id(updated_user.id).await?;

        if let Some(username) = &updated_user.username {
            self.ensure_distinct_username(username, user.id).await?;
        }
        if let Some(email) = &updated_user.email {
            self.ensure_distinct_email(email, user.id).await?;
        }

        sqlx::query_as::<_, UserRow>(
            "UPDATE users SET username = $1, email = $2, password = $3 WHERE id = $4 RETURNING *",
        )
        .bind(updated_user.username.unwrap_or(user.username))
        .bind(updated_user.email.unwrap_or(user.email))
        .bind(updated_user.password.unwrap_or(user.password))
        .bind(updated_user.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_data()
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn add_friendship(&self, a: PrimaryKey, b: PrimaryKey) -> Result<()> {
        let _ = self.user_by_id(a).await?;
        let _ = self.user_by_id(b).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        sqlx::query(
            "UPDATE users SET friends = array_append(friends, $2)
             WHERE id = $1 AND array_position(friends, $2) IS NULL",
        )
        .bind(a)
        .bind(b)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        sqlx::query(
            "UPDATE users SET friends = array_append(friends, $2)
             WHERE id = $1 AND array_position(friends, $2) IS NULL",
        )
        .bind(b)
        .bind(a)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn remove_friendship(&self, a: PrimaryKey, b: PrimaryKey) -> Result<()> {
        let _ = self.user_by_id(a).await?;
        let _ = self.user_by_id(b).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        sqlx::query("UPDATE users SET friends = array_remove(friends, $2) WHERE id = $1")
            .bind(a)
            .bind(b)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        sqlx::query("UPDATE users SET friends = array_remove(friends, $2) WHERE id = $1")
            .bind(b)
            .bind(a)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn book_by_id(&self, book_id: PrimaryKey) -> Result<BookData> {
        sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE id = $1")
            .bind(book_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("book", "id"))?
            .into_data()
    }

    async fn list_books(&self) -> Result<Vec<BookData>> {
        sqlx::query_as::<_, BookRow>("SELECT * FROM books ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(BookRow::into_data)
            .collect()
    }

    async fn create_book(&self, new_book: NewBook) -> Result<BookData> {
        sqlx::query_as::<_, BookRow>(
            "INSERT INTO books (title, author, year, category) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(new_book.title)
        .bind(new_book.author)
        .bind(new_book.year)
        .bind(new_book.category)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_data()
    }

    async fn update_book(&self, updated_book: UpdatedBook) -> Result<BookData> {
        let book = self.book_by_id(updated_book.id).await?;

        sqlx::query_as::<_, BookRow>(
            "UPDATE books SET title = $1, author = $2, year = $3, category = $4 WHERE id = $5 RETURNING *",
        )
        .bind(updated_book.title.unwrap_or(book.title))
        .bind(updated_book.author.unwrap_or(book.author))
        .bind(updated_book.year.unwrap_or(book.year))
        .bind(updated_book.category.unwrap_or(book.category))
        .bind(updated_book.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_data()
    }

    async fn delete_book(&self, book_id: PrimaryKey) -> Result<()> {
        // Ensure book exists
        let _ = self.book_by_id(book_id).await?;

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(book_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn set_book_status(&self, book_id: PrimaryKey, status: BookStatus) -> Result<()> {
        let _ = self.book_by_id(book_id).await?;

        sqlx::query("UPDATE books SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(book_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn set_average_rating(&self, book_id: PrimaryKey, average: f32) -> Result<()> {
        let _ = self.book_by_id(book_id).await?;

        sqlx::query("UPDATE books SET average_rating = $1 WHERE id = $2")
            .bind(average)
            .bind(book_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn loan_by_id(&self, loan_id: PrimaryKey) -> Result<LoanData> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE id = $1")
            .bind(loan_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("loan", "id"))?
            .into_data()
    }

    async fn loans_by_user(&self, user_id: PrimaryKey) -> Result<Vec<LoanData>> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE user_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(LoanRow::into_data)
            .collect()
    }

    async fn loans_by_book(&self, book_id: PrimaryKey) -> Result<Vec<LoanData>> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE book_id = $1 ORDER BY id")
            .bind(book_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(LoanRow::into_data)
            .collect()
    }

    async fn active_loan_by_book(&self, book_id: PrimaryKey) -> Result<Option<LoanData>> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE book_id = $1 AND status = 'ACTIVE'")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.any())?
            .map(LoanRow::into_data)
            .transpose()
    }

    async fn waiting_loans_by_book(&self, book_id: PrimaryKey) -> Result<Vec<LoanData>> {
        sqlx::query_as::<_, LoanRow>(
            "SELECT * FROM loans WHERE book_id = $1 AND status = 'WAITING' ORDER BY id",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(LoanRow::into_data)
        .collect()
    }

    async fn waiting_loans_by_user(&self, user_id: PrimaryKey) -> Result<Vec<LoanData>> {
        sqlx::query_as::<_, LoanRow>(
            "SELECT * FROM loans WHERE user_id = $1 AND status = 'WAITING' ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(LoanRow::into_data)
        .collect()
    }

    async fn create_loan(&self, new_loan: NewLoan) -> Result<LoanData> {
        sqlx::query_as::<_, LoanRow>(
            "INSERT INTO loans (book_id, user_id, status, priority) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(new_loan.book_id)
        .bind(new_loan.user_id)
        .bind(new_loan.status.as_str())
        .bind(new_loan.priority)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_data()
    }

    async fn update_loan(&self, loan: LoanData) -> Result<LoanData> {
        let _ = self.loan_by_id(loan.id).await?;

        sqlx::query_as::<_, LoanRow>(
            "UPDATE loans SET book_id = $1, user_id = $2, loan_date = $3, return_date = $4,
             status = $5, priority = $6 WHERE id = $7 RETURNING *",
        )
        .bind(loan.book_id)
        .bind(loan.user_id)
        .bind(loan.loan_date)
        .bind(loan.return_date)
        .bind(loan.status.as_str())
        .bind(loan.priority)
        .bind(loan.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_data()
    }

    async fn delete_loan(&self, loan_id: PrimaryKey) -> Result<()> {
        // Ensure loan exists
        let _ = self.loan_by_id(loan_id).await?;

        sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(loan_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn rating_by_id(&self, rating_id: PrimaryKey) -> Result<RatingData> {
        sqlx::query_as::<_, RatingRow>("SELECT * FROM ratings WHERE id = $1")
            .bind(rating_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("rating", "id"))
            .map(RatingRow::into_data)
    }

    async fn rating_by_book_and_user(
        &self,
        book_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<Option<RatingData>> {
        sqlx::query_as::<_, RatingRow>("SELECT * FROM ratings WHERE book_id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|row| row.map(RatingRow::into_data))
    }

    async fn ratings_by_book(&self, book_id: PrimaryKey) -> Result<Vec<RatingData>> {
        sqlx::query_as::<_, RatingRow>("SELECT * FROM ratings WHERE book_id = $1 ORDER BY id")
            .bind(book_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|rows| rows.into_iter().map(RatingRow::into_data).collect())
    }

    async fn ratings_by_user(&self, user_id: PrimaryKey) -> Result<Vec<RatingData>> {
        sqlx::query_as::<_, RatingRow>("SELECT * FROM ratings WHERE user_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|rows| rows.into_iter().map(RatingRow::into_data).collect())
    }

    async fn list_ratings(&self) -> Result<Vec<RatingData>> {
        sqlx::query_as::<_, RatingRow>("SELECT * FROM ratings ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|rows| rows.into_iter().map(RatingRow::into_data).collect())
    }

    async fn create_rating(&self, new_rating: NewRating) -> Result<RatingData> {
        if let Some(existing) = self
            .rating_by_book_and_user(new_rating.book_id, new_rating.user_id)
            .await?
        {
            return Err(StoreError::Conflict {
                resource: "rating",
                field: "book and user",
                value: format!("{}/{}", existing.book_id, existing.user_id),
            });
        }

        sqlx::query_as::<_, RatingRow>(
            "INSERT INTO ratings (book_id, user_id, rating, comment) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(new_rating.book_id)
        .bind(new_rating.user_id)
        .bind(new_rating.rating as i16)
        .bind(new_rating.comment)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(RatingRow::into_data)
    }

    async fn update_rating(&self, rating: RatingData) -> Result<RatingData> {
        let _ = self.rating_by_id(rating.id).await?;

        sqlx::query_as::<_, RatingRow>(
            "UPDATE ratings SET book_id = $1, user_id = $2, rating = $3, comment = $4, date = $5
             WHERE id = $6 RETURNING *",
        )
        .bind(rating.book_id)
        .bind(rating.user_id)
        .bind(rating.rating as i16)
        .bind(rating.comment)
        .bind(rating.date)
        .bind(rating.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(RatingRow::into_data)
    }

    async fn delete_rating(&self, rating_id: PrimaryKey) -> Result<()> {
        // Ensure rating exists
        let _ = self.rating_by_id(rating_id).await?;

        sqlx::query("DELETE FROM ratings WHERE id = $1")
            .bind(rating_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn message_by_id(&self, message_id: PrimaryKey) -> Result<MessageData> {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("message", "id"))
            .map(MessageRow::into_data)
    }

    async fn messages_by_receiver(&self, receiver_id: PrimaryKey) -> Result<Vec<MessageData>> {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE receiver_id = $1 ORDER BY id")
            .bind(receiver_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|rows| rows.into_iter().map(MessageRow::into_data).collect())
    }

    async fn messages_by_sender(&self, sender_id: PrimaryKey) -> Result<Vec<MessageData>> {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE sender_id = $1 ORDER BY id")
            .bind(sender_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|rows| rows.into_iter().map(MessageRow::into_data).collect())
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (sender_id, receiver_id, content) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(new_message.sender_id)
        .bind(new_message.receiver_id)
        .bind(new_message.content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(MessageRow::into_data)
    }

    async fn mark_message_read(&self, message_id: PrimaryKey) -> Result<MessageData> {
        let _ = self.message_by_id(message_id).await?;

        sqlx::query_as::<_, MessageRow>(
            "UPDATE messages SET read = true WHERE id = $1 RETURNING *",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(MessageRow::into_data)
    }

    async fn delete_message(&self, message_id: PrimaryKey) -> Result<()> {
        // Ensure message exists
        let _ = self.message_by_id(message_id).await?;

        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }
}

impl IntoStoreError for SqlxError {
    fn any(self) -> StoreError {
        StoreError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> StoreError {
        match self {
            SqlxError::RowNotFound => StoreError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
