use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use log::info;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::{
    LibraryContext, LoanStatus, NewUser, PrimaryKey, Store, StoreError, UpdatedUser, UserData,
    UserRole,
};

/// Manages registration, credential checks, and account removal.
pub struct Accounts<S> {
    context: LibraryContext<S>,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AccountsError {
    /// Email or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The caller's role does not allow the action
    #[error("Caller is not permitted to perform this action")]
    NotPermitted,
    /// The account still holds a book
    #[error("Account holds an active loan")]
    HasActiveLoan,
    #[error("HashError: {0}")]
    HashError(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug)]
pub struct UpdatedAccount {
    pub id: PrimaryKey,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl<S> Accounts<S>
where
    S: Store,
{
    pub fn new(context: &LibraryContext<S>) -> Self {
        Self {
            context: context.clone(),
            argon: Argon2::default(),
        }
    }

    /// Registers a new account, storing the credential as a hash
    pub async fn register(&self, new_account: NewAccount) -> Result<UserData, AccountsError> {
        let hashed_password = self.hash_password(&new_account.password)?;

        let user = self
            .context
            .store
            .create_user(NewUser {
                username: new_account.username,
                email: new_account.email,
                password: hashed_password,
                role: new_account.role,
            })
            .await?;

        info!("Registered {} account {}", user.role.as_str(), user.username);

        Ok(user)
    }

    /// Checks credentials, returning the matching account
    pub async fn login(&self, credentials: Credentials) -> Result<UserData, AccountsError> {
        let user = self
            .context
            .store
            .user_by_email(&credentials.email)
            .await
            .map_err(|e| match e {
                StoreError::NotFound {
                    resource: _,
                    identifier: _,
                } => AccountsError::InvalidCredentials,
                err => AccountsError::Store(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AccountsError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AccountsError::InvalidCredentials)?;

        Ok(user)
    }

    /// Updates an account, re-hashing the credential if it changed
    pub async fn update_account(&self, updated: UpdatedAccount) -> Result<UserData, AccountsError> {
        let password = updated
            .password
            .map(|p| self.hash_password(&p))
            .transpose()?;

        let user = self
            .context
            .store
            .update_user(UpdatedUser {
                id: updated.id,
                username: updated.username,
                email: updated.email,
                password,
            })
            .await?;

        Ok(user)
    }

    /// Deletes an account along with its queued loans and friendships.
    ///
    /// Only admins may delete accounts, and an admin account can only be
    /// deleted by itself. An account holding a book cannot be deleted until
    /// the book comes back.
    pub async fn delete_account(
        &self,
        caller_id: PrimaryKey,
        target_id: PrimaryKey,
    ) -> Result<(), AccountsError> {
        let store = &self.context.store;

        let caller = store.user_by_id(caller_id).await?;
        let target = store.user_by_id(target_id).await?;

        if caller.role != UserRole::Admin {
            return Err(AccountsError::NotPermitted);
        }
        if target.role == UserRole::Admin && caller.id != target.id {
            return Err(AccountsError::NotPermitted);
        }

        let loans = store.loans_by_user(target_id).await?;

        if loans.iter().any(|l| l.status == LoanStatus::Active) {
            return Err(AccountsError::HasActiveLoan);
        }

        for loan in loans.iter().filter(|l| l.status == LoanStatus::Waiting) {
            store.delete_loan(loan.id).await?;
        }

        for friend_id in &target.friends {
            store.remove_friendship(target.id, *friend_id).await?;
        }

        store.delete_user(target_id).await?;

        info!("Account {} deleted", target.username);

        Ok(())
    }

    /// Returns an account if it exists
    pub async fn account_by_id(&self, user_id: PrimaryKey) -> Result<UserData, StoreError> {
        self.context.store.user_by_id(user_id).await
    }

    /// Returns all accounts
    pub async fn list_accounts(&self) -> Result<Vec<UserData>, StoreError> {
        self.context.store.list_users().await
    }

    fn hash_password(&self, plain: &str) -> Result<String, AccountsError> {
        let salt = SaltString::generate(&mut OsRng);

        let hashed = self
            .argon
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| AccountsError::HashError(e.to_string()))?
            .to_string();

        Ok(hashed)
    }
}
