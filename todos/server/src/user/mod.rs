use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, FixedOffset};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter};

use crate::entities::user;

pub mod form;
pub mod web;

pub use form::{RegistrationForm, RegistrationInput};
pub use web::create_register_router;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct User {
    id: i32,
    username: String,
    email: String,
    date_joined: DateTime<FixedOffset>,
}

impl User {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn date_joined(&self) -> DateTime<FixedOffset> {
        self.date_joined
    }
}

impl From<user::Model> for User {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            date_joined: model.date_joined,
        }
    }
}

/// Error type for UserService operations.
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("A user with the username '{0}' already exists")]
    DuplicateUsername(String),
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl From<argon2::password_hash::Error> for UserServiceError {
    fn from(err: argon2::password_hash::Error) -> Self {
        UserServiceError::PasswordHash(err.to_string())
    }
}

/// Hashes `password` into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, UserServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Checks `password` against a stored PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub struct UserService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl UserService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> UserService<'_> {
        UserService { db }
    }

    /// Creates a new account with a hashed password.
    ///
    /// # Arguments
    ///
    /// * `input` - Cleaned registration data.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `User`, or `DuplicateUsername` if the name is taken.
    #[tracing::instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create_user(&self, input: RegistrationInput) -> Result<User, UserServiceError> {
        if self.username_exists(&input.username).await? {
            return Err(UserServiceError::DuplicateUsername(input.username));
        }

        let password_hash = hash_password(&input.password)?;
        let active_model = user::ActiveModel {
            username: ActiveValue::Set(input.username.clone()),
            email: ActiveValue::Set(input.email),
            password_hash: ActiveValue::Set(password_hash),
            date_joined: ActiveValue::Set(chrono::Utc::now().fixed_offset()),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await.map_err(|err| {
            // Lost a race with a concurrent registration of the same name.
            if matches!(
                err.sql_err(),
                Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
            ) {
                UserServiceError::DuplicateUsername(input.username.clone())
            } else {
                UserServiceError::Database(err)
            }
        })?;
        tracing::info!("Registered user {}", created_model.id);
        Ok(User::from(created_model))
    }

    /// Returns true if a user with this username exists, ignoring case.
    #[tracing::instrument(skip(self))]
    pub async fn username_exists(&self, username: &str) -> Result<bool, UserServiceError> {
        let existing = user::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(user::Column::Username)))
                    .eq(username.to_lowercase()),
            )
            .one(self.db)
            .await?;
        Ok(existing.is_some())
    }

    /// Verifies a username and password pair.
    ///
    /// # Returns
    ///
    /// `Some(User)` when the credentials match, `None` otherwise.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserServiceError> {
        let Some(model) = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db)
            .await?
        else {
            return Ok(None);
        };

        if verify_password(password, &model.password_hash) {
            Ok(Some(User::from(model)))
        } else {
            tracing::info!("Rejected password for user {}", model.id);
            Ok(None)
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_user_by_id(&self, id: i32) -> Result<Option<User>, UserServiceError> {
        let model = user::Entity::find_by_id(id).one(self.db).await?;
        Ok(model.map(User::from))
    }

    /// Deletes an account. Tasks owned by the account are removed by the foreign key cascade.
    ///
    /// # Returns
    ///
    /// `true` if an account was deleted, `false` if none had this ID.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, id: i32) -> Result<bool, UserServiceError> {
        let result = user::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_verify_hashed_password() {
        let hash = hash_password("correct horse battery").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong horse battery", &hash));
    }

    #[test]
    fn salts_each_hash() {
        let first = hash_password("correct horse battery").unwrap();
        let second = hash_password("correct horse battery").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
