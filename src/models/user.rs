use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Column list selected into [`User`]. The avatar column stays out of row
/// reads; avatar bytes move only through the dedicated avatar handlers.
pub const USER_COLUMNS: &str = "id, name, email, password_hash, age, tokens, created_at, updated_at";

/// A user row as stored in the `users` table.
///
/// This struct never reaches the wire: handlers respond with [`UserProfile`],
/// which strips the password hash and the session token list. The avatar
/// bytes live in their own column and are only touched by the avatar
/// handlers, so they are deliberately not part of this struct.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub age: i32,
    /// Active session tokens, in issue order. Logout removes one entry,
    /// logout-all clears the list.
    pub tokens: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-facing representation of a user.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub age: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            age: user.age,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl User {
    pub fn profile(&self) -> UserProfile {
        self.into()
    }
}

/// Payload for `PATCH /users/me`.
///
/// The field set is the update allow-list; `deny_unknown_fields` makes any
/// other key fail deserialization, rejecting the whole request rather than
/// silently dropping the stray field.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UserUpdate {
    #[validate(custom = "not_blank")]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 7), custom = "password_not_literal")]
    pub password: Option<String>,
    #[validate(range(min = 0))]
    pub age: Option<i32>,
}

/// Rejects values that are empty once surrounding whitespace is stripped.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("not_blank");
        error.message = Some("must not be blank".into());
        return Err(error);
    }
    Ok(())
}

/// Rejects passwords containing the literal word "password" in any casing.
pub fn password_not_literal(value: &str) -> Result<(), ValidationError> {
    if value.to_lowercase().contains("password") {
        let mut error = ValidationError::new("password_literal");
        error.message = Some("must not contain the word password".into());
        return Err(error);
    }
    Ok(())
}
