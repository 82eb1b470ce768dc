pub mod extractors;
pub mod middleware;
pub mod password;
pub mod token;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::user::{not_blank, password_not_literal, UserProfile};

// Re-export necessary items
pub use middleware::{AuthMiddleware, AuthSession};
pub use password::{hash_password, verify_password};
pub use token::{generate_token, verify_token, Claims};

/// Payload for a new account signup.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    /// Display name. Required, and must survive trimming.
    #[validate(custom = "not_blank")]
    pub name: String,
    /// Email address. Case-folded to lowercase before storage; must be
    /// unique across all users.
    #[validate(email)]
    pub email: String,
    /// Password. At least 7 characters and must not contain the word
    /// "password" in any casing. Only a bcrypt hash is ever stored.
    #[validate(length(min = 7), custom = "password_not_literal")]
    pub password: String,
    /// Optional age, defaulting to 0. Must not be negative.
    #[validate(range(min = 0))]
    pub age: Option<i32>,
}

/// Payload for a login request.
///
/// Deliberately carries no validation: every failure on this path — unknown
/// email, malformed email, wrong password — must collapse into the one
/// generic "Unable to login" response.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response for signup and login: the sanitized user plus the newly issued
/// session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub token: String,
}
