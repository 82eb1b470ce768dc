use crate::error::AppError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims encoded within a session JWT.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject of the token: the user's id.
    pub sub: Uuid,
    /// Expiration timestamp (seconds since epoch).
    pub exp: usize,
    /// Random token id. Two tokens issued to the same user in the same
    /// second must still be distinct strings, since sessions are revoked by
    /// removing the exact token from the user's token list.
    pub jti: Uuid,
}

/// Generates a session JWT for the given user id, expiring in 24 hours.
///
/// Requires the `JWT_SECRET` environment variable for signing.
pub fn generate_token(user_id: Uuid) -> Result<String, AppError> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        exp: expiration,
        jti: Uuid::new_v4(),
    };

    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| AppError::InternalServerError("JWT_SECRET not set".into()))?;

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))
}

/// Verifies a session JWT and decodes its claims.
///
/// Default validation applies (signature, expiration). Returns
/// `AppError::Unauthorized` for malformed, forged or expired tokens.
pub fn verify_token(token: &str) -> Result<Claims, AppError> {
    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| AppError::InternalServerError("JWT_SECRET not set".into()))?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}


#[cfg(test)]
mod tests {
    use super::env_lock::JWT_ENV_LOCK;
    use super::*;

    // Helper to run test logic with a temporarily set JWT_SECRET
    fn run_with_temp_jwt_secret<F>(secret_value: &str, test_logic: F)
    where
        F: FnOnce(),
    {
        let _guard = JWT_ENV_LOCK.lock().unwrap();

        let original_secret_val = std::env::var("JWT_SECRET").ok();
        std::env::set_var("JWT_SECRET", secret_value);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(test_logic));

        if let Some(original) = original_secret_val {
            std::env::set_var("JWT_SECRET", original);
        } else {
            std::env::remove_var("JWT_SECRET");
        }

        if let Err(panic_payload) = result {
            std::panic::resume_unwind(panic_payload);
        }
    }

    #[test]
    fn test_token_generation_and_verification() {
        run_with_temp_jwt_secret("test_secret_for_gen_verify", || {
            let user_id = Uuid::new_v4();
            let token = generate_token(user_id).unwrap();
            let claims = verify_token(&token).unwrap();
            assert_eq!(claims.sub, user_id);
        });
    }

    #[test]
    fn test_consecutive_tokens_are_distinct() {
        run_with_temp_jwt_secret("test_secret_for_jti", || {
            let user_id = Uuid::new_v4();
            let first = generate_token(user_id).unwrap();
            let second = generate_token(user_id).unwrap();
            assert_ne!(first, second);
        });
    }

    #[test]
    fn test_token_expiration() {
        run_with_temp_jwt_secret("test_secret_for_expiration", || {
            let expiration = chrono::Utc::now()
                .checked_sub_signed(chrono::Duration::hours(2))
                .expect("valid timestamp")
                .timestamp() as usize;

            let claims_expired = Claims {
                sub: Uuid::new_v4(),
                exp: expiration,
                jti: Uuid::new_v4(),
            };
            let expired_token = encode(
                &Header::default(),
                &claims_expired,
                &EncodingKey::from_secret("test_secret_for_expiration".as_bytes()),
            )
            .unwrap();

            match verify_token(&expired_token) {
                Err(AppError::Unauthorized(msg)) => {
                    assert!(msg.contains("ExpiredSignature"));
                }
                Ok(_) => panic!("Token should have been invalid due to expiration"),
                Err(e) => panic!("Unexpected error type for expired token: {:?}", e),
            }
        });
    }

    #[test]
    fn test_invalid_token_signature() {
        run_with_temp_jwt_secret("a_completely_different_secret", || {
            let user_id = Uuid::new_v4();
            let forged = {
                let claims = Claims {
                    sub: user_id,
                    exp: chrono::Utc::now().timestamp() as usize + 3600,
                    jti: Uuid::new_v4(),
                };
                encode(
                    &Header::default(),
                    &claims,
                    &EncodingKey::from_secret("someone_elses_secret".as_bytes()),
                )
                .unwrap()
            };

            match verify_token(&forged) {
                Err(AppError::Unauthorized(msg)) => {
                    assert!(msg.contains("InvalidSignature") || msg.contains("InvalidToken"));
                }
                Ok(_) => panic!("Token should have been invalid due to signature mismatch"),
                Err(e) => panic!("Unexpected error type for invalid signature: {:?}", e),
            }
        });
    }
}
