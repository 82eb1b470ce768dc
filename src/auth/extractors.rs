use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::auth::middleware::AuthSession;
use crate::error::AppError;

/// Extracts the session resolved by `AuthMiddleware` from request
/// extensions.
///
/// Handlers on protected routes take `AuthSession` as an argument and get
/// the acting user plus the literal request token. If the session is absent
/// (the guard did not run or did not insert it), the extractor fails with
/// the same generic 401 the guard uses.
impl FromRequest for AuthSession {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthSession>().cloned() {
            Some(session) => ready(Ok(session)),
            None => {
                let err = AppError::Unauthorized("Please authenticate".to_string());
                ready(Err(err.into()))
            }
        }
    }
}
