use std::rc::Rc;

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ResponseError,
    http::Method,
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use sqlx::PgPool;

use crate::auth::token::verify_token;
use crate::error::AppError;
use crate::models::user::{User, USER_COLUMNS};

/// The resolved session the guard attaches to request extensions: the acting
/// user plus the literal token the request authenticated with. Handlers
/// receive it through the `FromRequest` impl in `auth::extractors`.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// Authentication guard for every protected route.
///
/// Verifies the bearer token, then resolves the user whose id matches the
/// token subject *and* whose active-token list still contains the exact
/// token string — a token that was valid but has been revoked via logout
/// fails here. Any failure short-circuits with a generic 401; the cause is
/// logged server-side and never reaches the client.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    // Rc because the guard awaits the store before calling the inner
    // service, so the call future must own a handle to it.
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        if is_public(req.method(), req.path()) {
            return Box::pin(async move {
                service.call(req).await.map(|res| res.map_into_left_body())
            });
        }

        Box::pin(async move {
            match authenticate(&req).await {
                Ok(session) => {
                    req.extensions_mut().insert(session);
                    service.call(req).await.map(|res| res.map_into_left_body())
                }
                Err(err) => {
                    // Short-circuit with the guard's own response; the
                    // inner service never runs.
                    let response = err.error_response().map_into_right_body();
                    Ok(req.into_response(response))
                }
            }
        })
    }
}

/// Routes reachable without a session: signup, login, avatar read and the
/// health probe.
fn is_public(method: &Method, path: &str) -> bool {
    if path == "/health" {
        return true;
    }
    if method == Method::POST && (path == "/users" || path == "/users/login") {
        return true;
    }
    method == Method::GET && path.starts_with("/users/") && path.ends_with("/avatar")
}

async fn authenticate(req: &ServiceRequest) -> Result<AuthSession, AppError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?
        .to_owned();

    let claims = verify_token(&token).map_err(|_| unauthorized())?;

    let pool = req
        .app_data::<web::Data<PgPool>>()
        .ok_or_else(unauthorized)?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND $2 = ANY(tokens)"
    ))
    .bind(claims.sub)
    .bind(&token)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        log::error!("session lookup failed: {}", e);
        unauthorized()
    })?
    .ok_or_else(unauthorized)?;

    Ok(AuthSession { user, token })
}

fn unauthorized() -> AppError {
    AppError::Unauthorized("Please authenticate".into())
}
