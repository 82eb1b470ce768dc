use crate::{
    auth::{
        generate_token, hash_password, verify_password, AuthResponse, AuthSession, LoginRequest,
        SignupRequest,
    },
    avatar,
    emails::Mailer,
    error::AppError,
    models::user::{User, UserUpdate, USER_COLUMNS},
};
use actix_multipart::Multipart;
use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use futures::TryStreamExt;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Sign up a new user
///
/// Creates the account, fires a best-effort welcome email and issues the
/// first session token.
#[post("")]
pub async fn signup(
    pool: web::Data<PgPool>,
    mailer: web::Data<Mailer>,
    payload: web::Json<SignupRequest>,
) -> Result<impl Responder, AppError> {
    // Validate input
    payload.validate()?;

    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    // Check if email already exists
    let existing = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&**pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::BadRequest("Email already registered".into()));
    }

    // Hash password
    let password_hash = hash_password(&payload.password)?;

    // Insert new user
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, name, email, password_hash, age) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .bind(payload.age.unwrap_or(0))
    .fetch_one(&**pool)
    .await?;

    // Failure of the welcome email must not fail the signup
    mailer.send_welcome(&user.email, &user.name);

    // Issue the first session token
    let token = generate_token(user.id)?;
    let user = append_token(&pool, user.id, &token).await?;

    Ok(HttpResponse::Created().json(AuthResponse {
        user: user.profile(),
        token,
    }))
}

/// Login
///
/// An unknown email and a wrong password produce the same generic error, so
/// the response never reveals which part of the credentials was wrong.
#[post("/login")]
pub async fn login(
    pool: web::Data<PgPool>,
    payload: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    let email = payload.email.trim().to_lowercase();

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(&email)
    .fetch_optional(&**pool)
    .await?;

    let user = match user {
        Some(user) => user,
        None => return Err(login_failed()),
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(login_failed());
    }

    let token = generate_token(user.id)?;
    let user = append_token(&pool, user.id, &token).await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        user: user.profile(),
        token,
    }))
}

/// Logout the current session only: exactly the token that authenticated
/// this request is removed, other sessions stay valid.
#[post("/logout")]
pub async fn logout(
    pool: web::Data<PgPool>,
    session: AuthSession,
) -> Result<impl Responder, AppError> {
    sqlx::query("UPDATE users SET tokens = array_remove(tokens, $1), updated_at = now() WHERE id = $2")
        .bind(&session.token)
        .bind(session.user.id)
        .execute(&**pool)
        .await?;

    Ok(HttpResponse::Ok().finish())
}

/// Logout everywhere: the entire token list is cleared.
#[post("/logoutAll")]
pub async fn logout_all(
    pool: web::Data<PgPool>,
    session: AuthSession,
) -> Result<impl Responder, AppError> {
    sqlx::query("UPDATE users SET tokens = '{}', updated_at = now() WHERE id = $1")
        .bind(session.user.id)
        .execute(&**pool)
        .await?;

    Ok(HttpResponse::Ok().finish())
}

/// Read the authenticated user's own profile.
#[get("/me")]
pub async fn me(session: AuthSession) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(session.user.profile()))
}

/// Update the authenticated user's own profile.
///
/// `UserUpdate` deserialization already rejects any field outside the
/// allow-list, so by the time this body runs the payload is known-clean.
#[patch("/me")]
pub async fn update_me(
    pool: web::Data<PgPool>,
    session: AuthSession,
    payload: web::Json<UserUpdate>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let mut user = session.user;
    if let Some(name) = &payload.name {
        user.name = name.trim().to_string();
    }
    if let Some(email) = &payload.email {
        user.email = email.trim().to_lowercase();
    }
    if let Some(password) = &payload.password {
        // A password change stores a fresh hash, never the plaintext
        user.password_hash = hash_password(password)?;
    }
    if let Some(age) = payload.age {
        user.age = age;
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET name = $1, email = $2, password_hash = $3, age = $4, updated_at = now() \
         WHERE id = $5 RETURNING {USER_COLUMNS}"
    ))
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.age)
    .bind(user.id)
    .fetch_one(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(user.profile()))
}

/// Delete the authenticated user's own account.
///
/// The user's tasks go with the account, inside one transaction, so a crash
/// cannot leave orphaned tasks behind. The cancellation email fires only
/// after the commit.
#[delete("/me")]
pub async fn delete_me(
    pool: web::Data<PgPool>,
    mailer: web::Data<Mailer>,
    session: AuthSession,
) -> Result<impl Responder, AppError> {
    let user = session.user;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM tasks WHERE owner = $1")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    mailer.send_cancellation(&user.email, &user.name);

    Ok(HttpResponse::Ok().json(user.profile()))
}

/// Upload an avatar image.
///
/// Expects a multipart field named "avatar". The filename extension and the
/// size ceiling are checked while the stream is read, before any decoding;
/// accepted images are normalized to a 250x250 PNG and stored on the user
/// row.
#[post("/me/avatar")]
pub async fn upload_avatar(
    pool: web::Data<PgPool>,
    session: AuthSession,
    mut payload: Multipart,
) -> Result<impl Responder, AppError> {
    let data = read_avatar_field(&mut payload).await?;
    let png = avatar::normalize(&data)?;

    sqlx::query("UPDATE users SET avatar = $1, updated_at = now() WHERE id = $2")
        .bind(&png)
        .bind(session.user.id)
        .execute(&**pool)
        .await?;

    Ok(HttpResponse::Ok().finish())
}

/// Delete the stored avatar.
#[delete("/me/avatar")]
pub async fn delete_avatar(
    pool: web::Data<PgPool>,
    session: AuthSession,
) -> Result<impl Responder, AppError> {
    sqlx::query("UPDATE users SET avatar = NULL, updated_at = now() WHERE id = $1")
        .bind(session.user.id)
        .execute(&**pool)
        .await?;

    Ok(HttpResponse::Ok().finish())
}

/// Read a user's avatar by user id. Public: avatars are served to anyone
/// who knows the id, always as PNG.
#[get("/{id}/avatar")]
pub async fn get_avatar(
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let avatar = sqlx::query_scalar::<_, Option<Vec<u8>>>("SELECT avatar FROM users WHERE id = $1")
        .bind(user_id.into_inner())
        .fetch_optional(&**pool)
        .await?
        .flatten()
        .ok_or_else(|| AppError::NotFound("Avatar not found".into()))?;

    Ok(HttpResponse::Ok().content_type("image/png").body(avatar))
}

/// Appends a freshly issued token to the user's active-token list and
/// returns the updated row. Shared by signup and login.
async fn append_token(pool: &PgPool, user_id: Uuid, token: &str) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET tokens = array_append(tokens, $1), updated_at = now() \
         WHERE id = $2 RETURNING {USER_COLUMNS}"
    ))
    .bind(token)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

fn login_failed() -> AppError {
    AppError::BadRequest("Unable to login".into())
}

/// Drains the multipart payload and returns the bytes of the "avatar"
/// field, enforcing the extension and size constraints as chunks arrive.
async fn read_avatar_field(payload: &mut Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(mut field) = payload.try_next().await.map_err(bad_upload)? {
        if field.name() != "avatar" {
            // Drain unrelated fields without buffering them
            while field.try_next().await.map_err(bad_upload)?.is_some() {}
            continue;
        }

        let filename = field
            .content_disposition()
            .get_filename()
            .unwrap_or_default()
            .to_string();
        if !avatar::has_image_extension(&filename) {
            return Err(AppError::BadRequest(
                "Please upload an image with jpg/jpeg/png extension".into(),
            ));
        }

        let mut buf = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(bad_upload)? {
            if buf.len() + chunk.len() > avatar::MAX_AVATAR_BYTES {
                return Err(AppError::BadRequest(
                    "Avatar must be 1MB or smaller".into(),
                ));
            }
            buf.extend_from_slice(&chunk);
        }
        return Ok(buf);
    }

    Err(AppError::BadRequest("Missing avatar file field".into()))
}

fn bad_upload(err: actix_multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid upload: {}", err))
}
