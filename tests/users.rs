use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::middleware::Logger;
use actix_web::{test, web, App};
use dotenv::dotenv;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use taskbox::auth::AuthMiddleware;
use taskbox::emails::Mailer;
use taskbox::error::json_error_handler;
use taskbox::routes;

// Integration tests need a real PostgreSQL; they skip with a notice when
// DATABASE_URL is not set so the unit suite stays green without one.
async fn setup() -> Option<PgPool> {
    dotenv().ok();
    std::env::set_var("JWT_SECRET", "integration-test-secret");

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping integration test");
            return None;
        }
    };

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    Some(pool)
}

fn unique_email(tag: &str) -> String {
    format!("{}-{}@example.com", tag, Uuid::new_v4().simple())
}

async fn remove_user(pool: &PgPool, email: &str) {
    let _ = sqlx::query("DELETE FROM tasks WHERE owner IN (SELECT id FROM users WHERE email = $1)")
        .bind(email)
        .execute(pool)
        .await;
    let _ = sqlx::query("DELETE FROM users WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await;
}

async fn signup_user<S, B>(app: &S, email: &str, password: &str) -> (Uuid, String)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/users")
        .set_json(json!({
            "name": "Integration User",
            "email": email,
            "password": password
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(status, StatusCode::CREATED, "Signup failed. Body: {}", body);

    let user_id = Uuid::parse_str(body["user"]["id"].as_str().expect("user id")).unwrap();
    let token = body["token"].as_str().expect("token").to_string();
    (user_id, token)
}

/// Builds a multipart body with a single file field, the way a browser
/// would encode it.
fn multipart_upload(field: &str, filename: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "------------------------taskboxtestboundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (
        format!("multipart/form-data; boundary={boundary}"),
        body,
    )
}

fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    use image::codecs::jpeg::JpegEncoder;
    use image::RgbImage;

    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    encoder.encode_image(&img).unwrap();
    buf
}

macro_rules! test_app {
    ($pool:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($pool.clone()))
                .app_data(web::Data::new(Mailer::from_env()))
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .wrap(AuthMiddleware)
                .wrap(Logger::default())
                .configure(routes::config),
        )
        .await
    };
}

#[actix_rt::test]
async fn test_read_own_profile() {
    let Some(pool) = setup().await else { return };
    let app = test_app!(pool);
    let email = unique_email("profile-read");

    let (user_id, token) = signup_user(&app, &email, "1162Cm13!").await;

    let req = test::TestRequest::get()
        .uri("/users/me")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], user_id.to_string());
    assert_eq!(body["email"], email.as_str());
    assert!(body.get("password").is_none());
    assert!(body.get("password_hash").is_none());
    assert!(body.get("tokens").is_none());
    assert!(body.get("avatar").is_none());

    remove_user(&pool, &email).await;
}

#[actix_rt::test]
async fn test_update_own_profile() {
    let Some(pool) = setup().await else { return };
    let app = test_app!(pool);
    let email = unique_email("profile-update");

    let (_, token) = signup_user(&app, &email, "1162Cm13!").await;

    // Update allow-listed fields
    let req = test::TestRequest::patch()
        .uri("/users/me")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "Michael", "age": 28 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(status, StatusCode::OK, "Update failed. Body: {}", body);
    assert_eq!(body["name"], "Michael");
    assert_eq!(body["age"], 28);

    // A field outside the allow-list rejects the whole request, even
    // alongside valid fields
    let req = test::TestRequest::patch()
        .uri("/users/me")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "name": "Ignored", "location": "Sofia" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let name: String = sqlx::query_scalar("SELECT name FROM users WHERE email = $1")
        .bind(&email)
        .fetch_one(&pool)
        .await
        .expect("user row");
    assert_eq!(name, "Michael");

    // Invalid values on allow-listed fields are rejected too
    let req = test::TestRequest::patch()
        .uri("/users/me")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "email": "not-an-email" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    remove_user(&pool, &email).await;
}

#[actix_rt::test]
async fn test_password_change_rehashes() {
    let Some(pool) = setup().await else { return };
    let app = test_app!(pool);
    let email = unique_email("password-change");

    let (_, token) = signup_user(&app, &email, "1162Cm13!").await;

    let req = test::TestRequest::patch()
        .uri("/users/me")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .set_json(json!({ "password": "fresh42secret" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // The stored hash is not the plaintext
    let hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE email = $1")
        .bind(&email)
        .fetch_one(&pool)
        .await
        .expect("user row");
    assert_ne!(hash, "fresh42secret");

    // The old password no longer logs in, the new one does
    let req = test::TestRequest::post()
        .uri("/users/login")
        .set_json(json!({ "email": email, "password": "1162Cm13!" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/users/login")
        .set_json(json!({ "email": email, "password": "fresh42secret" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    remove_user(&pool, &email).await;
}

#[actix_rt::test]
async fn test_delete_account_cascades_to_tasks() {
    let Some(pool) = setup().await else { return };
    let app = test_app!(pool);
    let email = unique_email("account-delete");

    let (user_id, token) = signup_user(&app, &email, "1162Cm13!").await;

    // Two tasks owned by this user
    for description in ["First errand", "Second errand"] {
        let req = test::TestRequest::post()
            .uri("/tasks")
            .append_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({ "description": description }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::delete()
        .uri("/users/me")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["email"], email.as_str());

    // User row gone, and every owned task with it
    let user_count: i64 = sqlx::query_scalar("SELECT count(*) FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(user_count, 0);

    let task_count: i64 = sqlx::query_scalar("SELECT count(*) FROM tasks WHERE owner = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(task_count, 0);

    // The deleted user's session is gone too
    let req = test::TestRequest::get()
        .uri("/users/me")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_avatar_upload_and_read() {
    let Some(pool) = setup().await else { return };
    let app = test_app!(pool);
    let email = unique_email("avatar");

    let (user_id, token) = signup_user(&app, &email, "1162Cm13!").await;

    // Upload a valid JPEG
    let (content_type, body) =
        multipart_upload("avatar", "profile-pic.jpg", "image/jpeg", &test_jpeg(64, 48));
    let req = test::TestRequest::post()
        .uri("/users/me/avatar")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Content-Type", content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    assert_eq!(
        status,
        StatusCode::OK,
        "Avatar upload failed. Body: {:?}",
        String::from_utf8_lossy(&body)
    );

    // The avatar is readable by anyone, as a 250x250 PNG
    let req = test::TestRequest::get()
        .uri(&format!("/users/{}/avatar", user_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("Content-Type").unwrap(),
        "image/png"
    );
    use image::GenericImageView;
    let bytes = test::read_body(resp).await;
    assert!(!bytes.is_empty());
    let decoded = image::load_from_memory(&bytes).expect("stored avatar decodes");
    assert_eq!(decoded.dimensions(), (250, 250));

    // Delete, then the read is a 404
    let req = test::TestRequest::delete()
        .uri("/users/me/avatar")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!("/users/{}/avatar", user_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let bytes = test::read_body(resp).await;
    assert!(bytes.is_empty());

    remove_user(&pool, &email).await;
}

#[actix_rt::test]
async fn test_avatar_upload_constraints() {
    let Some(pool) = setup().await else { return };
    let app = test_app!(pool);
    let email = unique_email("avatar-constraints");

    let (_, token) = signup_user(&app, &email, "1162Cm13!").await;

    // A 2MB file is rejected before any decoding happens
    let oversized = vec![0u8; 2_000_000];
    let (content_type, body) =
        multipart_upload("avatar", "huge-pic.jpg", "image/jpeg", &oversized);
    let req = test::TestRequest::post()
        .uri("/users/me/avatar")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Content-Type", content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // A .gif filename is rejected
    let (content_type, body) =
        multipart_upload("avatar", "animated.gif", "image/gif", &[0x47, 0x49, 0x46]);
    let req = test::TestRequest::post()
        .uri("/users/me/avatar")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Content-Type", content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Bytes that are not an image are rejected even with a good name
    let (content_type, body) =
        multipart_upload("avatar", "broken.png", "image/png", &[0x00, 0x01, 0x02]);
    let req = test::TestRequest::post()
        .uri("/users/me/avatar")
        .append_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Content-Type", content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    remove_user(&pool, &email).await;
}

#[actix_rt::test]
async fn test_avatar_read_missing_user() {
    let Some(pool) = setup().await else { return };
    let app = test_app!(pool);

    let req = test::TestRequest::get()
        .uri(&format!("/users/{}/avatar", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
