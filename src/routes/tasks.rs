use crate::{
    auth::AuthSession,
    error::AppError,
    models::{Task, TaskInput, TaskQuery, TaskUpdate},
};
use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

const TASK_COLUMNS: &str = "id, description, completed, owner, created_at, updated_at";

/// Create a new task owned by the authenticated user.
///
/// The owner always comes from the session; a client-supplied owner field
/// is ignored.
#[post("")]
pub async fn create_task(
    pool: web::Data<PgPool>,
    payload: web::Json<TaskInput>,
    session: AuthSession,
) -> Result<impl Responder, AppError> {
    // Validate input
    payload.validate()?;

    let task = Task::new(payload.into_inner(), session.user.id);

    let result = sqlx::query_as::<_, Task>(&format!(
        "INSERT INTO tasks (id, description, completed, owner, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {TASK_COLUMNS}"
    ))
    .bind(task.id)
    .bind(task.description)
    .bind(task.completed)
    .bind(task.owner)
    .bind(task.created_at)
    .bind(task.updated_at)
    .fetch_one(&**pool)
    .await?;

    Ok(HttpResponse::Created().json(result))
}

/// List the authenticated user's tasks.
///
/// ## Query Parameters:
/// - `completed` (optional): keep only tasks matching `value == "true"`.
/// - `sortBy` (optional): `<field>_<asc|desc>` over createdAt, updatedAt,
///   completed or description; anything else means the default order.
/// - `limit` / `skip` (optional): pagination; non-numeric values are
///   ignored.
#[get("")]
#[allow(unused_assignments)]
pub async fn get_tasks(
    pool: web::Data<PgPool>,
    query: web::Query<TaskQuery>,
    session: AuthSession,
) -> Result<impl Responder, AppError> {
    // Base query scoped to the owner; refinements are appended with
    // numbered parameters, except the ORDER BY column which comes from the
    // allow-list in TaskQuery and is spliced directly.
    let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner = $1");
    let mut param_count = 2;

    if query.completed_filter().is_some() {
        sql.push_str(&format!(" AND completed = ${}", param_count));
        param_count += 1;
    }

    let (column, direction) = query.order_by();
    sql.push_str(&format!(" ORDER BY {} {}", column, direction));

    if query.limit_value().is_some() {
        sql.push_str(&format!(" LIMIT ${}", param_count));
        param_count += 1;
    }
    if query.skip_value().is_some() {
        sql.push_str(&format!(" OFFSET ${}", param_count));
        param_count += 1;
    }

    let mut query_builder = sqlx::query_as::<_, Task>(&sql);

    query_builder = query_builder.bind(session.user.id);

    if let Some(completed) = query.completed_filter() {
        query_builder = query_builder.bind(completed);
    }
    if let Some(limit) = query.limit_value() {
        query_builder = query_builder.bind(limit);
    }
    if let Some(skip) = query.skip_value() {
        query_builder = query_builder.bind(skip);
    }

    let tasks = query_builder.fetch_all(&**pool).await?;

    Ok(HttpResponse::Ok().json(tasks))
}

/// Read one task by id.
///
/// The owner is part of the lookup itself, so a task belonging to someone
/// else is indistinguishable from a task that does not exist.
#[get("/{id}")]
pub async fn get_task(
    pool: web::Data<PgPool>,
    task_id: web::Path<Uuid>,
    session: AuthSession,
) -> Result<impl Responder, AppError> {
    let task = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND owner = $2"
    ))
    .bind(task_id.into_inner())
    .bind(session.user.id)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(task_not_found)?;

    Ok(HttpResponse::Ok().json(task))
}

/// Update one task.
///
/// Allow-list: description, completed. Unknown fields are rejected by
/// `TaskUpdate` deserialization before this body runs.
#[patch("/{id}")]
pub async fn update_task(
    pool: web::Data<PgPool>,
    task_id: web::Path<Uuid>,
    payload: web::Json<TaskUpdate>,
    session: AuthSession,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let mut task = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND owner = $2"
    ))
    .bind(task_id.into_inner())
    .bind(session.user.id)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(task_not_found)?;

    if let Some(description) = &payload.description {
        task.description = description.trim().to_string();
    }
    if let Some(completed) = payload.completed {
        task.completed = completed;
    }

    let task = sqlx::query_as::<_, Task>(&format!(
        "UPDATE tasks SET description = $1, completed = $2, updated_at = now() \
         WHERE id = $3 AND owner = $4 RETURNING {TASK_COLUMNS}"
    ))
    .bind(&task.description)
    .bind(task.completed)
    .bind(task.id)
    .bind(task.owner)
    .fetch_one(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(task))
}

/// Delete one task, responding with the deleted task.
#[delete("/{id}")]
pub async fn delete_task(
    pool: web::Data<PgPool>,
    task_id: web::Path<Uuid>,
    session: AuthSession,
) -> Result<impl Responder, AppError> {
    let task = sqlx::query_as::<_, Task>(&format!(
        "DELETE FROM tasks WHERE id = $1 AND owner = $2 RETURNING {TASK_COLUMNS}"
    ))
    .bind(task_id.into_inner())
    .bind(session.user.id)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(task_not_found)?;

    Ok(HttpResponse::Ok().json(task))
}

fn task_not_found() -> AppError {
    AppError::NotFound("Task not found".into())
}
