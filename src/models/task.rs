use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::user::not_blank;

/// A task entity as stored in the database and returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    pub completed: bool,
    /// The user this task belongs to. Every query for a task carries this
    /// as an explicit parameter; a task is never reachable through another
    /// user's session.
    pub owner: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for `POST /tasks`.
///
/// Unknown fields are tolerated on create: a client-supplied `owner` (or
/// anything else) is dropped, and the owner is always forced to the
/// authenticated user.
#[derive(Debug, Deserialize, Validate)]
pub struct TaskInput {
    #[validate(custom = "not_blank")]
    pub description: String,
    pub completed: Option<bool>,
}

/// Payload for `PATCH /tasks/{id}`.
///
/// Like [`UserUpdate`](crate::models::user::UserUpdate), the field set is
/// the allow-list and unknown fields reject the whole request.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TaskUpdate {
    #[validate(custom = "not_blank")]
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl Task {
    /// Builds a new `Task` owned by `owner`, stamping a fresh id and
    /// timestamps. `completed` defaults to false, the description is
    /// trimmed.
    pub fn new(input: TaskInput, owner: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: input.description.trim().to_string(),
            completed: input.completed.unwrap_or(false),
            owner,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Query parameters for `GET /tasks`.
///
/// All refinements are lenient, matching the behavior the API has always
/// had: `completed` compares against the literal string "true", and
/// `limit`/`skip` values that do not parse as non-negative numbers are
/// treated as absent.
#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub completed: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

impl TaskQuery {
    pub fn completed_filter(&self) -> Option<bool> {
        self.completed.as_deref().map(|value| value == "true")
    }

    pub fn limit_value(&self) -> Option<i64> {
        parse_page_param(self.limit.as_deref())
    }

    pub fn skip_value(&self) -> Option<i64> {
        parse_page_param(self.skip.as_deref())
    }

    /// Resolves `sortBy=<field>_<direction>` to an `(column, direction)`
    /// pair safe to splice into SQL. Fields map through an allow-list of
    /// sortable columns; anything unrecognized falls back to the default
    /// order. The direction is descending only for the exact token "desc".
    pub fn order_by(&self) -> (&'static str, &'static str) {
        let Some(sort_by) = self.sort_by.as_deref() else {
            return DEFAULT_ORDER;
        };
        let (field, direction) = sort_by.split_once('_').unwrap_or((sort_by, "asc"));
        let Some(column) = sort_column(field) else {
            return DEFAULT_ORDER;
        };
        let direction = if direction == "desc" { "DESC" } else { "ASC" };
        (column, direction)
    }
}

const DEFAULT_ORDER: (&str, &str) = ("created_at", "ASC");

fn sort_column(field: &str) -> Option<&'static str> {
    match field {
        "createdAt" => Some("created_at"),
        "updatedAt" => Some("updated_at"),
        "completed" => Some("completed"),
        "description" => Some("description"),
        _ => None,
    }
}

fn parse_page_param(value: Option<&str>) -> Option<i64> {
    value
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|parsed| *parsed >= 0)
}
