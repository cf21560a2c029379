use askama::Template;
use axum::{
    Form, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::notifier::{Email, Notifier};
use crate::task::{NewTask, Task, TaskService, TaskServiceError};
use crate::web::ErrorMessageTemplate;

/// Accepted layouts of the naive `due_date` form field, tried in order.
const DUE_DATE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Deserialize)]
pub struct CreateTaskForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub notify_email: String,
}

/// Rejections of a submitted task form.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TaskFormError {
    #[error("Missing fields")]
    MissingFields,
    #[error("Invalid date format. Use YYYY-MM-DDTHH:MM")]
    InvalidDueDate,
}

impl CreateTaskForm {
    /// Validates the form, reading `due_date` as a wall-clock time in `tz`.
    pub fn into_new_task<Tz: TimeZone>(self, tz: &Tz) -> Result<NewTask, TaskFormError> {
        let title = self.title.trim();
        let due_raw = self.due_date.trim();
        if title.is_empty() || due_raw.is_empty() {
            return Err(TaskFormError::MissingFields);
        }

        Ok(NewTask {
            title: title.to_string(),
            description: non_blank(self.description),
            due_at: parse_due_date(due_raw, tz)?,
            notify_email: non_blank(self.notify_email),
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses a due date as submitted by a `datetime-local` input.
///
/// Values with an explicit offset (RFC 3339) are taken as-is; naive values
/// are interpreted in `tz`. For a wall-clock time that occurs twice the
/// earlier instant wins, one that never occurs is rejected.
pub fn parse_due_date<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<DateTime<Utc>, TaskFormError> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    let naive = DUE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or(TaskFormError::InvalidDueDate)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or(TaskFormError::InvalidDueDate)
}

/// Custom error type for task handler operations.
#[derive(Debug, thiserror::Error)]
enum TaskError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a task service error.
    #[error("Task service error")]
    Service(#[from] TaskServiceError),
    /// Represents an invalid form submission.
    #[error("Invalid task form: {0}")]
    Form(#[from] TaskFormError),
}

impl IntoResponse for TaskError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, user_facing_error_message) = match &self {
            TaskError::Form(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            TaskError::Service(TaskServiceError::TaskNotFound(id)) => (
                StatusCode::NOT_FOUND,
                format!("Task with ID {} not found.", id),
            ),
            _ => {
                tracing::error!("Task request failed: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred while processing your request. Please try again later."
                        .to_string(),
                )
            }
        };

        let error_template = ErrorMessageTemplate::new(user_facing_error_message);
        let Ok(rendered) = error_template.render() else {
            return status_code.into_response();
        };
        (status_code, Html(rendered)).into_response()
    }
}

#[derive(Template)]
#[template(path = "tasks.html")]
struct TasksTemplate {
    tasks: Vec<Task>,
    /// UTC offset the due date field is read in, e.g. `+02:00`.
    zone: String,
}

impl TasksTemplate {
    pub fn new(tasks: Vec<Task>, zone: String) -> Self {
        Self { tasks, zone }
    }
}

#[derive(Clone)]
pub struct TaskState {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub notifier: Arc<dyn Notifier>,
}

/// Handler for GET / that lists all tasks below the create form.
#[tracing::instrument(skip(state))]
async fn tasks_handler(State(state): State<Arc<TaskState>>) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let tasks = task_service.get_all_tasks().await?;
    let template = TasksTemplate::new(tasks, Local::now().format("%:z").to_string());
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for POST /tasks that stores a new task and confirms it by email.
#[tracing::instrument(skip(state))]
async fn create_task_handler(
    State(state): State<Arc<TaskState>>,
    Form(form): Form<CreateTaskForm>,
) -> Result<Redirect, TaskError> {
    let new_task = form.into_new_task(&Local)?;
    let task_service = TaskService::new(&state.db);
    let task = task_service.create_task(new_task).await?;
    tracing::info!("Created task {} due {}", task.id(), task.due_display());

    if let Some(address) = task.notify_email() {
        let email = Email::confirmation(&task, address);
        match state.notifier.send(&email).await {
            Ok(()) => tracing::info!("Confirmation for task {} sent to {}", task.id(), address),
            Err(err) => tracing::warn!(
                "Confirmation for task {} could not be sent: {}",
                task.id(),
                err
            ),
        }
    }

    Ok(Redirect::to("/"))
}

/// Handler for POST /tasks/{id}/complete.
#[tracing::instrument(skip(state))]
async fn complete_task_handler(
    State(state): State<Arc<TaskState>>,
    Path(id): Path<u32>,
) -> Result<Redirect, TaskError> {
    let task_service = TaskService::new(&state.db);
    task_service.complete_task_by_id(id).await?;
    Ok(Redirect::to("/"))
}

/// Handler for POST /tasks/{id}/delete.
#[tracing::instrument(skip(state))]
async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Path(id): Path<u32>,
) -> Result<Redirect, TaskError> {
    let task_service = TaskService::new(&state.db);
    task_service.delete_task_by_id(id).await?;
    Ok(Redirect::to("/"))
}

/// Creates and returns the task router with all task-related routes.
pub fn create_task_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/", get(tasks_handler))
        .route("/tasks", get(tasks_handler).post(create_task_handler))
        .route("/tasks/{id}/complete", post(complete_task_handler))
        .route("/tasks/{id}/delete", post(delete_task_handler))
        .with_state(state)
}
