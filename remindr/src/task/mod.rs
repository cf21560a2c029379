use crate::entities::*;
use crate::reminder::ReminderKind;
use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt;
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::*;

pub mod web;

pub use crate::entities::task::Status as TaskStatus;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: u32,
    title: String,
    description: Option<String>,
    due_at: DateTime<Utc>,
    status: TaskStatus,
    notify_email: Option<String>,
    reminder_day_sent: bool,
    reminder_hour_sent: bool,
    created_at: DateTime<Utc>,
}

impl Task {
    /// Returns the ID of the task.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the title of the task.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description of the task, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the due time of the task.
    pub fn due_at(&self) -> DateTime<Utc> {
        self.due_at
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Returns the recipient override stored on the task.
    pub fn notify_email(&self) -> Option<&str> {
        self.notify_email.as_deref()
    }

    /// Returns whether the reminder of the given kind was already sent.
    pub fn reminder_sent(&self, kind: ReminderKind) -> bool {
        match kind {
            ReminderKind::Day => self.reminder_day_sent,
            ReminderKind::Hour => self.reminder_hour_sent,
        }
    }

    pub fn day_reminder_sent(&self) -> bool {
        self.reminder_day_sent
    }

    pub fn hour_reminder_sent(&self) -> bool {
        self.reminder_hour_sent
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Due time as shown in emails and alerts.
    pub fn due_display(&self) -> String {
        self.due_at.format("%Y-%m-%d %H:%M UTC").to_string()
    }

    /// Due time as wall-clock time in `tz`, with its UTC offset.
    pub fn due_display_in<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: fmt::Display,
    {
        self.due_at
            .with_timezone(tz)
            .format("%Y-%m-%d %H:%M %:z")
            .to_string()
    }

    /// Due time in the server's zone, the zone the task form is read in.
    pub fn due_local_display(&self) -> String {
        self.due_display_in(&Local)
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Self {
            id: model.id as u32,
            title: model.title,
            description: model.description,
            due_at: model.due_at,
            status: model.status,
            notify_email: model.notify_email,
            reminder_day_sent: model.reminder_day_sent,
            reminder_hour_sent: model.reminder_hour_sent,
            created_at: model.created_at,
        }
    }
}

/// Fields supplied by the user when creating a task.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_at: DateTime<Utc>,
    pub notify_email: Option<String>,
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// Represents a task not found error.
    #[error("Task with ID {0} not found")]
    TaskNotFound(u32),
}

pub struct TaskService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TaskService<'_> {
        TaskService { db }
    }

    /// Creates a new task with both reminder flags unset.
    ///
    /// # Arguments
    ///
    /// * `new_task` - The user-supplied fields of the task.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(&self, new_task: NewTask) -> Result<Task, TaskServiceError> {
        let active_model = task::ActiveModel {
            title: ActiveValue::Set(new_task.title),
            description: ActiveValue::Set(new_task.description),
            due_at: ActiveValue::Set(new_task.due_at),
            status: ActiveValue::Set(TaskStatus::Pending),
            notify_email: ActiveValue::Set(new_task.notify_email),
            reminder_day_sent: ActiveValue::Set(false),
            reminder_hour_sent: ActiveValue::Set(false),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(Task::from(created_model))
    }

    /// Retrieves all tasks, soonest due first.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_tasks(&self) -> Result<Vec<Task>, TaskServiceError> {
        let tasks = task::Entity::find()
            .order_by_asc(task::Column::DueAt)
            .order_by_asc(task::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }

    /// Retrieves a task by its ID.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the task to retrieve.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn get_task_by_id(&self, id: u32) -> Result<Task, TaskServiceError> {
        let model = task::Entity::find_by_id(id as i32)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;
        Ok(Task::from(model))
    }

    /// Retrieves the tasks that may still need a reminder at `now`: pending,
    /// not yet due, and with at least one reminder flag unset.
    ///
    /// # Arguments
    ///
    /// * `now` - The instant the scheduler is evaluating.
    ///
    /// # Returns
    ///
    /// A `Result` containing the candidate tasks, soonest due first.
    #[tracing::instrument(skip(self))]
    pub async fn get_reminder_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskServiceError> {
        let tasks = task::Entity::find()
            .filter(task::Column::Status.eq(TaskStatus::Pending))
            .filter(task::Column::DueAt.gt(now))
            .filter(
                Condition::any()
                    .add(task::Column::ReminderDaySent.eq(false))
                    .add(task::Column::ReminderHourSent.eq(false)),
            )
            .order_by_asc(task::Column::DueAt)
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }

    /// Records that the reminder of `kind` went out for task `id`.
    ///
    /// The flag only ever moves from `false` to `true`: the update is
    /// conditional on the flag still being unset.
    ///
    /// # Returns
    ///
    /// `true` if this call set the flag, `false` if it was already set.
    #[tracing::instrument(skip(self))]
    pub async fn mark_reminder_sent(
        &self,
        id: u32,
        kind: ReminderKind,
    ) -> Result<bool, TaskServiceError> {
        let column = match kind {
            ReminderKind::Day => task::Column::ReminderDaySent,
            ReminderKind::Hour => task::Column::ReminderHourSent,
        };
        let result = task::Entity::update_many()
            .col_expr(column, Expr::value(true))
            .filter(task::Column::Id.eq(id as i32))
            .filter(column.eq(false))
            .exec(self.db)
            .await?;

        if result.rows_affected > 0 {
            return Ok(true);
        }
        // Distinguish an already-set flag from a missing task.
        self.get_task_by_id(id).await?;
        Ok(false)
    }

    /// Marks a task as done. Done tasks receive no further reminders.
    #[tracing::instrument(skip(self))]
    pub async fn complete_task_by_id(&self, id: u32) -> Result<Task, TaskServiceError> {
        let task_to_update = task::Entity::find_by_id(id as i32)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;

        let mut active_model: task::ActiveModel = task_to_update.into();
        active_model.status = ActiveValue::Set(TaskStatus::Done);
        let updated_model = active_model.update(self.db).await?;
        Ok(Task::from(updated_model))
    }

    /// Deletes a task by its ID.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the task to delete.
    ///
    /// # Returns
    ///
    /// A `Result` containing the deleted `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task_by_id(&self, id: u32) -> Result<Task, TaskServiceError> {
        let task_to_delete = task::Entity::find_by_id(id as i32)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;

        let task_copy = Task::from(task_to_delete);
        task::Entity::delete_by_id(id as i32).exec(self.db).await?;
        Ok(task_copy)
    }
}
