use crate::auth::CurrentUser;
use crate::entities::task;
use chrono::{DateTime, FixedOffset, NaiveDate};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
};

pub mod calendar;
pub mod form;
pub mod web;

pub use web::{TaskState, create_task_router};

/// Completion state of a task relative to a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Overdue,
    Active,
}

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: i32,
    owner_id: i32,
    title: String,
    description: String,
    due_date: Option<NaiveDate>,
    is_completed: bool,
    created_at: DateTime<FixedOffset>,
    updated_at: DateTime<FixedOffset>,
}

impl Task {
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the ID of the user owning this task.
    pub fn owner_id(&self) -> i32 {
        self.owner_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn created_at(&self) -> DateTime<FixedOffset> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<FixedOffset> {
        self.updated_at
    }

    /// A task is overdue when its due date lies strictly before `today` and it is not completed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_completed && self.due_date.is_some_and(|due| due < today)
    }

    pub fn status(&self, today: NaiveDate) -> TaskStatus {
        if self.is_completed {
            TaskStatus::Completed
        } else if self.is_overdue(today) {
            TaskStatus::Overdue
        } else {
            TaskStatus::Active
        }
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.user_id,
            title: model.title,
            description: model.description,
            due_date: model.due_date,
            is_completed: model.is_completed,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Cleaned field values accepted by create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInput {
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
}

impl TaskInput {
    /// Input carrying only a title, everything else at its default.
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_date: None,
        }
    }
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// No task exists under the given ID.
    #[error("Task with ID {0} not found")]
    NotFound(i32),
    /// The task exists but is owned by a different user.
    #[error("Task with ID {0} belongs to another user")]
    Forbidden(i32),
    #[error("Task title must not be empty")]
    EmptyTitle,
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Ensures `user` owns `task`.
pub fn require_owner(task: &Task, user: &CurrentUser) -> Result<(), TaskServiceError> {
    if task.owner_id() == user.id {
        Ok(())
    } else {
        Err(TaskServiceError::Forbidden(task.id()))
    }
}

fn now() -> DateTime<FixedOffset> {
    chrono::Utc::now().fixed_offset()
}

pub struct TaskService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TaskService<'_> {
        TaskService { db }
    }

    /// Retrieves every task owned by `owner`, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_tasks(&self, owner: &CurrentUser) -> Result<Vec<Task>, TaskServiceError> {
        let tasks = task::Entity::find()
            .filter(task::Column::UserId.eq(owner.id))
            .order_by_desc(task::Column::CreatedAt)
            .order_by_desc(task::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }

    /// Creates a new task owned by `owner`.
    ///
    /// # Arguments
    ///
    /// * `owner` - The authenticated user the task will belong to.
    /// * `input` - Title, description and due date of the task.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(
        &self,
        owner: &CurrentUser,
        input: TaskInput,
    ) -> Result<Task, TaskServiceError> {
        if input.title.trim().is_empty() {
            return Err(TaskServiceError::EmptyTitle);
        }

        let timestamp = now();
        let active_model = task::ActiveModel {
            title: ActiveValue::Set(input.title),
            description: ActiveValue::Set(input.description),
            due_date: ActiveValue::Set(input.due_date),
            is_completed: ActiveValue::Set(false),
            created_at: ActiveValue::Set(timestamp),
            updated_at: ActiveValue::Set(timestamp),
            user_id: ActiveValue::Set(owner.id),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        tracing::info!("Created task {} for user {}", created_model.id, owner.id);
        Ok(Task::from(created_model))
    }

    /// Retrieves a task by its ID, provided `owner` owns it.
    ///
    /// # Returns
    ///
    /// `NotFound` if no task has this ID, `Forbidden` if another user owns it.
    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, id: i32, owner: &CurrentUser) -> Result<Task, TaskServiceError> {
        self.find_owned_model(id, owner).await.map(Task::from)
    }

    /// Overwrites the editable fields of a task owned by `owner`.
    #[tracing::instrument(skip(self))]
    pub async fn update_task(
        &self,
        id: i32,
        owner: &CurrentUser,
        input: TaskInput,
    ) -> Result<Task, TaskServiceError> {
        let model = self.find_owned_model(id, owner).await?;
        if input.title.trim().is_empty() {
            return Err(TaskServiceError::EmptyTitle);
        }

        let mut active_model: task::ActiveModel = model.into();
        active_model.title = ActiveValue::Set(input.title);
        active_model.description = ActiveValue::Set(input.description);
        active_model.due_date = ActiveValue::Set(input.due_date);
        active_model.updated_at = ActiveValue::Set(now());
        let updated_model = active_model.update(self.db).await?;

        Ok(Task::from(updated_model))
    }

    /// Permanently deletes a task owned by `owner`.
    ///
    /// # Returns
    ///
    /// A `Result` containing the deleted `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(
        &self,
        id: i32,
        owner: &CurrentUser,
    ) -> Result<Task, TaskServiceError> {
        let model = self.find_owned_model(id, owner).await?;
        let deleted = Task::from(model.clone());
        model.delete(self.db).await?;
        tracing::info!("Deleted task {} of user {}", id, owner.id);
        Ok(deleted)
    }

    /// Flips the completion flag of a task owned by `owner`.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_task(
        &self,
        id: i32,
        owner: &CurrentUser,
    ) -> Result<Task, TaskServiceError> {
        let model = self.find_owned_model(id, owner).await?;
        let is_completed = !model.is_completed;

        let mut active_model: task::ActiveModel = model.into();
        active_model.is_completed = ActiveValue::Set(is_completed);
        active_model.updated_at = ActiveValue::Set(now());
        let updated_model = active_model.update(self.db).await?;

        Ok(Task::from(updated_model))
    }

    async fn find_owned_model(
        &self,
        id: i32,
        owner: &CurrentUser,
    ) -> Result<task::Model, TaskServiceError> {
        let model = task::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::NotFound(id))?;
        require_owner(&Task::from(model.clone()), owner)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn sample_task(due_date: Option<NaiveDate>, is_completed: bool) -> Task {
        let timestamp = now();
        Task {
            id: 1,
            owner_id: 42,
            title: "Water the plants".to_string(),
            description: String::new(),
            due_date,
            is_completed,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn can_derive_status_from_due_date_and_completion() {
        let yesterday = today().checked_sub_days(Days::new(1));
        let tomorrow = today().checked_add_days(Days::new(1));

        assert_eq!(sample_task(yesterday, false).status(today()), TaskStatus::Overdue);
        assert_eq!(sample_task(tomorrow, false).status(today()), TaskStatus::Active);
        assert_eq!(sample_task(None, false).status(today()), TaskStatus::Active);
        assert_eq!(sample_task(yesterday, true).status(today()), TaskStatus::Completed);
    }

    #[test]
    fn task_due_today_is_not_overdue() {
        assert!(!sample_task(Some(today()), false).is_overdue(today()));
    }

    #[test]
    fn can_require_owner() {
        let task = sample_task(None, false);
        let owner = CurrentUser::new(42, "owner".to_string());
        let stranger = CurrentUser::new(7, "stranger".to_string());

        assert!(require_owner(&task, &owner).is_ok());
        assert!(matches!(
            require_owner(&task, &stranger),
            Err(TaskServiceError::Forbidden(1))
        ));
    }
}
