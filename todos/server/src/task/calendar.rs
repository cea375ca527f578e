//! JSON event feed consumed by the calendar page.
use axum::{Extension, Json, extract::State};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::CurrentUser;
use crate::task::web::{TaskError, TaskState, today};
use crate::task::{Task, TaskService, TaskStatus};

pub const COMPLETED_COLOR: &str = "#10b981";
pub const OVERDUE_COLOR: &str = "#ef4444";
pub const ACTIVE_COLOR: &str = "#3b82f6";

impl TaskStatus {
    /// Hex color used to render a task in this state on the calendar.
    pub fn color(self) -> &'static str {
        match self {
            TaskStatus::Completed => COMPLETED_COLOR,
            TaskStatus::Overdue => OVERDUE_COLOR,
            TaskStatus::Active => ACTIVE_COLOR,
        }
    }
}

/// A single calendar entry for one task.
#[derive(Debug, Serialize, ToSchema)]
pub struct CalendarEvent {
    /// Task identifier
    pub id: i32,
    pub title: String,
    /// Due date of the task, or the current day when it has none
    #[schema(value_type = String, format = Date)]
    pub start: NaiveDate,
    /// Hex color derived from the task status
    pub color: String,
    #[serde(rename = "extendedProps")]
    pub extended_props: ExtendedProps,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExtendedProps {
    pub description: String,
    pub is_completed: bool,
}

impl CalendarEvent {
    pub fn from_task(task: &Task, today: NaiveDate) -> Self {
        Self {
            id: task.id(),
            title: task.title().to_string(),
            start: task.due_date().unwrap_or(today),
            color: task.status(today).color().to_string(),
            extended_props: ExtendedProps {
                description: task.description().to_string(),
                is_completed: task.is_completed(),
            },
        }
    }
}

/// Handler for GET /api/calendar/ - Returns the caller's tasks as calendar events.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/calendar/",
    responses(
        (
            status = 200,
            description = "Calendar events for every task of the current user",
            body = [CalendarEvent]
        ),
        (status = 302, description = "Not logged in, redirected to the login page")
    ),
    tag = "Calendar"
)]
pub async fn calendar_feed_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<CalendarEvent>>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let today = today();
    let events = task_service
        .list_tasks(&user)
        .await?
        .iter()
        .map(|task| CalendarEvent::from_task(task, today))
        .collect();
    Ok(Json(events))
}
