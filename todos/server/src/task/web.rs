use askama::Template;
use axum::{
    Extension, Form, Router,
    extract::{FromRequest, Path, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::form::FormErrors;
use crate::task::calendar;
use crate::task::form::TaskForm;
use crate::task::{Task, TaskService, TaskServiceError, TaskStatus};
use crate::web::{PageContext, error_response, found, internal_server_error};

/// State shared by the task handlers.
#[derive(Clone)]
pub struct TaskState {
    pub db: Arc<sea_orm::DatabaseConnection>,
}

/// The calendar day used to decide whether a task is overdue.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Custom error type for task handler operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    #[error("Task service error: {0}")]
    Service(#[from] TaskServiceError),
}

impl axum::response::IntoResponse for TaskError {
    fn into_response(self) -> axum::response::Response {
        match self {
            TaskError::Service(TaskServiceError::NotFound(id)) => {
                tracing::info!("Task {} not found", id);
                error_response(StatusCode::NOT_FOUND, "The requested task does not exist.")
            }
            TaskError::Service(TaskServiceError::Forbidden(id)) => {
                tracing::warn!("Refused access to task {}", id);
                error_response(
                    StatusCode::FORBIDDEN,
                    "You do not have permission to access this task.",
                )
            }
            other => {
                tracing::error!("{}", other);
                internal_server_error()
            }
        }
    }
}

#[derive(Template)]
#[template(path = "tasks/list.html")]
struct TaskListTemplate {
    page: PageContext,
    rows: Vec<TaskRow>,
}

struct TaskRow {
    task: Task,
    status_class: &'static str,
}

impl TaskRow {
    fn new(task: Task, today: NaiveDate) -> Self {
        let status_class = match task.status(today) {
            TaskStatus::Completed => "completed",
            TaskStatus::Overdue => "overdue",
            TaskStatus::Active => "active",
        };
        Self { task, status_class }
    }
}

#[derive(Template)]
#[template(path = "tasks/form.html")]
struct TaskFormTemplate<'a> {
    page: PageContext,
    heading: &'a str,
    action: String,
    form: TaskForm,
    errors: FormErrors,
}

#[derive(Template)]
#[template(path = "tasks/confirm_delete.html")]
struct ConfirmDeleteTemplate {
    page: PageContext,
    task: Task,
}

#[derive(Template)]
#[template(path = "tasks/calendar.html")]
struct CalendarTemplate {
    page: PageContext,
}

fn render(template: &impl Template) -> Result<Response, TaskError> {
    Ok(Html(template.render()?).into_response())
}

/// Handler for GET / - Lists the caller's tasks, newest first.
#[tracing::instrument(skip(state))]
pub async fn task_list_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    page: PageContext,
) -> Result<Response, TaskError> {
    let today = today();
    let rows = TaskService::new(&state.db)
        .list_tasks(&user)
        .await?
        .into_iter()
        .map(|task| TaskRow::new(task, today))
        .collect();
    render(&TaskListTemplate { page, rows })
}

/// Handler for GET /create/ - Shows an empty task form.
#[tracing::instrument]
pub async fn create_page_handler(page: PageContext) -> Result<Response, TaskError> {
    render(&TaskFormTemplate {
        page,
        heading: "Create task",
        action: "/create/".to_string(),
        form: TaskForm::default(),
        errors: FormErrors::new(),
    })
}

/// Handler for POST /create/ - Creates a task owned by the caller.
/// Invalid input re-renders the form with its errors.
#[tracing::instrument(skip(state))]
pub async fn create_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    page: PageContext,
    Form(form): Form<TaskForm>,
) -> Result<Response, TaskError> {
    match form.validate() {
        Ok(input) => {
            TaskService::new(&state.db).create_task(&user, input).await?;
            Ok(found(&page.link("/")))
        }
        Err(errors) => render(&TaskFormTemplate {
            page,
            heading: "Create task",
            action: "/create/".to_string(),
            form,
            errors,
        }),
    }
}

/// Handler for GET /update/{id}/ - Shows the form pre-filled with the task.
#[tracing::instrument(skip(state))]
pub async fn update_page_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    page: PageContext,
    Path(id): Path<i32>,
) -> Result<Response, TaskError> {
    let task = TaskService::new(&state.db).get_task(id, &user).await?;
    render(&TaskFormTemplate {
        page,
        heading: "Edit task",
        action: format!("/update/{}/", id),
        form: TaskForm::from_task(&task),
        errors: FormErrors::new(),
    })
}

/// Handler for POST /update/{id}/ - Saves changes to a task owned by the caller.
/// Ownership is checked before the request body is parsed.
#[tracing::instrument(skip(state, request))]
pub async fn update_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    page: PageContext,
    Path(id): Path<i32>,
    request: Request,
) -> Result<Response, TaskError> {
    let task_service = TaskService::new(&state.db);
    task_service.get_task(id, &user).await?;

    let Form(form) = match Form::<TaskForm>::from_request(request, &()).await {
        Ok(form) => form,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    match form.validate() {
        Ok(input) => {
            task_service.update_task(id, &user, input).await?;
            Ok(found(&page.link("/")))
        }
        Err(errors) => render(&TaskFormTemplate {
            page,
            heading: "Edit task",
            action: format!("/update/{}/", id),
            form,
            errors,
        }),
    }
}

/// Handler for GET /delete/{id}/ - Asks for confirmation before deleting.
#[tracing::instrument(skip(state))]
pub async fn delete_page_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    page: PageContext,
    Path(id): Path<i32>,
) -> Result<Response, TaskError> {
    let task = TaskService::new(&state.db).get_task(id, &user).await?;
    render(&ConfirmDeleteTemplate { page, task })
}

/// Handler for POST /delete/{id}/
#[tracing::instrument(skip(state))]
pub async fn delete_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    page: PageContext,
    Path(id): Path<i32>,
) -> Result<Response, TaskError> {
    TaskService::new(&state.db).delete_task(id, &user).await?;
    Ok(found(&page.link("/")))
}

/// Handler for POST /toggle/{id}/ - Flips the completion flag.
#[tracing::instrument(skip(state))]
pub async fn toggle_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    page: PageContext,
    Path(id): Path<i32>,
) -> Result<Response, TaskError> {
    let task = TaskService::new(&state.db).toggle_task(id, &user).await?;
    tracing::info!("Task {} completed: {}", task.id(), task.is_completed());
    Ok(found(&page.link("/")))
}

/// Handler for GET /calendar/ - The calendar page loads its events from the JSON feed.
#[tracing::instrument]
pub async fn calendar_page_handler(page: PageContext) -> Result<Response, TaskError> {
    render(&CalendarTemplate { page })
}

/// Creates a router with every task page and the calendar feed.
/// Handlers expect a `CurrentUser` extension, so the router must sit behind the login middleware.
pub fn create_task_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/", get(task_list_handler))
        .route("/create/", get(create_page_handler).post(create_handler))
        .route(
            "/update/{id}/",
            get(update_page_handler).post(update_handler),
        )
        .route(
            "/delete/{id}/",
            get(delete_page_handler).post(delete_handler),
        )
        .route("/toggle/{id}/", post(toggle_handler))
        .route("/calendar/", get(calendar_page_handler))
        .route("/api/calendar/", get(calendar::calendar_feed_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn maps_missing_task_to_not_found() {
        let response = TaskError::Service(TaskServiceError::NotFound(9)).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("does not exist"));
    }

    #[tokio::test]
    async fn maps_foreign_task_to_forbidden() {
        let response = TaskError::Service(TaskServiceError::Forbidden(9)).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn maps_other_failures_to_internal_server_error() {
        let database_error = sea_orm::DbErr::Custom("connection lost".to_string());
        let response =
            TaskError::Service(TaskServiceError::Database(database_error)).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_text(response).await.contains("connection lost"));
    }

    #[test]
    fn can_render_task_form_with_errors() {
        let mut errors = FormErrors::new();
        errors.add("title", "This field is required.");
        let template = TaskFormTemplate {
            page: PageContext::new(
                Some(&CurrentUser::new(1, "alice".to_string())),
                crate::web::Locale::Ja,
            ),
            heading: "Create task",
            action: "/create/".to_string(),
            form: TaskForm {
                due_date: "2026-10-30".to_string(),
                ..TaskForm::default()
            },
            errors,
        };

        let html = template.render().unwrap();

        assert!(html.contains("<html lang=\"ja\">"));
        assert!(html.contains("This field is required."));
        assert!(html.contains("value=\"2026-10-30\""));
        assert!(html.contains("action=\"/create/\""));
    }
}
