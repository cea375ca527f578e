use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

use crate::task::calendar::{self, CalendarEvent, ExtendedProps};

/// OpenAPI description of the JSON endpoints.
#[derive(OpenApi)]
#[openapi(
    paths(calendar::calendar_feed_handler),
    components(schemas(CalendarEvent, ExtendedProps)),
    tags((name = "Calendar", description = "Task events for the calendar view"))
)]
pub struct ApiDoc;

#[tracing::instrument]
pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates the router serving the OpenAPI document.
pub fn create_api_router() -> Router {
    Router::new().route("/api/openapi.json", get(openapi_handler))
}
