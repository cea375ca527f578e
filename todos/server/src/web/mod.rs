use askama::Template;
use axum::Router;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::middleware::{Next, from_fn, from_fn_with_state};
use axum::response::{Html, IntoResponse, Response};
use migration::MigratorTrait;
use sea_orm::Database;
use std::convert::Infallible;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthState, CurrentUser, FilteredMakeSpan, auth_user_middleware, create_login_router,
    login_redirect_middleware,
};
use crate::config::Config;
use crate::task::{TaskState, create_task_router};
use crate::user::create_register_router;

pub mod api;
pub mod locale;

pub use locale::Locale;

/// Values every full page needs for the shared layout.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub username: Option<String>,
    pub lang: &'static str,
    /// Language prefix of the requested URL, kept on every link and redirect.
    pub prefix: &'static str,
    /// Path and query of the request without the language prefix.
    pub current_path: String,
}

impl PageContext {
    pub fn new(current_user: Option<&CurrentUser>, locale: Locale) -> Self {
        Self {
            username: current_user.map(|user| user.username.clone()),
            lang: locale.code(),
            prefix: "",
            current_path: "/".to_string(),
        }
    }

    /// `path` under the language prefix of the current request.
    pub fn link(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let locale = Locale::from_request_parts(parts, state).await?;
        let current_path = parts
            .uri
            .path_and_query()
            .map(|path_and_query| path_and_query.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self {
            username: parts
                .extensions
                .get::<CurrentUser>()
                .map(|user| user.username.clone()),
            lang: locale.code(),
            prefix: locale::url_prefix(&parts.extensions),
            current_path,
        })
    }
}

/// Custom error type for web handler operations.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
}

impl axum::response::IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("{}", self);
        internal_server_error()
    }
}

/// Generic 500 page that leaks nothing about the failure.
pub fn internal_server_error() -> Response {
    let user_facing_error_message =
        "An unexpected error occurred while processing your request. Please try again later.";
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!(
            "<h1>Internal Server Error</h1><p>{}</p>",
            user_facing_error_message
        )),
    )
        .into_response()
}

/// `302 Found` redirect to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Returns `target` if it is a path on this site, `fallback` otherwise.
/// Protocol-relative (`//host`) and backslash tricks are treated as off-site.
pub fn safe_redirect_target<'a>(target: Option<&'a str>, fallback: &'a str) -> &'a str {
    match target {
        Some(target)
            if target.starts_with('/')
                && !target.starts_with("//")
                && !target.contains('\\') =>
        {
            target
        }
        _ => fallback,
    }
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate<'a> {
    page: PageContext,
    status: u16,
    message: &'a str,
}

/// Marks a response to be replaced by the shared error page.
#[derive(Debug, Clone, Copy)]
struct ErrorPage {
    status: StatusCode,
    message: &'static str,
}

/// Plain-text error response that `error_page_middleware` renders as a full page.
pub fn error_response(status: StatusCode, message: &'static str) -> Response {
    let mut response = (status, message).into_response();
    response
        .extensions_mut()
        .insert(ErrorPage { status, message });
    response
}

/// Renders marked error responses with the layout of the current caller.
pub async fn error_page_middleware(page: PageContext, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    match response.extensions().get::<ErrorPage>().copied() {
        Some(error) => error_page(error.status, error.message, page),
        None => response,
    }
}

/// Renders the shared error page with the given status, falling back to the plain 500 page.
pub fn error_page(status: StatusCode, message: &str, page: PageContext) -> Response {
    match render_error_page(status, message, page) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn render_error_page(
    status: StatusCode,
    message: &str,
    page: PageContext,
) -> Result<String, WebError> {
    let template = ErrorTemplate {
        page,
        status: status.as_u16(),
        message,
    };
    Ok(template.render()?)
}

/// Assembles the full application router on top of an already migrated database.
pub fn create_app(config: &Config, db: sea_orm::DatabaseConnection) -> Router {
    let db = Arc::new(db);
    let auth_state = Arc::new(AuthState::from_config(config, db.clone()));
    let task_state = Arc::new(TaskState { db: db.clone() });

    let protected_routes = Router::new()
        .merge(create_task_router(task_state))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware))
                .layer(from_fn(login_redirect_middleware))
                .layer(from_fn(error_page_middleware)),
        );

    let public_routes = Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(create_login_router(auth_state.clone()))
        .merge(create_register_router(auth_state.clone()))
        .merge(locale::create_locale_router())
        .merge(api::create_api_router())
        .layer(from_fn_with_state(auth_state, auth_user_middleware));

    let routes = Router::new().merge(protected_routes).merge(public_routes).layer(
        ServiceBuilder::new()
            .layer(SetSensitiveRequestHeadersLayer::new([
                header::COOKIE,
                header::AUTHORIZATION,
            ]))
            .layer(TraceLayer::new_for_http().make_span_with(FilteredMakeSpan)),
    );

    // Language prefixes are stripped before the inner router matches the path.
    Router::new()
        .fallback_service(routes)
        .layer(from_fn(locale::locale_prefix_middleware))
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let app = create_app(&config, db);
    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}
