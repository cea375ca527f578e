use askama::Template;
use axum::Router;
use axum::extract::{Extension, Form, MatchedPath, Query, Request, State};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::encode;
use std::sync::Arc;
use tower_http::trace::MakeSpan;
use tracing::Span;

use crate::config::Config;
use crate::form::{FormErrors, REQUIRED_MESSAGE};
use crate::user::{User, UserService, UserServiceError};
use crate::web::locale::url_prefix;
use crate::web::{PageContext, found, internal_server_error, safe_redirect_target};

pub const AUTH_COOKIE: &str = "auth_token";
pub const LOGIN_PATH: &str = "/login/";
pub const LOGOUT_PATH: &str = "/logout/";

const INVALID_LOGIN_MESSAGE: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

/// Represents the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
}

impl CurrentUser {
    /// Creates a new CurrentUser instance.
    pub fn new(id: i32, username: String) -> Self {
        Self { id, username }
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self::new(user.id(), user.username().to_string())
    }
}

/// Authentication state containing the JWT secret and the user store.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: String,
    pub secure_cookies: bool,
    pub db: Arc<sea_orm::DatabaseConnection>,
}

impl AuthState {
    /// Creates a new AuthState from the application config.
    pub fn from_config(config: &Config, db: Arc<sea_orm::DatabaseConnection>) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            secure_cookies: config.secure_cookies,
            db,
        }
    }

    /// Issues a session token for `user` and stores it in the auth cookie.
    pub fn start_session(
        &self,
        jar: CookieJar,
        user: &CurrentUser,
    ) -> Result<CookieJar, AuthError> {
        let jwt_token =
            encode_jwt(user.id, user.username.clone(), &self.jwt_secret).map_err(|err| {
                tracing::error!("Failed to encode JWT: {}", err);
                AuthError::JwtError
            })?;

        let cookie = Cookie::build((AUTH_COOKIE, jwt_token))
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::hours(24))
            .path("/")
            .build();

        Ok(jar.add(cookie))
    }
}

/// Creates a login router with authentication routes.
pub fn create_login_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route(
            LOGIN_PATH,
            axum::routing::get(login_page_handler).post(login_handler),
        )
        .route(
            LOGOUT_PATH,
            axum::routing::get(logout_handler).post(logout_handler),
        )
        .with_state(state)
}

/// Authentication middleware that checks for valid JWT tokens and sets CurrentUser extension.
/// This middleware only populates the CurrentUser extension and does not perform redirects.
/// Tokens of accounts that no longer exist are ignored.
/// A failed user lookup ends the request with a 500.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token_cookie) = jar.get(AUTH_COOKIE) {
        if let Ok(claims) = decode_jwt(token_cookie.value(), &state.jwt_secret) {
            match UserService::new(&state.db)
                .find_user_by_id(claims.user_id)
                .await
            {
                Ok(Some(user)) => {
                    request.extensions_mut().insert(CurrentUser::from(&user));
                }
                Ok(None) => tracing::info!("Session refers to deleted user {}", claims.user_id),
                Err(err) => {
                    tracing::error!("Failed to load session user: {}", err);
                    return internal_server_error();
                }
            }
        }
    }

    next.run(request).await
}

/// Login redirect middleware that redirects unauthenticated users to the login page.
/// This middleware should be applied after auth_user_middleware to check for CurrentUser extension.
/// A language prefix of the request is kept on both the login page and the return path.
pub async fn login_redirect_middleware(request: Request, next: Next) -> Response {
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        let prefix = url_prefix(request.extensions());
        let requested = request
            .uri()
            .path_and_query()
            .map(|path_and_query| path_and_query.as_str())
            .unwrap_or("/");
        let next = format!("{}{}", prefix, requested);
        return found(&format!("{}{}", prefix, login_url(&next)));
    }

    next.run(request).await
}

/// Login page URL that returns to `next` after a successful login.
pub fn login_url(next: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    format!("{}?{}", LOGIN_PATH, query)
}

/// Represents the login request payload.
#[derive(serde::Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

#[derive(serde::Deserialize, Debug, Default)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub exp: usize,       // Expiry time of the token
    pub iat: usize,       // Issued at time of the token
    pub user_id: i32,     // ID of the authenticated user
    pub username: String, // Username of the authenticated user
}

/// Custom error type for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents an error during JWT operations.
    #[error("JWT operation failed")]
    JwtError,
    #[error("User service error: {0}")]
    Service(#[from] UserServiceError),
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("{}", self);
        internal_server_error()
    }
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate<'a> {
    pub page: PageContext,
    pub username: &'a str,
    pub next: &'a str,
    pub errors: FormErrors,
}

/// Handles GET requests to display the login page.
/// Users that are already logged in are sent to the task list.
#[tracing::instrument(skip(current_user))]
pub async fn login_page_handler(
    current_user: Option<Extension<CurrentUser>>,
    page: PageContext,
    Query(query): Query<NextQuery>,
) -> Result<Response, AuthError> {
    if current_user.is_some() {
        let home = page.link("/");
        return Ok(found(safe_redirect_target(query.next.as_deref(), &home)));
    }

    let template = LoginTemplate {
        page,
        username: "",
        next: query.next.as_deref().unwrap_or(""),
        errors: FormErrors::new(),
    };
    Ok(Html(template.render()?).into_response())
}

/// Handles the login request.
/// Checks submitted username and password against the stored accounts.
/// If a user is already logged in, redirects without checking credentials.
#[tracing::instrument(skip(state, jar, current_user, payload))]
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    current_user: Option<Extension<CurrentUser>>,
    page: PageContext,
    Form(payload): Form<LoginRequest>,
) -> Result<(CookieJar, Response), AuthError> {
    let home = page.link("/");
    let redirect_to = safe_redirect_target(payload.next.as_deref(), &home).to_string();
    if current_user.is_some() {
        return Ok((jar, found(&redirect_to)));
    }

    let mut errors = FormErrors::new();
    if payload.username.trim().is_empty() {
        errors.add("username", REQUIRED_MESSAGE);
    }
    if payload.password.is_empty() {
        errors.add("password", REQUIRED_MESSAGE);
    }

    if errors.is_empty() {
        let user_service = UserService::new(&state.db);
        match user_service
            .authenticate(payload.username.trim(), &payload.password)
            .await?
        {
            Some(user) => {
                tracing::info!("User {} logged in", user.id());
                let jar = state.start_session(jar, &CurrentUser::from(&user))?;
                return Ok((jar, found(&redirect_to)));
            }
            None => errors.add_non_field(INVALID_LOGIN_MESSAGE),
        }
    }

    let template = LoginTemplate {
        page,
        username: payload.username.trim(),
        next: payload.next.as_deref().unwrap_or(""),
        errors,
    };
    Ok((jar, Html(template.render()?).into_response()))
}

/// Handles logout by dropping the auth cookie and returning to the login page.
#[tracing::instrument(skip(jar))]
pub async fn logout_handler(page: PageContext, jar: CookieJar) -> (CookieJar, Response) {
    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/"));
    (jar, found(&page.link(LOGIN_PATH)))
}

pub fn encode_jwt(user_id: i32, username: String, jwt_secret: &str) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::hours(24);
    let exp = (now + expire).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        exp,
        iat,
        user_id,
        username,
    };
    let jwt = encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(jwt)
}

pub fn decode_jwt(token: &str, jwt_secret: &str) -> anyhow::Result<Claims> {
    let token_data = jsonwebtoken::decode(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Custom span maker that filters sensitive data from credential-bearing requests.
/// This implementation avoids logging request bodies and cookies for security.
#[derive(Clone, Debug)]
pub struct FilteredMakeSpan;

/// Routes whose requests carry passwords.
const SENSITIVE_PATHS: [&str; 2] = [LOGIN_PATH, "/register/"];

impl<B> MakeSpan<B> for FilteredMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let method = request.method();
        let matched_path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str);

        if SENSITIVE_PATHS.contains(&request.uri().path()) {
            // Query strings may carry redirect targets or typed-in credentials.
            tracing::info_span!(
                "request",
                method = %method,
                path = %request.uri().path(),
                matched_path,
                sensitive_route = true,
            )
        } else {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %request.uri(),
                matched_path,
            )
        }
    }
}
