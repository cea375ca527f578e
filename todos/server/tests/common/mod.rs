#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::{postgres, testcontainers};
use todos_server::auth::{AUTH_COOKIE, CurrentUser, encode_jwt};
use todos_server::config::Config;
use todos_server::user::{RegistrationInput, User, UserService};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test_secret";
pub const PASSWORD: &str = "testpass123!";

pub fn test_config() -> Config {
    Config {
        db_url: "sqlite::memory:".to_string(),
        port: 8080,
        jwt_secret: JWT_SECRET.to_string(),
        secure_cookies: false,
    }
}

/// Fresh in-memory database with every migration applied.
/// A single pooled connection keeps the whole test on the same in-memory database.
pub async fn setup_sqlite_db() -> anyhow::Result<DatabaseConnection> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn setup_container() -> anyhow::Result<testcontainers::ContainerAsync<postgres::Postgres>>
{
    let container = postgres::Postgres::default().start().await?;
    Ok(container)
}

pub async fn setup_postgres_db(
    container: &testcontainers::ContainerAsync<postgres::Postgres>,
) -> anyhow::Result<DatabaseConnection> {
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let db_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
    let db = Database::connect(&db_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn create_user(db: &DatabaseConnection, username: &str) -> User {
    UserService::new(db)
        .create_user(RegistrationInput {
            username: username.to_string(),
            email: format!("{}@test.com", username),
            password: PASSWORD.to_string(),
        })
        .await
        .expect("Failed to create user")
}

pub fn current_user(user: &User) -> CurrentUser {
    CurrentUser::new(user.id(), user.username().to_string())
}

/// `Cookie` header value carrying a valid session for `user`.
pub fn auth_cookie(user: &User) -> String {
    let token = encode_jwt(user.id(), user.username().to_string(), JWT_SECRET)
        .expect("Failed to encode JWT");
    format!("{}={}", AUTH_COOKIE, token)
}

/// The full application on top of a fresh database, plus a handle to that database.
pub async fn create_test_app() -> (Router, DatabaseConnection) {
    let db = setup_sqlite_db().await.expect("Failed to setup database");
    let app = todos_server::web::create_app(&test_config(), db.clone());
    (app, db)
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get("location")
            .and_then(|value| value.to_str().ok())
    }

    /// The `name=value` part of the first `Set-Cookie` header for `name`.
    pub fn set_cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all("set-cookie")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| value.starts_with(&format!("{}=", name)))
            .map(|value| value.split(';').next().unwrap_or_default().to_string())
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}
