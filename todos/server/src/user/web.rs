use askama::Template;
use axum::{
    Extension, Form, Router,
    extract::State,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use crate::auth::{AuthError, AuthState, CurrentUser};
use crate::form::FormErrors;
use crate::user::{RegistrationForm, UserService, UserServiceError};
use crate::web::{PageContext, found};

pub const REGISTER_PATH: &str = "/register/";

#[derive(Template)]
#[template(path = "auth/register.html")]
struct RegisterTemplate<'a> {
    page: PageContext,
    username: &'a str,
    email: &'a str,
    errors: FormErrors,
}

/// Creates a router for account registration.
pub fn create_register_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route(REGISTER_PATH, get(register_page_handler).post(register_handler))
        .with_state(state)
}

/// Handler for GET /register/
#[tracing::instrument(skip(current_user))]
pub async fn register_page_handler(
    current_user: Option<Extension<CurrentUser>>,
    page: PageContext,
) -> Result<Response, AuthError> {
    if current_user.is_some() {
        return Ok(found(&page.link("/")));
    }

    let template = RegisterTemplate {
        page,
        username: "",
        email: "",
        errors: FormErrors::new(),
    };
    Ok(Html(template.render()?).into_response())
}

/// Handler for POST /register/ - Creates the account and logs it in straight away.
#[tracing::instrument(skip(state, jar, current_user, form))]
pub async fn register_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    current_user: Option<Extension<CurrentUser>>,
    page: PageContext,
    Form(form): Form<RegistrationForm>,
) -> Result<(CookieJar, Response), AuthError> {
    if current_user.is_some() {
        return Ok((jar, found(&page.link("/"))));
    }

    let errors = match form.validate() {
        Ok(input) => match UserService::new(&state.db).create_user(input).await {
            Ok(user) => {
                let jar = state.start_session(jar, &CurrentUser::from(&user))?;
                return Ok((jar, found(&page.link("/"))));
            }
            Err(UserServiceError::DuplicateUsername(username)) => {
                tracing::info!("Username '{}' is already taken", username);
                let mut errors = FormErrors::new();
                errors.add("username", "A user with that username already exists.");
                errors
            }
            Err(err) => return Err(err.into()),
        },
        Err(errors) => errors,
    };

    let template = RegisterTemplate {
        page,
        username: form.username.trim(),
        email: form.email.trim(),
        errors,
    };
    Ok((jar, Html(template.render()?).into_response()))
}
