//! Language selection through URL prefixes, a cookie, or the `Accept-Language` header.
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::uri::PathAndQuery;
use axum::http::{Extensions, Uri, header};
use axum::middleware::Next;
use axum::response::Response;
use axum::{Form, Router};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use std::convert::Infallible;

use crate::web::{found, safe_redirect_target};

pub const LANGUAGE_COOKIE: &str = "lang";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Ja,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Ja];

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ja => "ja",
        }
    }

    /// URL path prefix selecting this language.
    pub fn prefix(self) -> &'static str {
        match self {
            Locale::En => "/en",
            Locale::Ja => "/ja",
        }
    }

    /// Matches a language tag such as `ja` or `en-GB` on its primary subtag.
    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code.trim().split(['-', '_']).next()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|locale| locale.code() == primary)
    }

    /// Picks the supported language with the highest quality value
    /// from an `Accept-Language` header.
    pub fn from_accept_language(header: &str) -> Option<Self> {
        let mut best: Option<(Locale, f32)> = None;
        for entry in header.split(',') {
            let mut parts = entry.split(';');
            let Some(locale) = parts.next().and_then(Locale::from_code) else {
                continue;
            };
            let quality = parts
                .find_map(|param| param.trim().strip_prefix("q="))
                .and_then(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            if quality > 0.0 && best.is_none_or(|(_, best_quality)| quality > best_quality) {
                best = Some((locale, quality));
            }
        }
        best.map(|(locale, _)| locale)
    }
}

/// Locale chosen by a `/en/...` or `/ja/...` URL prefix.
#[derive(Debug, Clone, Copy)]
struct PrefixLocale(Locale);

/// Language prefix the current request arrived under, empty when there was none.
pub fn url_prefix(extensions: &Extensions) -> &'static str {
    extensions
        .get::<PrefixLocale>()
        .map(|PrefixLocale(locale)| locale.prefix())
        .unwrap_or("")
}

/// Strips a leading language prefix from the request path and remembers the selected locale.
pub async fn locale_prefix_middleware(mut request: Request, next: Next) -> Response {
    if let Some((locale, uri)) = strip_locale_prefix(request.uri()) {
        request.extensions_mut().insert(PrefixLocale(locale));
        *request.uri_mut() = uri;
    }
    next.run(request).await
}

fn strip_locale_prefix(uri: &Uri) -> Option<(Locale, Uri)> {
    let path = uri.path();
    let (locale, rest) = Locale::ALL.into_iter().find_map(|locale| {
        let rest = path.strip_prefix('/')?.strip_prefix(locale.code())?;
        (rest.is_empty() || rest.starts_with('/')).then_some((locale, rest))
    })?;

    let rest = if rest.is_empty() { "/" } else { rest };
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", rest, query),
        None => rest.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok().map(|uri| (locale, uri))
}

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(PrefixLocale(locale)) = parts.extensions.get::<PrefixLocale>() {
            return Ok(*locale);
        }

        let jar = CookieJar::from_headers(&parts.headers);
        let from_cookie = jar
            .get(LANGUAGE_COOKIE)
            .and_then(|cookie| Locale::from_code(cookie.value()));
        let from_header = || {
            parts
                .headers
                .get(header::ACCEPT_LANGUAGE)
                .and_then(|value| value.to_str().ok())
                .and_then(Locale::from_accept_language)
        };

        Ok(from_cookie.or_else(from_header).unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
pub struct SetLanguageForm {
    #[serde(default)]
    language: String,
    next: Option<String>,
}

/// Handler for POST /i18n/setlang/ that stores the chosen language in a cookie.
#[tracing::instrument(skip(jar))]
pub async fn set_language_handler(
    jar: CookieJar,
    Form(form): Form<SetLanguageForm>,
) -> (CookieJar, Response) {
    let redirect = found(safe_redirect_target(form.next.as_deref(), "/"));

    match Locale::from_code(&form.language) {
        Some(locale) => {
            let cookie = Cookie::build((LANGUAGE_COOKIE, locale.code()))
                .path("/")
                .same_site(SameSite::Lax)
                .max_age(time::Duration::days(365))
                .build();
            (jar.add(cookie), redirect)
        }
        None => {
            tracing::warn!("Ignoring unsupported language '{}'", form.language);
            (jar, redirect)
        }
    }
}

pub fn create_locale_router() -> Router {
    Router::new().route(
        "/i18n/setlang/",
        axum::routing::post(set_language_handler),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[test]
    fn can_parse_language_codes() {
        assert_eq!(Locale::from_code("ja"), Some(Locale::Ja));
        assert_eq!(Locale::from_code("en-GB"), Some(Locale::En));
        assert_eq!(Locale::from_code("JA_jp"), Some(Locale::Ja));
        assert_eq!(Locale::from_code("fr"), None);
    }

    #[test]
    fn can_pick_best_accept_language() {
        assert_eq!(
            Locale::from_accept_language("fr-CH, fr;q=0.9, ja;q=0.8, en;q=0.7"),
            Some(Locale::Ja)
        );
        assert_eq!(
            Locale::from_accept_language("ja;q=0.5, en-US"),
            Some(Locale::En)
        );
        assert_eq!(Locale::from_accept_language("ja;q=0"), None);
        assert_eq!(Locale::from_accept_language("de, fr"), None);
    }

    #[test]
    fn can_remember_url_prefix() {
        let mut extensions = Extensions::new();
        assert_eq!(url_prefix(&extensions), "");

        extensions.insert(PrefixLocale(Locale::Ja));
        assert_eq!(url_prefix(&extensions), "/ja");
    }

    #[test]
    fn can_strip_locale_prefix() {
        let uri: Uri = "/ja/update/3/?x=1".parse().unwrap();
        let (locale, stripped) = strip_locale_prefix(&uri).unwrap();
        assert_eq!(locale, Locale::Ja);
        assert_eq!(stripped, "/update/3/?x=1");

        let (locale, stripped) = strip_locale_prefix(&"/en".parse().unwrap()).unwrap();
        assert_eq!(locale, Locale::En);
        assert_eq!(stripped, "/");

        assert!(strip_locale_prefix(&"/english/".parse().unwrap()).is_none());
        assert!(strip_locale_prefix(&"/calendar/".parse().unwrap()).is_none());
    }

    async fn locale_echo(locale: Locale) -> &'static str {
        locale.code()
    }

    fn echo_app() -> Router {
        Router::new()
            .fallback_service(Router::new().route("/where/", axum::routing::get(locale_echo)))
            .layer(axum::middleware::from_fn(locale_prefix_middleware))
    }

    async fn body_text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn can_route_prefixed_path_with_locale() {
        let response = echo_app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ja/where/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ja");
    }

    #[tokio::test]
    async fn can_prefer_cookie_over_accept_language() {
        let response = echo_app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/where/")
                    .header("cookie", "lang=ja")
                    .header("accept-language", "en")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "ja");
    }

    #[tokio::test]
    async fn can_set_language_cookie() {
        let app = create_locale_router();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/i18n/setlang/")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("language=ja&next=%2Fcalendar%2F"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get("location").unwrap(), "/calendar/");
        let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
        assert!(cookie.starts_with("lang=ja"));
    }

    #[tokio::test]
    async fn ignores_unsupported_language() {
        let app = create_locale_router();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/i18n/setlang/")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("language=xx&next=https%3A%2F%2Fevil.example"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get("location").unwrap(), "/");
        assert!(response.headers().get("set-cookie").is_none());
    }
}
