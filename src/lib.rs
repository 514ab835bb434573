//! Snapbord: a photo sharing board.
//!
//! Every route is a plain function from a [`Request`] to a [`Response`]
//! (spin-sdk types). [`handle_request`] dispatches them; the Spin component
//! below and the native actix server in [`native`] are the two hosts.

use spin_sdk::http::{Request, Response};
use tracing::{debug, error};

pub mod admin;
pub mod auth;
pub mod config;
pub mod core;
pub mod likes;
pub mod mail;
pub mod media;
pub mod models;
pub mod posts;
pub mod state;
pub mod users;
pub mod verification;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;

use crate::core::errors::AppError;
use crate::core::helpers::redirect;
use crate::state::AppState;

pub fn handle_request(state: &AppState, req: Request) -> anyhow::Result<Response> {
    let path = req.path().to_string();
    let method = req.method().to_string();
    debug!(%method, %path, "request");

    match route(state, &req, &method, &path) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            error!(%method, %path, error = %e, "handler failed");
            Ok(AppError::from(e).into())
        }
    }
}

fn route(state: &AppState, req: &Request, method: &str, path: &str) -> anyhow::Result<Response> {
    match (method, path) {
        ("GET", "/") => posts::home(state, req),
        ("GET", "/login/") => auth::index_view(state, req),
        ("GET", "/accounts/login/") => auth::index_view(state, req),
        ("POST", "/accounts/login/") => auth::login_user(state, req),
        (_, "/accounts/logout/") => auth::logout_user(state, req),
        ("GET", "/accounts/signup/") => auth::signup_page(state, req),
        ("POST", "/accounts/signup/") => auth::signup(state, req),
        ("POST", "/accounts/password/change/") => auth::change_password(state, req),
        ("GET", "/explore/") => posts::explore(state, req),
        (_, "/upload/") => posts::upload(state, req),
        ("GET", "/post/") => posts::post_page(state, req, None),
        ("GET", "/profile/") => users::profile_redirect(state, req),
        (_, "/profile/edit/") => users::profile_edit(state, req),
        ("GET", "/profile/verification_code/") => verification::verification_code(state, req),
        (_, "/profile/settings/") => users::settings_view(state, req),
        (_, "/profile/delete/") => users::delete_account(state, req),
        ("GET", "/admin/") => admin::dashboard(state, req),
        ("GET", p) if p.starts_with("/static/") => core::static_server::serve_static(p),
        ("GET", p) if p.starts_with("/media/") => media::serve_media(&state.store, p),
        (m, p) if p.starts_with("/post/") => route_post(state, req, m, p),
        ("GET", p) if p.starts_with("/@") => {
            let username = p.trim_start_matches("/@").trim_end_matches('/');
            if username.is_empty() || username.contains('/') {
                return Ok(not_found());
            }
            let username = urlencoding::decode(username)
                .map(|u| u.into_owned())
                .unwrap_or_else(|_| username.to_string());
            users::profile_view(state, req, &username)
        }
        ("GET", "/profile") | ("GET", "/explore") | ("GET", "/upload") | ("GET", "/login") => {
            Ok(redirect(&format!("{}/", path)))
        }
        _ => Ok(not_found()),
    }
}

/// `/post/{uuid}/`, `/post/{uuid}/edit/` and `/post/{uuid}/like/`.
fn route_post(state: &AppState, req: &Request, method: &str, path: &str) -> anyhow::Result<Response> {
    let rest = path.trim_start_matches("/post/").trim_end_matches('/');
    let segments: Vec<&str> = rest.split('/').collect();

    match (method, segments.as_slice()) {
        ("GET", [id]) => posts::post_page(state, req, Some(*id)),
        (_, [id, "edit"]) => posts::post_edit(state, req, id),
        (_, [id, "like"]) => likes::handle_like(state, req, id),
        _ => Ok(not_found()),
    }
}

fn not_found() -> Response {
    AppError::NotFound("Page not found".to_string()).into()
}

// === Spin component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
fn handle(req: Request) -> anyhow::Result<impl spin_sdk::http::IntoResponse> {
    let store = crate::core::store::Store::open_default()?;
    let config = config::Config::load()?;
    if let Some(admin) = &config.admin {
        core::db::bootstrap_admin(&store, admin)?;
    }

    let (outbox, mut rx) = mail::Outbox::channel();
    let state = AppState::new(store, config, outbox);
    let response = handle_request(&state, req)?;

    // No background threads under Spin: deliver queued mail before returning.
    mail::flush(&mut rx, &mail::ConsoleMailer);
    Ok(response)
}
