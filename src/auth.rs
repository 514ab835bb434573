use std::collections::HashMap;

use spin_sdk::http::{Request, Response};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::*;
use crate::core::db;
use crate::core::errors::FormErrors;
use crate::core::helpers::*;
use crate::core::query_params::{get_present, parse_form, parse_query_params};
use crate::core::render::{page, render};
use crate::core::store::Store;
use crate::models::models::{TokenData, User};
use crate::state::AppState;
use crate::verification::check_code;

// === Sessions ===

pub fn issue_session(store: &Store, user_id: &str) -> anyhow::Result<String> {
    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        user_id: user_id.to_string(),
        created_at: now(),
    };
    store.set_json(&token_key(&token), &data)?;
    db::push_back(store, TOKENS_LIST_KEY, &token)?;
    Ok(token)
}

pub fn revoke_session(store: &Store, token: &str) -> anyhow::Result<()> {
    store.delete(&token_key(token))?;
    db::remove_from_list(store, TOKENS_LIST_KEY, token)
}

fn is_expired(data: &TokenData, session_hours: i64) -> bool {
    (now() - data.created_at).num_hours() >= session_hours
}

/// Drops every token of `user_id`, and any expired token met on the way.
pub fn revoke_user_sessions(store: &Store, user_id: &str, session_hours: i64) -> anyhow::Result<()> {
    let all_tokens = store.get_list(TOKENS_LIST_KEY)?;
    let mut remaining = Vec::with_capacity(all_tokens.len());

    for token in all_tokens {
        let key = token_key(&token);
        match store.get_json::<TokenData>(&key)? {
            Some(data) if data.user_id == user_id || is_expired(&data, session_hours) => store.delete(&key)?,
            Some(_) => remaining.push(token),
            None => {}
        }
    }

    store.set_json(TOKENS_LIST_KEY, &remaining)
}

/// Session token from the cookie, or from a bearer header for API clients.
pub fn request_token(req: &Request) -> Option<&str> {
    if let Some(token) = cookie(req, SESSION_COOKIE).filter(|t| !t.is_empty()) {
        return Some(token);
    }
    header_str(req, "authorization")?.strip_prefix("Bearer ")
}

pub fn validate_token(state: &AppState, req: &Request) -> Option<String> {
    let token = request_token(req)?;
    let data = state.store.get_json::<TokenData>(&token_key(token)).ok()??;

    if is_expired(&data, state.config.session_hours) {
        if let Err(e) = revoke_session(&state.store, token) {
            warn!(error = %e, "could not drop expired session");
        }
        return None;
    }

    // Check if user still exists
    if !state.store.exists(&user_key(&data.user_id)).ok()? {
        return None;
    }
    Some(data.user_id)
}

pub fn current_user(state: &AppState, req: &Request) -> anyhow::Result<Option<User>> {
    match validate_token(state, req) {
        Some(user_id) => db::get_user(&state.store, &user_id),
        None => Ok(None),
    }
}

pub fn login_redirect(req: &Request) -> Response {
    let path = req.path();
    let next = match req.query() {
        "" => path.to_string(),
        query => format!("{}?{}", path, query),
    };
    if next == "/" || next.is_empty() {
        redirect("/login/")
    } else {
        redirect(&format!("/login/?next={}", urlencoding::encode(&next)))
    }
}

/// Only same-site paths are followed after login.
fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n.to_string(),
        _ => "/".to_string(),
    }
}

// === Forms ===

fn login_form(values: &HashMap<String, String>, error: Option<&str>, next: &str) -> anyhow::Result<String> {
    render(
        "partials/login_form.html",
        &[
            ("login", values.get("login").cloned().unwrap_or_default()),
            ("next", next.to_string()),
            ("error", error.unwrap_or_default().to_string()),
        ],
    )
}

fn signup_form(values: &HashMap<String, String>, errors: &FormErrors) -> anyhow::Result<String> {
    let value = |k: &str| values.get(k).cloned().unwrap_or_default();
    render(
        "partials/signup_form.html",
        &[
            ("email", value("email")),
            ("username", value("username")),
            ("birthday", value("birthday")),
            ("code", value("code")),
            ("email_errors", errors.html("email")),
            ("username_errors", errors.html("username")),
            ("password1_errors", errors.html("password1")),
            ("password2_errors", errors.html("password2")),
            ("birthday_errors", errors.html("birthday")),
            ("code_errors", errors.html("code")),
        ],
    )
}

fn landing(req: &Request, login: String, signup: String) -> anyhow::Result<Response> {
    let content = render("index.html", &[("login_form", login), ("signup_form", signup)])?;
    page(req, None, "Welcome", content)
}

// === Handlers ===

pub fn index_view(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    if validate_token(state, req).is_some() {
        return Ok(redirect("/"));
    }
    let params = parse_query_params(req.uri());
    let next = safe_next(get_present(&params, "next"));
    landing(
        req,
        login_form(&HashMap::new(), None, &next)?,
        signup_form(&HashMap::new(), &FormErrors::new())?,
    )
}

pub fn signup_page(_state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let content = signup_form(&HashMap::new(), &FormErrors::new())?;
    page(req, None, "Sign up", content)
}

pub fn login_user(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let form = parse_form(req.body());
    let login = form.get("login").map(|s| s.trim()).unwrap_or_default();
    let password = form.get("password").map(String::as_str).unwrap_or_default();
    let next = safe_next(get_present(&form, "next"));

    // Usernames may contain '@', so an email miss falls back to the username.
    let mut user = None;
    if login.contains('@') {
        user = db::find_user_by_email(&state.store, login)?;
    }
    if user.is_none() {
        user = db::find_user_by_username(&state.store, login)?;
    }

    match user {
        Some(u) if verify_password(password, &u.password) => {
            let token = issue_session(&state.store, &u.id)?;
            info!(username = %u.username, "login");
            Ok(redirect_with_cookie(&next, &session_cookie(&token, state.config.session_hours)))
        }
        _ => {
            warn!(%login, "failed login");
            landing(
                req,
                login_form(&form, Some("The username and/or password you specified are not correct."), &next)?,
                signup_form(&HashMap::new(), &FormErrors::new())?,
            )
        }
    }
}

pub fn logout_user(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    if let Some(token) = request_token(req) {
        revoke_session(&state.store, token)?;
    }
    Ok(redirect_with_cookie("/login/", &clear_session_cookie()))
}

pub fn validate_signup(store: &Store, form: &HashMap<String, String>) -> anyhow::Result<FormErrors> {
    let mut errors = FormErrors::new();
    let field = |k: &str| form.get(k).map(|s| s.trim()).unwrap_or_default();

    let email = field("email");
    if email.is_empty() {
        errors.add("email", "This field is required.");
    } else if !is_valid_email(email) {
        errors.add("email", "Enter a valid email address.");
    } else if db::find_user_by_email(store, email)?.is_some() {
        errors.add("email", "A user is already registered with this email address.");
    }

    let username = field("username");
    if username.is_empty() {
        errors.add("username", "This field is required.");
    } else if username.len() > MAX_USERNAME_LENGTH || !is_valid_username(username) {
        errors.add("username", "Enter a valid username. Letters, digits and @/./+/-/_ only.");
    } else if db::find_user_by_username(store, username)?.is_some() {
        errors.add("username", "A user with that username already exists.");
    }

    let password1 = form.get("password1").map(String::as_str).unwrap_or_default();
    let password2 = form.get("password2").map(String::as_str).unwrap_or_default();
    if password1.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password1",
            format!("Password must be a minimum of {} characters.", MIN_PASSWORD_LENGTH),
        );
    }
    if form.contains_key("password2") && password1 != password2 {
        errors.add("password2", "You must type the same password each time.");
    }

    if parse_date(field("birthday")).is_none() {
        errors.add("birthday", "Enter a valid date.");
    }

    let code = field("code");
    if code.is_empty() || !check_code(store, email, code)? {
        errors.add("code", "Invalid or expired verification code.");
    }

    Ok(errors)
}

pub fn signup(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let form = parse_form(req.body());
    let errors = validate_signup(&state.store, &form)?;

    if !errors.is_empty() {
        warn!(fields = ?errors, "signup rejected");
        let login = login_form(&HashMap::new(), None, "/")?;
        return landing(req, login, signup_form(&form, &errors)?);
    }

    let field = |k: &str| form.get(k).map(|s| s.trim()).unwrap_or_default();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: field("username").to_lowercase(),
        email: field("email").to_lowercase(),
        email_verified: true,
        password: hash_password(form.get("password1").map(String::as_str).unwrap_or_default())?,
        name: None,
        image: None,
        bio: None,
        website: None,
        birthday: parse_date(field("birthday")),
        notifications: true,
        darkmode: false,
        is_staff: false,
        date_joined: now(),
    };
    db::insert_user(&state.store, &user)?;
    info!(username = %user.username, "signup");

    let token = issue_session(&state.store, &user.id)?;
    Ok(redirect_with_cookie("/", &session_cookie(&token, state.config.session_hours)))
}

pub fn change_password(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let mut user = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };

    let form = parse_form(req.body());
    let old_password = form.get("oldpassword").map(String::as_str).unwrap_or_default();
    let password1 = form.get("password1").map(String::as_str).unwrap_or_default();
    let password2 = form.get("password2").map(String::as_str).unwrap_or_default();

    let mut errors = FormErrors::new();
    if !verify_password(old_password, &user.password) {
        errors.add("oldpassword", "Please type your current password.");
    }
    if password1.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password1",
            format!("Password must be a minimum of {} characters.", MIN_PASSWORD_LENGTH),
        );
    }
    if password1 != password2 {
        errors.add("password2", "You must type the same password each time.");
    }

    if !errors.is_empty() {
        let content = render(
            "partials/password_change.html",
            &[
                ("oldpassword_errors", errors.html("oldpassword")),
                ("password1_errors", errors.html("password1")),
                ("password2_errors", errors.html("password2")),
            ],
        )?;
        return page(req, Some(&user), "Change password", content);
    }

    user.password = hash_password(password1)?;
    db::save_user(&state.store, &user)?;

    revoke_user_sessions(&state.store, &user.id, state.config.session_hours)?;
    let token = issue_session(&state.store, &user.id)?;
    info!(username = %user.username, "password changed");

    Ok(redirect_with_cookie(
        "/profile/settings/",
        &session_cookie(&token, state.config.session_hours),
    ))
}
