use std::collections::HashMap;

use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::auth::{current_user, login_redirect, request_token, revoke_session};
use crate::config::*;
use crate::core::db;
use crate::core::errors::{AppError, FormErrors};
use crate::core::helpers::*;
use crate::core::multipart::parse_request_form;
use crate::core::query_params::{get_bool_flag, get_present, is_set, parse_form, parse_query_params};
use crate::core::render::{flag, fragment, is_fragment_request, page, render};
use crate::core::store::Store;
use crate::likes::{like_count, liked_posts, total_likes_for_author};
use crate::media;
use crate::models::models::{Post, User};
use crate::posts::post_tiles;
use crate::state::AppState;
use crate::verification::check_code;

// === Profile ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Newest,
    Oldest,
    Popular,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("oldest") => SortOrder::Oldest,
            Some("popular") => SortOrder::Popular,
            _ => SortOrder::Newest,
        }
    }
}

/// `posts` must arrive newest first.
pub fn sort_posts(store: &Store, mut posts: Vec<Post>, order: SortOrder) -> anyhow::Result<Vec<Post>> {
    match order {
        SortOrder::Newest => {}
        SortOrder::Oldest => posts.reverse(),
        SortOrder::Popular => {
            let mut counted = Vec::with_capacity(posts.len());
            for post in posts {
                counted.push((like_count(store, &post.id)?, post));
            }
            // stable, so equal counts keep newest-first order
            counted.sort_by(|a, b| b.0.cmp(&a.0));
            posts = counted.into_iter().map(|(_, p)| p).collect();
        }
    }
    Ok(posts)
}

pub fn profile_redirect(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    match current_user(state, req)? {
        Some(u) => Ok(redirect(&format!("/@{}/", u.username))),
        None => Ok(login_redirect(req)),
    }
}

pub fn profile_view(state: &AppState, req: &Request, username: &str) -> anyhow::Result<Response> {
    let viewer = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };

    let params = parse_query_params(req.uri());
    if is_set(&params, "link") {
        let urlpath = format!("/@{}/", urlencoding::encode(username));
        return Ok(fragment(render("partials/profile_link.html", &[("urlpath", urlpath)])?));
    }

    let profile_user = match db::find_user_by_username(&state.store, username)? {
        Some(u) => u,
        None => return Ok(AppError::NotFound("User not found".to_string()).into()),
    };

    let order = SortOrder::parse(params.get("sort").map(String::as_str));
    let own_posts = db::posts_by_author(&state.store, &profile_user.id)?;
    let post_count = own_posts.len();
    let profile_posts = sort_posts(&state.store, own_posts, order)?;
    let profile_posts_liked = liked_posts(&state.store, &profile_user.id)?;
    let profile_user_likes = total_likes_for_author(&state.store, &profile_user.id)?;

    if is_set(&params, "liked") {
        return Ok(fragment(post_tiles(&profile_posts_liked)?));
    }
    if get_present(&params, "sort").is_some() {
        return Ok(fragment(post_tiles(&profile_posts)?));
    }

    let is_owner = viewer.id == profile_user.id;
    let content = render(
        "profile.html",
        &[
            ("username", profile_user.username.clone()),
            ("name", profile_user.display_name().to_string()),
            ("avatar", profile_user.avatar()),
            ("bio", profile_user.bio.clone().unwrap_or_default()),
            ("website", profile_user.website.clone().unwrap_or_default()),
            ("website_link", profile_user.website_link().unwrap_or_default()),
            ("post_count", post_count.to_string()),
            ("likes_total", profile_user_likes.to_string()),
            ("liked_count", profile_posts_liked.len().to_string()),
            (
                "owner_tools",
                if is_owner { render("partials/profile_owner_tools.html", &[])? } else { String::new() },
            ),
            ("posts", post_tiles(&profile_posts)?),
        ],
    )?;
    page(req, Some(&viewer), &profile_user.username, content)
}

// === Profile edit ===

fn profile_form(user: &User, fields: Option<&HashMap<String, String>>, errors: &FormErrors) -> anyhow::Result<String> {
    let value = |k: &str, fallback: Option<&str>| {
        let raw = match fields {
            Some(f) => f.get(k).map(String::as_str).unwrap_or_default(),
            None => fallback.unwrap_or_default(),
        };
        raw.to_string()
    };
    render(
        "partials/profile_edit.html",
        &[
            ("avatar", user.avatar()),
            ("username", value("username", Some(&user.username))),
            ("name", value("name", user.name.as_deref())),
            ("bio", value("bio", user.bio.as_deref())),
            ("website", value("website", user.website.as_deref())),
            ("image_errors", errors.html("image")),
            ("username_errors", errors.html("username")),
            ("name_errors", errors.html("name")),
            ("bio_errors", errors.html("bio")),
            ("website_errors", errors.html("website")),
        ],
    )
}

fn optional(fields: &HashMap<String, String>, key: &str) -> Option<String> {
    fields.get(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn profile_edit(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let mut user = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };
    let profile_url = format!("/@{}/", user.username);

    if req.method().to_string() != "POST" {
        if is_fragment_request(req) {
            return Ok(fragment(profile_form(&user, None, &FormErrors::new())?));
        }
        return Ok(redirect(&profile_url));
    }

    let form = parse_request_form(req)?;
    let mut errors = FormErrors::new();

    let username = form.fields.get("username").map(|s| s.trim()).unwrap_or_default();
    if username.is_empty() {
        errors.add("username", "This field is required.");
    } else if username.len() > MAX_USERNAME_LENGTH || !is_valid_username(username) {
        errors.add("username", "Enter a valid username. Letters, digits and @/./+/-/_ only.");
    } else if matches!(db::find_user_by_username(&state.store, username)?, Some(other) if other.id != user.id) {
        errors.add("username", "A user with that username already exists.");
    }

    let name = optional(&form.fields, "name");
    if name.as_ref().is_some_and(|n| n.chars().count() > MAX_NAME_LENGTH) {
        errors.add("name", format!("Ensure this value has at most {} characters.", MAX_NAME_LENGTH));
    }
    let bio = optional(&form.fields, "bio");
    if bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO_LENGTH) {
        errors.add("bio", format!("Ensure this value has at most {} characters.", MAX_BIO_LENGTH));
    }
    let website = optional(&form.fields, "website");
    if website.as_ref().is_some_and(|w| w.chars().count() > MAX_WEBSITE_LENGTH) {
        errors.add("website", format!("Ensure this value has at most {} characters.", MAX_WEBSITE_LENGTH));
    }

    let image = form.files.get("image");
    let image_type = match image.map(media::validate_image) {
        Some(Ok(ct)) => Some(ct),
        Some(Err(msg)) => {
            errors.add("image", msg);
            None
        }
        None => None,
    };

    if !errors.is_empty() {
        warn!(user = %user.username, "profile edit rejected");
        if is_fragment_request(req) {
            return Ok(fragment(profile_form(&user, Some(&form.fields), &errors)?));
        }
        return Ok(redirect(&profile_url));
    }

    if let (Some(file), Some(ct)) = (image, image_type) {
        let key = media::save_media(&state.store, "avatars", file, ct)?;
        if let Some(old) = user.image.replace(key) {
            media::delete_media(&state.store, &old)?;
        }
    }
    user.username = username.to_string();
    user.name = name;
    user.bio = bio.map(|b| sanitize_text(&b)).filter(|b| !b.is_empty());
    user.website = website;
    db::save_user(&state.store, &user)?;

    info!(user = %user.username, "profile updated");
    Ok(redirect(&format!("/@{}/", user.username)))
}

// === Settings ===

fn settings_page(req: &Request, user: &User, errors: &FormErrors) -> anyhow::Result<Response> {
    let content = render(
        "settings.html",
        &[
            ("email", user.email.clone()),
            (
                "email_status",
                if user.email_verified { "Verified".to_string() } else { "Not verified".to_string() },
            ),
            (
                "birthday",
                user.birthday.map(|b| b.format("%Y-%m-%d").to_string()).unwrap_or_else(|| "Not set".to_string()),
            ),
            ("notifications", flag(user.notifications)),
            ("darkmode", flag(user.darkmode)),
            ("email_errors", errors.html("email")),
            ("code_errors", errors.html("code")),
            ("birthday_errors", errors.html("birthday")),
        ],
    )?;
    page(req, Some(user), "Settings", content)
}

fn email_form(user: &User, value: Option<&str>, errors: &FormErrors) -> anyhow::Result<String> {
    render(
        "partials/settings_email.html",
        &[
            ("email", value.unwrap_or(&user.email).to_string()),
            ("email_errors", errors.html("email")),
        ],
    )
}

pub fn settings_view(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let mut user = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };

    let query = parse_query_params(req.uri());
    let form = if req.method().to_string() == "POST" {
        parse_form(req.body())
    } else {
        HashMap::new()
    };
    let mut errors = FormErrors::new();

    if is_set(&query, "email") {
        return Ok(fragment(email_form(&user, None, &FormErrors::new())?));
    }

    if let Some(new_email) = get_present(&form, "email").map(str::trim) {
        if !is_valid_email(new_email) {
            errors.add("email", "Enter a valid email address.");
        } else if matches!(db::find_user_by_email(&state.store, new_email)?, Some(other) if other.id != user.id) {
            errors.add("email", "This email is already taken.");
        } else if new_email != user.email {
            user.email = new_email.to_string();
            user.email_verified = false;
            db::save_user(&state.store, &user)?;
            info!(user = %user.username, "email changed, awaiting verification");
            return Ok(redirect("/profile/settings/"));
        }
    }

    if is_set(&query, "verification") {
        return Ok(fragment(render("partials/settings_verification.html", &[("email", user.email.clone())])?));
    }

    if let Some(code) = get_present(&form, "code") {
        if check_code(&state.store, &user.email, code)? {
            user.email_verified = true;
            db::save_user(&state.store, &user)?;
            info!(user = %user.username, "email verified");
            return Ok(redirect("/profile/settings/"));
        }
        errors.add("code", "Invalid or expired verification code.");
    }

    if is_set(&query, "birthday") {
        let value = user.birthday.map(|b| b.format("%Y-%m-%d").to_string()).unwrap_or_default();
        return Ok(fragment(render("partials/settings_birthday.html", &[("birthday", value)])?));
    }

    if let Some(raw) = get_present(&form, "birthday") {
        match parse_date(raw) {
            Some(date) => {
                user.birthday = Some(date);
                db::save_user(&state.store, &user)?;
                return Ok(redirect("/profile/settings/"));
            }
            None => errors.add("birthday", "Enter a valid date."),
        }
    }

    if let Some(value) = get_present(&form, "notifications") {
        user.notifications = value == "on";
        db::save_user(&state.store, &user)?;
        return Ok(empty_ok());
    }

    if is_set(&query, "darkmode") {
        user.darkmode = get_bool_flag(&query, "darkmode");
        db::save_user(&state.store, &user)?;
        return Ok(empty_ok());
    }

    if errors.has("email") && is_fragment_request(req) {
        return Ok(fragment(email_form(&user, get_present(&form, "email"), &errors)?));
    }
    settings_page(req, &user, &errors)
}

// === Account deletion ===

pub fn delete_account(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let user = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };

    if req.method().to_string() == "POST" {
        if let Some(token) = request_token(req) {
            revoke_session(&state.store, token)?;
        }
        db::delete_user(&state.store, &user.id, state.config.session_hours)?;
        return Ok(redirect_with_cookie("/login/", &clear_session_cookie()));
    }

    let content = render("profile_delete.html", &[("username", user.username.clone())])?;
    page(req, Some(&user), "Delete account", content)
}
