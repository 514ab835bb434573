use std::collections::HashSet;
use std::sync::OnceLock;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::OsRng;
use regex::Regex;
use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::config::SESSION_COOKIE;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
            .expect("Regex should compile")
    })
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("Regex should compile"))
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email_regex().is_match(email)
}

/// Letters, digits and `@ . + - _`.
pub fn is_valid_username(username: &str) -> bool {
    username_regex().is_match(username)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn sanitize_text(text: &str) -> String {
    // Plain text only, every tag stripped
    let cleaned = Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string();
    // Output is escaped again at render time
    html_escape::decode_html_entities(&cleaned).into_owned()
}

// === Responses ===

pub fn html(status: u16, body: impl Into<String>) -> Response {
    Response::builder()
        .status(status)
        .header("content-type", "text/html; charset=utf-8")
        .body(body.into().into_bytes())
        .build()
}

pub fn empty_ok() -> Response {
    Response::builder().status(200).body(Vec::<u8>::new()).build()
}

pub fn redirect(location: &str) -> Response {
    Response::builder()
        .status(302)
        .header("location", location)
        .body(Vec::<u8>::new())
        .build()
}

pub fn redirect_with_cookie(location: &str, cookie: &str) -> Response {
    Response::builder()
        .status(302)
        .header("location", location)
        .header("set-cookie", cookie)
        .body(Vec::<u8>::new())
        .build()
}

pub fn session_cookie(token: &str, max_age_hours: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        max_age_hours * 3600
    )
}

pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

// === Request inspection ===

pub fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.header(name).and_then(|h| h.as_str())
}

pub fn cookie<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    let raw = header_str(req, "cookie")?;
    raw.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

pub fn content_type(req: &Request) -> &str {
    header_str(req, "content-type").unwrap_or_default()
}
