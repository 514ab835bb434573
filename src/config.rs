use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

// === Limits ===
pub const MAX_CAPTION_LENGTH: usize = 80;
pub const MAX_TAGS_LENGTH: usize = 80;
pub const MAX_NAME_LENGTH: usize = 30;
pub const MAX_BIO_LENGTH: usize = 250;
pub const MAX_WEBSITE_LENGTH: usize = 250;
pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const FEED_PAGE_SIZE: usize = 1;
pub const VERIFICATION_CODE_TTL_SECS: i64 = 300;

pub const SESSION_COOKIE: &str = "sessionid";
pub const FRAGMENT_HEADER: &str = "hx-request";
pub const DEFAULT_AVATAR: &str = "/static/images/avatar.svg";

// === Store keys ===
pub const USERS_LIST_KEY: &str = "users_list";
pub const FEED_KEY: &str = "feed";
pub const TOKENS_LIST_KEY: &str = "tokens_list";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn post_likes_key(post_id: &str) -> String {
    format!("post_likes:{}", post_id)
}

pub fn user_likes_key(user_id: &str) -> String {
    format!("user_likes:{}", user_id)
}

pub fn verification_code_key(email: &str) -> String {
    format!("verification_code:{}", email)
}

pub fn media_key(key: &str) -> String {
    format!("media:{}", key)
}

pub fn media_type_key(key: &str) -> String {
    format!("media_type:{}", key)
}

// === Runtime configuration ===
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: String,
    pub session_hours: i64,
    pub mail_from: String,
    pub smtp: Option<SmtpConfig>,
    pub admin: Option<AdminBootstrap>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:80".to_string(),
            session_hours: 24 * 14,
            mail_from: "no-reply@snapbord.local".to_string(),
            smtp: None,
            admin: None,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let smtp = match var("SNAPBORD_SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: try_load("SNAPBORD_SMTP_PORT", "587")?,
                username: var("SNAPBORD_SMTP_USERNAME"),
                password: var("SNAPBORD_SMTP_PASSWORD"),
            }),
            None => {
                info!("SNAPBORD_SMTP_HOST not set, mail goes to the log");
                None
            }
        };

        let admin = match (var("SNAPBORD_ADMIN_USERNAME"), var("SNAPBORD_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminBootstrap {
                email: var("SNAPBORD_ADMIN_EMAIL")
                    .unwrap_or_else(|| format!("{}@snapbord.local", username)),
                username,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            bind: var("SNAPBORD_BIND").unwrap_or(defaults.bind),
            session_hours: try_load("SNAPBORD_SESSION_HOURS", &defaults.session_hours.to_string())?,
            mail_from: var("SNAPBORD_MAIL_FROM").unwrap_or(defaults.mail_from),
            smtp,
            admin,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow::anyhow!("Invalid {}: {}", key, e)
    })
}
