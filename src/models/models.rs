use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_AVATAR;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub password: String,
    pub name: Option<String>,
    /// Media key of the uploaded avatar.
    pub image: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub birthday: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub notifications: bool,
    #[serde(default)]
    pub darkmode: bool,
    #[serde(default)]
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn avatar(&self) -> String {
        match &self.image {
            Some(key) => format!("/media/{}", key),
            None => DEFAULT_AVATAR.to_string(),
        }
    }

    pub fn website_link(&self) -> Option<String> {
        self.website.as_ref().map(|w| {
            if w.starts_with("http://") || w.starts_with("https://") {
                w.clone()
            } else {
                format!("http://{}", w)
            }
        })
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Post {
    pub id: String,
    /// `None` once the author account is deleted.
    pub author_id: Option<String>,
    pub image: String,
    pub body: Option<String>,
    pub tags: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn image_url(&self) -> String {
        format!("/media/{}", self.image)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LikedPost {
    pub post_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExpiringValue {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}
