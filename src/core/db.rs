use tracing::info;
use uuid::Uuid;

use crate::config::*;
use crate::core::helpers::{hash_password, now};
use crate::core::store::Store;
use crate::models::models::{Post, User};
use crate::{auth, likes, media};

// === Id lists ===

pub fn push_front(store: &Store, key: &str, id: &str) -> anyhow::Result<()> {
    let mut ids = store.get_list(key)?;
    ids.insert(0, id.to_string());
    store.set_json(key, &ids)
}

pub fn push_back(store: &Store, key: &str, id: &str) -> anyhow::Result<()> {
    let mut ids = store.get_list(key)?;
    ids.push(id.to_string());
    store.set_json(key, &ids)
}

pub fn remove_from_list(store: &Store, key: &str, id: &str) -> anyhow::Result<()> {
    let mut ids = store.get_list(key)?;
    ids.retain(|existing| existing != id);
    store.set_json(key, &ids)
}

// === Users ===

pub fn get_user(store: &Store, id: &str) -> anyhow::Result<Option<User>> {
    store.get_json(&user_key(id))
}

pub fn save_user(store: &Store, user: &User) -> anyhow::Result<()> {
    store.set_json(&user_key(&user.id), user)
}

pub fn insert_user(store: &Store, user: &User) -> anyhow::Result<()> {
    save_user(store, user)?;
    push_back(store, USERS_LIST_KEY, &user.id)
}

pub fn all_users(store: &Store) -> anyhow::Result<Vec<User>> {
    let mut users = Vec::new();
    for id in store.get_list(USERS_LIST_KEY)? {
        if let Some(u) = get_user(store, &id)? {
            users.push(u);
        }
    }
    Ok(users)
}

pub fn find_user_by_username(store: &Store, username: &str) -> anyhow::Result<Option<User>> {
    let wanted = username.to_lowercase();
    Ok(all_users(store)?
        .into_iter()
        .find(|u| u.username.to_lowercase() == wanted))
}

pub fn find_user_by_email(store: &Store, email: &str) -> anyhow::Result<Option<User>> {
    let wanted = email.to_lowercase();
    Ok(all_users(store)?
        .into_iter()
        .find(|u| u.email.to_lowercase() == wanted))
}

/// Removes the account. Posts survive without an author; likes and sessions go.
pub fn delete_user(store: &Store, user_id: &str, session_hours: i64) -> anyhow::Result<()> {
    for mut post in posts_by_author(store, user_id)? {
        post.author_id = None;
        save_post(store, &post)?;
    }

    likes::remove_all_likes_by_user(store, user_id)?;
    auth::revoke_user_sessions(store, user_id, session_hours)?;

    if let Some(user) = get_user(store, user_id)? {
        if let Some(image) = &user.image {
            media::delete_media(store, image)?;
        }
    }

    store.delete(&user_key(user_id))?;
    remove_from_list(store, USERS_LIST_KEY, user_id)?;

    info!(user_id, "account deleted");
    Ok(())
}

// === Posts ===

pub fn get_post(store: &Store, id: &str) -> anyhow::Result<Option<Post>> {
    store.get_json(&post_key(id))
}

pub fn save_post(store: &Store, post: &Post) -> anyhow::Result<()> {
    store.set_json(&post_key(&post.id), post)
}

pub fn insert_post(store: &Store, post: &Post) -> anyhow::Result<()> {
    save_post(store, post)?;
    // prepend newest
    push_front(store, FEED_KEY, &post.id)
}

/// Every post, newest first.
pub fn all_posts(store: &Store) -> anyhow::Result<Vec<Post>> {
    let mut posts = Vec::new();
    for id in store.get_list(FEED_KEY)? {
        if let Some(p) = get_post(store, &id)? {
            posts.push(p);
        }
    }
    Ok(posts)
}

/// Posts written by `user_id`, newest first.
pub fn posts_by_author(store: &Store, user_id: &str) -> anyhow::Result<Vec<Post>> {
    Ok(all_posts(store)?
        .into_iter()
        .filter(|p| p.author_id.as_deref() == Some(user_id))
        .collect())
}

pub fn delete_post(store: &Store, post: &Post) -> anyhow::Result<()> {
    likes::remove_all_likes_for_post(store, &post.id)?;
    media::delete_media(store, &post.image)?;
    store.delete(&post_key(&post.id))?;
    remove_from_list(store, FEED_KEY, &post.id)?;

    info!(post_id = %post.id, "post deleted");
    Ok(())
}

// === Bootstrap ===

/// Creates the configured staff account unless the username is already taken.
pub fn bootstrap_admin(store: &Store, admin: &AdminBootstrap) -> anyhow::Result<()> {
    if find_user_by_username(store, &admin.username)?.is_some() {
        return Ok(());
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: admin.username.to_lowercase(),
        email: admin.email.to_lowercase(),
        email_verified: true,
        password: hash_password(&admin.password)?,
        name: None,
        image: None,
        bio: None,
        website: None,
        birthday: None,
        notifications: true,
        darkmode: false,
        is_staff: true,
        date_joined: now(),
    };
    insert_user(store, &user)?;

    info!(username = %user.username, "staff account created");
    Ok(())
}
