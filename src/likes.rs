use spin_sdk::http::{Request, Response};
use tracing::debug;

use crate::auth::{current_user, login_redirect};
use crate::config::*;
use crate::core::db;
use crate::core::errors::AppError;
use crate::core::helpers::{now, redirect, validate_uuid};
use crate::core::query_params::{is_set, parse_query_params};
use crate::core::render::{fragment, is_fragment_request, render};
use crate::core::store::Store;
use crate::models::models::{LikedPost, Post};
use crate::state::AppState;

/// Adds the like unless the pair already exists. Returns whether it was added.
pub fn like_post(store: &Store, user_id: &str, post_id: &str) -> anyhow::Result<bool> {
    let likes_key = post_likes_key(post_id);
    let mut likers = store.get_list(&likes_key)?;

    if likers.iter().any(|id| id == user_id) {
        return Ok(false);
    }
    likers.push(user_id.to_string());
    store.set_json(&likes_key, &likers)?;

    let liked_key = user_likes_key(user_id);
    let mut liked: Vec<LikedPost> = store.get_json(&liked_key)?.unwrap_or_default();
    liked.retain(|l| l.post_id != post_id);
    liked.insert(
        0,
        LikedPost {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            created_at: now(),
        },
    );
    store.set_json(&liked_key, &liked)?;

    Ok(true)
}

pub fn unlike_post(store: &Store, user_id: &str, post_id: &str) -> anyhow::Result<()> {
    db::remove_from_list(store, &post_likes_key(post_id), user_id)?;

    let liked_key = user_likes_key(user_id);
    let mut liked: Vec<LikedPost> = store.get_json(&liked_key)?.unwrap_or_default();
    liked.retain(|l| l.post_id != post_id);
    store.set_json(&liked_key, &liked)
}

pub fn has_liked(store: &Store, user_id: &str, post_id: &str) -> anyhow::Result<bool> {
    Ok(store
        .get_list(&post_likes_key(post_id))?
        .iter()
        .any(|id| id == user_id))
}

/// Flips the like. Returns true when the post is liked afterwards.
pub fn toggle_like(store: &Store, user_id: &str, post_id: &str) -> anyhow::Result<bool> {
    if has_liked(store, user_id, post_id)? {
        unlike_post(store, user_id, post_id)?;
        Ok(false)
    } else {
        like_post(store, user_id, post_id)?;
        Ok(true)
    }
}

pub fn like_count(store: &Store, post_id: &str) -> anyhow::Result<usize> {
    Ok(store.get_list(&post_likes_key(post_id))?.len())
}

/// Posts `user_id` has liked, most recent like first.
pub fn liked_posts(store: &Store, user_id: &str) -> anyhow::Result<Vec<Post>> {
    let liked: Vec<LikedPost> = store.get_json(&user_likes_key(user_id))?.unwrap_or_default();
    let mut posts = Vec::with_capacity(liked.len());
    for like in liked {
        if let Some(post) = db::get_post(store, &like.post_id)? {
            posts.push(post);
        }
    }
    Ok(posts)
}

/// Likes received across every post `user_id` authored.
pub fn total_likes_for_author(store: &Store, user_id: &str) -> anyhow::Result<usize> {
    let mut total = 0;
    for post in db::posts_by_author(store, user_id)? {
        total += like_count(store, &post.id)?;
    }
    Ok(total)
}

pub fn remove_all_likes_for_post(store: &Store, post_id: &str) -> anyhow::Result<()> {
    let likes_key = post_likes_key(post_id);
    for user_id in store.get_list(&likes_key)? {
        let liked_key = user_likes_key(&user_id);
        let mut liked: Vec<LikedPost> = store.get_json(&liked_key)?.unwrap_or_default();
        liked.retain(|l| l.post_id != post_id);
        store.set_json(&liked_key, &liked)?;
    }
    store.delete(&likes_key)
}

pub fn remove_all_likes_by_user(store: &Store, user_id: &str) -> anyhow::Result<()> {
    let liked_key = user_likes_key(user_id);
    let liked: Vec<LikedPost> = store.get_json(&liked_key)?.unwrap_or_default();
    for like in liked {
        db::remove_from_list(store, &post_likes_key(&like.post_id), user_id)?;
    }
    store.delete(&liked_key)
}

// === HTTP Handlers ===

pub fn like_button(store: &Store, viewer_id: &str, post: &Post, template: &str) -> anyhow::Result<String> {
    let liked = has_liked(store, viewer_id, &post.id)?;
    let author_likes = match &post.author_id {
        Some(author) => total_likes_for_author(store, author)?,
        None => 0,
    };

    render(
        template,
        &[
            ("post_id", post.id.clone()),
            ("liked_class", if liked { "liked".to_string() } else { String::new() }),
            ("like_count", like_count(store, &post.id)?.to_string()),
            ("author_likes", author_likes.to_string()),
        ],
    )
}

pub fn handle_like(state: &AppState, req: &Request, post_id: &str) -> anyhow::Result<Response> {
    let user = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };

    if !validate_uuid(post_id) {
        return Ok(AppError::NotFound("Post not found".to_string()).into());
    }
    let post = match db::get_post(&state.store, post_id)? {
        Some(p) => p,
        None => return Ok(AppError::NotFound("Post not found".to_string()).into()),
    };

    if is_fragment_request(req) {
        let liked = toggle_like(&state.store, &user.id, &post.id)?;
        debug!(post_id = %post.id, user = %user.username, liked, "like toggled");
    }

    let params = parse_query_params(req.uri());
    if is_set(&params, "home") {
        return Ok(fragment(like_button(&state.store, &user.id, &post, "partials/like_home.html")?));
    }
    if is_set(&params, "postpage") {
        return Ok(fragment(like_button(&state.store, &user.id, &post, "partials/like_postpage.html")?));
    }

    Ok(redirect(&format!("/post/{}/", post.id)))
}
