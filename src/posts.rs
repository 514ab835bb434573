use std::collections::HashMap;

use spin_sdk::http::{Request, Response};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{current_user, login_redirect};
use crate::config::*;
use crate::core::db;
use crate::core::errors::{AppError, FormErrors};
use crate::core::helpers::{html, now, redirect, validate_uuid};
use crate::core::multipart::{parse_request_form, UploadedFile};
use crate::core::pagination::paginate;
use crate::core::query_params::{get_page_number, is_set, parse_query_params};
use crate::core::render::{fragment, is_fragment_request, page, render};
use crate::core::store::Store;
use crate::likes::like_button;
use crate::media;
use crate::models::models::{Post, User};
use crate::state::AppState;

// === Rendering ===

/// Resolves post authors once per render.
pub struct Authors<'a> {
    store: &'a Store,
    seen: HashMap<String, Option<User>>,
}

impl<'a> Authors<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            seen: HashMap::new(),
        }
    }

    pub fn get(&mut self, post: &Post) -> anyhow::Result<Option<&User>> {
        let id = match &post.author_id {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        if !self.seen.contains_key(&id) {
            let user = db::get_user(self.store, &id)?;
            self.seen.insert(id.clone(), user);
        }
        Ok(self.seen.get(&id).and_then(Option::as_ref))
    }
}

fn author_vars(author: Option<&User>) -> [(&'static str, String); 3] {
    match author {
        Some(a) => [
            ("author_username", a.username.clone()),
            ("author_name", a.display_name().to_string()),
            ("author_avatar", a.avatar()),
        ],
        None => [
            ("author_username", String::new()),
            ("author_name", "Deleted user".to_string()),
            ("author_avatar", DEFAULT_AVATAR.to_string()),
        ],
    }
}

fn post_vars(post: &Post) -> Vec<(&'static str, String)> {
    vec![
        ("post_id", post.id.clone()),
        ("image", post.image_url()),
        ("body", post.body.clone().unwrap_or_default()),
        ("tags", post.tags.clone().unwrap_or_default()),
        ("created_at", post.created_at.format("%d %b %Y").to_string()),
    ]
}

pub fn post_card(store: &Store, authors: &mut Authors, viewer: &User, post: &Post) -> anyhow::Result<String> {
    let mut vars = post_vars(post);
    vars.extend(author_vars(authors.get(post)?));
    vars.push(("like", like_button(store, &viewer.id, post, "partials/like_home.html")?));
    render("partials/post_card.html", &vars)
}

pub fn post_tiles(posts: &[Post]) -> anyhow::Result<String> {
    let mut out = String::new();
    for post in posts {
        out.push_str(&render("partials/post_tile.html", &post_vars(post))?);
    }
    Ok(out)
}

// === Feed ===

pub fn home(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let user = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };

    let params = parse_query_params(req.uri());
    let posts = db::all_posts(&state.store)?;
    let feed_page = paginate(posts, FEED_PAGE_SIZE, get_page_number(&params, "page_number"));

    let mut authors = Authors::new(&state.store);
    let mut items = String::new();
    for post in &feed_page.items {
        items.push_str(&post_card(&state.store, &mut authors, &user, post)?);
    }
    if let Some(next) = feed_page.next_page_number() {
        items.push_str(&render("partials/next_page.html", &[("next_page", next.to_string())])?);
    }

    if is_set(&params, "paginator") {
        return Ok(fragment(items));
    }

    let content = render(
        "home.html",
        &[
            ("posts", items),
            ("page_start_index", feed_page.start_index().to_string()),
        ],
    )?;
    page(req, Some(&user), "Home", content)
}

pub fn explore(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let user = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };

    let posts = db::all_posts(&state.store)?;
    let content = render("explore.html", &[("posts", post_tiles(&posts)?)])?;
    page(req, Some(&user), "Explore", content)
}

// === Upload ===

fn validate_caption(fields: &HashMap<String, String>, errors: &mut FormErrors) -> (Option<String>, Option<String>) {
    let body = fields.get("body").map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let tags = fields.get("tags").map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    if body.as_ref().is_some_and(|b| b.chars().count() > MAX_CAPTION_LENGTH) {
        errors.add(
            "body",
            format!("Ensure this value has at most {} characters.", MAX_CAPTION_LENGTH),
        );
    }
    if tags.as_ref().is_some_and(|t| t.chars().count() > MAX_TAGS_LENGTH) {
        errors.add(
            "tags",
            format!("Ensure this value has at most {} characters.", MAX_TAGS_LENGTH),
        );
    }
    (body, tags)
}

fn upload_form(fields: &HashMap<String, String>, errors: &FormErrors) -> anyhow::Result<String> {
    let value = |k: &str| fields.get(k).cloned().unwrap_or_default();
    render(
        "upload.html",
        &[
            ("body", value("body")),
            ("tags", value("tags")),
            ("image_errors", errors.html("image")),
            ("body_errors", errors.html("body")),
            ("tags_errors", errors.html("tags")),
        ],
    )
}

pub fn create_post(
    store: &Store,
    author: &User,
    image: &UploadedFile,
    content_type: &str,
    body: Option<String>,
    tags: Option<String>,
) -> anyhow::Result<Post> {
    let image_key = media::save_media(store, "posts", image, content_type)?;
    let post = Post {
        id: Uuid::new_v4().to_string(),
        author_id: Some(author.id.clone()),
        image: image_key,
        body,
        tags,
        created_at: now(),
    };
    db::insert_post(store, &post)?;

    info!(post_id = %post.id, author = %author.username, "post created");
    Ok(post)
}

pub fn upload(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let user = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };

    if req.method().to_string() != "POST" {
        let content = upload_form(&HashMap::new(), &FormErrors::new())?;
        return page(req, Some(&user), "Upload", content);
    }

    let form = match parse_request_form(req) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "unreadable upload body");
            return Ok(AppError::BadRequest("Malformed form data".to_string()).into());
        }
    };

    let mut errors = FormErrors::new();
    let image = form.files.get("image");
    let content_type = match image {
        None => {
            errors.add("image", "This field is required.");
            None
        }
        Some(file) => match media::validate_image(file) {
            Ok(ct) => Some(ct),
            Err(msg) => {
                errors.add("image", msg);
                None
            }
        },
    };
    let (body, tags) = validate_caption(&form.fields, &mut errors);

    match (image, content_type) {
        (Some(file), Some(ct)) if errors.is_empty() => {
            create_post(&state.store, &user, file, ct, body, tags)?;
            Ok(redirect("/"))
        }
        _ => {
            let content = upload_form(&form.fields, &errors)?;
            page(req, Some(&user), "Upload", content)
        }
    }
}

// === Post page ===

/// The author's posts (newest first) with the neighbours of `post` among them.
pub fn siblings(store: &Store, post: &Post) -> anyhow::Result<(Vec<Post>, Option<Post>, Option<Post>)> {
    let author_posts = match &post.author_id {
        Some(author) => db::posts_by_author(store, author)?,
        None => return Ok((vec![post.clone()], None, None)),
    };

    let index = author_posts.iter().position(|p| p.id == post.id);
    let (prev, next) = match index {
        Some(i) => (
            i.checked_sub(1).and_then(|j| author_posts.get(j)).cloned(),
            author_posts.get(i + 1).cloned(),
        ),
        None => (None, None),
    };
    Ok((author_posts, prev, next))
}

fn find_post(store: &Store, post_id: &str) -> anyhow::Result<Option<Post>> {
    if !validate_uuid(post_id) {
        return Ok(None);
    }
    db::get_post(store, post_id)
}

pub fn post_page(state: &AppState, req: &Request, post_id: Option<&str>) -> anyhow::Result<Response> {
    let post_id = match post_id {
        Some(id) if !id.is_empty() => id,
        _ => return Ok(redirect("/")),
    };
    let post = match find_post(&state.store, post_id)? {
        Some(p) => p,
        None => return Ok(AppError::NotFound("Post not found".to_string()).into()),
    };

    let viewer = current_user(state, req)?;
    let (author_posts, prev, next) = siblings(&state.store, &post)?;
    let mut authors = Authors::new(&state.store);
    let author = authors.get(&post)?.cloned();

    let like = match &viewer {
        Some(v) => like_button(&state.store, &v.id, &post, "partials/like_postpage.html")?,
        None => String::new(),
    };
    let owner_tools = match (&viewer, &post.author_id) {
        (Some(v), Some(author_id)) if &v.id == author_id => {
            render("partials/post_owner_tools.html", &[("post_id", post.id.clone())])?
        }
        _ => String::new(),
    };

    let mut vars = post_vars(&post);
    vars.extend(author_vars(author.as_ref()));
    vars.extend([
        ("like", like),
        ("owner_tools", owner_tools),
        ("prev_id", prev.map(|p| p.id).unwrap_or_default()),
        ("next_id", next.map(|p| p.id).unwrap_or_default()),
        ("author_posts", post_tiles(&author_posts)?),
    ]);

    let content = render("postpage.html", &vars)?;
    page(req, viewer.as_ref(), "Post", content)
}

// === Edit / delete ===

fn edit_form(post: &Post, fields: Option<&HashMap<String, String>>, errors: &FormErrors) -> anyhow::Result<String> {
    let value = |k: &str, fallback: &Option<String>| {
        let raw = match fields {
            Some(f) => f.get(k).cloned().unwrap_or_default(),
            None => fallback.clone().unwrap_or_default(),
        };
        raw
    };
    render(
        "partials/post_edit.html",
        &[
            ("post_id", post.id.clone()),
            ("image", post.image_url()),
            ("body", value("body", &post.body)),
            ("tags", value("tags", &post.tags)),
            ("body_errors", errors.html("body")),
            ("tags_errors", errors.html("tags")),
        ],
    )
}

pub fn post_edit(state: &AppState, req: &Request, post_id: &str) -> anyhow::Result<Response> {
    let user = match current_user(state, req)? {
        Some(u) => u,
        None => return Ok(login_redirect(req)),
    };
    let mut post = match find_post(&state.store, post_id)? {
        Some(p) => p,
        None => return Ok(AppError::NotFound("Post not found".to_string()).into()),
    };

    if post.author_id.as_deref() != Some(user.id.as_str()) {
        warn!(post_id = %post.id, user = %user.username, "edit attempt by non-owner");
        return Ok(redirect("/"));
    }

    let mut errors = FormErrors::new();
    let mut submitted = None;

    if req.method().to_string() == "POST" {
        let form = parse_request_form(req)?;
        let (body, tags) = validate_caption(&form.fields, &mut errors);
        if errors.is_empty() {
            post.body = body;
            post.tags = tags;
            db::save_post(&state.store, &post)?;
            return Ok(redirect(&format!("/post/{}/", post.id)));
        }
        submitted = Some(form.fields);
    }

    let params = parse_query_params(req.uri());
    if is_set(&params, "delete") {
        db::delete_post(&state.store, &post)?;
        return Ok(redirect(&format!("/@{}/", user.username)));
    }

    if is_fragment_request(req) {
        return Ok(html(200, edit_form(&post, submitted.as_ref(), &errors)?));
    }
    Ok(redirect(&format!("/post/{}/", post.id)))
}
