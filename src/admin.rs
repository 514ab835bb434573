use spin_sdk::http::{Request, Response};

use crate::auth::current_user;
use crate::core::db;
use crate::core::helpers::redirect;
use crate::core::render::{page, render};
use crate::state::AppState;

/// Read-only overview of accounts for staff.
pub fn dashboard(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let user = match current_user(state, req)? {
        Some(u) if u.is_staff => u,
        _ => return Ok(redirect("/login/?next=%2Fadmin%2F")),
    };

    let users = db::all_users(&state.store)?;
    let posts = db::all_posts(&state.store)?;

    let mut rows = String::new();
    for u in &users {
        let count = posts
            .iter()
            .filter(|p| p.author_id.as_deref() == Some(u.id.as_str()))
            .count();
        rows.push_str(&render(
            "partials/admin_user_row.html",
            &[
                ("username", u.username.clone()),
                ("name", u.name.clone().unwrap_or_default()),
                ("email", u.email.clone()),
                ("is_staff", if u.is_staff { "yes".to_string() } else { "no".to_string() }),
                ("post_count", count.to_string()),
            ],
        )?);
    }

    let orphaned = posts.iter().filter(|p| p.author_id.is_none()).count();
    let content = render(
        "admin.html",
        &[
            ("user_count", users.len().to_string()),
            ("post_count", posts.len().to_string()),
            ("orphaned_count", orphaned.to_string()),
            ("rows", rows),
        ],
    )?;
    page(req, Some(&user), "Administration", content)
}
