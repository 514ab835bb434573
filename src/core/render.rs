//! HTML rendering and fragment negotiation.
//!
//! Templates are embedded at build time and rendered with tera, which escapes
//! every value in an `.html` template. Handlers pass plain text; fragments that
//! are already HTML are marked `| safe` where the template includes them.

use std::sync::OnceLock;

use rust_embed::RustEmbed;
use spin_sdk::http::{Request, Response};
use tera::{Context, Tera};

use crate::config::FRAGMENT_HEADER;
use crate::core::helpers::{header_str, html};
use crate::models::models::User;

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

fn load_templates() -> Result<Tera, String> {
    let mut sources = Vec::new();
    for name in Templates::iter() {
        let file = Templates::get(&name).ok_or_else(|| format!("Template {} not found", name))?;
        let source = String::from_utf8(file.data.into_owned()).map_err(|e| e.to_string())?;
        sources.push((name.into_owned(), source));
    }

    let mut tera = Tera::default();
    tera.set_escape_fn(escape_html);
    tera.add_raw_templates(sources).map_err(|e| e.to_string())?;
    Ok(tera)
}

fn engine() -> anyhow::Result<&'static Tera> {
    static ENGINE: OnceLock<Result<Tera, String>> = OnceLock::new();
    ENGINE
        .get_or_init(load_templates)
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Templates failed to load: {}", e))
}

/// Escapes `& < > " '`, which covers both text and quoted attributes.
fn escape_html(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

pub fn render(name: &str, vars: &[(&str, String)]) -> anyhow::Result<String> {
    let mut context = Context::new();
    for (key, value) in vars {
        context.insert(*key, value);
    }
    Ok(engine()?.render(name, &context)?)
}

/// Whether the client wants the whole page or only the inner fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Full,
    Fragment,
}

impl Presentation {
    pub fn negotiate(req: &Request) -> Self {
        match header_str(req, FRAGMENT_HEADER) {
            Some(v) if v.eq_ignore_ascii_case("true") => Presentation::Fragment,
            _ => Presentation::Full,
        }
    }
}

pub fn is_fragment_request(req: &Request) -> bool {
    Presentation::negotiate(req) == Presentation::Fragment
}

/// Wraps `content` in the site layout, or returns it bare for fragment requests.
pub fn page(req: &Request, viewer: Option<&User>, title: &str, content: String) -> anyhow::Result<Response> {
    let body = match Presentation::negotiate(req) {
        Presentation::Fragment => content,
        Presentation::Full => layout(viewer, title, content)?,
    };
    Ok(html(200, body))
}

/// Template truth value: tera treats the empty string as false.
pub fn flag(on: bool) -> String {
    if on { "true".to_string() } else { String::new() }
}

pub fn fragment(content: String) -> Response {
    html(200, content)
}

pub fn layout(viewer: Option<&User>, title: &str, content: String) -> anyhow::Result<String> {
    let nav = match viewer {
        Some(user) => render(
            "partials/nav.html",
            &[
                ("username", user.username.clone()),
                ("avatar", user.avatar()),
                ("is_staff", flag(user.is_staff)),
            ],
        )?,
        None => String::new(),
    };
    let theme = if viewer.is_some_and(|u| u.darkmode) { "dark" } else { "" };

    render(
        "base.html",
        &[
            ("title", title.to_string()),
            ("theme", theme.to_string()),
            ("nav", nav),
            ("content", content),
        ],
    )
}

pub fn error_page(status: u16, message: &str) -> Response {
    let body = render(
        "error.html",
        &[("status", status.to_string()), ("message", message.to_string())],
    )
    .unwrap_or_else(|_| format!("<h1>{}</h1><p>{}</p>", status, escape_html(message)));
    html(status, body)
}
