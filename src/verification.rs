use rand::Rng;
use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::config::*;
use crate::core::cache;
use crate::core::helpers::{html, is_valid_email};
use crate::core::query_params::{get_present, parse_query_params};
use crate::core::render::render;
use crate::core::store::Store;
use crate::mail::EmailMessage;
use crate::state::AppState;

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Stores a fresh code for `email` (replacing any earlier one) and queues the
/// mail carrying it.
pub fn issue_code(state: &AppState, email: &str) -> anyhow::Result<String> {
    let code = generate_code();
    cache::set(
        &state.store,
        &verification_code_key(email),
        &code,
        VERIFICATION_CODE_TTL_SECS,
    )?;

    state.outbox.dispatch(EmailMessage {
        subject: "Your Snapbord Verification Code".to_string(),
        body: format!("Use this code to sign up: {}. It expires in 5 minutes.", code),
        from: state.config.mail_from.clone(),
        to: vec![email.to_string()],
    });

    info!(%email, "verification code issued");
    Ok(code)
}

/// True when `code` matches the live code stored for exactly this email.
pub fn check_code(store: &Store, email: &str, code: &str) -> anyhow::Result<bool> {
    let cached = cache::get(store, &verification_code_key(email))?;
    Ok(matches!(cached, Some(expected) if expected == code.trim()))
}

fn notice(class: &str, message: &str) -> anyhow::Result<Response> {
    let body = render(
        "partials/notice.html",
        &[("class", class.to_string()), ("message", message.to_string())],
    )?;
    Ok(html(200, body))
}

pub fn verification_code(state: &AppState, req: &Request) -> anyhow::Result<Response> {
    let params = parse_query_params(req.uri());

    let email = match get_present(&params, "email") {
        Some(email) => email,
        None => return notice("error", "Email is required."),
    };

    if !is_valid_email(email) {
        warn!(%email, "verification code requested for invalid address");
        return notice("error", "Invalid email address provided.");
    }

    issue_code(state, email)?;
    notice("success", "Verification code sent to your email!")
}
