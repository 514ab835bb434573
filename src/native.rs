//! Native host: actix-web in front of the same handlers the Spin component uses.

use std::time::Duration;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use spin_sdk::http::{Method, Request, Response};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::db;
use crate::core::store::Store;
use crate::mail::{self, Outbox};
use crate::state::AppState;

/// Response headers the handlers emit and the adapter carries over.
const FORWARDED_HEADERS: [&str; 5] = [
    "content-type",
    "location",
    "set-cookie",
    "cache-control",
    "x-content-type-options",
];

pub fn actix_to_spin_request(req: &HttpRequest, body: web::Bytes) -> Request {
    let method = match req.method().as_str() {
        "GET" => Method::Get,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "DELETE" => Method::Delete,
        "HEAD" => Method::Head,
        "OPTIONS" => Method::Options,
        "PATCH" => Method::Patch,
        _ => Method::Get,
    };

    let mut builder = Request::builder();
    builder.method(method).uri(req.uri().to_string());

    for (name, value) in req.headers() {
        if let Ok(val_str) = value.to_str() {
            builder.header(name.as_str(), val_str);
        }
    }

    builder.body(body.to_vec()).build()
}

pub fn spin_to_actix_response(spin_resp: Response) -> HttpResponse {
    let status = *spin_resp.status();

    let mut response = HttpResponse::build(
        actix_web::http::StatusCode::from_u16(status)
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
    );

    for name in FORWARDED_HEADERS {
        if let Some(value) = spin_resp.header(name).and_then(|v| v.as_str()) {
            response.append_header((name, value));
        }
    }

    response.body(spin_resp.body().to_vec())
}

pub async fn handle_all(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let spin_req = actix_to_spin_request(&req, body);

    // Password hashing and store scans are blocking work.
    let result = web::block(move || crate::handle_request(&state, spin_req)).await;

    match result {
        Ok(Ok(spin_resp)) => spin_to_actix_response(spin_resp),
        Ok(Err(e)) => {
            error!(error = %e, "request failed");
            HttpResponse::InternalServerError().body("Internal server error")
        }
        Err(e) => {
            error!(error = %e, "request handler panicked");
            HttpResponse::InternalServerError().body("Internal server error")
        }
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = Store::memory();
    if let Some(admin) = &config.admin {
        db::bootstrap_admin(&store, admin)?;
    }

    let mailer = mail::mailer_from_config(&config)?;
    let (outbox, rx) = Outbox::channel();
    let worker = tokio::spawn(mail::run_worker(rx, mailer));

    let bind = config.bind.clone();
    let state = web::Data::new(AppState::new(store, config, outbox));

    info!("Server listening on http://{}", bind);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(handle_all))
    })
    .bind(&bind)?
    .run()
    .await?;

    // The server owned the last outbox sender, so the worker drains and stops.
    if tokio::time::timeout(Duration::from_secs(5), worker).await.is_err() {
        warn!("mail worker did not finish draining before shutdown");
    }
    Ok(())
}
