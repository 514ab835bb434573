use std::collections::BTreeMap;

use spin_sdk::http::Response;
use thiserror::Error;

use crate::core::render::error_page;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn status(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::InternalError(_) => 500,
        }
    }
}

impl From<AppError> for Response {
    fn from(err: AppError) -> Self {
        let message = match &err {
            AppError::BadRequest(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "internal error");
                "Something went wrong".to_string()
            }
        };
        error_page(err.status(), &message)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

/// Field-level validation messages, rendered inline next to form inputs.
#[derive(Debug, Default, Clone)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Error paragraphs for one field, already escaped.
    pub fn html(&self, field: &str) -> String {
        self.get(field)
            .iter()
            .map(|msg| format!(r#"<p class="error">{}</p>"#, html_escape::encode_text(msg)))
            .collect()
    }
}
