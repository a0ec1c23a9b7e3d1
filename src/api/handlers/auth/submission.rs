//! Reusable form-submission results.
//!
//! Validation failures are user-correctable: they surface as field-scoped or
//! form-scoped messages with a 400 status, and handlers can return the same
//! shape from any flow (register, verify, signup, login).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Wire shape for a rejected submission.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct SubmissionReply {
    pub status: String,
    pub form_errors: Vec<String>,
    pub field_errors: BTreeMap<String, Vec<String>>,
}

/// Accumulated validation outcome for one request.
#[derive(Debug, Default)]
pub(crate) struct Submission {
    form_errors: Vec<String>,
    field_errors: BTreeMap<String, Vec<String>>,
}

impl Submission {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A single form-level error, e.g. the deliberately vague login failure.
    pub(crate) fn form_error(message: &str) -> Self {
        let mut submission = Self::new();
        submission.add_form_error(message);
        submission
    }

    pub(crate) fn add_form_error(&mut self, message: &str) {
        self.form_errors.push(message.to_string());
    }

    pub(crate) fn add_field_error(&mut self, field: &str, message: &str) {
        self.field_errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub(crate) fn has_errors(&self) -> bool {
        !self.form_errors.is_empty() || !self.field_errors.is_empty()
    }

    pub(crate) fn reply(&self) -> SubmissionReply {
        SubmissionReply {
            status: "error".to_string(),
            form_errors: self.form_errors.clone(),
            field_errors: self.field_errors.clone(),
        }
    }
}

impl IntoResponse for Submission {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self.reply())).into_response()
    }
}
