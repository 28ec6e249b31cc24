//! Error kinds surfaced to users and HTTP clients.
//!
//! `EvaluationError` covers the three terminal outcomes of a submission. Each maps to a single
//! user-facing line; the transport detail is kept for logs only.

use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

use crate::image::ImageError;
use crate::protocol::ErrorOut;

pub const VALIDATION_MESSAGE: &str =
  "Please provide both the question and the student answer (text or image).";
pub const EMPTY_RESPONSE_MESSAGE: &str =
  "The examiner was unable to generate a response. Please try again.";
pub const TRANSPORT_MESSAGE: &str = "A system error occurred. Ensure your API key is valid.";

#[derive(Debug, Error)]
pub enum EvaluationError {
  #[error("question or answer is missing")]
  Validation,
  #[error("the model returned no text")]
  EmptyResponse,
  #[error("completion request failed: {0}")]
  Transport(String),
}

impl EvaluationError {
  /// The one-line message shown inline under the form.
  pub fn user_message(&self) -> &'static str {
    match self {
      EvaluationError::Validation => VALIDATION_MESSAGE,
      EvaluationError::EmptyResponse => EMPTY_RESPONSE_MESSAGE,
      EvaluationError::Transport(_) => TRANSPORT_MESSAGE,
    }
  }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unknown session: {0}")]
  UnknownSession(String),
  #[error("unknown image slot: {0}")]
  UnknownSlot(String),
  #[error("session is busy or showing a report; reset it first")]
  NotEditable,
  #[error("too many open sessions; try again later")]
  TooManySessions,
  #[error(transparent)]
  Image(#[from] ImageError),
  #[error(transparent)]
  Evaluation(#[from] EvaluationError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::UnknownSession(_) => StatusCode::NOT_FOUND,
      ApiError::Image(ImageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
      ApiError::UnknownSlot(_) | ApiError::Image(_) => StatusCode::BAD_REQUEST,
      ApiError::NotEditable => StatusCode::CONFLICT,
      ApiError::TooManySessions => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Evaluation(EvaluationError::Validation) => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Evaluation(_) => StatusCode::BAD_GATEWAY,
    }
  }

  fn public_message(&self) -> String {
    match self {
      ApiError::Evaluation(e) => e.user_message().to_string(),
      other => other.to_string(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> axum::response::Response {
    (self.status(), Json(ErrorOut { error: self.public_message() })).into_response()
  }
}
