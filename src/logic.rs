//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Evaluating a submission (validate, build request, one model call)
//!   - Driving a session through submit / reset
//!   - Form edits, including image uploads

use std::str::FromStr;

use tracing::{debug, error, info, instrument, warn};

use crate::domain::{EncodedImage, SubmissionInput};
use crate::error::{ApiError, EvaluationError};
use crate::image::{encode_bytes, ensure_size, from_data_url, ImageError};
use crate::protocol::{to_out, FormIn, SessionOut};
use crate::request::build_request;
use crate::session::SubmitOutcome;
use crate::state::AppState;

/// Which image of the form an upload targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSlot {
  Question,
  Answer,
}

impl FromStr for ImageSlot {
  type Err = ApiError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "question" => Ok(ImageSlot::Question),
      "answer" => Ok(ImageSlot::Answer),
      other => Err(ApiError::UnknownSlot(other.to_string())),
    }
  }
}

impl ImageSlot {
  fn slot_mut(self, form: &mut SubmissionInput) -> &mut Option<EncodedImage> {
    match self {
      ImageSlot::Question => &mut form.question_image,
      ImageSlot::Answer => &mut form.answer_image,
    }
  }
}

/// Validate, send to the model once, return the raw reply text.
#[instrument(
  level = "info",
  skip(state, input),
  fields(question_len = input.question_text.len(), answer_len = input.answer_text.len(),
         question_image = input.question_image.is_some(), answer_image = input.answer_image.is_some())
)]
pub async fn evaluate_submission(state: &AppState, input: SubmissionInput) -> Result<String, EvaluationError> {
  input.validate()?;

  let Some(gemini) = &state.gemini else {
    error!(target: "grading", "No Gemini credential configured; failing submission.");
    return Err(EvaluationError::Transport("no API key configured".into()));
  };

  let req = build_request(&state.prompts, input);
  match gemini.generate(&req).await {
    Ok(Some(raw)) => {
      debug!(target: "grading", reply_len = raw.len(), "Examiner reply received");
      Ok(raw)
    }
    Ok(None) => {
      warn!(target: "grading", "Examiner returned no text");
      Err(EvaluationError::EmptyResponse)
    }
    Err(e) => {
      error!(target: "grading", error = %e, "Examiner call failed");
      Err(e)
    }
  }
}

/// First half of a submit: move an idle, valid form to `Submitting` and hand back the snapshot
/// to send. `None` when there is nothing to send (validation failed, or the session is busy or
/// showing a report).
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn begin_submission(state: &AppState, session_id: &str) -> Result<Option<SubmissionInput>, ApiError> {
  let outcome = state
    .with_session(session_id, |v| v.begin_submit())
    .await
    .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))?;

  match outcome {
    SubmitOutcome::Dispatch(input) => Ok(Some(input)),
    SubmitOutcome::Rejected => {
      info!(target: "grading", %session_id, "Submission rejected by validation");
      Ok(None)
    }
    SubmitOutcome::Ignored => {
      debug!(target: "grading", %session_id, "Submit ignored; session not idle");
      Ok(None)
    }
  }
}

/// Second half: call the model and land the session on its report or back on the form.
#[instrument(level = "info", skip(state, input), fields(%session_id))]
pub async fn finish_submission(
  state: &AppState,
  session_id: &str,
  input: SubmissionInput,
) -> Result<SessionOut, ApiError> {
  let result = evaluate_submission(state, input).await;
  let applied = state
    .with_session(session_id, |v| match &result {
      Ok(raw) => v.succeed(raw.clone()),
      Err(e) => v.fail(e),
    })
    .await;
  match (&result, applied) {
    (Ok(_), Some(true)) => info!(target: "grading", %session_id, "Session reported"),
    (Err(e), Some(true)) => info!(target: "grading", %session_id, error = %e, "Session returned to form with error"),
    _ => warn!(target: "grading", %session_id, "Session vanished or changed while the examiner was busy"),
  }
  snapshot(state, session_id).await
}

/// Submit a session's form and wait for the outcome. A submit while one is already in flight
/// (or after a report) leaves the session untouched and just returns its snapshot.
pub async fn submit_session(state: &AppState, session_id: &str) -> Result<SessionOut, ApiError> {
  match begin_submission(state, session_id).await? {
    Some(input) => finish_submission(state, session_id, input).await,
    None => snapshot(state, session_id).await,
  }
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn reset_session(state: &AppState, session_id: &str) -> Result<SessionOut, ApiError> {
  let done = state
    .with_session(session_id, |v| v.reset())
    .await
    .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))?;
  if !done {
    debug!(target: "grading", %session_id, "Reset ignored; request in flight");
  }
  snapshot(state, session_id).await
}

pub async fn snapshot(state: &AppState, session_id: &str) -> Result<SessionOut, ApiError> {
  state
    .get_session(session_id)
    .await
    .ok_or_else(|| ApiError::UnknownSession(session_id.to_string()))
}

/// Apply a partial form update. Images are decoded before the session is touched, so a bad
/// image leaves the form unchanged.
#[instrument(level = "info", skip(state, update), fields(%session_id))]
pub async fn update_form(state: &AppState, session_id: &str, update: FormIn) -> Result<SessionOut, ApiError> {
  let decode = |url: &str| decode_data_url(state, url);
  let question_image = update.question_image.map(|o| o.as_deref().map(decode).transpose()).transpose()?;
  let answer_image = update.answer_image.map(|o| o.as_deref().map(decode).transpose()).transpose()?;

  edit_form(state, session_id, move |form| {
    if let Some(q) = update.question { form.question_text = q; }
    if let Some(a) = update.answer { form.answer_text = a; }
    if let Some(img) = question_image { form.question_image = img; }
    if let Some(img) = answer_image { form.answer_image = img; }
  })
  .await
}

/// Parse a browser data URL and hold it to the upload limit.
pub fn decode_data_url(state: &AppState, data_url: &str) -> Result<EncodedImage, ImageError> {
  let img = from_data_url(data_url)?;
  ensure_size(img.decoded_len(), state.limits.max_upload_bytes)?;
  Ok(img)
}

/// Store an uploaded image (raw bytes + Content-Type) in one slot.
#[instrument(level = "info", skip(state, bytes), fields(%session_id, ?slot, size = bytes.len(), %mime_type))]
pub async fn set_image_bytes(
  state: &AppState,
  session_id: &str,
  slot: ImageSlot,
  bytes: &[u8],
  mime_type: &str,
) -> Result<SessionOut, ApiError> {
  ensure_size(bytes.len(), state.limits.max_upload_bytes)?;
  let img = encode_bytes(bytes, mime_type)?;
  edit_form(state, session_id, move |form| *slot.slot_mut(form) = Some(img)).await
}

/// Same as `set_image_bytes` but from a browser data URL.
pub async fn set_image_data_url(
  state: &AppState,
  session_id: &str,
  slot: ImageSlot,
  data_url: &str,
) -> Result<SessionOut, ApiError> {
  let img = decode_data_url(state, data_url)?;
  edit_form(state, session_id, move |form| *slot.slot_mut(form) = Some(img)).await
}

pub async fn clear_image(state: &AppState, session_id: &str, slot: ImageSlot) -> Result<SessionOut, ApiError> {
  edit_form(state, session_id, move |form| *slot.slot_mut(form) = None).await
}

pub async fn edit_form(
  state: &AppState,
  session_id: &str,
  f: impl FnOnce(&mut SubmissionInput),
) -> Result<SessionOut, ApiError> {
  let sessions_hit = state
    .with_session(session_id, |v| match v.form_mut() {
      Some(form) => {
        f(form);
        Ok(to_out(session_id, v))
      }
      None => Err(ApiError::NotEditable),
    })
    .await;
  sessions_hit.unwrap_or_else(|| Err(ApiError::UnknownSession(session_id.to_string())))
}
