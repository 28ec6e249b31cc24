//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  body::Bytes,
  extract::{Path, State},
  http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::domain::SubmissionInput;
use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::*;
use crate::sectionizer::sectionize;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, model: state.gemini.as_ref().map(|g| g.model.clone()) })
}

/// One-shot evaluation without a session.
#[instrument(level = "info", skip(state, body), fields(question_len = body.question.len(), answer_len = body.answer.len()))]
pub async fn http_post_evaluate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EvaluateIn>,
) -> Result<Json<ReportOut>, ApiError> {
  let input = SubmissionInput {
    question_text: body.question,
    question_image: body.question_image.as_deref().map(|u| decode_data_url(&state, u)).transpose()?,
    answer_text: body.answer,
    answer_image: body.answer_image.as_deref().map(|u| decode_data_url(&state, u)).transpose()?,
  };
  let raw = evaluate_submission(&state, input).await?;
  let report = sectionize(&raw);
  info!(target: "grading", marks = %report.marks, "HTTP evaluate served");
  Ok(Json(ReportOut { report: ReportView::new(&report, &raw) }))
}

/// Parse a reply that was obtained elsewhere.
#[instrument(level = "info", skip(body), fields(text_len = body.text.len()))]
pub async fn http_post_sectionize(Json(body): Json<SectionizeIn>) -> impl IntoResponse {
  let report = sectionize(&body.text);
  Json(ReportOut { report: ReportView::new(&report, &body.text) })
}

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
  let id = state.create_session().await?;
  Ok((StatusCode::CREATED, Json(snapshot(&state, &id).await?)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  if state.remove_session(&id).await {
    info!(target: "grading", session_id = %id, "Session deleted");
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::UnknownSession(id))
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(snapshot(&state, &id).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_put_form(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<FormIn>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(update_form(&state, &id, body).await?))
}

#[instrument(level = "info", skip(state, headers, bytes), fields(size = bytes.len()))]
pub async fn http_put_image(
  State(state): State<Arc<AppState>>,
  Path((id, slot)): Path<(String, String)>,
  headers: HeaderMap,
  bytes: Bytes,
) -> Result<Json<SessionOut>, ApiError> {
  let slot: ImageSlot = slot.parse()?;
  let mime = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default();
  Ok(Json(set_image_bytes(&state, &id, slot, &bytes, mime).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_image(
  State(state): State<Arc<AppState>>,
  Path((id, slot)): Path<(String, String)>,
) -> Result<Json<SessionOut>, ApiError> {
  let slot: ImageSlot = slot.parse()?;
  Ok(Json(clear_image(&state, &id, slot).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, ApiError> {
  let out = submit_session(&state, &id).await?;
  info!(target: "grading", session_id = %id, state = out.state, "HTTP submit handled");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_reset(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(reset_session(&state, &id).await?))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{Limits, Prompts};
  use crate::gemini::Gemini;
  use crate::routes::build_router;
  use axum::{body::Body, http::Request, Router};
  use serde_json::{json, Value};
  use tower::ServiceExt;
  use wiremock::matchers::method;
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn app(gemini: Option<Gemini>) -> Router {
    build_router(Arc::new(AppState::with_parts(Prompts::default(), gemini)))
  }

  fn app_with(state: &Arc<AppState>) -> Router {
    build_router(Arc::clone(state))
  }

  async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        req = req.header(CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  async fn gemini_replying(text: &str) -> (MockServer, Gemini) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"parts": [{"text": text}]}}]
      })))
      .mount(&server)
      .await;
    let gemini = Gemini::new("k", server.uri(), "m", 0.1);
    (server, gemini)
  }

  #[tokio::test]
  async fn health_reports_model() {
    let (status, body) = call(&app(None), "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "model": null}));
  }

  #[tokio::test]
  async fn sectionize_applies_fallbacks() {
    let (status, body) = call(
      &app(None),
      "POST",
      "/api/v1/sectionize",
      Some(json!({"text": "Marks: 2.5/5\nCorrect Points:\n- one"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["marks"], "2.5/5");
    assert_eq!(body["report"]["correctPoints"], "- one");
    assert_eq!(body["report"]["missingPoints"], NO_DEDUCTIONS);
    assert!(body["report"].get("suggestedApproach").is_none());
  }

  #[tokio::test]
  async fn evaluate_validates_before_calling_the_model() {
    let (status, body) = call(
      &app(None),
      "POST",
      "/api/v1/evaluate",
      Some(json!({"question": "", "answer": "something"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], crate::error::VALIDATION_MESSAGE);
  }

  #[tokio::test]
  async fn evaluate_returns_parsed_report() {
    let (_server, gemini) = gemini_replying("Marks: 3/5\nExaminer Tips:\n- Use keywords").await;
    let (status, body) = call(
      &app(Some(gemini)),
      "POST",
      "/api/v1/evaluate",
      Some(json!({"question": "", "questionImage": "data:image/png;base64,aGk=", "answer": "V = IR"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["marks"], "3/5");
    assert_eq!(body["report"]["tips"], "- Use keywords");
  }

  #[tokio::test]
  async fn evaluate_without_credential_is_bad_gateway() {
    let (status, body) = call(
      &app(None),
      "POST",
      "/api/v1/evaluate",
      Some(json!({"question": "Q", "answer": "A"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], crate::error::TRANSPORT_MESSAGE);
  }

  #[tokio::test]
  async fn session_flow_over_http() {
    let (_server, gemini) = gemini_replying("Marks: 5/5\nCorrect Points:\n- all").await;
    let app = app(Some(gemini));

    let (status, created) = call(&app, "POST", "/api/v1/session", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "POST", &format!("/api/v1/session/{id}/submit"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, s) = call(&app, "GET", &format!("/api/v1/session/{id}"), None).await;
    assert_eq!(s["error"], crate::error::VALIDATION_MESSAGE);

    let req = Request::builder()
      .method("PUT")
      .uri(format!("/api/v1/session/{id}/image/answer"))
      .header(CONTENT_TYPE, "image/jpeg")
      .body(Body::from(vec![0xFFu8, 0xD8, 0xFF]))
      .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);

    let (status, s) = call(&app, "PUT", &format!("/api/v1/session/{id}/form"), Some(json!({"question": "Q"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(s["form"]["answerImage"], json!({"mimeType": "image/jpeg", "bytes": 3}));

    let (_, s) = call(&app, "POST", &format!("/api/v1/session/{id}/submit"), None).await;
    assert_eq!(s["state"], "reported");
    assert_eq!(s["report"]["marks"], "5/5");
    assert!(s.get("form").is_none());

    let (status, _) = call(&app, "PUT", &format!("/api/v1/session/{id}/form"), Some(json!({"question": "x"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, s) = call(&app, "POST", &format!("/api/v1/session/{id}/reset"), None).await;
    assert_eq!(s["state"], "idle");
    assert_eq!(s["form"]["question"], "");
    assert!(s["form"]["answerImage"].is_null());
  }

  #[tokio::test]
  async fn image_errors_and_unknown_sessions() {
    let app = app(None);
    let (status, _) = call(&app, "GET", "/api/v1/session/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, created) = call(&app, "POST", "/api/v1/session", None).await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = call(&app, "DELETE", &format!("/api/v1/session/{id}/image/marks"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::builder()
      .method("PUT")
      .uri(format!("/api/v1/session/{id}/image/question"))
      .header(CONTENT_TYPE, "text/plain")
      .body(Body::from("hello"))
      .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn deleted_session_is_gone() {
    let app = app(None);
    let (_, created) = call(&app, "POST", "/api/v1/session", None).await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = call(&app, "DELETE", &format!("/api/v1/session/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = call(&app, "GET", &format!("/api/v1/session/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "DELETE", &format!("/api/v1/session/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn expired_session_is_gone() {
    let limits = Limits { session_ttl: std::time::Duration::from_secs(30), ..Limits::default() };
    let state = Arc::new(AppState::with_parts(Prompts::default(), None).with_limits(limits));
    let app = app_with(&state);
    let (_, created) = call(&app, "POST", "/api/v1/session", None).await;
    let id = created["id"].as_str().unwrap();

    let later = tokio::time::Instant::now() + std::time::Duration::from_secs(31);
    assert_eq!(state.sweep_expired(later).await, 1);

    let (status, _) = call(&app, "GET", &format!("/api/v1/session/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn session_creation_is_capped() {
    let limits = Limits { max_sessions: 1, ..Limits::default() };
    let state = Arc::new(AppState::with_parts(Prompts::default(), None).with_limits(limits));
    let app = app_with(&state);

    let (status, _) = call(&app, "POST", "/api/v1/session", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(&app, "POST", "/api/v1/session", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("too many"));
  }

  #[tokio::test]
  async fn raw_upload_over_the_limit_is_too_large() {
    let limits = Limits { max_upload_bytes: 8, ..Limits::default() };
    let state = Arc::new(AppState::with_parts(Prompts::default(), None).with_limits(limits));
    let app = app_with(&state);
    let (_, created) = call(&app, "POST", "/api/v1/session", None).await;
    let id = created["id"].as_str().unwrap();

    let put = |len: usize| {
      Request::builder()
        .method("PUT")
        .uri(format!("/api/v1/session/{id}/image/answer"))
        .header(CONTENT_TYPE, "image/png")
        .body(Body::from(vec![7u8; len]))
        .unwrap()
    };
    assert_eq!(app.clone().oneshot(put(8)).await.unwrap().status(), StatusCode::OK);
    assert_eq!(app.clone().oneshot(put(9)).await.unwrap().status(), StatusCode::PAYLOAD_TOO_LARGE);

    let (_, s) = call(&app, "GET", &format!("/api/v1/session/{id}"), None).await;
    assert_eq!(s["form"]["answerImage"]["bytes"], 8);
  }
}
