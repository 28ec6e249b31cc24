//! Minimal Gemini client for our use-case.
//!
//! We only call `models/{model}:generateContent` once per submission: no retries, no backoff and
//! no client-side timeout. Calls are instrumented and log model name, latency, part counts and
//! token usage (not contents).
//!
//! NOTE: We never log the API key and we keep error body truncations short to avoid PII leaks.

use std::time::Instant;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::EvaluationError;
use crate::request::{GradingRequest, Part};
use crate::util::trunc_for_log;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub temperature: f32,
}

impl Gemini {
  pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_key: api_key.into(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
      model: model.into(),
      temperature,
    }
  }

  /// Construct the client if we find GEMINI_API_KEY (or API_KEY); otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY")
      .or_else(|_| std::env::var("API_KEY"))
      .ok()
      .filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
    let temperature = std::env::var("GEMINI_TEMPERATURE")
      .ok()
      .and_then(|t| t.parse::<f32>().ok())
      .unwrap_or(DEFAULT_TEMPERATURE);

    Some(Self::new(api_key, base_url, model, temperature))
  }

  fn endpoint(&self) -> String {
    format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
  }

  /// One completion call. `Ok(None)` when the provider answered but produced no text.
  #[instrument(
    level = "info",
    skip(self, req),
    fields(model = %self.model, prompt_len = req.prompt_text().map_or(0, str::len), images = req.image_count())
  )]
  pub async fn generate(&self, req: &GradingRequest) -> Result<Option<String>, EvaluationError> {
    let body = GenerateContentRequest::from_grading(req, self.temperature);
    let start = Instant::now();

    let res = self.client.post(self.endpoint())
      .header(USER_AGENT, "examiner-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&body).send().await
      .map_err(|e| {
        error!(elapsed = ?start.elapsed(), error = %e, "Gemini request could not be sent");
        EvaluationError::Transport(e.to_string())
      })?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_gemini_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      error!(elapsed = ?start.elapsed(), %status, error = %msg, "Gemini returned an error status");
      return Err(EvaluationError::Transport(format!("Gemini HTTP {}: {}", status, msg)));
    }

    let body: GenerateContentResponse = res.json().await.map_err(|e| {
      error!(elapsed = ?start.elapsed(), error = %e, "Gemini response body could not be decoded");
      EvaluationError::Transport(e.to_string())
    })?;

    if let Some(usage) = &body.usage_metadata {
      info!(prompt_tokens = ?usage.prompt_token_count, completion_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }

    let text = body.text();
    info!(elapsed = ?start.elapsed(), reply_len = text.as_ref().map_or(0, String::len), "Model response received");
    Ok(text)
  }
}

// --- generateContent DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
  system_instruction: ContentReq<'a>,
  contents: Vec<ContentReq<'a>>,
  generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct ContentReq<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  role: Option<&'static str>,
  parts: Vec<PartReq<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PartReq<'a> {
  Text { text: &'a str },
  Inline {
    #[serde(rename = "inlineData")]
    inline_data: InlineDataReq<'a>,
  },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataReq<'a> {
  mime_type: &'a str,
  data: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig { temperature: f32 }

impl<'a> GenerateContentRequest<'a> {
  fn from_grading(req: &'a GradingRequest, temperature: f32) -> Self {
    let parts = req.parts.iter().map(|p| match p {
      Part::Text(text) => PartReq::Text { text: text.as_str() },
      Part::InlineImage(img) => PartReq::Inline {
        inline_data: InlineDataReq { mime_type: &img.mime_type, data: &img.data },
      },
    }).collect();

    Self {
      system_instruction: ContentReq { role: None, parts: vec![PartReq::Text { text: req.system_instruction.as_str() }] },
      contents: vec![ContentReq { role: Some("user"), parts }],
      generation_config: GenerationConfig { temperature },
    }
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate { #[serde(default)] content: Option<ContentResp> }
#[derive(Deserialize)]
struct ContentResp { #[serde(default)] parts: Vec<PartResp> }
#[derive(Deserialize)]
struct PartResp { #[serde(default)] text: Option<String> }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

impl GenerateContentResponse {
  /// Concatenated text parts of the first candidate; None only when that text is empty.
  /// Whitespace still counts as a reply and ends up as a report of fallbacks.
  fn text(&self) -> Option<String> {
    let content = self.candidates.first()?.content.as_ref()?;
    let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if text.is_empty() { None } else { Some(text) }
  }
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
