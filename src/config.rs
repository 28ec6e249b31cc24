//! Loading examiner configuration (prompts) from TOML, and runtime limits from env.
//!
//! See `ExaminerConfig` and `Prompts` for the expected schema. Every prompt field is optional in
//! the file; missing fields keep the built-in CBSE examiner wording.

use std::{str::FromStr, time::Duration};

use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ExaminerConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts sent to the model.
///
/// `prompt_template` understands `{question}` and `{answer}`. The placeholders stand in for a
/// blank text field when the matching image carries the content instead.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system_instruction: String,
  pub prompt_template: String,
  pub question_placeholder: String,
  pub answer_placeholder: String,
}

const DEFAULT_SYSTEM_INSTRUCTION: &str = r#"You are a high-level, strict CBSE Board Examiner for Class 10.
Your evaluation must strictly adhere to the following CBSE protocols:
1. MARKING SCHEME: Allocate exactly 1 mark per valid scientific/historical/mathematical point or reasoning, up to a maximum of 5.
2. KEYWORDS: CBSE marking is keyword-centric. If the essential technical terms (as per NCERT) are missing, deduct marks even if the general explanation is correct.
3. STRUCTURE: Prioritize answers that use bullet points, sub-headings, and clear definitions.
4. ACCURACY: Use NCERT textbooks as the primary source of truth.
5. COMPETENCY: Evaluate for conceptual clarity, not just rote memorization.

SPECIAL RULE: If you do not know something or if a required piece of information is missing from the student's answer, write "Not mentioned by student".

Do not praise the student. Be clinical, objective, and exam-focused.
Do not add any extra text outside the specified format. Respond ONLY with the requested sections.

IMPORTANT:
- If a student answer image is provided, perform precise OCR.
- If keywords are missing, explicitly list them in the 'Missing' section."#;

const DEFAULT_PROMPT_TEMPLATE: &str = r#"--- CONTEXT ---
Question Text: {question}
Student Answer Text: {answer}

--- TASK ---
Evaluate this response based on CBSE Class 10 Board Standards.

Instructions:
- Marks: Provide a score out of 5 (e.g., 3.5/5).
- Correct Points: Identify valid points that earn marks. If none, write "Not mentioned by student".
- Missing / Incorrect Points: Identify missing technical keywords or conceptual errors. If none, write "Not mentioned by student".
- Suggested Writing Approach: Breakdown the structure (e.g., 'Define X, explain process Y in 3 points, provide 1 example').
- Suggested Model Answer: A perfect 'Topper-style' answer with mandatory keywords in **bold**.
- Examiner Tips: 2 strategic tips to avoid losing marks in the actual board exam.

Respond ONLY in this format:

Marks: X/5

Correct Points:
- ...

Missing / Incorrect Points:
- ...

Suggested Writing Approach:
...

Suggested Model Answer:
...

Examiner Tips:
- ...
- ..."#;

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system_instruction: DEFAULT_SYSTEM_INSTRUCTION.into(),
      prompt_template: DEFAULT_PROMPT_TEMPLATE.into(),
      question_placeholder: "Refer to Question Image.".into(),
      answer_placeholder: "Refer to Student Answer Image.".into(),
    }
  }
}

/// Attempt to load `ExaminerConfig` from EXAMINER_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_examiner_config_from_env() -> Option<ExaminerConfig> {
  let path = std::env::var("EXAMINER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_examiner_config(&s) {
      Ok(cfg) => {
        info!(target: "examiner_backend", %path, "Loaded examiner config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "examiner_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "examiner_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_examiner_config(s: &str) -> Result<ExaminerConfig, toml::de::Error> {
  toml::from_str::<ExaminerConfig>(s)
}

/// Inline image data above this size is rejected by the model anyway.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Bounds on what clients may keep in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
  /// Largest accepted image, measured on the decoded bytes.
  pub max_upload_bytes: usize,
  /// Idle time after which an HTTP session is dropped.
  pub session_ttl: Duration,
  /// Live sessions allowed at once, WebSocket ones included.
  pub max_sessions: usize,
}

impl Default for Limits {
  fn default() -> Self {
    Self {
      max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
      session_ttl: DEFAULT_SESSION_TTL,
      max_sessions: DEFAULT_MAX_SESSIONS,
    }
  }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
  let raw = std::env::var(key).ok()?;
  match raw.trim().parse::<T>() {
    Ok(v) => Some(v),
    Err(_) => {
      warn!(target: "examiner_backend", key, value = %raw, "Ignoring unparsable env value");
      None
    }
  }
}

/// Read MAX_UPLOAD_BYTES, SESSION_TTL_SECS and MAX_SESSIONS, falling back to the defaults.
pub fn limits_from_env() -> Limits {
  let defaults = Limits::default();
  Limits {
    max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
    session_ttl: env_parse::<u64>("SESSION_TTL_SECS")
      .filter(|s| *s > 0)
      .map(Duration::from_secs)
      .unwrap_or(defaults.session_ttl),
    max_sessions: env_parse("MAX_SESSIONS").filter(|n| *n > 0).unwrap_or(defaults.max_sessions),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_override_keeps_other_defaults() {
    let cfg = parse_examiner_config(
      r#"
      [prompts]
      question_placeholder = "See attached question."
      "#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.question_placeholder, "See attached question.");
    assert_eq!(cfg.prompts.answer_placeholder, "Refer to Student Answer Image.");
    assert_eq!(cfg.prompts.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
  }

  #[test]
  fn empty_file_is_all_defaults() {
    let cfg = parse_examiner_config("").unwrap();
    assert_eq!(cfg.prompts.prompt_template, DEFAULT_PROMPT_TEMPLATE);
  }

  #[test]
  fn default_template_lists_every_marker_in_order() {
    let tpl = &Prompts::default().prompt_template;
    let format = &tpl[tpl.find("Respond ONLY in this format:").unwrap()..];
    let positions: Vec<usize> = crate::sectionizer::MARKERS
      .iter()
      .map(|m| format.find(m).unwrap())
      .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn malformed_toml_is_an_error() {
    assert!(parse_examiner_config("[prompts\nsystem_instruction = 1").is_err());
  }
}
