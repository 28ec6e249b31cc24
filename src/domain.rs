//! Domain models used by the backend: encoded images, the form submission and the parsed report.

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;

/// Base64 image payload as it travels to the model (no `data:` prefix).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
  pub data: String,
  pub mime_type: String,
}

impl EncodedImage {
  /// Size of the image before encoding, derived from the padded base64 length.
  pub fn decoded_len(&self) -> usize {
    let pad = self.data.bytes().rev().take_while(|b| *b == b'=').take(2).count();
    (self.data.len() / 4 * 3).saturating_sub(pad)
  }
}

/// Everything the user typed or uploaded for one evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionInput {
  pub question_text: String,
  pub question_image: Option<EncodedImage>,
  pub answer_text: String,
  pub answer_image: Option<EncodedImage>,
}

impl SubmissionInput {
  pub fn has_question(&self) -> bool {
    !self.question_text.trim().is_empty() || self.question_image.is_some()
  }

  pub fn has_answer(&self) -> bool {
    !self.answer_text.trim().is_empty() || self.answer_image.is_some()
  }

  /// Both the question and the answer need at least one representation.
  pub fn validate(&self) -> Result<(), EvaluationError> {
    if self.has_question() && self.has_answer() {
      Ok(())
    } else {
      Err(EvaluationError::Validation)
    }
  }
}

/// Sections extracted from one raw examiner reply.
///
/// `None` means the marker never appeared; `Some("")` means it appeared with nothing under it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingReport {
  pub marks: String,
  pub correct_points: Option<String>,
  pub missing_points: Option<String>,
  pub suggested_approach: Option<String>,
  pub suggested_answer: Option<String>,
  pub tips: Option<String>,
}
