//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{EncodedImage, GradingReport};
use crate::session::ViewState;

pub const NO_CORRECT_POINTS: &str = "No credit-worthy points identified.";
pub const NO_DEDUCTIONS: &str = "No significant deductions.";
pub const NO_MODEL_ANSWER: &str = "No suggested answer provided.";
pub const NO_TIPS: &str = "No additional tips provided.";

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetState,
    SetQuestion {
        text: String,
    },
    SetAnswer {
        text: String,
    },
    SetQuestionImage {
        #[serde(rename = "dataUrl")]
        data_url: String,
    },
    SetAnswerImage {
        #[serde(rename = "dataUrl")]
        data_url: String,
    },
    ClearQuestionImage,
    ClearAnswerImage,
    Submit,
    Reset,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    State { session: SessionOut },
    Error { message: String },
}

/// Report as the result view shows it: absent sections replaced by their fallback phrase.
/// The writing approach has no fallback and is simply left out.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub marks: String,
    pub correct_points: String,
    pub missing_points: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_approach: Option<String>,
    pub suggested_answer: String,
    pub tips: String,
    pub raw: String,
}

fn or_fallback(section: &Option<String>, fallback: &str) -> String {
    match section.as_deref() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => fallback.to_string(),
    }
}

impl ReportView {
    pub fn new(report: &GradingReport, raw: &str) -> Self {
        Self {
            marks: report.marks.clone(),
            correct_points: or_fallback(&report.correct_points, NO_CORRECT_POINTS),
            missing_points: or_fallback(&report.missing_points, NO_DEDUCTIONS),
            suggested_approach: report.suggested_approach.clone().filter(|s| !s.is_empty()),
            suggested_answer: or_fallback(&report.suggested_answer, NO_MODEL_ANSWER),
            tips: or_fallback(&report.tips, NO_TIPS),
            raw: raw.to_string(),
        }
    }
}

/// What the client learns about a stored image. The payload itself never travels back; the
/// client already has it.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageMeta {
    pub mime_type: String,
    pub bytes: usize,
}

impl From<&EncodedImage> for ImageMeta {
    fn from(img: &EncodedImage) -> Self {
        Self { mime_type: img.mime_type.clone(), bytes: img.decoded_len() }
    }
}

/// Form fields echoed back to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormOut {
    pub question: String,
    pub answer: String,
    pub question_image: Option<ImageMeta>,
    pub answer_image: Option<ImageMeta>,
}

/// DTO used by both WS and HTTP for session delivery.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub id: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<FormOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportView>,
}

/// Convert a session's view state to the public DTO.
pub fn to_out(id: &str, view: &ViewState) -> SessionOut {
    SessionOut {
        id: id.to_string(),
        state: view.name(),
        form: view.form().map(|f| FormOut {
            question: f.question_text.clone(),
            answer: f.answer_text.clone(),
            question_image: f.question_image.as_ref().map(ImageMeta::from),
            answer_image: f.answer_image.as_ref().map(ImageMeta::from),
        }),
        error: view.error().map(str::to_string),
        report: view.report().map(|(r, raw)| ReportView::new(r, raw)),
    }
}

//
// HTTP request/response DTOs
//

/// Partial form update. Text fields replace when present; image fields replace with a data URL,
/// or clear the image when explicitly `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormIn {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub question_image: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub answer_image: Option<Option<String>>,
}

/// Distinguishes a missing field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateIn {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub question_image: Option<String>,
    #[serde(default)]
    pub answer_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportOut {
    pub report: ReportView,
}

#[derive(Deserialize)]
pub struct SectionizeIn {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sectionizer::sectionize;

    #[test]
    fn report_view_applies_fallbacks() {
        let raw = "Nothing recognisable here.";
        let view = ReportView::new(&sectionize(raw), raw);
        assert_eq!(view.marks, "N/A");
        assert_eq!(view.correct_points, NO_CORRECT_POINTS);
        assert_eq!(view.missing_points, NO_DEDUCTIONS);
        assert_eq!(view.suggested_approach, None);
        assert_eq!(view.suggested_answer, NO_MODEL_ANSWER);
        assert_eq!(view.tips, NO_TIPS);
    }

    #[test]
    fn empty_sections_also_fall_back() {
        let raw = "Correct Points:\n\nSuggested Writing Approach:\n";
        let view = ReportView::new(&sectionize(raw), raw);
        assert_eq!(view.correct_points, NO_CORRECT_POINTS);
        assert_eq!(view.suggested_approach, None);
    }

    #[test]
    fn form_in_tells_null_from_missing() {
        let f: FormIn = serde_json::from_str(r#"{"question":"Q","questionImage":null}"#).unwrap();
        assert_eq!(f.question.as_deref(), Some("Q"));
        assert_eq!(f.answer, None);
        assert_eq!(f.question_image, Some(None));
        assert_eq!(f.answer_image, None);
    }

    #[test]
    fn ws_messages_use_snake_case_tags() {
        let m: ClientWsMessage =
            serde_json::from_str(r#"{"type":"set_question_image","dataUrl":"data:image/png;base64,aGk="}"#).unwrap();
        assert!(matches!(m, ClientWsMessage::SetQuestionImage { .. }));
        let out = serde_json::to_value(ServerWsMessage::Error { message: "x".into() }).unwrap();
        assert_eq!(out, serde_json::json!({"type": "error", "message": "x"}));
    }

    #[test]
    fn idle_session_serializes_without_report() {
        let out = serde_json::to_value(to_out("s1", &ViewState::default())).unwrap();
        assert_eq!(out["state"], "idle");
        assert_eq!(out["form"]["question"], "");
        assert!(out.get("report").is_none());
        assert!(out.get("error").is_none());
    }

    #[test]
    fn form_snapshot_carries_image_metadata_only() {
        let payload = "aGVsbG8gd29ybGQ=";
        let view = ViewState::Idle {
            form: crate::domain::SubmissionInput {
                answer_image: Some(EncodedImage { data: payload.into(), mime_type: "image/png".into() }),
                ..Default::default()
            },
            error: None,
        };
        let out = serde_json::to_value(to_out("s1", &view)).unwrap();
        assert_eq!(out["form"]["answerImage"], serde_json::json!({"mimeType": "image/png", "bytes": 11}));
        assert!(out["form"]["questionImage"].is_null());
        assert!(!out.to_string().contains(payload));
    }
}
