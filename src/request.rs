//! Request assembly: system instruction, prompt text and ordered content parts.
//!
//! Pure transformation. Callers validate the submission first.

use crate::config::Prompts;
use crate::domain::{EncodedImage, SubmissionInput};
use crate::util::fill_template;

/// One entry of the user turn sent to the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Part {
  Text(String),
  InlineImage(EncodedImage),
}

/// Everything the completion client needs for one grading call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GradingRequest {
  pub system_instruction: String,
  pub parts: Vec<Part>,
}

impl GradingRequest {
  pub fn prompt_text(&self) -> Option<&str> {
    match self.parts.first() {
      Some(Part::Text(t)) => Some(t),
      _ => None,
    }
  }

  pub fn image_count(&self) -> usize {
    self.parts.iter().filter(|p| matches!(p, Part::InlineImage(_))).count()
  }
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
  if text.trim().is_empty() { placeholder } else { text }
}

/// Prompt text with question/answer interpolated.
pub fn build_prompt(prompts: &Prompts, question: &str, answer: &str) -> String {
  fill_template(
    &prompts.prompt_template,
    &[
      ("question", or_placeholder(question, &prompts.question_placeholder)),
      ("answer", or_placeholder(answer, &prompts.answer_placeholder)),
    ],
  )
}

/// Text first, then the question image, then the answer image.
pub fn build_request(prompts: &Prompts, input: SubmissionInput) -> GradingRequest {
  let mut parts = vec![Part::Text(build_prompt(prompts, &input.question_text, &input.answer_text))];
  if let Some(img) = input.question_image {
    parts.push(Part::InlineImage(img));
  }
  if let Some(img) = input.answer_image {
    parts.push(Part::InlineImage(img));
  }

  GradingRequest { system_instruction: prompts.system_instruction.clone(), parts }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn img(tag: &str) -> EncodedImage {
    EncodedImage { data: tag.into(), mime_type: "image/jpeg".into() }
  }

  fn prompts() -> Prompts {
    Prompts {
      system_instruction: "be strict".into(),
      prompt_template: "Q={question}\nA={answer}".into(),
      ..Prompts::default()
    }
  }

  #[test]
  fn text_only_request_has_a_single_part() {
    let req = build_request(
      &prompts(),
      SubmissionInput {
        question_text: "Define reflex action.".into(),
        answer_text: "An automatic response.".into(),
        ..Default::default()
      },
    );
    assert_eq!(req.system_instruction, "be strict");
    assert_eq!(req.parts, vec![Part::Text("Q=Define reflex action.\nA=An automatic response.".into())]);
    assert_eq!(req.image_count(), 0);
  }

  #[test]
  fn images_follow_the_text_question_first() {
    let req = build_request(
      &prompts(),
      SubmissionInput {
        question_image: Some(img("q")),
        answer_image: Some(img("a")),
        ..Default::default()
      },
    );
    assert_eq!(
      req.parts,
      vec![
        Part::Text("Q=Refer to Question Image.\nA=Refer to Student Answer Image.".into()),
        Part::InlineImage(img("q")),
        Part::InlineImage(img("a")),
      ]
    );
  }

  #[test]
  fn answer_image_alone_comes_right_after_text() {
    let req = build_request(
      &prompts(),
      SubmissionInput {
        question_text: "State Ohm's law.".into(),
        answer_image: Some(img("a")),
        ..Default::default()
      },
    );
    assert_eq!(req.parts.len(), 2);
    assert_eq!(req.parts[1], Part::InlineImage(img("a")));
    assert_eq!(req.prompt_text(), Some("Q=State Ohm's law.\nA=Refer to Student Answer Image."));
  }

  #[test]
  fn whitespace_text_uses_placeholder() {
    let p = build_prompt(&prompts(), "  \n", "V = IR");
    assert_eq!(p, "Q=Refer to Question Image.\nA=V = IR");
  }

  #[test]
  fn default_template_interpolates_both_fields() {
    let p = build_prompt(&Prompts::default(), "What is a reflex arc?", "");
    assert!(p.contains("Question Text: What is a reflex arc?"));
    assert!(p.contains("Student Answer Text: Refer to Student Answer Image."));
    assert!(!p.contains("{question}"));
  }
}
