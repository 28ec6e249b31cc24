//! Per-form view state: idle → submitting → reported, or back to idle with an error.
//!
//! One exclusive state at a time, changed only through the named actions below. Actions that do
//! not apply to the current state are no-ops and report `false` (or `Ignored`).

use crate::domain::{GradingReport, SubmissionInput};
use crate::error::EvaluationError;
use crate::sectionizer::sectionize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewState {
  /// Form visible, optionally with the inline error of the last attempt.
  Idle { form: SubmissionInput, error: Option<String> },
  /// A request is in flight for this snapshot of the form.
  Submitting { form: SubmissionInput },
  /// Report view; the form is gone until reset.
  Reported { report: GradingReport, raw: String },
}

impl Default for ViewState {
  fn default() -> Self {
    ViewState::Idle { form: SubmissionInput::default(), error: None }
  }
}

/// Result of asking to submit.
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// Now `Submitting`; send this snapshot to the model.
  Dispatch(SubmissionInput),
  /// Validation failed; state stays `Idle` with the error set.
  Rejected,
  /// Not in `Idle`; nothing changed.
  Ignored,
}

impl ViewState {
  pub fn name(&self) -> &'static str {
    match self {
      ViewState::Idle { .. } => "idle",
      ViewState::Submitting { .. } => "submitting",
      ViewState::Reported { .. } => "reported",
    }
  }

  /// Editable form, only while idle.
  pub fn form_mut(&mut self) -> Option<&mut SubmissionInput> {
    match self {
      ViewState::Idle { form, .. } => Some(form),
      _ => None,
    }
  }

  pub fn form(&self) -> Option<&SubmissionInput> {
    match self {
      ViewState::Idle { form, .. } | ViewState::Submitting { form } => Some(form),
      ViewState::Reported { .. } => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      ViewState::Idle { error, .. } => error.as_deref(),
      _ => None,
    }
  }

  pub fn report(&self) -> Option<(&GradingReport, &str)> {
    match self {
      ViewState::Reported { report, raw } => Some((report, raw)),
      _ => None,
    }
  }

  pub fn begin_submit(&mut self) -> SubmitOutcome {
    let ViewState::Idle { form, error } = self else {
      return SubmitOutcome::Ignored;
    };
    if let Err(e) = form.validate() {
      *error = Some(e.user_message().to_string());
      return SubmitOutcome::Rejected;
    }
    let form = std::mem::take(form);
    *self = ViewState::Submitting { form: form.clone() };
    SubmitOutcome::Dispatch(form)
  }

  pub fn succeed(&mut self, raw: String) -> bool {
    if !matches!(self, ViewState::Submitting { .. }) {
      return false;
    }
    let report = sectionize(&raw);
    *self = ViewState::Reported { report, raw };
    true
  }

  /// Back to the form with the input intact and the error shown.
  pub fn fail(&mut self, err: &EvaluationError) -> bool {
    let ViewState::Submitting { form } = self else {
      return false;
    };
    let form = std::mem::take(form);
    *self = ViewState::Idle { form, error: Some(err.user_message().to_string()) };
    true
  }

  /// Clears inputs, report and error at once. Refused while a request is in flight.
  pub fn reset(&mut self) -> bool {
    if matches!(self, ViewState::Submitting { .. }) {
      return false;
    }
    *self = ViewState::default();
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::EncodedImage;
  use crate::error::{EMPTY_RESPONSE_MESSAGE, TRANSPORT_MESSAGE, VALIDATION_MESSAGE};

  fn filled() -> ViewState {
    let mut s = ViewState::default();
    let form = s.form_mut().unwrap();
    form.question_text = "Define reflex action.".into();
    form.answer_image = Some(EncodedImage { data: "aGk=".into(), mime_type: "image/jpeg".into() });
    s
  }

  #[test]
  fn starts_idle_and_empty() {
    let s = ViewState::default();
    assert_eq!(s.name(), "idle");
    assert_eq!(s.form(), Some(&SubmissionInput::default()));
    assert_eq!(s.error(), None);
  }

  #[test]
  fn invalid_submit_stays_idle_with_error() {
    let mut s = ViewState::default();
    s.form_mut().unwrap().answer_text = "Only an answer".into();
    assert_eq!(s.begin_submit(), SubmitOutcome::Rejected);
    assert_eq!(s.name(), "idle");
    assert_eq!(s.error(), Some(VALIDATION_MESSAGE));
    assert_eq!(s.form().unwrap().answer_text, "Only an answer");
  }

  #[test]
  fn valid_submit_dispatches_snapshot_and_clears_error() {
    let mut s = filled();
    if let ViewState::Idle { error, .. } = &mut s {
      *error = Some("old".into());
    }
    let expected = s.form().unwrap().clone();
    assert_eq!(s.begin_submit(), SubmitOutcome::Dispatch(expected.clone()));
    assert_eq!(s, ViewState::Submitting { form: expected });
    assert_eq!(s.error(), None);
  }

  #[test]
  fn second_submit_while_submitting_is_a_no_op() {
    let mut s = filled();
    s.begin_submit();
    let before = s.clone();
    assert_eq!(s.begin_submit(), SubmitOutcome::Ignored);
    assert_eq!(s, before);
  }

  #[test]
  fn form_is_locked_outside_idle() {
    let mut s = filled();
    s.begin_submit();
    assert!(s.form_mut().is_none());
  }

  #[test]
  fn success_produces_a_report() {
    let mut s = filled();
    s.begin_submit();
    assert!(s.succeed("Marks: 2/5\nCorrect Points:\n- one".into()));
    let (report, raw) = s.report().unwrap();
    assert_eq!(report.marks, "2/5");
    assert_eq!(report.correct_points.as_deref(), Some("- one"));
    assert!(raw.starts_with("Marks"));
    assert!(s.form().is_none());
  }

  #[test]
  fn failures_return_to_the_form_with_a_message() {
    for (err, msg) in [
      (EvaluationError::EmptyResponse, EMPTY_RESPONSE_MESSAGE),
      (EvaluationError::Transport("boom".into()), TRANSPORT_MESSAGE),
    ] {
      let mut s = filled();
      let form = s.form().unwrap().clone();
      s.begin_submit();
      assert!(s.fail(&err));
      assert_eq!(s, ViewState::Idle { form, error: Some(msg.into()) });
    }
  }

  #[test]
  fn outcomes_outside_submitting_are_ignored() {
    let mut s = filled();
    assert!(!s.succeed("Marks: 5/5".into()));
    assert!(!s.fail(&EvaluationError::EmptyResponse));
    assert_eq!(s, filled());
  }

  #[test]
  fn reset_clears_everything() {
    let mut s = filled();
    s.begin_submit();
    s.succeed("Marks: 5/5".into());
    assert!(s.reset());
    assert_eq!(s, ViewState::default());

    let mut s = filled();
    s.form_mut().unwrap().answer_image = None;
    s.begin_submit();
    assert!(s.error().is_some());
    assert!(s.reset());
    assert_eq!(s, ViewState::default());
  }

  #[test]
  fn reset_is_refused_while_submitting() {
    let mut s = filled();
    s.begin_submit();
    assert!(!s.reset());
    assert_eq!(s.name(), "submitting");
  }
}
