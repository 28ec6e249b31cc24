//! Splits the examiner's free-text reply into named sections.
//!
//! The reply is expected to look like:
//!
//! ```text
//! Marks: 3.5/5
//!
//! Correct Points:
//! - ...
//!
//! Missing / Incorrect Points:
//! - ...
//! ```
//!
//! Nothing enforces that shape, so every section is optional. A section runs from the line after
//! its marker up to the next line that starts with any known marker, wherever that marker sits in
//! the reply. Only the marker test is case-insensitive; body lines are copied verbatim.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::GradingReport;

pub const MARKS: &str = "Marks:";
pub const CORRECT_POINTS: &str = "Correct Points:";
pub const MISSING_POINTS: &str = "Missing / Incorrect Points:";
pub const SUGGESTED_APPROACH: &str = "Suggested Writing Approach:";
pub const SUGGESTED_ANSWER: &str = "Suggested Model Answer:";
pub const EXAMINER_TIPS: &str = "Examiner Tips:";

/// All markers, in the order the model is asked to emit them.
pub const MARKERS: [&str; 6] =
  [MARKS, CORRECT_POINTS, MISSING_POINTS, SUGGESTED_APPROACH, SUGGESTED_ANSWER, EXAMINER_TIPS];

pub const NO_MARKS: &str = "N/A";

fn marks_regex() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?i-u)Marks: ([0-9]\.?[0-9]?/5)").expect("static regex"))
}

fn starts_with_marker(line: &str, marker: &str) -> bool {
  line.trim().to_lowercase().starts_with(&marker.to_lowercase())
}

fn is_boundary(line: &str) -> bool {
  MARKERS.iter().any(|m| starts_with_marker(line, m))
}

/// The `X/5` score, or "N/A" when the reply carries none.
pub fn extract_marks(raw: &str) -> String {
  marks_regex()
    .captures(raw)
    .and_then(|c| c.get(1))
    .map(|m| m.as_str().to_string())
    .unwrap_or_else(|| NO_MARKS.to_string())
}

/// Body of the first section introduced by `marker`.
pub fn extract_section(lines: &[&str], marker: &str) -> Option<String> {
  let start = lines.iter().position(|l| starts_with_marker(l, marker))?;
  let body: Vec<&str> = lines[start + 1..]
    .iter()
    .take_while(|l| !is_boundary(l))
    .copied()
    .collect();
  Some(body.join("\n").trim().to_string())
}

/// Parse one raw reply. Pure; calling it twice on the same text gives the same report.
pub fn sectionize(raw: &str) -> GradingReport {
  let lines: Vec<&str> = raw.split('\n').collect();
  GradingReport {
    marks: extract_marks(raw),
    correct_points: extract_section(&lines, CORRECT_POINTS),
    missing_points: extract_section(&lines, MISSING_POINTS),
    suggested_approach: extract_section(&lines, SUGGESTED_APPROACH),
    suggested_answer: extract_section(&lines, SUGGESTED_ANSWER),
    tips: extract_section(&lines, EXAMINER_TIPS),
  }
}
