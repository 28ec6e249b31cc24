//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// Values are inserted in one pass, so a value containing `{other}` is left alone.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  'scan: while let Some(start) = rest.find('{') {
    out.push_str(&rest[..start]);
    let tail = &rest[start..];
    for (k, v) in pairs {
      let needle = format!("{{{}}}", k);
      if tail.starts_with(&needle) {
        out.push_str(v);
        rest = &tail[needle.len()..];
        continue 'scan;
      }
    }
    out.push('{');
    rest = &tail[1..];
  }
  out.push_str(rest);
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge provider error bodies.
pub fn trunc_for_log(s: &str, max_chars: usize) -> String {
  match s.char_indices().nth(max_chars) {
    None => s.to_string(),
    Some((cut, _)) => format!("{}… ({} bytes total)", &s[..cut], s.len()),
  }
}
